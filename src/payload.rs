//! Request bodies sent to the HR API.
//!
//! Each endpoint gets its own struct so the JSON shape is checked by the compiler,
//! and a `validate` method so a malformed body is caught before it's sent under load.

use chrono::{DateTime, Local, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

use crate::identity::IdentityRecord;

/// Attendance check-in endpoint.
pub const ATTENDANCE_CREATE_PATH: &str = "/v1/attendance-management/biometric/create";

/// Employee creation endpoint.
pub const EMPLOYEE_CREATE_PATH: &str = "/v1/employee-central/profile/employee-information/create";

/// Employee ids of roster users start here.
pub const FIRST_EMPLOYEE_FID: u32 = 70;

/// Password given to every created employee.
const CREATED_EMPLOYEE_PASSWORD: &str = "Test@123456";

/// A request body that failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadError {
    /// The offending JSON field.
    pub field: &'static str,
    /// The offending value.
    pub value: String,
    /// What is wrong with it.
    pub detail: String,
}
impl PayloadError {
    fn new(field: &'static str, value: impl ToString, detail: &str) -> Self {
        PayloadError {
            field,
            value: value.to_string(),
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PayloadError: invalid {} {:?} ({})",
            self.field, self.value, self.detail
        )
    }
}

impl std::error::Error for PayloadError {}

/// Direction of a biometric punch.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Display, EnumString)]
pub enum InOutFlag {
    #[serde(rename = "IN")]
    #[strum(serialize = "IN")]
    In,
    #[serde(rename = "OUT")]
    #[strum(serialize = "OUT")]
    Out,
}

/// Body of [`ATTENDANCE_CREATE_PATH`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct AttendancePayload {
    pub employee_fid: u32,
    pub device_user_id: String,
    /// RFC 3339 timestamp in UTC with milliseconds.
    pub date: String,
    /// Local hour of the punch.
    pub hours: u32,
    /// Local minute of the punch.
    pub minutes: u32,
    pub in_out_flag: InOutFlag,
    pub hardware_type: String,
    pub is_lock: bool,
    pub seconds: u32,
    pub milliseconds: u32,
}
impl AttendancePayload {
    /// A biometric punch for `employee_fid` at `punched_at`.
    pub fn new(employee_fid: u32, punched_at: DateTime<Local>, in_out_flag: InOutFlag) -> Self {
        AttendancePayload {
            employee_fid,
            device_user_id: "1".to_string(),
            date: punched_at
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            hours: punched_at.hour(),
            minutes: punched_at.minute(),
            in_out_flag,
            hardware_type: "BIOMETRIC".to_string(),
            is_lock: false,
            seconds: 0,
            milliseconds: 0,
        }
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.device_user_id.is_empty() {
            return Err(PayloadError::new(
                "device_user_id",
                &self.device_user_id,
                "must not be empty",
            ));
        }
        if self.hours > 23 {
            return Err(PayloadError::new("hours", self.hours, "must be below 24"));
        }
        if self.minutes > 59 {
            return Err(PayloadError::new("minutes", self.minutes, "must be below 60"));
        }
        if DateTime::parse_from_rfc3339(&self.date).is_err() {
            return Err(PayloadError::new("date", &self.date, "must be RFC 3339"));
        }
        Ok(())
    }
}

/// Body of [`EMPLOYEE_CREATE_PATH`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct EmployeeProfilePayload {
    pub prefix: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub employee_code: String,
    pub father_name: String,
    pub spouse_name: String,
    pub official_email: String,
    pub personal_email: String,
    pub gender: String,
    pub mobile_number: String,
    pub date_of_birth: String,
    pub date_of_joining: String,
    pub date_of_probation: String,
    pub date_of_confirmation: String,
    pub scheduled_confirmation_date: String,
    #[serde(rename = "aadhar_number")]
    pub national_id: String,
    #[serde(rename = "pan_number")]
    pub tax_id: String,
    pub pf_applicable: String,
    pub pension_applicable: String,
    pub lwf_applicable: String,
    pub pt_applicable: String,
    pub esic_applicable: String,
    pub biometric_code: String,
    pub employee_type: String,
    pub currency: String,
    pub attendance_marking_mode: String,
    pub department_id: u32,
    pub designation_fid: u32,
    pub role_fid: u32,
    pub division_id: u32,
    pub grade_id: u32,
    pub employee_category_id: u32,
    pub company_setting_id: u32,
    pub manager_fid: u32,
    pub company_reg_fid: u32,
    pub location_id: u32,
    pub shift_id: u32,
    pub calculation_table_fid: u32,
    pub password: String,
}
impl EmployeeProfilePayload {
    /// Profile for 0-based `iteration` of 1-based `worker`, using its identity record.
    pub fn new(worker: usize, iteration: usize, identity: &IdentityRecord) -> Self {
        let n = iteration + 1;
        let even = iteration % 2 == 0;
        let no = || "No".to_string();

        EmployeeProfilePayload {
            prefix: if even { "MR" } else { "MS" }.to_string(),
            first_name: format!("User{}_{:03}", worker, n),
            middle_name: format!("M{}_{}", worker, n),
            last_name: format!("LastName{}_{}", worker, n),
            employee_code: identity.employee_code.clone(),
            father_name: format!("Father{}_{}", worker, n),
            spouse_name: format!("Spouse{}_{}", worker, n),
            official_email: identity.official_email.clone(),
            personal_email: identity.personal_email.clone(),
            gender: if even { "MALE" } else { "FEMALE" }.to_string(),
            mobile_number: identity.mobile_number.clone(),
            date_of_birth: "2003-02-20T00:00:00.000Z".to_string(),
            date_of_joining: "2025-12-10T00:00:00.000Z".to_string(),
            date_of_probation: "2025-12-10T00:00:00.000Z".to_string(),
            date_of_confirmation: "2026-06-10T00:00:00.000Z".to_string(),
            scheduled_confirmation_date: "2026-06-10T00:00:00.000Z".to_string(),
            national_id: identity.national_id.clone(),
            tax_id: identity.tax_id.clone(),
            pf_applicable: no(),
            pension_applicable: no(),
            lwf_applicable: no(),
            pt_applicable: no(),
            esic_applicable: no(),
            biometric_code: identity.biometric_code.clone(),
            employee_type: "PERMANENT".to_string(),
            currency: "INR".to_string(),
            attendance_marking_mode: "BIOMETRIC".to_string(),
            department_id: 32,
            designation_fid: 34,
            role_fid: 3,
            division_id: 18,
            grade_id: 11,
            employee_category_id: 8,
            company_setting_id: 1,
            manager_fid: 10,
            company_reg_fid: 1,
            location_id: 12,
            shift_id: 11,
            calculation_table_fid: 1,
            password: CREATED_EMPLOYEE_PASSWORD.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.employee_code.is_empty() {
            return Err(PayloadError::new(
                "employee_code",
                &self.employee_code,
                "must not be empty",
            ));
        }
        if !is_digits(&self.mobile_number, 10) {
            return Err(PayloadError::new(
                "mobile_number",
                &self.mobile_number,
                "must be 10 digits",
            ));
        }
        if !is_digits(&self.national_id, 12) {
            return Err(PayloadError::new(
                "aadhar_number",
                &self.national_id,
                "must be 12 digits",
            ));
        }
        for (field, email) in [
            ("official_email", &self.official_email),
            ("personal_email", &self.personal_email),
        ] {
            if !is_email(email) {
                return Err(PayloadError::new(field, email, "must be an email address"));
            }
        }
        if self.password.is_empty() {
            return Err(PayloadError::new("password", "", "must not be empty"));
        }
        Ok(())
    }
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::deterministic;
    use chrono::TimeZone;
    use serde_json::Value;

    #[test]
    fn attendance_payload_shape() {
        let punched_at = Local.with_ymd_and_hms(2026, 10, 19, 8, 52, 0).unwrap();
        let payload = AttendancePayload::new(71, punched_at, InOutFlag::In);
        assert!(payload.validate().is_ok());
        assert_eq!(payload.hours, 8);
        assert_eq!(payload.minutes, 52);

        let json: Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["employee_fid"], 71);
        assert_eq!(json["device_user_id"], "1");
        assert_eq!(json["in_out_flag"], "IN");
        assert_eq!(json["hardware_type"], "BIOMETRIC");
        assert_eq!(json["is_lock"], false);
        assert!(json["date"].as_str().unwrap().ends_with(".000Z"));
    }

    #[test]
    fn attendance_validation() {
        let mut payload = AttendancePayload::new(70, Local::now(), InOutFlag::Out);
        payload.minutes = 60;
        assert_eq!(payload.validate().unwrap_err().field, "minutes");
        payload.minutes = 0;
        payload.date = "yesterday".to_string();
        assert_eq!(payload.validate().unwrap_err().field, "date");
    }

    #[test]
    fn employee_payload_from_identity() {
        let identity = deterministic::record(3, 2, 200);
        let payload = EmployeeProfilePayload::new(3, 1, &identity);
        assert!(payload.validate().is_ok());
        assert_eq!(payload.prefix, "MS");
        assert_eq!(payload.gender, "FEMALE");
        assert_eq!(payload.first_name, "User3_002");
        assert_eq!(payload.employee_code, "VU03EMP0002");

        let json: Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["aadhar_number"], identity.national_id.as_str());
        assert_eq!(json["pan_number"], identity.tax_id.as_str());
        assert_eq!(json["department_id"], 32);
        assert!(json.get("national_id").is_none());
    }

    #[test]
    fn employee_validation_catches_bad_identity() {
        let mut identity = deterministic::record(1, 1, 200);
        identity.mobile_number = "98761".to_string();
        let error = EmployeeProfilePayload::new(1, 0, &identity)
            .validate()
            .unwrap_err();
        assert_eq!(error.field, "mobile_number");

        let mut identity = deterministic::record(1, 1, 200);
        identity.personal_email = "nobody".to_string();
        let error = EmployeeProfilePayload::new(1, 0, &identity)
            .validate()
            .unwrap_err();
        assert_eq!(error.field, "personal_email");
    }

    #[test]
    fn in_out_flag_parses() {
        assert_eq!("OUT".parse::<InOutFlag>().unwrap(), InOutFlag::Out);
        assert_eq!(InOutFlag::In.to_string(), "IN");
    }
}
