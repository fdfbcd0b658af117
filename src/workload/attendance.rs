//! Morning biometric check-in.
//!
//! Every worker logs in with a roster credential and posts one attendance record per
//! iteration. The [`AttendanceMode`] decides when the punch is dated, which employee it
//! is for, and how long the worker pauses afterwards.

use chrono::{DateTime, Duration, Local};
use goose::prelude::*;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{login, mark_failed, send_authorized, worker_index, WorkloadRun};
use crate::auth::SharedTokenCache;
use crate::config::{AttendanceMode, AttendanceOptions};
use crate::logger::{payload, DiagnosticsSink};
use crate::payload::{AttendancePayload, InOutFlag, ATTENDANCE_CREATE_PATH, FIRST_EMPLOYEE_FID};
use crate::roster::{Credential, Roster};
use crate::{util, LoadTestError};

/// Realistic punches are spread this many minutes around 09:00.
const MORNING_WINDOW_MINUTES: i64 = 15;

/// High-load workers map onto this many distinct employees.
const HIGH_LOAD_EMPLOYEES: usize = 1000;

/// State shared by all attendance workers.
pub struct AttendanceContext {
    pub mode: AttendanceMode,
    pub roster: Roster,
    pub tokens: SharedTokenCache,
    pub sink: Arc<dyn DiagnosticsSink>,
}
impl AttendanceContext {
    pub fn new(mode: AttendanceMode, roster: Roster, sink: Arc<dyn DiagnosticsSink>) -> Self {
        AttendanceContext {
            mode,
            roster,
            tokens: SharedTokenCache::new(),
            sink,
        }
    }

    /// Credential and employee id used by a 1-based worker.
    pub fn assignment(&self, worker: usize) -> (&Credential, u32) {
        match self.mode {
            AttendanceMode::HighLoad => {
                let credential = &self.roster.credentials()[worker % self.roster.len()];
                let employee = FIRST_EMPLOYEE_FID + (worker % HIGH_LOAD_EMPLOYEES) as u32;
                (credential, employee)
            }
            AttendanceMode::Realistic | AttendanceMode::Spike => {
                let employee = FIRST_EMPLOYEE_FID + self.roster.index_of(worker) as u32;
                (self.roster.assign(worker), employee)
            }
        }
    }
}

/// 09:00 local time on the day of `now`, shifted by `offset_minutes`.
pub fn morning_punch(now: DateTime<Local>, offset_minutes: i64) -> DateTime<Local> {
    let morning = now
        .date_naive()
        .and_hms_opt(9, 0, 0)
        .and_then(|nine| nine.and_local_timezone(Local).earliest())
        .unwrap_or(now);
    morning + Duration::minutes(offset_minutes)
}

/// Whether the target accepted a check-in: 201 and a body with `status: true` and a
/// record id.
pub fn check_in_accepted(status: u16, body: Option<&Value>) -> bool {
    status == 201
        && body.is_some_and(|body| {
            body.get("status") == Some(&Value::Bool(true))
                && body.get("data").and_then(|data| data.get("id")).is_some()
        })
}

fn payload_for(mode: AttendanceMode, employee_fid: u32) -> AttendancePayload {
    let mut rng = rand::rng();
    match mode {
        AttendanceMode::Realistic => {
            let offset = rng.random_range(-MORNING_WINDOW_MINUTES..=MORNING_WINDOW_MINUTES);
            AttendancePayload::new(
                employee_fid,
                morning_punch(Local::now(), offset),
                InOutFlag::In,
            )
        }
        AttendanceMode::Spike | AttendanceMode::HighLoad => {
            let flag = if rng.random_bool(0.5) {
                InOutFlag::In
            } else {
                InOutFlag::Out
            };
            AttendancePayload::new(employee_fid, Local::now(), flag)
        }
    }
}

async fn pause_after_success(mode: AttendanceMode) {
    let secs = match mode {
        AttendanceMode::Realistic => util::jitter_secs(1.0, 3.0),
        AttendanceMode::Spike => 0.1,
        AttendanceMode::HighLoad => util::jitter_secs(0.0, 0.5),
    };
    util::sleep_secs(secs).await;
}

/// Posts one attendance record.
async fn check_in(user: &mut GooseUser, context: &AttendanceContext) -> TransactionResult {
    let worker = worker_index(user);
    let (credential, employee_fid) = context.assignment(worker);

    let token = match login(user, &context.tokens, credential, context.sink.as_ref()).await {
        Some(token) => token,
        None => return Ok(()),
    };

    let attendance = payload_for(context.mode, employee_fid);
    if let Err(e) = attendance.validate() {
        warn!("VU {}: not sending attendance: {}", worker, e);
        return Ok(());
    }

    let mut reply = send_authorized(
        user,
        GooseMethod::Post,
        ATTENDANCE_CREATE_PATH,
        &token,
        Some(&attendance),
    )
    .await?;

    if check_in_accepted(reply.status, reply.json().as_ref()) {
        pause_after_success(context.mode).await;
        return Ok(());
    }

    context.sink.log_event(
        "ATTENDANCE_FAILED",
        payload(json!({
            "vu": worker,
            "scenario": context.mode.to_string(),
            "endpoint": ATTENDANCE_CREATE_PATH,
            "status": reply.status,
            "duration_ms": reply.duration_ms,
        })),
    );
    mark_failed(user, "attendance not recorded", &mut reply)
}

/// The attendance scenario.
pub fn scenario(context: Arc<AttendanceContext>) -> Scenario {
    let name = format!("Attendance {}", context.mode);
    let transaction: TransactionFunction = Arc::new(move |user| {
        let context = context.clone();
        Box::pin(async move { check_in(user, &context).await })
    });

    Scenario::new(&name)
        .register_transaction(Transaction::new(transaction).set_name("biometric check-in"))
}

/// Runs the attendance workload.
pub async fn run(options: AttendanceOptions) -> Result<(), LoadTestError> {
    let run = WorkloadRun::open(
        &options.host,
        &options.roster_file,
        &options.events_file,
        &options.goose_args,
    )
    .await?;
    info!(
        "attendance: {} mode, {} roster identities",
        options.mode,
        run.roster.len()
    );

    let context = Arc::new(AttendanceContext::new(
        options.mode,
        run.roster.clone(),
        run.sink(),
    ));
    let mut attack = run.attack(scenario(context))?;
    // Spike mode starts every worker within the first second.
    let spike_rate = run.roster.len().to_string();
    attack = match options.mode {
        AttendanceMode::Realistic => *attack
            .set_default(GooseDefault::Users, run.roster.len())?
            .set_default(GooseDefault::HatchRate, "10")?,
        AttendanceMode::Spike => *attack
            .set_default(GooseDefault::Users, run.roster.len())?
            .set_default(GooseDefault::HatchRate, spike_rate.as_str())?,
        AttendanceMode::HighLoad => *attack
            .set_default(GooseDefault::Users, HIGH_LOAD_EMPLOYEES)?
            .set_default(GooseDefault::HatchRate, "100")?,
    };
    if !run.has_run_time() {
        attack = match options.mode {
            AttendanceMode::HighLoad => *attack.set_default(GooseDefault::RunTime, 30usize)?,
            _ => *attack.set_default(GooseDefault::Iterations, 1usize)?,
        };
    }

    run.execute(attack).await?;
    Ok(())
}
