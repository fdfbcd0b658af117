//! Identity records as a pure function of worker and record indices.
//!
//! Employee codes, emails and biometric codes embed both indices literally and can't
//! collide. Mobile numbers and national ids are derived arithmetically and then
//! truncated, so they can collide on large tables; callers must [`verify`] the result.
//! Tax ids are drawn from a bounded space and repeat legitimately, they are not a
//! critical field.
//!
//! [`verify`]: super::verify

use super::{IdentityRecord, WorkerIdentitySet};
use crate::util::{first_digits, last_digits, pad};

/// Letters used in tax ids.
pub(crate) const TAX_ID_ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Mobile prefixes are `MOBILE_PREFIX_BASE + worker % 10`.
pub(crate) const MOBILE_PREFIX_BASE: u64 = 98_760;

/// First national id before worker and record offsets are added.
pub(crate) const NATIONAL_ID_BASE: u64 = 299_400_000_000;

/// Per-worker offset added to the mobile sequence number.
const MOBILE_WORKER_OFFSET: u64 = 1_000_000;

/// Per-worker offset added to national ids.
const NATIONAL_ID_WORKER_OFFSET: u64 = 2_000_000;

/// Per-record offset added to national ids.
const NATIONAL_ID_RECORD_STEP: u64 = 100;

/// Generates `per_worker` records for each of `worker_count` workers.
pub fn generate(worker_count: u32, per_worker: u32) -> Vec<WorkerIdentitySet> {
    (1..=worker_count)
        .map(|worker| WorkerIdentitySet {
            worker,
            records: (1..=per_worker)
                .map(|record| self::record(worker, record, per_worker))
                .collect(),
        })
        .collect()
}

/// Record `record` (1-based) of worker `worker` (1-based).
pub fn record(worker: u32, record: u32, per_worker: u32) -> IdentityRecord {
    let v = worker as u64;
    let i = record as u64;
    let sequence = (v - 1) * per_worker as u64 + i;

    let mobile_prefix = MOBILE_PREFIX_BASE + v % 10;
    let mobile_suffix = last_digits(10_000 + sequence + v * MOBILE_WORKER_OFFSET, 5);

    let national_id = first_digits(
        NATIONAL_ID_BASE + v * NATIONAL_ID_WORKER_OFFSET + i * NATIONAL_ID_RECORD_STEP,
        12,
    );

    let first_letter = TAX_ID_ALPHABET[((v - 1) % 26) as usize] as char;
    let second_letter = TAX_ID_ALPHABET[((i / 10) % 26) as usize] as char;
    let tax_digits = last_digits(1_000 + (v * 10 + i) % 1_000, 4);

    IdentityRecord {
        employee_code: format!("VU{}EMP{}", pad(v, 2), pad(i, 4)),
        mobile_number: format!("{}{}", mobile_prefix, mobile_suffix),
        personal_email: format!("vu{}_user{}@testdomain{}.com", v, pad(i, 4), v % 5),
        official_email: format!("emp_vu{}_{}@company{}.com", v, pad(i, 4), v % 3),
        national_id,
        tax_id: format!("{}{}PT{}A", first_letter, second_letter, tax_digits),
        biometric_code: format!("BIO_VU{}_{}", pad(v, 2), pad(i, 4)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_record_of_first_worker() {
        let r = record(1, 1, 200);
        assert_eq!(r.employee_code, "VU01EMP0001");
        assert_eq!(r.mobile_number, "9876110001");
        assert_eq!(r.personal_email, "vu1_user0001@testdomain1.com");
        assert_eq!(r.official_email, "emp_vu1_0001@company1.com");
        assert_eq!(r.national_id, "299402000100");
        assert_eq!(r.tax_id, "AAPT1011A");
        assert_eq!(r.biometric_code, "BIO_VU01_0001");
    }

    #[test]
    fn later_worker_and_record() {
        let r = record(12, 37, 200);
        assert_eq!(r.employee_code, "VU12EMP0037");
        // sequence 11 * 200 + 37 = 2237, 10000 + 2237 + 12,000,000 = 12,012,237
        assert_eq!(r.mobile_number, "9876212237");
        assert_eq!(r.personal_email, "vu12_user0037@testdomain2.com");
        assert_eq!(r.official_email, "emp_vu12_0037@company0.com");
        assert_eq!(r.national_id, "299424003700");
        // (12 * 10 + 37) % 1000 = 157
        assert_eq!(r.tax_id, "LDPT1157A");
        assert_eq!(r.biometric_code, "BIO_VU12_0037");
    }

    #[test]
    fn mobile_numbers_are_ten_digits() {
        for set in generate(50, 200) {
            for r in set.records {
                assert_eq!(r.mobile_number.len(), 10, "{}", r.mobile_number);
                assert_eq!(r.national_id.len(), 12);
            }
        }
    }

    #[test]
    fn tax_ids_repeat_once_spaces_wrap() {
        // Record 260,001 wraps both the 26-letter and the 1000-number spaces.
        let a = record(1, 1, 300_000);
        let b = record(1, 260_001, 300_000);
        assert_eq!(a.tax_id, b.tax_id);
    }
}
