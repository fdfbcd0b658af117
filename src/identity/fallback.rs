//! Randomized identity records, used when the deterministic table collides.
//!
//! Critical fields are drawn at random and redrawn until unused across the whole
//! table. Each draw is capped at `max_attempts` candidates so a space that is (nearly)
//! full fails with [`GenerationError::RetryExhausted`] instead of spinning forever.
//! Emails and biometric codes embed a millisecond timestamp instead of being checked.

use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;

use super::deterministic::{MOBILE_PREFIX_BASE, NATIONAL_ID_BASE, TAX_ID_ALPHABET};
use super::{CriticalField, GenerationError, IdentityRecord, WorkerIdentitySet};
use crate::util::{first_digits, pad};

/// Default cap on candidates drawn for one value.
pub const MAX_RESAMPLE_ATTEMPTS: usize = 10_000;

/// Span of random national id offsets.
const NATIONAL_ID_SPAN: u64 = 1_000_000_000;

#[derive(Default)]
struct UsedValues {
    employee_codes: HashSet<String>,
    mobile_numbers: HashSet<String>,
    national_ids: HashSet<String>,
}

/// Draws candidates until one is absent from `used`, then records it.
pub(crate) fn draw_unique<F>(
    used: &mut HashSet<String>,
    field: CriticalField,
    worker: u32,
    max_attempts: usize,
    mut draw: F,
) -> Result<String, GenerationError>
where
    F: FnMut() -> String,
{
    for _ in 0..max_attempts {
        let candidate = draw();
        if !used.contains(&candidate) {
            used.insert(candidate.clone());
            return Ok(candidate);
        }
    }
    Err(GenerationError::RetryExhausted {
        field,
        worker,
        attempts: max_attempts,
    })
}

/// Generates `per_worker` random records for each of `worker_count` workers.
pub fn generate<R: Rng + ?Sized>(
    worker_count: u32,
    per_worker: u32,
    rng: &mut R,
    max_attempts: usize,
) -> Result<Vec<WorkerIdentitySet>, GenerationError> {
    let mut used = UsedValues::default();
    let mut workers = Vec::with_capacity(worker_count as usize);

    for worker in 1..=worker_count {
        let mut records = Vec::with_capacity(per_worker as usize);
        for record in 1..=per_worker {
            records.push(self::record(worker, record, rng, &mut used, max_attempts)?);
        }
        workers.push(WorkerIdentitySet { worker, records });
    }

    info!(
        "fallback generated {} unique employee codes",
        used.employee_codes.len()
    );
    Ok(workers)
}

fn record<R: Rng + ?Sized>(
    worker: u32,
    record: u32,
    rng: &mut R,
    used: &mut UsedValues,
    max_attempts: usize,
) -> Result<IdentityRecord, GenerationError> {
    let v = worker as i64;
    let i = record as i64;
    let timestamp = Utc::now().timestamp_millis() + v * 1_000 + i;

    let employee_code = draw_unique(
        &mut used.employee_codes,
        CriticalField::EmployeeCode,
        worker,
        max_attempts,
        || format!("EMP{}_V{}", pad(rng.random_range(0..1_000_000), 6), v),
    )?;
    let mobile_number = draw_unique(
        &mut used.mobile_numbers,
        CriticalField::MobileNumber,
        worker,
        max_attempts,
        || {
            format!(
                "{}{}",
                MOBILE_PREFIX_BASE + rng.random_range(0..10),
                rng.random_range(10_000..100_000u64)
            )
        },
    )?;
    let national_id = draw_unique(
        &mut used.national_ids,
        CriticalField::NationalId,
        worker,
        max_attempts,
        || first_digits(NATIONAL_ID_BASE + rng.random_range(0..NATIONAL_ID_SPAN), 12),
    )?;

    let first_letter = TAX_ID_ALPHABET[rng.random_range(0..26)] as char;
    let second_letter = TAX_ID_ALPHABET[rng.random_range(0..26)] as char;
    let tax_digits: u32 = rng.random_range(1_000..10_000);

    Ok(IdentityRecord {
        employee_code,
        mobile_number,
        personal_email: format!("user_{}_vu{}_{}@gmail.com", timestamp, v, i),
        official_email: format!("emp_{}_vu{}_{}@company.com", timestamp, v, i),
        national_id,
        tax_id: format!("{}{}PT{}A", first_letter, second_letter, tax_digits),
        biometric_code: format!("BIO_{}_VU{}_{}", timestamp, v, i),
    })
}
