//! Unique identity data for bulk employee creation.
//!
//! The target rejects a new employee whose employee code, mobile number or national
//! id already exists, so every worker needs its own, globally unique values for these
//! "critical" fields. The table is generated once, before the load test starts, and
//! then shared read-only with all workers.
//!
//! Generation first tries the [`deterministic`] strategy, a pure function of the
//! worker and record indices. Some of its derivations truncate numbers, which can
//! collide on large tables, so the whole table is [`verify`]ed; a single duplicate
//! discards it and the [`fallback`] strategy resamples random values until each is
//! unique. Whichever strategy produced the table, the critical fields are unique
//! across all workers.
//!
//! ```rust
//! use hrms_loadtest::identity::{generate, Strategy};
//!
//! let table = generate(2, 3).unwrap();
//! assert_eq!(table.strategy, Strategy::Deterministic);
//! assert_eq!(table.worker(2).unwrap().records[0].employee_code, "VU02EMP0001");
//! ```

pub mod deterministic;
pub mod fallback;

use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Generated identity fields for one employee.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct IdentityRecord {
    pub employee_code: String,
    pub mobile_number: String,
    pub personal_email: String,
    pub official_email: String,
    pub national_id: String,
    pub tax_id: String,
    pub biometric_code: String,
}
impl IdentityRecord {
    pub fn critical(&self, field: CriticalField) -> &str {
        match field {
            CriticalField::EmployeeCode => &self.employee_code,
            CriticalField::MobileNumber => &self.mobile_number,
            CriticalField::NationalId => &self.national_id,
        }
    }
}

/// The records owned by one worker.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct WorkerIdentitySet {
    /// 1-based worker id.
    pub worker: u32,
    pub records: Vec<IdentityRecord>,
}
impl WorkerIdentitySet {
    /// Record for a 0-based iteration.
    pub fn record(&self, iteration: usize) -> Option<&IdentityRecord> {
        self.records.get(iteration)
    }
}

/// How an [`IdentityTable`] was produced.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Display)]
pub enum Strategy {
    #[strum(serialize = "deterministic")]
    Deterministic,
    #[strum(serialize = "fallback")]
    Fallback,
}

/// Identity data for every worker, indexed by 1-based worker id.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct IdentityTable {
    pub strategy: Strategy,
    pub workers: Vec<WorkerIdentitySet>,
}
impl IdentityTable {
    /// Slice of a 1-based worker, `None` if the worker has no data.
    pub fn worker(&self, worker: usize) -> Option<&WorkerIdentitySet> {
        worker
            .checked_sub(1)
            .and_then(|index| self.workers.get(index))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn record_count(&self) -> usize {
        self.workers.iter().map(|w| w.records.len()).sum()
    }

    pub fn records(&self) -> impl Iterator<Item = &IdentityRecord> {
        self.workers.iter().flat_map(|w| w.records.iter())
    }
}

/// Fields the target requires to be unique.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum CriticalField {
    #[strum(serialize = "employee code")]
    EmployeeCode,
    #[strum(serialize = "mobile number")]
    MobileNumber,
    #[strum(serialize = "national id")]
    NationalId,
}

/// Why generation could not use a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationError {
    /// The table holds a duplicate critical value; non-fatal, triggers the fallback.
    VerificationFailed {
        /// Field of the first duplicate found.
        field: CriticalField,
        /// The duplicated value.
        value: String,
        /// 1-based worker holding the second occurrence.
        worker: u32,
        /// Total number of duplicates across all critical fields.
        duplicates: usize,
    },
    /// The fallback could not find an unused value; fatal.
    RetryExhausted {
        /// Field that ran out of candidates.
        field: CriticalField,
        /// 1-based worker being generated.
        worker: u32,
        /// How many candidates were drawn.
        attempts: usize,
    },
}
impl GenerationError {
    fn describe(&self) -> &str {
        match *self {
            GenerationError::VerificationFailed { .. } => "duplicate critical value",
            GenerationError::RetryExhausted { .. } => "no unused value left to draw",
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GenerationError::VerificationFailed {
                field,
                ref value,
                worker,
                duplicates,
            } => write!(
                f,
                "GenerationError: {} ({} {} in VU {}, {} duplicates)",
                self.describe(),
                field,
                value,
                worker,
                duplicates
            ),
            GenerationError::RetryExhausted {
                field,
                worker,
                attempts,
            } => write!(
                f,
                "GenerationError: {} ({} for VU {} after {} attempts)",
                self.describe(),
                field,
                worker,
                attempts
            ),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Only the first collisions are logged individually.
const MAX_LOGGED_COLLISIONS: usize = 10;

/// Checks that every critical field is unique across the whole table.
///
/// The error describes the first duplicate and counts all of them.
pub fn verify(workers: &[WorkerIdentitySet]) -> Result<(), GenerationError> {
    let mut first: Option<(CriticalField, String, u32)> = None;
    let mut duplicates = 0;

    for field in CriticalField::iter() {
        let mut seen: HashSet<&str> = HashSet::new();
        for set in workers {
            for record in &set.records {
                let value = record.critical(field);
                if !seen.insert(value) {
                    if duplicates < MAX_LOGGED_COLLISIONS {
                        warn!("collision: {} {:?} in VU {}", field, value, set.worker);
                    }
                    duplicates += 1;
                    if first.is_none() {
                        first = Some((field, value.to_string(), set.worker));
                    }
                }
            }
        }
    }

    match first {
        None => Ok(()),
        Some((field, value, worker)) => Err(GenerationError::VerificationFailed {
            field,
            value,
            worker,
            duplicates,
        }),
    }
}

/// Generates and verifies the identity table for `worker_count` workers with
/// `per_worker` records each, falling back to random sampling on collision.
pub fn generate(worker_count: u32, per_worker: u32) -> Result<IdentityTable, GenerationError> {
    generate_with_limit(worker_count, per_worker, fallback::MAX_RESAMPLE_ATTEMPTS)
}

/// Like [`generate`], with an explicit per-value resample cap for the fallback.
pub fn generate_with_limit(
    worker_count: u32,
    per_worker: u32,
    max_attempts: usize,
) -> Result<IdentityTable, GenerationError> {
    info!(
        "generating identities for {} VUs x {} records",
        worker_count, per_worker
    );
    let workers = deterministic::generate(worker_count, per_worker);

    let table = match verify(&workers) {
        Ok(()) => IdentityTable {
            strategy: Strategy::Deterministic,
            workers,
        },
        Err(e) => {
            warn!("{}, switching to randomized generation", e);
            let workers = fallback::generate(
                worker_count,
                per_worker,
                &mut rand::rng(),
                max_attempts,
            )?;
            IdentityTable {
                strategy: Strategy::Fallback,
                workers,
            }
        }
    };

    log_table(&table);
    Ok(table)
}

fn log_table(table: &IdentityTable) {
    info!(
        "{} strategy: {} unique records for {} VUs",
        table.strategy,
        table.record_count().to_formatted_string(&Locale::en),
        table.worker_count().to_formatted_string(&Locale::en),
    );
    for set in table.workers.iter().take(2) {
        let codes: Vec<&str> = set
            .records
            .iter()
            .take(3)
            .map(|r| r.employee_code.as_str())
            .collect();
        let mobiles: Vec<&str> = set
            .records
            .iter()
            .take(3)
            .map(|r| r.mobile_number.as_str())
            .collect();
        debug!(
            "VU {} sample employee codes: {}; mobiles: {}",
            set.worker,
            codes.join(", "),
            mobiles.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_critical_fields_unique(table: &IdentityTable) {
        for field in CriticalField::iter() {
            let values: HashSet<&str> = table.records().map(|r| r.critical(field)).collect();
            assert_eq!(values.len(), table.record_count(), "{} not unique", field);
        }
    }

    #[test]
    fn small_table_uses_deterministic_strategy() {
        let table = generate(2, 3).unwrap();
        assert_eq!(table.strategy, Strategy::Deterministic);
        let codes: Vec<&str> = table.records().map(|r| r.employee_code.as_str()).collect();
        assert_eq!(
            codes,
            vec![
                "VU01EMP0001",
                "VU01EMP0002",
                "VU01EMP0003",
                "VU02EMP0001",
                "VU02EMP0002",
                "VU02EMP0003"
            ]
        );
        assert_critical_fields_unique(&table);
    }

    #[test]
    fn default_workload_size_verifies() {
        let table = generate(50, 200).unwrap();
        assert_eq!(table.strategy, Strategy::Deterministic);
        assert_eq!(table.record_count(), 10_000);
        assert_critical_fields_unique(&table);
    }

    #[test]
    fn generation_is_repeatable() {
        assert_eq!(generate(7, 25).unwrap(), generate(7, 25).unwrap());
    }

    #[test]
    fn mobile_collision_switches_to_fallback() {
        // VU 1 record 1 and VU 11 record 1 share a prefix and the last five digits
        // of their sequence number once 11 x 10,000 records exceed 100,000.
        let deterministic = deterministic::generate(11, 10_000);
        assert!(matches!(
            verify(&deterministic),
            Err(GenerationError::VerificationFailed {
                field: CriticalField::MobileNumber,
                ..
            })
        ));

        let table = generate(11, 10_000).unwrap();
        assert_eq!(table.strategy, Strategy::Fallback);
        assert_eq!(table.worker_count(), 11);
        assert_eq!(table.record_count(), 110_000);
        assert_critical_fields_unique(&table);
    }

    #[test]
    fn national_id_collision_is_detected() {
        // VU 1 record 20,001 lands on VU 2 record 1.
        let deterministic = deterministic::generate(2, 20_001);
        let error = verify(&deterministic).unwrap_err();
        match error {
            GenerationError::VerificationFailed {
                field,
                ref value,
                worker,
                ..
            } => {
                assert_eq!(field, CriticalField::NationalId);
                assert_eq!(value, "299404000100");
                assert_eq!(worker, 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn worker_lookup_is_one_based() {
        let table = generate(3, 1).unwrap();
        assert!(table.worker(0).is_none());
        assert_eq!(table.worker(3).unwrap().worker, 3);
        assert!(table.worker(4).is_none());
        assert_eq!(
            table.worker(1).unwrap().record(0).unwrap().biometric_code,
            "BIO_VU01_0001"
        );
    }

    #[test]
    fn empty_table() {
        let table = generate(0, 200).unwrap();
        assert_eq!(table.record_count(), 0);
        assert_eq!(table.strategy, Strategy::Deterministic);
    }
}
