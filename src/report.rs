//! Per-worker outcomes of the bulk creation workload and the run summary built
//! from them.
//!
//! Goose reports request counts and latencies on its own. What it can't report is
//! why the target refused an employee, so every worker keeps a [`WorkerOutcome`]
//! and hands it to the shared [`OutcomeLedger`] when it stops. Once the attack is over
//! the ledger is folded into a [`BulkRunSummary`].

use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use strum_macros::Display;

use crate::identity::Strategy;

/// Why the target refused to create an employee.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Display)]
pub enum Rejection {
    #[strum(serialize = "duplicate employee code")]
    DuplicateEmployeeCode,
    #[strum(serialize = "duplicate mobile number")]
    DuplicateMobile,
    #[strum(serialize = "duplicate national id")]
    DuplicateNationalId,
    #[strum(serialize = "other")]
    Other,
}

/// What one worker achieved.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// 1-based worker id.
    pub worker: usize,
    /// Roster identity the worker logged in as.
    pub identity: String,
    /// Whether the worker ever held a token.
    pub authenticated: bool,
    pub attempted: usize,
    pub created: usize,
    pub failed: usize,
    pub duplicate_employee_codes: usize,
    pub duplicate_mobiles: usize,
    pub duplicate_national_ids: usize,
    /// How many times the token was dropped and fetched again.
    pub token_refreshes: usize,
}
impl WorkerOutcome {
    pub fn new(worker: usize, identity: &str) -> Self {
        WorkerOutcome {
            worker,
            identity: identity.to_string(),
            ..Default::default()
        }
    }

    pub fn record_created(&mut self) {
        self.attempted += 1;
        self.created += 1;
    }

    pub fn record_rejected(&mut self, rejection: Rejection) {
        self.attempted += 1;
        self.failed += 1;
        match rejection {
            Rejection::DuplicateEmployeeCode => self.duplicate_employee_codes += 1,
            Rejection::DuplicateMobile => self.duplicate_mobiles += 1,
            Rejection::DuplicateNationalId => self.duplicate_national_ids += 1,
            Rejection::Other => (),
        }
    }
}

/// Collects outcomes from all workers.
#[derive(Debug, Default)]
pub struct OutcomeLedger {
    outcomes: Mutex<Vec<WorkerOutcome>>,
}
impl OutcomeLedger {
    pub fn new() -> Self {
        OutcomeLedger::default()
    }

    pub fn record(&self, outcome: WorkerOutcome) {
        match self.outcomes.lock() {
            Ok(mut outcomes) => outcomes.push(outcome),
            Err(poisoned) => poisoned.into_inner().push(outcome),
        }
    }

    /// All outcomes, ordered by worker.
    pub fn outcomes(&self) -> Vec<WorkerOutcome> {
        let mut outcomes = match self.outcomes.lock() {
            Ok(outcomes) => outcomes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        outcomes.sort_by_key(|o| o.worker);
        outcomes
    }
}

/// Advice derived from the success rate.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Recommendation {
    /// Below 30%: the target is overwhelmed or the data is wrong.
    Critical,
    /// Below 70%: the target struggles at this concurrency.
    Degraded,
    Healthy,
}
impl Recommendation {
    pub fn for_success_rate(success_rate: f64) -> Self {
        if success_rate < 30.0 {
            Recommendation::Critical
        } else if success_rate < 70.0 {
            Recommendation::Degraded
        } else {
            Recommendation::Healthy
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let advice = match *self {
            Recommendation::Critical => {
                "critical: reduce workers, add pacing and check the duplicate counters"
            }
            Recommendation::Degraded => "degraded: the target struggles, try fewer workers",
            Recommendation::Healthy => "healthy: the target sustains this load",
        };
        write!(f, "{}", advice)
    }
}

/// Totals over all workers of a bulk creation run.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct BulkRunSummary {
    pub strategy: Strategy,
    pub workers: usize,
    /// Workers that never obtained a token.
    pub unauthenticated_workers: usize,
    pub attempted: usize,
    pub created: usize,
    pub failed: usize,
    pub duplicate_employee_codes: usize,
    pub duplicate_mobiles: usize,
    pub duplicate_national_ids: usize,
    pub token_refreshes: usize,
    /// Percentage of attempts that created an employee, 0 when nothing was attempted.
    pub success_rate: f64,
    pub recommendation: Recommendation,
    pub outcomes: Vec<WorkerOutcome>,
}
impl BulkRunSummary {
    pub fn new(strategy: Strategy, outcomes: Vec<WorkerOutcome>) -> Self {
        let sum = |f: fn(&WorkerOutcome) -> usize| outcomes.iter().map(f).sum::<usize>();
        let attempted = sum(|o| o.attempted);
        let created = sum(|o| o.created);
        let success_rate = if attempted == 0 {
            0.0
        } else {
            created as f64 * 100.0 / attempted as f64
        };

        BulkRunSummary {
            strategy,
            workers: outcomes.len(),
            unauthenticated_workers: outcomes.iter().filter(|o| !o.authenticated).count(),
            attempted,
            created,
            failed: sum(|o| o.failed),
            duplicate_employee_codes: sum(|o| o.duplicate_employee_codes),
            duplicate_mobiles: sum(|o| o.duplicate_mobiles),
            duplicate_national_ids: sum(|o| o.duplicate_national_ids),
            token_refreshes: sum(|o| o.token_refreshes),
            success_rate,
            recommendation: Recommendation::for_success_rate(success_rate),
            outcomes,
        }
    }

    /// Writes the summary as pretty-printed JSON.
    pub fn write_json(&self, path: &str) -> Result<(), crate::LoadTestError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("wrote run summary to {}", path);
        Ok(())
    }
}

impl fmt::Display for BulkRunSummary {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let rule = " ------------------------------------------------------------------------------";
        writeln!(fmt, "\n === BULK USER CREATION ===\n{}", rule)?;
        writeln!(fmt, " {:<28} | {}", "Identity strategy", self.strategy)?;
        let rows = [
            ("Workers", self.workers),
            ("Workers without token", self.unauthenticated_workers),
            ("Attempted", self.attempted),
            ("Created", self.created),
            ("Failed", self.failed),
            ("Duplicate employee codes", self.duplicate_employee_codes),
            ("Duplicate mobile numbers", self.duplicate_mobiles),
            ("Duplicate national ids", self.duplicate_national_ids),
            ("Token refreshes", self.token_refreshes),
        ];
        for (label, value) in rows {
            writeln!(
                fmt,
                " {:<28} | {}",
                label,
                value.to_formatted_string(&Locale::en)
            )?;
        }
        writeln!(fmt, " {:<28} | {:.2}%", "Success rate", self.success_rate)?;
        writeln!(fmt, "{}", rule)?;
        writeln!(fmt, " {}", self.recommendation)?;
        writeln!(fmt, "{}", rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(worker: usize, created: usize, rejections: &[Rejection]) -> WorkerOutcome {
        let mut outcome = WorkerOutcome::new(worker, &format!("GSPL-{}", 1099 + worker));
        outcome.authenticated = true;
        for _ in 0..created {
            outcome.record_created();
        }
        for rejection in rejections {
            outcome.record_rejected(*rejection);
        }
        outcome
    }

    #[test]
    fn recommendation_tiers() {
        assert_eq!(Recommendation::for_success_rate(0.0), Recommendation::Critical);
        assert_eq!(Recommendation::for_success_rate(29.99), Recommendation::Critical);
        assert_eq!(Recommendation::for_success_rate(30.0), Recommendation::Degraded);
        assert_eq!(Recommendation::for_success_rate(69.9), Recommendation::Degraded);
        assert_eq!(Recommendation::for_success_rate(70.0), Recommendation::Healthy);
        assert_eq!(Recommendation::for_success_rate(100.0), Recommendation::Healthy);
    }

    #[test]
    fn summary_totals() {
        let ledger = OutcomeLedger::new();
        ledger.record(outcome(
            2,
            1,
            &[Rejection::DuplicateMobile, Rejection::Other],
        ));
        ledger.record(outcome(1, 4, &[]));
        let mut silent = WorkerOutcome::new(3, "GSPL-1102");
        silent.token_refreshes = 2;
        ledger.record(silent);

        let outcomes = ledger.outcomes();
        assert_eq!(
            outcomes.iter().map(|o| o.worker).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let summary = BulkRunSummary::new(Strategy::Deterministic, outcomes);
        assert_eq!(summary.workers, 3);
        assert_eq!(summary.unauthenticated_workers, 1);
        assert_eq!(summary.attempted, 7);
        assert_eq!(summary.created, 5);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.duplicate_mobiles, 1);
        assert_eq!(summary.duplicate_employee_codes, 0);
        assert_eq!(summary.token_refreshes, 2);
        assert!((summary.success_rate - 500.0 / 7.0).abs() < 1e-9);
        assert_eq!(summary.recommendation, Recommendation::Healthy);

        let rendered = summary.to_string();
        assert!(rendered.contains("Success rate"));
        assert!(rendered.contains("71.43%"));
    }

    #[test]
    fn empty_run_is_critical() {
        let summary = BulkRunSummary::new(Strategy::Fallback, Vec::new());
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.recommendation, Recommendation::Critical);
    }

    #[test]
    fn summary_file_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = BulkRunSummary::new(Strategy::Deterministic, vec![outcome(1, 2, &[])]);
        summary.write_json(path.to_str().unwrap()).unwrap();

        let written: BulkRunSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, summary);
    }
}
