//! Bulk employee creation.
//!
//! Before the attack starts, the [identity generator](crate::identity) builds one
//! slice of unique employee data per worker. Each worker then logs in once, creates
//! one employee per iteration from its own slice, and backs off when the target starts
//! refusing. Every worker keeps its own [`TokenCache`] in Goose session data, so a
//! token refresh by one worker never touches another.
//!
//! When a worker stops, its [`WorkerOutcome`] goes to the shared [`OutcomeLedger`];
//! the ledger is summarized once the attack is over.

use goose::prelude::*;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{mark_failed, send_authorized, user_base, worker_index, Reply, WorkloadRun};
use crate::auth::{GooseExchange, TokenCache};
use crate::config::BulkUsersOptions;
use crate::identity::{self, IdentityTable};
use crate::logger::{payload, DiagnosticsSink};
use crate::payload::{EmployeeProfilePayload, EMPLOYEE_CREATE_PATH};
use crate::report::{BulkRunSummary, OutcomeLedger, Rejection, WorkerOutcome};
use crate::roster::Roster;
use crate::{util, LoadTestError};

/// Login attempts made when a worker starts.
const LOGIN_ATTEMPTS: usize = 3;
/// Consecutive failures before backing off.
const BACKOFF_THRESHOLD: usize = 3;
/// Consecutive failures before fetching a fresh token.
const REFRESH_THRESHOLD: usize = 5;
/// Longest backoff, in seconds.
const MAX_BACKOFF_SECS: u64 = 15;
/// Pause after a request that got no response at all, in seconds.
const NO_RESPONSE_PAUSE_SECS: f64 = 3.0;
/// A strategic pause is taken every this many iterations.
const STRATEGIC_PAUSE_EVERY: usize = 40;

lazy_static! {
    static ref DUPLICATE_EMPLOYEE_CODE: Regex = Regex::new(r"(?i)employee\s*code").unwrap();
    static ref DUPLICATE_MOBILE: Regex = Regex::new(r"(?i)mobile").unwrap();
    static ref DUPLICATE_NATIONAL_ID: Regex = Regex::new(r"(?i)aadhaa?r").unwrap();
}

/// Error message of a refused request: the `message` field of a JSON body, the start
/// of any other JSON body, or the raw body.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => match value.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => util::truncate(&value.to_string(), 300),
        },
        Err(_) => util::truncate(body, 200),
    }
}

/// Classifies why the target refused to create an employee.
pub fn classify(message: &str) -> Rejection {
    if DUPLICATE_EMPLOYEE_CODE.is_match(message) {
        Rejection::DuplicateEmployeeCode
    } else if DUPLICATE_MOBILE.is_match(message) {
        Rejection::DuplicateMobile
    } else if DUPLICATE_NATIONAL_ID.is_match(message) {
        Rejection::DuplicateNationalId
    } else {
        Rejection::Other
    }
}

/// Seconds to back off after `consecutive` failures, if any.
pub fn backoff_secs(consecutive: usize) -> Option<u64> {
    if consecutive >= BACKOFF_THRESHOLD {
        Some((consecutive as u64 * 3).min(MAX_BACKOFF_SECS))
    } else {
        None
    }
}

/// Think time between iterations: slower for higher workers and after failures.
pub fn pacing_secs(worker: usize, consecutive: usize, jitter: f64) -> f64 {
    0.3 + worker as f64 * 0.01 + consecutive as f64 * 0.2 + jitter
}

/// Seconds of the periodic pause after 0-based `iteration`, if one is due.
pub fn strategic_pause_secs(worker: usize, iteration: usize) -> Option<u64> {
    if iteration > 0 && iteration % STRATEGIC_PAUSE_EVERY == 0 {
        Some(1 + worker as u64 % 3)
    } else {
        None
    }
}

/// State shared by all bulk creation workers.
pub struct BulkContext {
    pub table: IdentityTable,
    pub roster: Roster,
    pub pacing: bool,
    pub ledger: OutcomeLedger,
    pub sink: Arc<dyn DiagnosticsSink>,
    /// Multiplier applied to every pause a worker takes; 0 disables them.
    pub pause_scale: f64,
}
impl BulkContext {
    pub fn new(
        table: IdentityTable,
        roster: Roster,
        pacing: bool,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        BulkContext {
            table,
            roster,
            pacing,
            ledger: OutcomeLedger::new(),
            sink,
            pause_scale: 1.0,
        }
    }

    /// Scales login retries, backoff, pacing and no-response pauses.
    pub fn with_pause_scale(mut self, pause_scale: f64) -> Self {
        self.pause_scale = pause_scale;
        self
    }

    async fn pause(&self, secs: f64) {
        util::sleep_secs(secs * self.pause_scale).await;
    }
}

/// Per-worker session data.
#[derive(Debug, Default)]
struct WorkerState {
    tokens: TokenCache,
    token: Option<String>,
    outcome: WorkerOutcome,
    iteration: usize,
    consecutive_failures: usize,
}

fn take_state(user: &mut GooseUser) -> WorkerState {
    user.get_session_data_mut::<WorkerState>()
        .map(std::mem::take)
        .unwrap_or_default()
}

/// Fetches a token into `state`, replacing any cached one.
async fn refresh_token(
    user: &mut GooseUser,
    context: &BulkContext,
    state: &mut WorkerState,
    worker: usize,
) -> bool {
    let credential = context.roster.assign(worker);
    let base = user_base(user);
    state.tokens.invalidate(&base, &credential.identity);
    let mut exchange = GooseExchange::new(user);
    match state
        .tokens
        .acquire(&mut exchange, &base, credential, context.sink.as_ref())
        .await
    {
        Ok(token) => {
            state.token = Some(token);
            state.outcome.authenticated = true;
            true
        }
        Err(_) => false,
    }
}

/// Logs in with a few retries when the worker starts.
async fn authenticate(user: &mut GooseUser, context: &BulkContext) -> TransactionResult {
    let worker = worker_index(user);
    let credential = context.roster.assign(worker);
    let mut state = WorkerState {
        outcome: WorkerOutcome::new(worker, &credential.identity),
        ..Default::default()
    };

    match context.table.worker(worker) {
        Some(set) => {
            for attempt in 0..LOGIN_ATTEMPTS {
                if refresh_token(user, context, &mut state, worker).await {
                    break;
                }
                context.pause((1 + attempt) as f64).await;
            }
            if state.token.is_some() {
                let codes: Vec<&str> = set
                    .records
                    .iter()
                    .take(3)
                    .map(|r| r.employee_code.as_str())
                    .collect();
                info!(
                    "VU {}: starting as {}, employee codes {}...",
                    worker,
                    credential.identity,
                    codes.join(", ")
                );
            } else {
                warn!(
                    "VU {}: failed to get a token for {}",
                    worker, credential.identity
                );
            }
        }
        None => warn!("VU {}: no identity data for this worker", worker),
    }

    user.set_session_data(state);
    Ok(())
}

/// Creates the employee of the current iteration.
async fn create_employee(user: &mut GooseUser, context: &BulkContext) -> TransactionResult {
    let mut state = take_state(user);
    let result = create_next(user, context, &mut state).await;
    user.set_session_data(state);
    result
}

async fn create_next(
    user: &mut GooseUser,
    context: &BulkContext,
    state: &mut WorkerState,
) -> TransactionResult {
    let worker = worker_index(user);
    let iteration = state.iteration;
    let token = match state.token.clone() {
        Some(token) => token,
        None => return Ok(()),
    };
    let record = match context
        .table
        .worker(worker)
        .and_then(|set| set.record(iteration))
    {
        Some(record) => record,
        None => return Ok(()),
    };
    state.iteration += 1;

    if iteration > 0 && iteration % 20 == 0 {
        info!(
            "VU {}: progress {}/{} (created {}, failed {})",
            worker,
            iteration,
            context.table.worker(worker).map_or(0, |set| set.records.len()),
            state.outcome.created,
            state.outcome.failed
        );
    }

    let employee = EmployeeProfilePayload::new(worker, iteration, record);
    if let Err(e) = employee.validate() {
        warn!("VU {}: not sending employee {}: {}", worker, iteration + 1, e);
        return Ok(());
    }

    let mut reply = send_authorized(
        user,
        GooseMethod::Post,
        EMPLOYEE_CREATE_PATH,
        &token,
        Some(&employee),
    )
    .await?;

    let result = if reply.status == 200 || reply.status == 201 {
        state.outcome.record_created();
        state.consecutive_failures = 0;
        if (iteration + 1) % 50 == 0 {
            info!(
                "VU {}: created employee {} ({}, {})",
                worker,
                iteration + 1,
                employee.employee_code,
                employee.mobile_number
            );
        }
        Ok(())
    } else {
        let result = rejected(user, context, state, &employee, &mut reply);
        if !reply.received() {
            context.pause(NO_RESPONSE_PAUSE_SECS).await;
        } else if let Some(secs) = backoff_secs(state.consecutive_failures) {
            info!(
                "VU {}: {} consecutive failures, backing off for {}s",
                worker, state.consecutive_failures, secs
            );
            context.pause(secs as f64).await;
            if state.consecutive_failures >= REFRESH_THRESHOLD
                && refresh_token(user, context, state, worker).await
            {
                state.outcome.token_refreshes += 1;
                info!("VU {}: token refreshed", worker);
            }
        }
        result
    };

    if context.pacing {
        let jitter = util::jitter_secs(0.0, 0.4);
        context
            .pause(pacing_secs(worker, state.consecutive_failures, jitter))
            .await;
        if let Some(secs) = strategic_pause_secs(worker, iteration) {
            info!(
                "VU {}: strategic pause of {}s after {} employees",
                worker, secs, iteration
            );
            context.pause(secs as f64).await;
        }
    }

    result
}

/// Records a refused employee and reports it.
fn rejected(
    user: &mut GooseUser,
    context: &BulkContext,
    state: &mut WorkerState,
    employee: &EmployeeProfilePayload,
    reply: &mut Reply,
) -> TransactionResult {
    let worker = worker_index(user);
    let message = error_message(&reply.body);
    let rejection = if reply.received() {
        classify(&message)
    } else {
        Rejection::Other
    };
    state.outcome.record_rejected(rejection);
    state.consecutive_failures += 1;

    warn!(
        "VU {}: employee {} refused with status {}: {}",
        worker, state.iteration, reply.status, message
    );
    let value = match rejection {
        Rejection::DuplicateEmployeeCode => Some(&employee.employee_code),
        Rejection::DuplicateMobile => Some(&employee.mobile_number),
        Rejection::DuplicateNationalId => Some(&employee.national_id),
        Rejection::Other => None,
    };
    if let Some(value) = value {
        warn!(
            "VU {}: {} {:?} already exists, the target may hold data from an earlier run",
            worker, rejection, value
        );
    }

    context.sink.log_event(
        "EMPLOYEE_CREATE_FAILED",
        payload(json!({
            "vu": worker,
            "employee": state.iteration,
            "status": reply.status,
            "duration_ms": reply.duration_ms,
            "employee_code": employee.employee_code,
            "reason": rejection.to_string(),
            "response": reply.excerpt(),
        })),
    );
    mark_failed(user, "employee not created", reply)
}

/// Hands the worker's outcome to the ledger.
async fn record_outcome(user: &mut GooseUser, context: &BulkContext) -> TransactionResult {
    let state = take_state(user);
    let outcome = state.outcome;
    if outcome.worker > 0 {
        info!(
            "VU {}: completed, created {} of {} attempted",
            outcome.worker, outcome.created, outcome.attempted
        );
        context.ledger.record(outcome);
    }
    Ok(())
}

/// The bulk creation scenario.
pub fn scenario(context: Arc<BulkContext>) -> Scenario {
    let on_start = context.clone();
    let login_transaction: TransactionFunction = Arc::new(move |user| {
        let context = on_start.clone();
        Box::pin(async move { authenticate(user, &context).await })
    });
    let each_iteration = context.clone();
    let create_transaction: TransactionFunction = Arc::new(move |user| {
        let context = each_iteration.clone();
        Box::pin(async move { create_employee(user, &context).await })
    });
    let record_transaction: TransactionFunction = Arc::new(move |user| {
        let context = context.clone();
        Box::pin(async move { record_outcome(user, &context).await })
    });

    scenario!("BulkUsers")
        .register_transaction(
            Transaction::new(login_transaction)
                .set_name("login")
                .set_on_start(),
        )
        .register_transaction(Transaction::new(create_transaction).set_name("create employee"))
        .register_transaction(
            Transaction::new(record_transaction)
                .set_name("record outcome")
                .set_on_stop(),
        )
}

/// Runs the bulk creation workload.
pub async fn run(options: BulkUsersOptions) -> Result<(), LoadTestError> {
    let run = WorkloadRun::open(
        &options.host,
        &options.roster_file,
        &options.events_file,
        &options.goose_args,
    )
    .await?;

    let table = identity::generate(options.workers, options.per_worker)?;
    let strategy = table.strategy;
    let roster = run.roster.first(options.workers as usize);
    info!(
        "bulk-users: {} workers x {} employees, {} admin identities, pacing {}",
        options.workers,
        options.per_worker,
        roster.len(),
        if options.no_pacing { "off" } else { "on" }
    );

    let context = Arc::new(BulkContext::new(
        table,
        roster,
        !options.no_pacing,
        run.sink(),
    ));
    let mut attack = *run
        .attack(scenario(context.clone()))?
        .set_default(GooseDefault::Users, options.workers as usize)?
        .set_default(GooseDefault::HatchRate, "5")?;
    if !run.has_run_time() {
        attack = *attack.set_default(GooseDefault::Iterations, options.per_worker as usize)?;
    }

    run.execute(attack).await?;

    let summary = BulkRunSummary::new(strategy, context.ledger.outcomes());
    info!("{}", summary);
    if !options.summary_file.is_empty() {
        summary.write_json(&options.summary_file)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_classified() {
        assert_eq!(
            classify("Employee code already exists"),
            Rejection::DuplicateEmployeeCode
        );
        assert_eq!(
            classify("EMPLOYEE CODE VU01EMP0001 exists"),
            Rejection::DuplicateEmployeeCode
        );
        assert_eq!(
            classify("mobile number is already registered"),
            Rejection::DuplicateMobile
        );
        assert_eq!(
            classify("Aadhar number already in use"),
            Rejection::DuplicateNationalId
        );
        assert_eq!(classify("internal server error"), Rejection::Other);
    }

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(
            error_message(r#"{"status":false,"message":"Mobile number exists"}"#),
            "Mobile number exists"
        );
        assert_eq!(error_message(r#"{"error":"boom"}"#), r#"{"error":"boom"}"#);
        assert_eq!(error_message("<html>502</html>"), "<html>502</html>");
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_secs(0), None);
        assert_eq!(backoff_secs(2), None);
        assert_eq!(backoff_secs(3), Some(9));
        assert_eq!(backoff_secs(4), Some(12));
        assert_eq!(backoff_secs(5), Some(15));
        assert_eq!(backoff_secs(40), Some(15));
    }

    #[test]
    fn pacing_slows_down_higher_workers_and_failures() {
        assert!((pacing_secs(1, 0, 0.0) - 0.31).abs() < 1e-9);
        assert!((pacing_secs(50, 0, 0.0) - 0.8).abs() < 1e-9);
        assert!((pacing_secs(1, 2, 0.1) - 0.81).abs() < 1e-9);
    }

    #[test]
    fn strategic_pauses() {
        assert_eq!(strategic_pause_secs(1, 0), None);
        assert_eq!(strategic_pause_secs(1, 39), None);
        assert_eq!(strategic_pause_secs(1, 40), Some(2));
        assert_eq!(strategic_pause_secs(3, 80), Some(1));
        assert_eq!(strategic_pause_secs(5, 120), Some(3));
    }
}
