//! Payroll configuration lookups.
//!
//! The first 50 roster identities each get one worker, which logs in and reads the
//! payroll head configuration, the salary structures and the slab directory.

use goose::prelude::*;
use serde_json::json;
use std::sync::Arc;

use super::{login, mark_failed, send_authorized, worker_index, WorkloadRun};
use crate::auth::SharedTokenCache;
use crate::config::TargetOptions;
use crate::logger::{payload, DiagnosticsSink};
use crate::roster::Roster;
use crate::{util, LoadTestError};

/// How many roster identities take part.
pub const PAYROLL_IDENTITIES: usize = 50;

/// Endpoints read by every worker, in order.
pub const PAYROLL_ENDPOINTS: [&str; 3] = [
    "/v1/payroll-compensation/payroll-head-configuration/get-all",
    "/v1/payroll-compensation/salary-structures/get-all",
    "/v1/payroll-compensation/slab-directory/get-all",
];

/// Pause after each lookup, in seconds.
const PAUSE_SECS: f64 = 1.0;

/// State shared by all payroll workers.
pub struct PayrollContext {
    pub roster: Roster,
    pub tokens: SharedTokenCache,
    pub sink: Arc<dyn DiagnosticsSink>,
}
impl PayrollContext {
    /// Keeps the first [`PAYROLL_IDENTITIES`] identities of `roster`.
    pub fn new(roster: &Roster, sink: Arc<dyn DiagnosticsSink>) -> Self {
        PayrollContext {
            roster: roster.first(PAYROLL_IDENTITIES),
            tokens: SharedTokenCache::new(),
            sink,
        }
    }
}

async fn check_payroll(user: &mut GooseUser, context: &PayrollContext) -> TransactionResult {
    let worker = worker_index(user);
    // One worker per identity; extra workers have nothing to do.
    let credential = match context.roster.get(worker) {
        Some(credential) => credential,
        None => return Ok(()),
    };
    let token = match login(user, &context.tokens, credential, context.sink.as_ref()).await {
        Some(token) => token,
        None => return Ok(()),
    };

    let mut result = Ok(());
    for endpoint in PAYROLL_ENDPOINTS {
        let mut reply =
            send_authorized::<()>(user, GooseMethod::Get, endpoint, &token, None).await?;
        if reply.status != 200 {
            context.sink.log_event(
                "PAYROLL_CHECK_FAILED",
                payload(json!({
                    "vu": worker,
                    "endpoint": endpoint,
                    "status": reply.status,
                    "duration_ms": reply.duration_ms,
                    "response": reply.excerpt(),
                })),
            );
            if let Err(e) = mark_failed(user, "payroll lookup failed", &mut reply) {
                result = Err(e);
            }
        }
        util::sleep_secs(PAUSE_SECS).await;
    }
    result
}

/// The payroll scenario.
pub fn scenario(context: Arc<PayrollContext>) -> Scenario {
    let transaction: TransactionFunction = Arc::new(move |user| {
        let context = context.clone();
        Box::pin(async move { check_payroll(user, &context).await })
    });

    scenario!("Payroll")
        .register_transaction(Transaction::new(transaction).set_name("payroll lookups"))
}

/// Runs the payroll workload.
pub async fn run(options: TargetOptions) -> Result<(), LoadTestError> {
    let run = WorkloadRun::open(
        &options.host,
        &options.roster_file,
        &options.events_file,
        &options.goose_args,
    )
    .await?;

    let context = Arc::new(PayrollContext::new(&run.roster, run.sink()));
    info!("payroll: {} identities", context.roster.len());

    let mut attack = *run
        .attack(scenario(context.clone()))?
        .set_default(GooseDefault::Users, context.roster.len())?
        .set_default(GooseDefault::HatchRate, "10")?;
    if !run.has_run_time() {
        attack = *attack.set_default(GooseDefault::Iterations, 1usize)?;
    }

    run.execute(attack).await?;
    Ok(())
}
