//! User and biometric listings.
//!
//! Every roster identity gets one worker, which logs in, lists all users a few times
//! and then lists the biometric attendance records.

use goose::prelude::*;
use serde_json::json;
use std::sync::Arc;

use super::{login, mark_failed, send_authorized, worker_index, WorkloadRun};
use crate::auth::SharedTokenCache;
use crate::config::TargetOptions;
use crate::logger::{payload, DiagnosticsSink};
use crate::roster::Roster;
use crate::{util, LoadTestError};

pub const USERS_PATH: &str = "/v1/user/get-all";
pub const BIOMETRIC_PATH: &str = "/v1/attendance-management/biometric/get-all";

/// Times the user list is fetched per iteration.
pub const USER_LIST_REPEATS: usize = 5;

/// Pause after each request, in seconds.
const PAUSE_SECS: f64 = 1.0;

/// State shared by all listing workers.
pub struct ListingContext {
    pub roster: Roster,
    pub tokens: SharedTokenCache,
    pub sink: Arc<dyn DiagnosticsSink>,
}
impl ListingContext {
    pub fn new(roster: Roster, sink: Arc<dyn DiagnosticsSink>) -> Self {
        ListingContext {
            roster,
            tokens: SharedTokenCache::new(),
            sink,
        }
    }
}

async fn list(user: &mut GooseUser, context: &ListingContext) -> TransactionResult {
    let worker = worker_index(user);
    let credential = match context.roster.get(worker) {
        Some(credential) => credential,
        None => return Ok(()),
    };
    let token = match login(user, &context.tokens, credential, context.sink.as_ref()).await {
        Some(token) => token,
        None => return Ok(()),
    };

    let mut result = Ok(());
    for attempt in 1..=USER_LIST_REPEATS {
        let mut reply =
            send_authorized::<()>(user, GooseMethod::Get, USERS_PATH, &token, None).await?;
        if reply.status != 200 {
            context.sink.log_event(
                "GET_ALL_USERS_FAILED",
                payload(json!({
                    "vu": worker,
                    "attempt": attempt,
                    "status": reply.status,
                    "duration_ms": reply.duration_ms,
                    "endpoint": USERS_PATH,
                    "response": reply.excerpt(),
                })),
            );
            if let Err(e) = mark_failed(user, "user listing failed", &mut reply) {
                result = Err(e);
            }
        }
        util::sleep_secs(PAUSE_SECS).await;
    }

    let mut reply =
        send_authorized::<()>(user, GooseMethod::Get, BIOMETRIC_PATH, &token, None).await?;
    if reply.status != 200 {
        context.sink.log_event(
            "GET_BIOMETRIC_FAILED",
            payload(json!({
                "vu": worker,
                "status": reply.status,
                "duration_ms": reply.duration_ms,
                "endpoint": BIOMETRIC_PATH,
                "response": reply.excerpt(),
            })),
        );
        if let Err(e) = mark_failed(user, "biometric listing failed", &mut reply) {
            result = Err(e);
        }
    }
    util::sleep_secs(PAUSE_SECS).await;

    result
}

/// The listing scenario.
pub fn scenario(context: Arc<ListingContext>) -> Scenario {
    let transaction: TransactionFunction = Arc::new(move |user| {
        let context = context.clone();
        Box::pin(async move { list(user, &context).await })
    });

    scenario!("UserListing")
        .register_transaction(Transaction::new(transaction).set_name("user and biometric lists"))
}

/// Runs the listing workload.
pub async fn run(options: TargetOptions) -> Result<(), LoadTestError> {
    let run = WorkloadRun::open(
        &options.host,
        &options.roster_file,
        &options.events_file,
        &options.goose_args,
    )
    .await?;

    let context = Arc::new(ListingContext::new(run.roster.clone(), run.sink()));
    info!("user-listing: {} identities", context.roster.len());

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
