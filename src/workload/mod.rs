//! The load test workloads, one Goose scenario each.
//!
//! Every workload follows the same life cycle, driven by [`run`]:
//!
//!  1. parse the Goose options found after `--` and initialize logging;
//!  2. validate the host, load the roster and start the optional events logger;
//!  3. do any one-off setup (the identity table of the bulk workload);
//!  4. build a [`GooseAttack`] with the workload's scenario and defaults, and execute it;
//!  5. report the failures collected along the way and flush the events file.
//!
//! Shared state (roster, token cache, diagnostics sink) lives in an `Arc`'d context
//! captured by the scenario's transaction closures. Per-worker state lives in Goose
//! session data.

pub mod attendance;
pub mod bulk_users;
pub mod check_login;
pub mod payroll;
pub mod user_listing;

use goose::config::GooseConfiguration;
use goose::goose::GooseResponse;
use goose::metrics::GooseRequestMetric;
use goose::prelude::*;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::auth::{GooseExchange, SharedTokenCache};
use crate::config::{self, Command, LoadTestOptions};
use crate::logger::{
    setup_events_logger, shutdown_events_logger, DiagnosticsSink, EventLoggerJoinHandle,
    EventLoggerTx, FailureCollector, LogSink,
};
use crate::roster::{Credential, Roster};
use crate::{util, LoadTestError};

/// Characters of a response body kept in diagnostics events.
pub const BODY_EXCERPT_CHARS: usize = 500;

/// Runs the workload selected on the command line.
pub async fn run(options: LoadTestOptions) -> Result<(), LoadTestError> {
    match options.command {
        Some(Command::Attendance(options)) => attendance::run(options).await,
        Some(Command::BulkUsers(options)) => bulk_users::run(options).await,
        Some(Command::Payroll(options)) => payroll::run(options).await,
        Some(Command::UserListing(options)) => user_listing::run(options).await,
        Some(Command::CheckLogin(options)) => check_login::run(options).await.map(|_| ()),
        None => Err(LoadTestError::InvalidOption {
            option: "command".to_string(),
            value: String::new(),
            detail: "a workload is required, run with --help to list them".to_string(),
        }),
    }
}

/// Everything a workload sets up before Goose starts, and tears down after.
pub struct WorkloadRun {
    pub configuration: GooseConfiguration,
    pub host: String,
    pub roster: Roster,
    pub collector: Arc<FailureCollector>,
    events_logger: Option<(EventLoggerJoinHandle, EventLoggerTx)>,
}
impl WorkloadRun {
    /// Parses Goose options, initializes logging and loads the roster.
    pub async fn open(
        host: &str,
        roster_file: &str,
        events_file: &str,
        goose_args: &[String],
    ) -> Result<WorkloadRun, LoadTestError> {
        let mut configuration = config::goose_configuration(goose_args)?;
        config::initialize_goose_logger(&mut configuration);

        let host = util::parse_host(host)?;
        let roster = Roster::load_or_default(roster_file)?;
        let events_logger = setup_events_logger(events_file).await?;
        let sink: Arc<dyn DiagnosticsSink> = Arc::new(LogSink::new(
            events_logger.as_ref().map(|(_, tx)| tx.clone()),
        ));

        Ok(WorkloadRun {
            configuration,
            host,
            roster,
            collector: Arc::new(FailureCollector::new(sink)),
            events_logger,
        })
    }

    /// The diagnostics sink workers report to.
    pub fn sink(&self) -> Arc<dyn DiagnosticsSink> {
        self.collector.clone()
    }

    /// A Goose attack running `scenario` against the configured host.
    pub fn attack(&self, scenario: Scenario) -> Result<GooseAttack, LoadTestError> {
        let attack = GooseAttack::initialize_with_config(self.configuration.clone())?
            .register_scenario(scenario)
            .set_default(GooseDefault::Host, self.host.as_str())?;
        Ok(*attack)
    }

    /// True if the user asked for a fixed run time, which excludes `--iterations`.
    pub fn has_run_time(&self) -> bool {
        !self.configuration.run_time.is_empty()
    }

    /// Executes the attack, then reports failures and flushes the events file.
    pub async fn execute(self, attack: GooseAttack) -> Result<GooseMetrics, LoadTestError> {
        let result = attack.execute().await;
        let failed = self.collector.failed();
        if failed > 0 {
            warn!("{} failures recorded during the run", failed);
        } else {
            info!("no failures recorded during the run");
        }
        shutdown_events_logger(self.events_logger).await;
        Ok(result?)
    }
}

/// 1-based worker id of a Goose user.
pub fn worker_index(user: &GooseUser) -> usize {
    user.weighted_users_index + 1
}

/// The base URL a Goose user sends requests to, without a trailing slash.
pub fn user_base(user: &GooseUser) -> String {
    user.base_url.as_str().trim_end_matches('/').to_string()
}

/// Looks up a token for `credential` through the Goose user, so the login request
/// shows up in the Goose metrics. `None` if the login failed, the failure has already
/// been reported.
pub async fn login(
    user: &mut GooseUser,
    tokens: &SharedTokenCache,
    credential: &Credential,
    sink: &dyn DiagnosticsSink,
) -> Option<String> {
    let base = user_base(user);
    let mut exchange = GooseExchange::new(user);
    tokens
        .acquire(&mut exchange, &base, credential, sink)
        .await
        .ok()
}

/// A response read to the end.
pub struct Reply {
    /// HTTP status, 0 if no response was received.
    pub status: u16,
    /// Body text, or the transport error.
    pub body: String,
    pub duration_ms: u64,
    /// The Goose metric of the request, needed to mark it failed.
    pub request: GooseRequestMetric,
}
impl Reply {
    /// Reads the body of a Goose response.
    pub async fn read(goose: GooseResponse) -> Reply {
        let request = goose.request;
        let (status, body) = match goose.response {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => (status, body),
                    Err(e) => (status, e.to_string()),
                }
            }
            Err(e) => (request.status_code, e.to_string()),
        };
        Reply {
            status,
            body,
            duration_ms: request.response_time,
            request,
        }
    }

    /// True if the server sent a response.
    pub fn received(&self) -> bool {
        self.status != 0
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// The start of the body, for diagnostics.
    pub fn excerpt(&self) -> String {
        util::truncate(&self.body, BODY_EXCERPT_CHARS)
    }
}

/// Sends a request carrying `token` in the `Authorization` header.
pub async fn send_authorized<T: Serialize + ?Sized>(
    user: &mut GooseUser,
    method: GooseMethod,
    path: &str,
    token: &str,
    json: Option<&T>,
) -> Result<Reply, Box<TransactionError>> {
    let mut request_builder = user
        .get_request_builder(&method, path)?
        .header(AUTHORIZATION, token);
    if let Some(json) = json {
        request_builder = request_builder.json(json);
    }
    let goose_request = GooseRequest::builder()
        .method(method)
        .path(path)
        .set_request_builder(request_builder)
        .build();
    let goose = user.request(goose_request).await?;
    Ok(Reply::read(goose).await)
}

/// Marks a request failed in the Goose metrics, unless Goose already did.
pub fn mark_failed(user: &mut GooseUser, tag: &str, reply: &mut Reply) -> TransactionResult {
    if reply.request.success {
        user.set_failure(tag, &mut reply.request, None, Some(&reply.body))
    } else {
        Ok(())
    }
}
