//! Logs every roster identity in once, without starting Goose.
//!
//! Useful before a real run, to find out which credentials the target accepts. All
//! identities are checked concurrently through one [`SharedTokenCache`].

use std::sync::Arc;

use crate::auth::{HttpExchange, SharedTokenCache};
use crate::config::{self, CheckLoginOptions};
use crate::logger::{
    setup_events_logger, shutdown_events_logger, DiagnosticsSink, FailureCollector, LogSink,
};
use crate::roster::{Credential, Roster};
use crate::{util, LoadTestError};

/// Logs in every identity of `roster` against `host`, returning how many succeeded.
pub async fn check_all(
    host: &str,
    roster: &Roster,
    exchange: HttpExchange,
    tokens: Arc<SharedTokenCache>,
    sink: Arc<dyn DiagnosticsSink>,
) -> usize {
    let mut handles = Vec::with_capacity(roster.len());
    for credential in roster.credentials() {
        let mut exchange = exchange.clone();
        let tokens = tokens.clone();
        let sink = sink.clone();
        let credential: Credential = credential.clone();
        let host = host.to_string();
        handles.push(tokio::spawn(async move {
            let result = tokens
                .acquire(&mut exchange, &host, &credential, sink.as_ref())
                .await;
            (credential.identity, result.is_ok())
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await {
            Ok((identity, true)) => {
                debug!("{}: logged in", identity);
                succeeded += 1;
            }
            Ok((identity, false)) => info!("{}: login failed", identity),
            Err(e) => warn!("login task failed: {}", e),
        }
    }
    succeeded
}

/// Runs the login check.
pub async fn run(options: CheckLoginOptions) -> Result<usize, LoadTestError> {
    config::initialize_logger(
        options.verbose,
        options.quiet,
        options.log_level,
        &options.log_file,
    );

    let host = util::parse_host(&options.host)?;
    let roster = Roster::load_or_default(&options.roster_file)?;
    let events_logger = setup_events_logger(&options.events_file).await?;
    let sink: Arc<dyn DiagnosticsSink> = Arc::new(LogSink::new(
        events_logger.as_ref().map(|(_, tx)| tx.clone()),
    ));
    let collector = Arc::new(FailureCollector::new(sink));

    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let succeeded = check_all(
        &host,
        &roster,
        HttpExchange::new(client),
        Arc::new(SharedTokenCache::new()),
        collector.clone(),
    )
    .await;

    info!(
        "{} of {} identities logged in to {} ({} failures)",
        succeeded,
        roster.len(),
        host,
        collector.failed()
    );
    shutdown_events_logger(events_logger).await;

    if succeeded == 0 {
        return Err(LoadTestError::InvalidRoster {
            detail: format!("none of the {} identities could log in", roster.len()),
        });
    }
    Ok(succeeded)
}
