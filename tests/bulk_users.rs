use httpmock::{Method::POST, MockServer};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

mod common;

use hrms_loadtest::identity;
use hrms_loadtest::logger::DiagnosticsSink;
use hrms_loadtest::payload::EMPLOYEE_CREATE_PATH;
use hrms_loadtest::report::Rejection;
use hrms_loadtest::workload::bulk_users::{self, BulkContext};

const TOKEN: &str = "bulk-token";

fn context(workers: u32, per_worker: u32, sink: Arc<dyn DiagnosticsSink>) -> Arc<BulkContext> {
    let table = identity::generate(workers, per_worker).unwrap();
    let context = BulkContext::new(table, common::roster(workers as usize), false, sink);
    // Backoff and retry pauses would only slow the tests down.
    Arc::new(context.with_pause_scale(0.0))
}

#[tokio::test]
#[serial]
/// Every worker logs in once and creates one employee per iteration.
async fn test_bulk_creation() {
    let server = MockServer::start();
    let login = common::mock_login(&server, TOKEN);
    let create = server.mock(|when, then| {
        when.method(POST)
            .path(EMPLOYEE_CREATE_PATH)
            .header("authorization", TOKEN);
        then.status(201).json_body(json!({"status": true}));
    });

    let collector = common::collector();
    let context = context(2, 3, collector.clone());
    let configuration = common::build_configuration(
        &server,
        vec!["--users", "2", "--hatch-rate", "2", "--iterations", "3"],
    );
    common::run_load_test(configuration, bulk_users::scenario(context.clone())).await;

    login.assert_hits(2);
    create.assert_hits(6);
    assert_eq!(collector.failed(), 0);

    let outcomes = context.ledger.outcomes();
    assert_eq!(outcomes.len(), 2);
    for (index, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.worker, index + 1);
        assert_eq!(outcome.identity, format!("GSPL-{}", 1100 + index));
        assert!(outcome.authenticated);
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.created, 3);
        assert_eq!(outcome.failed, 0);
    }
}

#[tokio::test]
#[serial]
/// Duplicate refusals are classified, counted and reported per employee.
async fn test_bulk_duplicates_reported() {
    let server = MockServer::start();
    let login = common::mock_login(&server, TOKEN);
    let create = server.mock(|when, then| {
        when.method(POST).path(EMPLOYEE_CREATE_PATH);
        then.status(409)
            .json_body(json!({"message": "Mobile number already exists"}));
    });

    let collector = common::collector();
    let context = context(2, 2, collector.clone());
    let configuration = common::build_configuration(
        &server,
        vec!["--users", "2", "--hatch-rate", "2", "--iterations", "2"],
    );
    common::run_load_test(configuration, bulk_users::scenario(context.clone())).await;

    login.assert_hits(2);
    create.assert_hits(4);

    let failures = collector.records_of("EMPLOYEE_CREATE_FAILED");
    assert_eq!(failures.len(), 4);
    assert!(failures.iter().all(|event| event.payload["status"] == 409));

    for outcome in context.ledger.outcomes() {
        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.duplicate_mobiles, 2);
        assert_eq!(outcome.duplicate_employee_codes, 0);
        assert_eq!(outcome.token_refreshes, 0);
    }
}

#[tokio::test]
#[serial]
/// A worker that can't log in never posts an employee.
async fn test_bulk_without_token() {
    let server = MockServer::start();
    let login = server.mock(|when, then| {
        when.method(POST).path(hrms_loadtest::auth::LOGIN_PATH);
        then.status(401).json_body(json!({"message": "invalid credentials"}));
    });
    let create = server.mock(|when, then| {
        when.method(POST).path(EMPLOYEE_CREATE_PATH);
        then.status(201);
    });

    let collector = common::collector();
    let context = context(1, 1, collector.clone());
    let configuration = common::build_configuration(&server, vec![]);
    common::run_load_test(configuration, bulk_users::scenario(context.clone())).await;

    // Three attempts before the worker gives up.
    login.assert_hits(3);
    create.assert_hits(0);
    assert_eq!(collector.records_of("AUTH_FAILED").len(), 3);

    let outcomes = context.ledger.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].authenticated);
    assert_eq!(outcomes[0].attempted, 0);
}

#[tokio::test]
#[serial]
/// Repeated refusals back off, then drop the token and log in again.
async fn test_bulk_backoff_refreshes_token() {
    let server = MockServer::start();
    let login = common::mock_login(&server, TOKEN);
    let create = server.mock(|when, then| {
        when.method(POST)
            .path(EMPLOYEE_CREATE_PATH)
            .header("authorization", TOKEN);
        then.status(500)
            .json_body(json!({"message": "database is busy"}));
    });

    let collector = common::collector();
    let context = context(1, 6, collector.clone());
    let configuration = common::build_configuration(&server, vec!["--iterations", "6"]);
    common::run_load_test(configuration, bulk_users::scenario(context.clone())).await;

    create.assert_hits(6);
    assert_eq!(collector.records_of("EMPLOYEE_CREATE_FAILED").len(), 6);

    let outcomes = context.ledger.outcomes();
    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.failed, 6);
    // Failures 5 and 6 each refresh the token.
    assert_eq!(outcome.token_refreshes, 2);
    assert_eq!(login.hits(), 1 + outcome.token_refreshes);
}

#[tokio::test]
#[serial]
/// A request that times out is counted as a failure with no status.
async fn test_bulk_no_response() {
    let server = MockServer::start();
    let login = common::mock_login(&server, TOKEN);
    server.mock(|when, then| {
        when.method(POST).path(EMPLOYEE_CREATE_PATH);
        then.status(201).delay(std::time::Duration::from_secs(3));
    });

    let collector = common::collector();
    let context = context(1, 1, collector.clone());
    let configuration = common::build_configuration(&server, vec!["--timeout", "1"]);
    common::run_load_test(configuration, bulk_users::scenario(context.clone())).await;

    login.assert_hits(1);

    let failures = collector.records_of("EMPLOYEE_CREATE_FAILED");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].payload["status"], 0);
    assert_eq!(failures[0].payload["reason"], Rejection::Other.to_string());

    let outcome = &context.ledger.outcomes()[0];
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.created, 0);
}
