use httpmock::{Method::GET, MockServer};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

mod common;

use hrms_loadtest::workload::payroll::{self, PayrollContext, PAYROLL_ENDPOINTS};
use hrms_loadtest::workload::user_listing::{
    self, ListingContext, BIOMETRIC_PATH, USERS_PATH, USER_LIST_REPEATS,
};

#[tokio::test]
#[serial]
/// Each identity reads every payroll endpoint once; workers past the roster idle.
async fn test_payroll_lookups() {
    let server = MockServer::start();
    let login = common::mock_login(&server, "payroll");
    let heads = server.mock(|when, then| {
        when.method(GET)
            .path(PAYROLL_ENDPOINTS[0])
            .header("authorization", "payroll");
        then.status(200).json_body(json!({"data": []}));
    });
    let structures = server.mock(|when, then| {
        when.method(GET).path(PAYROLL_ENDPOINTS[1]);
        then.status(200).json_body(json!({"data": []}));
    });
    let slabs = server.mock(|when, then| {
        when.method(GET).path(PAYROLL_ENDPOINTS[2]);
        then.status(500).body("slab directory unavailable");
    });

    let collector = common::collector();
    let context = Arc::new(PayrollContext::new(&common::roster(2), collector.clone()));
    let configuration =
        common::build_configuration(&server, vec!["--users", "3", "--hatch-rate", "3"]);
    common::run_load_test(configuration, payroll::scenario(context)).await;

    login.assert_hits(2);
    heads.assert_hits(2);
    structures.assert_hits(2);
    slabs.assert_hits(2);

    let failures = collector.records_of("PAYROLL_CHECK_FAILED");
    assert_eq!(failures.len(), 2);
    for failure in failures {
        assert_eq!(failure.payload["endpoint"], PAYROLL_ENDPOINTS[2]);
        assert_eq!(failure.payload["status"], 500);
        assert_eq!(failure.payload["response"], "slab directory unavailable");
    }
}

#[tokio::test]
#[serial]
/// The user list is read repeatedly, the biometric list once.
async fn test_user_listing() {
    let server = MockServer::start();
    let login = common::mock_login(&server, "lister");
    let users = server.mock(|when, then| {
        when.method(GET).path(USERS_PATH).header("authorization", "lister");
        then.status(200).json_body(json!({"data": []}));
    });
    let biometric = server.mock(|when, then| {
        when.method(GET).path(BIOMETRIC_PATH);
        then.status(403).json_body(json!({"message": "forbidden"}));
    });

    let collector = common::collector();
    let context = Arc::new(ListingContext::new(common::roster(1), collector.clone()));
    let configuration = common::build_configuration(&server, vec![]);
    common::run_load_test(configuration, user_listing::scenario(context)).await;

    login.assert_hits(1);
    users.assert_hits(USER_LIST_REPEATS);
    biometric.assert_hits(1);
    assert!(collector.records_of("GET_ALL_USERS_FAILED").is_empty());
    assert_eq!(collector.records_of("GET_BIOMETRIC_FAILED").len(), 1);
}
