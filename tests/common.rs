use gumdrop::Options;
use httpmock::{Method::POST, Mock, MockServer};
use serde_json::json;
use std::sync::Arc;

use goose::config::GooseConfiguration;
use goose::metrics::GooseMetrics;
use goose::prelude::*;

use hrms_loadtest::auth::LOGIN_PATH;
use hrms_loadtest::logger::FailureCollector;
use hrms_loadtest::roster::{Credential, Roster};

/// Not all functions are used by all tests, so we enable allow(dead_code) to avoid
/// compiler warnings during testing.

/// The following options are configured by default, if not set to a custom value:
///  --host <mock-server>
///  --users 1
///  --hatch-rate 1
///  --iterations 1 (unless --run-time is set)
#[allow(dead_code)]
pub fn build_configuration(server: &MockServer, custom: Vec<&str>) -> GooseConfiguration {
    // Start with an empty configuration.
    let mut configuration: Vec<&str> = vec![];
    // Declare server_url here no matter what, so its lifetime is sufficient when needed.
    let server_url = server.base_url();

    // Merge in all custom options first.
    configuration.extend_from_slice(&custom);

    // Default to using mock server if not otherwise configured.
    if !configuration.contains(&"--host") {
        configuration.extend_from_slice(&["--host", &server_url]);
    }

    // Default to testing with 1 user if not otherwise configured.
    if !configuration.contains(&"--users") {
        configuration.extend_from_slice(&["--users", "1"]);
    }

    // Default to hatch 1 user per second if not otherwise configured.
    if !configuration.contains(&"--hatch-rate") {
        configuration.extend_from_slice(&["--hatch-rate", "1"]);
    }

    // Default to a single iteration per user if no run time is configured.
    if !configuration.contains(&"--run-time") && !configuration.contains(&"--iterations") {
        configuration.extend_from_slice(&["--iterations", "1"]);
    }

    // Parse these options to generate a GooseConfiguration.
    GooseConfiguration::parse_args_default(&configuration)
        .expect("failed to parse options and generate a configuration")
}

/// Run a single scenario as configured, returning the GooseMetrics.
#[allow(dead_code)]
pub async fn run_load_test(configuration: GooseConfiguration, scenario: Scenario) -> GooseMetrics {
    GooseAttack::initialize_with_config(configuration)
        .unwrap()
        .register_scenario(scenario)
        .execute()
        .await
        .unwrap()
}

/// Login endpoint accepting every credential, handing out the same token.
#[allow(dead_code)]
pub fn mock_login<'a>(server: &'a MockServer, token: &str) -> Mock<'a> {
    server.mock(|when, then| {
        when.method(POST).path(LOGIN_PATH);
        then.status(200)
            .json_body(json!({"token": token, "expires_in": 3600}));
    })
}

/// A roster of `size` credentials named `GSPL-1100` onwards.
#[allow(dead_code)]
pub fn roster(size: usize) -> Roster {
    let credentials = (0..size)
        .map(|i| Credential::new(&format!("GSPL-{}", 1100 + i), "GSPL-9"))
        .collect();
    Roster::new(credentials).unwrap()
}

/// A failure collector that doesn't forward events anywhere.
#[allow(dead_code)]
pub fn collector() -> Arc<FailureCollector> {
    Arc::new(FailureCollector::detached())
}
