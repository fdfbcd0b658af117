use httpmock::{Method::GET, MockServer};
use log::info;

use goose::prelude::*;

use hrms_loadtest::workload::WorkloadRun;

// The logger is global to the process, so this file holds a single test.

pub async fn get_index(user: &mut GooseUser) -> TransactionResult {
    let _goose = user.get("/").await?;
    Ok(())
}

#[tokio::test]
/// Lines logged during setup are still in the log file after Goose starts.
async fn test_setup_lines_kept_in_log_file() {
    let server = MockServer::start();
    let index = server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200);
    });

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("hrms.log");
    let log_file = log_path.to_str().unwrap().to_string();
    let goose_args: Vec<String> = [
        "--goose-log",
        &log_file,
        "-g",
        "--users",
        "1",
        "--hatch-rate",
        "1",
        "--iterations",
        "1",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect();

    let run = WorkloadRun::open(&server.base_url(), "", "", &goose_args)
        .await
        .unwrap();
    assert!(run.configuration.goose_log.is_empty());

    for line in 0..50 {
        info!("setup line {} written before the attack", line);
    }

    let attack = run
        .attack(scenario!("LoadIndex").register_transaction(transaction!(get_index)))
        .unwrap();
    run.execute(attack).await.unwrap();
    info!("written after the attack");

    index.assert_hits(1);

    let contents = std::fs::read(&log_path).unwrap();
    assert!(!contents.contains(&0), "log file contains NUL bytes");
    let text = String::from_utf8(contents).unwrap();
    assert!(text.contains("setup line 0 written before the attack"));
    assert!(text.contains("setup line 49 written before the attack"));
    assert!(text.contains("written after the attack"));
}
