use gumdrop::Options;

use hrms_loadtest::config::LoadTestOptions;
use hrms_loadtest::{workload, LoadTestError};

#[tokio::main]
async fn main() -> Result<(), LoadTestError> {
    let options = LoadTestOptions::parse_args_default_or_exit();
    if options.command.is_none() {
        eprintln!("{}", LoadTestOptions::usage());
        if let Some(commands) = LoadTestOptions::command_list() {
            eprintln!("\nWorkloads:\n{}", commands);
        }
        std::process::exit(2);
    }

    workload::run(options).await
}
