//! Command-line configuration.
//!
//! Options are parsed with [`gumdrop`](https://docs.rs/gumdrop/), the same way Goose
//! parses its own. Each workload is a sub-command with its own options; anything after
//! a `--` separator is handed to Goose unchanged and parsed as a
//! [`GooseConfiguration`](https://docs.rs/goose/*/goose/config/struct.GooseConfiguration.html).
//!
//! ```bash
//! $ hrms-loadtest attendance --mode spike --host https://hrms.example.com -- --users 200 --run-time 5m
//! ```

use goose::config::GooseConfiguration;
use gumdrop::Options;
use simplelog::*;
use std::path::PathBuf;
use strum_macros::{Display, EnumString};

use crate::LoadTestError;

/// Target used when `--host` is not set.
pub const DEFAULT_HOST: &str = "http://localhost:3000";

/// Top level options.
#[derive(Options, Debug)]
#[options(
    help = r#"Load tests for the HR and payroll API, built on Goose.

Workload options come first, Goose options follow a `--` separator:
  hrms-loadtest bulk-users --workers 10 -- --users 10 --iterations 200

Run `hrms-loadtest help <workload>` for the options of one workload."#
)]
pub struct LoadTestOptions {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Workload to run
    #[options(command)]
    pub command: Option<Command>,
}

/// One sub-command per workload.
#[derive(Options, Debug)]
pub enum Command {
    /// Morning biometric check-in
    #[options(help = "Posts biometric attendance check-ins")]
    Attendance(AttendanceOptions),
    /// Bulk employee creation with unique identities
    #[options(help = "Creates employees with generated, collision-free identities")]
    BulkUsers(BulkUsersOptions),
    /// Payroll configuration lookups
    #[options(help = "Reads payroll configuration as the first 50 roster users")]
    Payroll(TargetOptions),
    /// User and attendance listings
    #[options(help = "Lists users and biometric records as every roster user")]
    UserListing(TargetOptions),
    /// Logs every roster identity in once
    #[options(help = "Logs every roster identity in once, without Goose")]
    CheckLogin(CheckLoginOptions),
}

/// Options shared by the read-only workloads.
#[derive(Options, Debug, Clone)]
pub struct TargetOptions {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Base URL of the target
    #[options(short = "H", default = "http://localhost:3000", meta = "HOST")]
    pub host: String,
    /// JSON file with [{"username": .., "password": ..}, ..]
    #[options(no_short, meta = "NAME")]
    pub roster_file: String,
    /// Writes diagnostics events to this file, one JSON object per line
    #[options(no_short, meta = "NAME")]
    pub events_file: String,
    /// Options passed on to Goose
    #[options(free)]
    pub goose_args: Vec<String>,
}

/// Attendance workload options.
#[derive(Options, Debug, Clone)]
pub struct AttendanceOptions {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Base URL of the target
    #[options(short = "H", default = "http://localhost:3000", meta = "HOST")]
    pub host: String,
    /// JSON file with [{"username": .., "password": ..}, ..]
    #[options(no_short, meta = "NAME")]
    pub roster_file: String,
    /// Writes diagnostics events to this file, one JSON object per line
    #[options(no_short, meta = "NAME")]
    pub events_file: String,
    /// Check-in pattern (realistic, spike, high-load)
    #[options(short = "m", default = "realistic", meta = "MODE")]
    pub mode: AttendanceMode,
    /// Options passed on to Goose
    #[options(free)]
    pub goose_args: Vec<String>,
}

/// Bulk employee creation options.
#[derive(Options, Debug, Clone)]
pub struct BulkUsersOptions {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Base URL of the target
    #[options(short = "H", default = "http://localhost:3000", meta = "HOST")]
    pub host: String,
    /// JSON file with [{"username": .., "password": ..}, ..]
    #[options(no_short, meta = "NAME")]
    pub roster_file: String,
    /// Writes diagnostics events to this file, one JSON object per line
    #[options(no_short, meta = "NAME")]
    pub events_file: String,
    /// Workers to generate identities for
    #[options(short = "w", default = "50", meta = "COUNT")]
    pub workers: u32,
    /// Employees each worker creates
    #[options(short = "p", default = "200", meta = "COUNT")]
    pub per_worker: u32,
    /// Sends requests back to back, without think time
    #[options(no_short)]
    pub no_pacing: bool,
    /// Writes the run summary as JSON to this file
    #[options(no_short, meta = "NAME")]
    pub summary_file: String,
    /// Options passed on to Goose
    #[options(free)]
    pub goose_args: Vec<String>,
}

/// Login check options.
#[derive(Options, Debug, Clone)]
pub struct CheckLoginOptions {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Base URL of the target
    #[options(short = "H", default = "http://localhost:3000", meta = "HOST")]
    pub host: String,
    /// JSON file with [{"username": .., "password": ..}, ..]
    #[options(no_short, meta = "NAME")]
    pub roster_file: String,
    /// Writes diagnostics events to this file, one JSON object per line
    #[options(no_short, meta = "NAME")]
    pub events_file: String,
    /// Sets log file name
    #[options(short = "G", meta = "NAME")]
    pub log_file: String,
    /// Increases log file level (-g, -gg, etc)
    #[options(count, short = "g")]
    pub log_level: u8,
    /// Decreases verbosity (-q, -qq, etc)
    #[options(count, short = "q")]
    pub quiet: u8,
    /// Increases verbosity (-v, -vv, etc)
    #[options(count, short = "v")]
    pub verbose: u8,
}

/// Check-in pattern of the attendance workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum AttendanceMode {
    /// One check-in per worker around 09:00.
    #[strum(serialize = "realistic")]
    Realistic,
    /// Check-ins at the current time, back to back.
    #[strum(serialize = "spike")]
    Spike,
    /// Many workers sharing roster credentials.
    #[strum(serialize = "high-load")]
    HighLoad,
}

/// Parses the arguments following `--` as Goose options.
pub fn goose_configuration(goose_args: &[String]) -> Result<GooseConfiguration, LoadTestError> {
    let args: Vec<&str> = goose_args.iter().map(String::as_str).collect();
    GooseConfiguration::parse_args_default(&args).map_err(|e| LoadTestError::InvalidOption {
        option: "goose options".to_string(),
        value: goose_args.join(" "),
        detail: e.to_string(),
    })
}

/// Terminal log level for the `-v` and `-q` counts, the way Goose maps them.
pub fn terminal_level(verbose: u8, quiet: u8) -> LevelFilter {
    match verbose {
        0 => match quiet {
            0 => LevelFilter::Info,
            _ => LevelFilter::Warn,
        },
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Log file level for the `-g` count, the way Goose maps it.
pub fn log_file_level(log_level: u8) -> LevelFilter {
    match log_level {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Initializes the logger before Goose starts, so setup work is logged too.
///
/// `-v` and `-q` adjust the terminal level, `-g` the level of the log file, if set.
pub fn initialize_logger(verbose: u8, quiet: u8, log_level: u8, log_file: &str) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(SimpleLogger::new(
        terminal_level(verbose, quiet),
        Config::default(),
    ));

    let log_path: Option<PathBuf> = if !log_file.is_empty() {
        Some(PathBuf::from(log_file))
    } else {
        None
    };
    if let Some(path) = log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(file) => loggers.push(WriteLogger::new(
                log_file_level(log_level),
                Config::default(),
                file,
            )),
            Err(e) => eprintln!("failed to create log file {}: {}", path.display(), e),
        }
    }

    if let Err(e) = CombinedLogger::init(loggers) {
        debug!("logger already initialized: {}", e);
    }
    if let Some(path) = log_path {
        info!("writing to log file: {}", path.display());
    }
}

/// Initializes the logger from Goose's own logging options.
///
/// The log file is then taken out of the configuration: Goose would otherwise create
/// it a second time when the attack starts, truncating everything logged so far.
pub fn initialize_goose_logger(configuration: &mut GooseConfiguration) {
    initialize_logger(
        configuration.verbose,
        configuration.quiet,
        configuration.log_level,
        &configuration.goose_log,
    );
    configuration.goose_log.clear();
}
