//! # hrms-loadtest
//!
//! Goose load tests for an HR and payroll REST API.
//!
//! Each workload is a [Goose](https://docs.rs/goose/) scenario: Goose schedules the
//! simulated users (called workers here), sends the HTTP requests and collects the
//! metrics. This crate contributes what Goose can't know about the target system:
//!
//!  - a [`TokenCache`](./auth/struct.TokenCache.html) that exchanges a roster credential
//!    for a bearer token and reuses it until it expires;
//!  - a unique [identity generator](./identity/index.html) that gives every worker its
//!    own collision-free employee codes, mobile numbers and national ids, verifying the
//!    whole table before the load test starts and falling back to randomized sampling
//!    if the deterministic table collides;
//!  - explicit, validated [request payloads](./payload/index.html);
//!  - the [workloads](./workload/index.html) themselves.
//!
//! ## Running a workload
//!
//! Workload options come first, Goose options follow a `--` separator:
//!
//! ```bash
//! $ hrms-loadtest bulk-users --host https://hrms.example.com --workers 50 --per-worker 200 \
//!     -- --users 50 --hatch-rate 5 --iterations 200 --report-file report.html
//! ```
//!
//! ## License
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! you may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//! <http://www.apache.org/licenses/LICENSE-2.0>
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

#[macro_use]
extern crate log;

pub mod auth;
pub mod config;
pub mod identity;
pub mod logger;
pub mod payload;
pub mod prelude;
pub mod report;
pub mod roster;
pub mod util;
pub mod workload;

use goose::GooseError;
use std::{fmt, io};

use crate::identity::GenerationError;

/// An enumeration of all errors a workload run can return.
#[derive(Debug)]
pub enum LoadTestError {
    /// Wraps a [`goose::GooseError`](https://docs.rs/goose/*/goose/enum.GooseError.html).
    Goose(GooseError),
    /// Wraps a [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    Io(io::Error),
    /// Wraps a [`serde_json::Error`](https://docs.rs/serde_json/*/serde_json/struct.Error.html).
    Json(serde_json::Error),
    /// Wraps a [`reqwest::Error`](https://docs.rs/reqwest/*/reqwest/struct.Error.html).
    Reqwest(reqwest::Error),
    /// Identity generation could not produce a unique table.
    Generation(GenerationError),
    /// Failed to parse a hostname.
    InvalidHost {
        /// The invalid hostname that caused this error.
        host: String,
        /// Wraps a [`url::ParseError`](https://docs.rs/url/*/url/enum.ParseError.html).
        parse_error: url::ParseError,
    },
    /// Invalid option or value specified, may only be invalid in context.
    InvalidOption {
        /// The invalid option that caused this error.
        option: String,
        /// The invalid value that caused this error.
        value: String,
        /// An optional explanation of the error.
        detail: String,
    },
    /// The credential roster can't be used.
    InvalidRoster {
        /// An explanation of the error.
        detail: String,
    },
}
impl LoadTestError {
    fn describe(&self) -> &str {
        match *self {
            LoadTestError::Goose(_) => "goose::GooseError",
            LoadTestError::Io(_) => "io::Error",
            LoadTestError::Json(_) => "serde_json::Error",
            LoadTestError::Reqwest(_) => "reqwest::Error",
            LoadTestError::Generation(_) => "failed to generate unique identities",
            LoadTestError::InvalidHost { .. } => "failed to parse hostname",
            LoadTestError::InvalidOption { .. } => "invalid option or value specified",
            LoadTestError::InvalidRoster { .. } => "invalid credential roster",
        }
    }
}

impl fmt::Display for LoadTestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoadTestError::Goose(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Io(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Json(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Reqwest(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Generation(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::InvalidHost {
                ref host,
                ref parse_error,
            } => write!(
                f,
                "LoadTestError: {} {} ({})",
                self.describe(),
                host,
                parse_error
            ),
            LoadTestError::InvalidOption {
                ref option,
                ref value,
                ref detail,
            } => write!(
                f,
                "LoadTestError: {} {}={} ({})",
                self.describe(),
                option,
                value,
                detail
            ),
            LoadTestError::InvalidRoster { ref detail } => {
                write!(f, "LoadTestError: {} ({})", self.describe(), detail)
            }
        }
    }
}

impl std::error::Error for LoadTestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            LoadTestError::Goose(ref source) => Some(source),
            LoadTestError::Io(ref source) => Some(source),
            LoadTestError::Json(ref source) => Some(source),
            LoadTestError::Reqwest(ref source) => Some(source),
            LoadTestError::Generation(ref source) => Some(source),
            LoadTestError::InvalidHost {
                ref parse_error, ..
            } => Some(parse_error),
            _ => None,
        }
    }
}

/// Auto-convert Goose errors.
impl From<GooseError> for LoadTestError {
    fn from(err: GooseError) -> LoadTestError {
        LoadTestError::Goose(err)
    }
}

/// Auto-convert IO errors.
impl From<io::Error> for LoadTestError {
    fn from(err: io::Error) -> LoadTestError {
        LoadTestError::Io(err)
    }
}

/// Auto-convert serde_json errors.
impl From<serde_json::Error> for LoadTestError {
    fn from(err: serde_json::Error) -> LoadTestError {
        LoadTestError::Json(err)
    }
}

/// Auto-convert Reqwest errors.
impl From<reqwest::Error> for LoadTestError {
    fn from(err: reqwest::Error) -> LoadTestError {
        LoadTestError::Reqwest(err)
    }
}

/// Auto-convert identity generation errors.
impl From<GenerationError> for LoadTestError {
    fn from(err: GenerationError) -> LoadTestError {
        LoadTestError::Generation(err)
    }
}
