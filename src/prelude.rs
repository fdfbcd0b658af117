//! Re-exports the types most programs driving a workload need.
//!
//! ```rust
//! use hrms_loadtest::prelude::*;
//! ```

pub use crate::auth::{
    AuthError, CachedToken, CredentialExchange, GooseExchange, HttpExchange, SharedTokenCache,
    TokenCache,
};
pub use crate::config::{AttendanceMode, Command, LoadTestOptions};
pub use crate::identity::{
    CriticalField, GenerationError, IdentityRecord, IdentityTable, Strategy, WorkerIdentitySet,
};
pub use crate::logger::{DiagnosticsSink, FailureCollector, LogSink};
pub use crate::payload::{AttendancePayload, EmployeeProfilePayload, InOutFlag, PayloadError};
pub use crate::report::{BulkRunSummary, Recommendation, Rejection, WorkerOutcome};
pub use crate::roster::{Credential, Roster};
pub use crate::LoadTestError;
