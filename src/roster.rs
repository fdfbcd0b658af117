//! The fixed roster of credentials workers log in with.
//!
//! Workers are numbered from 1, matching Goose's `weighted_users_index + 1`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::LoadTestError;

/// First numeric suffix of the default roster usernames.
const DEFAULT_FIRST_ID: usize = 1100;
/// How many usernames the default roster spans, before exclusions.
const DEFAULT_SPAN: usize = 99;
/// Accounts in the default span that can't log in.
const DEFAULT_EXCLUDED: &[&str] = &["GSPL-1166"];
/// Password shared by the default roster.
const DEFAULT_PASSWORD: &str = "GSPL-9";

/// A login identity and its secret.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Credential {
    #[serde(rename = "username")]
    pub identity: String,
    #[serde(rename = "password")]
    pub secret: String,
}
impl Credential {
    pub fn new(identity: &str, secret: &str) -> Self {
        Credential {
            identity: identity.to_string(),
            secret: secret.to_string(),
        }
    }
}

/// An ordered, non-empty list of credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Roster {
    credentials: Vec<Credential>,
}
impl Default for Roster {
    /// `GSPL-1100` through `GSPL-1198`, minus `GSPL-1166`.
    fn default() -> Self {
        let credentials = (0..DEFAULT_SPAN)
            .map(|offset| format!("GSPL-{}", DEFAULT_FIRST_ID + offset))
            .filter(|username| !DEFAULT_EXCLUDED.contains(&username.as_str()))
            .map(|username| Credential::new(&username, DEFAULT_PASSWORD))
            .collect();
        Roster { credentials }
    }
}
impl Roster {
    pub fn new(credentials: Vec<Credential>) -> Result<Self, LoadTestError> {
        if credentials.is_empty() {
            return Err(LoadTestError::InvalidRoster {
                detail: "the roster must contain at least one credential".to_string(),
            });
        }
        Ok(Roster { credentials })
    }

    /// Loads a roster from a JSON array of `{"username": ..., "password": ...}` objects.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadTestError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let credentials: Vec<Credential> = serde_json::from_str(&contents)?;
        Roster::new(credentials)
    }

    /// Loads `path` if set, otherwise returns the default roster.
    pub fn load_or_default(path: &str) -> Result<Self, LoadTestError> {
        if path.is_empty() {
            Ok(Roster::default())
        } else {
            let roster = Roster::load(path)?;
            info!("loaded {} credentials from {}", roster.len(), path);
            Ok(roster)
        }
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Keeps at most the first `count` credentials.
    pub fn first(&self, count: usize) -> Roster {
        let keep = count.clamp(1, self.credentials.len());
        Roster {
            credentials: self.credentials[..keep].to_vec(),
        }
    }

    /// Credential for a 1-based worker, cycling through the roster.
    ///
    /// Pure mapping: worker `w` always gets credential `(w - 1) % len`. Worker 0 is
    /// treated as worker 1.
    pub fn assign(&self, worker: usize) -> &Credential {
        &self.credentials[assign(worker, self.credentials.len())]
    }

    /// Credential for a 1-based worker without cycling, `None` past the end.
    pub fn get(&self, worker: usize) -> Option<&Credential> {
        worker
            .checked_sub(1)
            .and_then(|index| self.credentials.get(index))
    }

    /// Zero-based roster index of a 1-based worker, cycling.
    pub fn index_of(&self, worker: usize) -> usize {
        assign(worker, self.credentials.len())
    }
}

/// Maps a 1-based worker onto a zero-based roster index.
pub fn assign(worker: usize, roster_size: usize) -> usize {
    if roster_size == 0 {
        return 0;
    }
    worker.saturating_sub(1) % roster_size
}
