//! Exchanging roster credentials for bearer tokens, with time-bounded reuse.
//!
//! Logging in on every request would be wasteful under load and quickly trips the
//! target's rate limits, so tokens are cached per `identity@base` until the lifetime
//! announced by the server runs out.
//!
//! Two caches are provided:
//!  - [`TokenCache`] is owned by a single worker and needs `&mut self`; nothing is
//!    shared so nothing can race.
//!  - [`SharedTokenCache`] is shared by many workers, for workloads where several
//!    workers log in with the same credential. An async lock per cache key is held
//!    across the whole check, exchange and store sequence, so one identity is never
//!    exchanged twice concurrently while different identities proceed in parallel.
//!
//! Both caches talk to the server through a [`CredentialExchange`]: [`HttpExchange`]
//! uses its own `reqwest` client, [`GooseExchange`] borrows the running
//! [`GooseUser`](https://docs.rs/goose/*/goose/goose/struct.GooseUser.html) so the
//! login request is recorded in the Goose metrics.
//!
//! Failures never escape as panics: every failed attempt emits exactly one
//! diagnostics event (`AUTH_EXCEPTION` or `AUTH_FAILED`) and returns an [`AuthError`].
//! A failed attempt leaves any existing cache entry untouched.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use goose::goose::GooseUser;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::{fmt, mem};

use crate::logger::{payload, DiagnosticsSink};
use crate::roster::Credential;
use crate::util;

/// Login endpoint, relative to the target base.
pub const LOGIN_PATH: &str = "/v1/user/login";

/// Token lifetime used when the server doesn't announce one.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Announced lifetimes are capped to a year.
const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// How much of a rejected response body is kept.
const RESPONSE_EXCERPT_CHARS: usize = 300;

/// Source of the current time; replaceable so expiry can be tested.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Why a token could not be acquired.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthError {
    /// The exchange never completed: connection refused, timeout, TLS failure...
    Exception {
        /// Description of the transport failure.
        message: String,
    },
    /// The server answered, but not with a usable token.
    Rejected {
        /// HTTP status code of the response.
        status: u16,
        /// The start of the response body.
        body: String,
    },
}
impl AuthError {
    fn describe(&self) -> &str {
        match *self {
            AuthError::Exception { .. } => "credential exchange failed",
            AuthError::Rejected { .. } => "credential exchange rejected",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AuthError::Exception { ref message } => {
                write!(f, "AuthError: {} ({})", self.describe(), message)
            }
            AuthError::Rejected { status, ref body } => {
                write!(f, "AuthError: {} ({}: {})", self.describe(), status, body)
            }
        }
    }
}

impl std::error::Error for AuthError {}

/// JSON body posted to [`LOGIN_PATH`].
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub login_user_name: &'a str,
    pub login_password: &'a str,
}
impl<'a> From<&'a Credential> for LoginRequest<'a> {
    fn from(credential: &'a Credential) -> Self {
        LoginRequest {
            login_user_name: &credential.identity,
            login_password: &credential.secret,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expires_in: Option<Value>,
}

/// Raw outcome of a completed exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeResponse {
    pub status: u16,
    pub body: String,
}

/// Performs one credential exchange against the target.
#[async_trait]
pub trait CredentialExchange: Send {
    /// POSTs `request` to the login endpoint of `base`.
    ///
    /// Returns the status and body of any response the server sent, or
    /// [`AuthError::Exception`] if no response was received.
    async fn exchange(
        &mut self,
        base: &str,
        request: &LoginRequest<'_>,
    ) -> Result<ExchangeResponse, AuthError>;
}

/// Exchanges credentials with a plain `reqwest` client.
#[derive(Clone, Debug, Default)]
pub struct HttpExchange {
    client: reqwest::Client,
}
impl HttpExchange {
    pub fn new(client: reqwest::Client) -> Self {
        HttpExchange { client }
    }
}

#[async_trait]
impl CredentialExchange for HttpExchange {
    async fn exchange(
        &mut self,
        base: &str,
        request: &LoginRequest<'_>,
    ) -> Result<ExchangeResponse, AuthError> {
        let url = util::join_path(base, LOGIN_PATH);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AuthError::Exception {
                message: e.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| AuthError::Exception {
            message: e.to_string(),
        })?;
        Ok(ExchangeResponse { status, body })
    }
}

/// Exchanges credentials through a running Goose user.
///
/// The request goes to the Goose user's own host; the `base` passed in only
/// contributes to the cache key.
pub struct GooseExchange<'a> {
    user: &'a mut GooseUser,
}
impl<'a> GooseExchange<'a> {
    pub fn new(user: &'a mut GooseUser) -> Self {
        GooseExchange { user }
    }
}

#[async_trait]
impl CredentialExchange for GooseExchange<'_> {
    async fn exchange(
        &mut self,
        _base: &str,
        request: &LoginRequest<'_>,
    ) -> Result<ExchangeResponse, AuthError> {
        let goose = self
            .user
            .post_json(LOGIN_PATH, request)
            .await
            .map_err(|e| AuthError::Exception {
                message: format!("{:?}", e),
            })?;
        match goose.response {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.map_err(|e| AuthError::Exception {
                    message: e.to_string(),
                })?;
                Ok(ExchangeResponse { status, body })
            }
            Err(e) => Err(AuthError::Exception {
                message: e.to_string(),
            }),
        }
    }
}

/// A bearer token and the moment it stops being reused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
impl CachedToken {
    /// Live means strictly before the expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Cache key for an identity on a target base.
pub fn cache_key(base: &str, identity: &str) -> String {
    format!("{}@{}", identity, base)
}

/// Announced lifetime in milliseconds.
///
/// Absent, zero or unparsable values mean [`DEFAULT_TOKEN_LIFETIME_SECS`]. Anything
/// else is used as given, capped to a year either way: a fraction of a second expires
/// that quickly, a negative lifetime is already expired.
fn lifetime_ms(expires_in: Option<&Value>) -> i64 {
    let announced = match expires_in {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let max_ms = (MAX_TOKEN_LIFETIME_SECS * 1000) as f64;
    match announced {
        Some(secs) if secs.is_finite() && secs != 0.0 => {
            (secs * 1000.0).clamp(-max_ms, max_ms) as i64
        }
        _ => DEFAULT_TOKEN_LIFETIME_SECS * 1000,
    }
}

/// Turns a completed exchange into a cacheable token.
fn interpret(
    response: &ExchangeResponse,
    now: DateTime<Utc>,
) -> Result<CachedToken, AuthError> {
    let rejected = || AuthError::Rejected {
        status: response.status,
        body: util::truncate(&response.body, RESPONSE_EXCERPT_CHARS),
    };

    if !(200..300).contains(&response.status) {
        return Err(rejected());
    }
    let parsed: LoginResponse = serde_json::from_str(&response.body).map_err(|_| rejected())?;
    let token = match parsed.token {
        Some(token) if !token.is_empty() => token,
        _ => return Err(rejected()),
    };
    let lifetime = lifetime_ms(parsed.expires_in.as_ref());

    Ok(CachedToken {
        token,
        expires_at: now + Duration::milliseconds(lifetime),
    })
}

/// One exchange, reporting any failure to `sink` exactly once.
async fn exchange_token<E: CredentialExchange + ?Sized>(
    exchange: &mut E,
    base: &str,
    credential: &Credential,
    sink: &dyn DiagnosticsSink,
    clock: &Clock,
) -> Result<CachedToken, AuthError> {
    let request = LoginRequest::from(credential);
    let result = match exchange.exchange(base, &request).await {
        Ok(response) => interpret(&response, clock()),
        Err(e) => Err(e),
    };

    match result {
        Ok(cached) => {
            debug!(
                "{}: token acquired, expires at {}",
                credential.identity, cached.expires_at
            );
            Ok(cached)
        }
        Err(AuthError::Exception { message }) => {
            sink.log_event(
                "AUTH_EXCEPTION",
                payload(json!({
                    "username": credential.identity,
                    "error": message,
                })),
            );
            Err(AuthError::Exception { message })
        }
        Err(AuthError::Rejected { status, body }) => {
            sink.log_event(
                "AUTH_FAILED",
                payload(json!({
                    "username": credential.identity,
                    "status": status,
                    "response": body,
                })),
            );
            Err(AuthError::Rejected { status, body })
        }
    }
}

/// Token cache owned by a single worker.
pub struct TokenCache {
    entries: HashMap<String, CachedToken>,
    clock: Clock,
}
impl Default for TokenCache {
    fn default() -> Self {
        TokenCache::with_clock(system_clock())
    }
}
impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}
impl TokenCache {
    pub fn new() -> Self {
        TokenCache::default()
    }

    pub fn with_clock(clock: Clock) -> Self {
        TokenCache {
            entries: HashMap::new(),
            clock,
        }
    }

    /// The cached entry for `identity` on `base`, live or not.
    pub fn entry(&self, base: &str, identity: &str) -> Option<&CachedToken> {
        self.entries.get(&cache_key(base, identity))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a live cached token, or performs exactly one exchange.
    pub async fn acquire<E: CredentialExchange + ?Sized>(
        &mut self,
        exchange: &mut E,
        base: &str,
        credential: &Credential,
        sink: &dyn DiagnosticsSink,
    ) -> Result<String, AuthError> {
        let key = cache_key(base, &credential.identity);
        if let Some(cached) = self.entries.get(&key) {
            if cached.is_live((self.clock)()) {
                return Ok(cached.token.clone());
            }
        }

        let fresh = exchange_token(exchange, base, credential, sink, &self.clock).await?;
        let token = fresh.token.clone();
        self.entries.insert(key, fresh);
        Ok(token)
    }

    /// Drops the entry so the next `acquire` exchanges again.
    pub fn invalidate(&mut self, base: &str, identity: &str) -> Option<CachedToken> {
        self.entries.remove(&cache_key(base, identity))
    }

    /// Moves the cache out, leaving an empty one with the same clock.
    pub fn take(&mut self) -> TokenCache {
        let clock = self.clock.clone();
        mem::replace(self, TokenCache::with_clock(clock))
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<CachedToken>>>;

/// Token cache shared by many workers.
pub struct SharedTokenCache {
    slots: Mutex<HashMap<String, Slot>>,
    clock: Clock,
}
impl Default for SharedTokenCache {
    fn default() -> Self {
        SharedTokenCache::with_clock(system_clock())
    }
}
impl fmt::Debug for SharedTokenCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SharedTokenCache").finish()
    }
}
impl SharedTokenCache {
    pub fn new() -> Self {
        SharedTokenCache::default()
    }

    pub fn with_clock(clock: Clock) -> Self {
        SharedTokenCache {
            slots: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    /// Returns a live cached token, or performs exactly one exchange while holding
    /// the lock for this identity.
    pub async fn acquire<E: CredentialExchange + ?Sized>(
        &self,
        exchange: &mut E,
        base: &str,
        credential: &Credential,
        sink: &dyn DiagnosticsSink,
    ) -> Result<String, AuthError> {
        let slot = self.slot(&cache_key(base, &credential.identity));
        let mut entry = slot.lock().await;
        if let Some(cached) = entry.as_ref() {
            if cached.is_live((self.clock)()) {
                return Ok(cached.token.clone());
            }
        }

        let fresh = exchange_token(exchange, base, credential, sink, &self.clock).await?;
        let token = fresh.token.clone();
        *entry = Some(fresh);
        Ok(token)
    }

    /// Number of identities that have been looked up.
    pub fn len(&self) -> usize {
        match self.slots.lock() {
            Ok(slots) => slots.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
