//! Utility functions shared by the workloads.

use rand::Rng;
use std::time::Duration;
use url::Url;

use crate::LoadTestError;

/// Returns at most the first `max_chars` characters of `text`.
///
/// # Example
/// ```rust
/// use hrms_loadtest::util;
///
/// assert_eq!(util::truncate("abcdef", 3), "abc");
/// assert_eq!(util::truncate("ab", 3), "ab");
/// ```
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Joins a base URL and an absolute path without doubling the slash.
///
/// # Example
/// ```rust
/// use hrms_loadtest::util;
///
/// assert_eq!(
///     util::join_path("http://hrms.test/", "/v1/user/login"),
///     "http://hrms.test/v1/user/login"
/// );
/// ```
pub fn join_path(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Validates a host, returning it without a trailing slash.
///
/// # Example
/// ```rust
/// use hrms_loadtest::util;
///
/// assert_eq!(util::parse_host("http://hrms.test/").unwrap(), "http://hrms.test");
/// assert!(util::parse_host("hrms.test").is_err());
/// ```
pub fn parse_host(host: &str) -> Result<String, LoadTestError> {
    let url = Url::parse(host).map_err(|parse_error| LoadTestError::InvalidHost {
        host: host.to_string(),
        parse_error,
    })?;
    if url.cannot_be_a_base() {
        return Err(LoadTestError::InvalidHost {
            host: host.to_string(),
            parse_error: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        });
    }
    Ok(host.trim_end_matches('/').to_string())
}

/// Zero-pads `value` to `width` digits.
///
/// # Example
/// ```rust
/// use hrms_loadtest::util;
///
/// assert_eq!(util::pad(7, 4), "0007");
/// assert_eq!(util::pad(12345, 4), "12345");
/// ```
pub fn pad(value: u64, width: usize) -> String {
    format!("{:0width$}", value, width = width)
}

/// Keeps the last `digits` characters of a decimal rendering, like slicing the
/// string from the end.
///
/// # Example
/// ```rust
/// use hrms_loadtest::util;
///
/// assert_eq!(util::last_digits(1_010_001, 5), "10001");
/// assert_eq!(util::last_digits(42, 5), "42");
/// ```
pub fn last_digits(value: u64, digits: usize) -> String {
    let rendered = value.to_string();
    let skip = rendered.len().saturating_sub(digits);
    rendered[skip..].to_string()
}

/// Keeps the first `digits` characters of a decimal rendering.
///
/// # Example
/// ```rust
/// use hrms_loadtest::util;
///
/// assert_eq!(util::first_digits(299_402_000_100, 12), "299402000100");
/// assert_eq!(util::first_digits(1_299_402_000_100, 12), "129940200010");
/// ```
pub fn first_digits(value: u64, digits: usize) -> String {
    let rendered = value.to_string();
    let keep = rendered.len().min(digits);
    rendered[..keep].to_string()
}

/// Sleeps for a fractional number of seconds; negative or zero returns at once.
pub async fn sleep_secs(secs: f64) {
    if secs.is_finite() && secs > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }
}

/// Uniform random number of seconds in `[low, high)`.
pub fn jitter_secs(low: f64, high: f64) -> f64 {
    if high <= low {
        return low;
    }
    rand::rng().random_range(low..high)
}
