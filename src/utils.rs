//! Text helpers and retry utilities shared by the platform and recognizer clients.

use crate::config::{
    get_http_timeout_secs, PLATFORM_API_INITIAL_BACKOFF_MS, PLATFORM_API_MAX_BACKOFF_MS,
    PLATFORM_API_MAX_RETRIES,
};
use reqwest::Client as HttpClient;
use std::fmt::Display;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Marker appended to truncated text
pub const ELLIPSIS: char = '…';

/// Creates an HTTP client configured with the standard timeout.
///
/// Uses `HTTP_TIMEOUT_SECS` environment variable or 30s default.
#[must_use]
pub fn create_http_client() -> HttpClient {
    let timeout = Duration::from_secs(get_http_timeout_secs());
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// # Examples
///
/// ```
/// use face_manager_bot::utils::truncate_str;
/// let s = "こんにちは、世界";
/// assert_eq!(truncate_str(s, 5), "こんにちは");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Truncates to at most `max_chars` characters, replacing the tail with `…`.
///
/// Text at or under the limit is returned untouched; longer text keeps
/// `max_chars - 1` characters followed by a single ellipsis.
///
/// # Examples
///
/// ```
/// use face_manager_bot::utils::truncate_with_ellipsis;
/// assert_eq!(truncate_with_ellipsis("abcdef", 4), "abc…");
/// assert_eq!(truncate_with_ellipsis("abcd", 4), "abcd");
/// ```
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if s.chars().nth(max_chars).is_none() {
        return s.to_string();
    }
    let mut out = truncate_str(s, max_chars - 1);
    out.push(ELLIPSIS);
    out
}

/// Retry a platform API call with exponential backoff while `retryable` says so.
///
/// The strategy uses exponential backoff with jitter:
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Max retries: 3
///
/// # Errors
///
/// Returns the last error once retries are exhausted or the error is not retryable.
pub async fn retry_platform_operation<F, Fut, T, E, C>(operation: F, retryable: C) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
    C: FnMut(&E) -> bool,
{
    let retry_strategy = ExponentialBackoff::from_millis(PLATFORM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(PLATFORM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(PLATFORM_API_MAX_RETRIES);

    RetryIf::start(retry_strategy, operation, retryable)
        .await
        .map_err(|e| {
            warn!("Platform API operation failed: {}", e);
            e
        })
}
