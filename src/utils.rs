//! Utility functions shared by the outbound HTTP clients.
//!
//! Contains the bounded retry helper, HTTP client construction and
//! string helpers used when logging remote responses.

use crate::config::RetryPolicy;
use reqwest::{Client as HttpClient, StatusCode};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Maximum characters of a remote response body kept in log lines
pub const LOGGED_BODY_LIMIT: usize = 300;

/// Creates an HTTP client with the given default timeout and `User-Agent`.
///
/// Individual requests may override the timeout (media transfers do).
#[must_use]
pub fn create_http_client(timeout: Duration, user_agent: &str) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(user_agent)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Whether a response status is worth another attempt (429 or any 5xx).
#[must_use]
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Retry an outbound operation with exponential backoff.
///
/// The retry strategy uses exponential backoff with jitter to avoid thundering herd.
/// Only errors for which `is_transient` returns `true` are retried; any other
/// error is returned immediately. At most `policy.max_retries` retries follow
/// the first attempt.
///
/// # Arguments
///
/// * `label` - Operation name used in log lines
/// * `policy` - Backoff settings for this kind of call
/// * `operation` - An async closure performing a single attempt
/// * `is_transient` - Classifies an error as retryable
///
/// # Errors
///
/// Returns the last error if all attempts fail, or the first non-transient error.
///
/// # Examples
///
/// ```no_run
/// use reel_relay::config::RetryPolicy;
/// use reel_relay::utils::retry_operation;
///
/// # async fn example() -> Result<(), String> {
/// let body = retry_operation(
///     "page fetch",
///     RetryPolicy::default(),
///     || async { Ok::<_, String>("<html></html>".to_string()) },
///     |_e: &String| true,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_operation<F, Fut, T, E, C>(
    label: &str,
    policy: RetryPolicy,
    mut operation: F,
    mut is_transient: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    C: FnMut(&E) -> bool,
{
    let initial_ms = u64::try_from(policy.initial_backoff.as_millis()).unwrap_or(u64::MAX);
    let retry_strategy = ExponentialBackoff::from_millis(initial_ms)
        .max_delay(policy.max_backoff)
        .map(jitter) // Add jitter to prevent thundering herd
        .take(policy.max_retries);

    let attempts = AtomicUsize::new(0);
    RetryIf::spawn(
        retry_strategy,
        || {
            attempts.fetch_add(1, Ordering::Relaxed);
            operation()
        },
        |e: &E| {
            let retry = is_transient(e);
            let attempt = attempts.load(Ordering::Relaxed);
            if retry && attempt <= policy.max_retries {
                warn!(operation = label, attempt, error = %e, "Transient failure, retrying");
            }
            retry
        },
    )
    .await
    .map_err(|e| {
        warn!(
            operation = label,
            attempts = attempts.load(Ordering::Relaxed),
            error = %e,
            "Operation failed"
        );
        e
    })
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use reel_relay::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}
