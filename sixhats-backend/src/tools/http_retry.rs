//! HTTP retry helper with exponential backoff
//!
//! Search and fetch requests go through [`send_with_retry`]. Transient
//! failures (timeouts, connection errors, 429 and gateway-style 5xx) are
//! retried with a per-host backoff that doubles on every consecutive error.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// First backoff delay
const MIN_BACKOFF_MS: u64 = 500;
/// Backoff ceiling
const MAX_BACKOFF_MS: u64 = 8_000;
/// Quiet period after which a host's error streak is forgotten
const RESET_AFTER_SECS: u64 = 120;

#[derive(Debug, Clone)]
struct BackoffState {
    current_delay_ms: u64,
    last_error_at: Instant,
    error_count: u32,
}

/// Per-host backoff tracking
pub struct HttpRetryManager {
    states: RwLock<HashMap<String, BackoffState>>,
}

impl HttpRetryManager {
    pub fn new() -> Self {
        HttpRetryManager {
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide instance shared by all web capabilities
    pub fn global() -> &'static HttpRetryManager {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<HttpRetryManager> = OnceLock::new();
        INSTANCE.get_or_init(HttpRetryManager::new)
    }

    pub fn record_success(&self, key: &str) {
        if self.states.write().remove(key).is_some() {
            log::debug!("[HTTP_RETRY] Success for '{}', backoff reset", key);
        }
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn record_error(&self, key: &str) -> Duration {
        let mut states = self.states.write();
        let now = Instant::now();
        let state = states.entry(key.to_string()).or_insert(BackoffState {
            current_delay_ms: MIN_BACKOFF_MS,
            last_error_at: now,
            error_count: 0,
        });

        if now.duration_since(state.last_error_at) > Duration::from_secs(RESET_AFTER_SECS) {
            state.current_delay_ms = MIN_BACKOFF_MS;
            state.error_count = 1;
        } else {
            state.error_count += 1;
            if state.error_count > 1 {
                state.current_delay_ms = (state.current_delay_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
        state.last_error_at = now;

        log::warn!(
            "[HTTP_RETRY] Error #{} for '{}', backoff: {}ms",
            state.error_count,
            key,
            state.current_delay_ms
        );
        Duration::from_millis(state.current_delay_ms)
    }

    pub fn current_delay(&self, key: &str) -> Option<Duration> {
        self.states
            .read()
            .get(key)
            .map(|s| Duration::from_millis(s.current_delay_ms))
    }

    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 520..=524)
    }
}

impl Default for HttpRetryManager {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_reqwest_error_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout()
        || err.is_connect()
        || err
            .status()
            .map(|s| HttpRetryManager::is_retryable_status(s.as_u16()))
            .unwrap_or(false)
}

/// Backoff key for a URL: its host, or the raw string when unparsable
pub fn retry_key(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

/// Send a request, retrying transient failures up to `max_attempts` times.
///
/// `build` is called once per attempt. Non-success statuses that are not
/// retryable come back as `Err` immediately.
pub async fn send_with_retry<F>(
    key: &str,
    max_attempts: u32,
    build: F,
) -> Result<reqwest::Response, String>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let manager = HttpRetryManager::global();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = build().send().await;
        let retryable = match outcome {
            Ok(resp) if resp.status().is_success() => {
                manager.record_success(key);
                return Ok(resp);
            }
            Ok(resp) => {
                let status = resp.status();
                if !HttpRetryManager::is_retryable_status(status.as_u16()) || attempt >= max_attempts {
                    return Err(format!("HTTP {}", status));
                }
                format!("HTTP {}", status)
            }
            Err(e) => {
                if !is_reqwest_error_retryable(&e) || attempt >= max_attempts {
                    return Err(format!("request failed: {}", e));
                }
                e.to_string()
            }
        };
        let delay = manager.record_error(key);
        log::info!(
            "[HTTP_RETRY] Retrying '{}' in {}ms after: {}",
            key,
            delay.as_millis(),
            retryable
        );
        tokio::time::sleep(delay).await;
    }
}
