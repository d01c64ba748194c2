//! Retry classification and backoff.
//!
//! Providers do not report typed error codes uniformly, so whether a failed
//! call is worth retrying is decided by matching the error message against
//! known transient markers. HTTP status codes only count where they read
//! as a status (`API error 503`, `status: 502`, `HTTP 429`), never as part
//! of some other number in the body. This is a heuristic: an unrecognised
//! transient failure is treated as permanent and aborts the retry loop
//! early.

use std::sync::LazyLock;
use std::time::Duration;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "rate limit",
    "too many requests",
    "connection reset",
    "connection refused",
    "connection error",
    "econnreset",
    "econnrefused",
    "socket hang up",
];

const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "too many requests"];

const TRANSIENT_STATUS: &[u16] = &[429, 500, 502, 503, 504];

static STATUS_CODE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:api error|status(?: code)?|http(?:/[0-9.]+)?)[\s:=]*([0-9]{3})\b").ok()
});

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out"];

fn contains_any(message: &str, markers: &[&str]) -> bool {
    let message = message.to_lowercase();
    markers.iter().any(|marker| message.contains(marker))
}

/// HTTP status codes mentioned in status position.
fn status_codes(message: &str) -> Vec<u16> {
    let Some(re) = STATUS_CODE.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(message)
        .filter_map(|cap| cap.get(1)?.as_str().parse().ok())
        .collect()
}

/// Classify an error message.
pub fn classify_error(message: &str) -> ErrorClass {
    let transient_status = status_codes(message)
        .iter()
        .any(|code| TRANSIENT_STATUS.contains(code));
    if transient_status || contains_any(message, TRANSIENT_MARKERS) {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

/// Whether the message describes rate limiting.
pub fn is_rate_limit(message: &str) -> bool {
    status_codes(message).contains(&429) || contains_any(message, RATE_LIMIT_MARKERS)
}

/// Whether the message describes a timeout.
pub fn is_timeout(message: &str) -> bool {
    contains_any(message, TIMEOUT_MARKERS)
}

/// Linear backoff: the wait after attempt `n` is `base × n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
}

impl Backoff {
    pub fn linear(base: Duration) -> Self {
        Self { base }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt)
    }
}
