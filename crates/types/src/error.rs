//! Unified error type for the yoso workspace.

use crate::FailureClass;
use std::time::Duration;
use thiserror::Error;

/// Enumerates all error kinds that can occur across yoso crates.
#[derive(Debug, Error)]
pub enum YosoError {
    /// HTTP transport error (connect, TLS, body read).
    #[error("http error: {0}")]
    Http(String),

    /// The upstream API returned a non-success status.
    #[error("upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistent storage (`SQLite`) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller's request is missing a required field. Carries a stable tag
    /// such as `TEXT_MISSING`.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The upstream call succeeded but the payload did not contain the
    /// expected content.
    #[error("empty upstream response: {0}")]
    EmptyResponse(String),

    /// The upstream refused the input for a content reason that no retry can fix.
    #[error("content rejected: {reason}")]
    ContentRejected { reason: String },

    /// No credential slot holds a secret.
    #[error("no credentials configured")]
    NoCredentials,

    /// Every configured credential is cooling down.
    #[error("all credentials cooling down, retry in {}", format_wait(*retry_after))]
    CoolingDown { retry_after: Duration },

    /// Rotation stopped on a failure; carries the last classified error.
    #[error("request failed ({class}): {source}")]
    Terminal {
        class: FailureClass,
        #[source]
        source: Box<YosoError>,
    },

    /// The caller aborted the request.
    #[error("request cancelled")]
    Cancelled,
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for YosoError {
    fn from(e: reqwest::Error) -> Self {
        // Keep transport failure kinds visible to message-based classification.
        if e.is_timeout() {
            Self::Http(format!("request timed out: {e}"))
        } else if e.is_connect() {
            Self::Http(format!("connection refused: {e}"))
        } else {
            Self::Http(e.to_string())
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for YosoError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl YosoError {
    /// Returns the upstream HTTP status, if this error carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Terminal { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Returns `true` for upstream 500/503 responses, the only failures the
    /// transient backoff helper retries in place.
    #[must_use]
    pub fn is_server_transient(&self) -> bool {
        matches!(self, Self::Upstream { status: 500 | 503, .. })
    }

    /// Human-readable message used by the classifier's vocabulary fallback.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Upstream { body, .. } => body.clone(),
            Self::Http(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Formats a wait duration as `"45s"`, `"2m 5s"` or `"1h 3m"`.
#[must_use]
pub fn format_wait(wait: Duration) -> String {
    // Round partial seconds up so "retry in 0s" is never shown for a pending wait.
    let secs = wait.as_millis().div_ceil(1000);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) if s == 0 => format!("{m}m"),
        (0, _) => format!("{m}m {s}s"),
        _ if m == 0 => format!("{h}h"),
        _ => format!("{h}h {m}m"),
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, YosoError>;
