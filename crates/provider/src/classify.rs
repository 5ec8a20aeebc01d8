//! Outcome classifier — maps a failed upstream call to a [`FailureClass`].
//!
//! HTTP status codes are authoritative. Message vocabulary is a fallback for
//! errors without a status (transport failures) and for upstreams that report
//! quota or key problems under a generic status such as 400.

use regex::Regex;
use std::sync::LazyLock;
use yoso_types::{FailureClass, YosoError};

static RATE_LIMIT_VOCAB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b429\b|RESOURCE_EXHAUSTED|quota|rate[ _-]?limit|too many requests")
        .expect("rate limit vocabulary")
});

static INVALID_CREDENTIAL_VOCAB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)invalid api key|api key not valid|API_KEY_INVALID|permission denied|PERMISSION_DENIED|UNAUTHENTICATED",
    )
    .expect("invalid credential vocabulary")
});

static TRANSIENT_VOCAB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)timeout|timed out|fetch failed|ECONNRESET|connection (reset|closed|refused)")
        .expect("transient vocabulary")
});

static VOICE_SUBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)voice").expect("voice vocabulary"));

static REJECTION_VOCAB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)invalid|unknown|not found|not supported|unsupported|unrecognized|does not exist")
        .expect("rejection vocabulary")
});

/// Classifies a failure, in priority order: rate limit, invalid credential,
/// transient, unclassified.
#[must_use]
pub fn classify(err: &YosoError) -> FailureClass {
    match err {
        YosoError::Terminal { class, .. } => return *class,
        YosoError::Upstream { .. } | YosoError::Http(_) => {}
        // Local and orchestration errors are never about the credential.
        _ => return FailureClass::Unclassified,
    }

    let status = err.status();
    let message = err.message();

    if status == Some(429) || RATE_LIMIT_VOCAB.is_match(&message) {
        FailureClass::RateLimited
    } else if matches!(status, Some(401 | 403)) || INVALID_CREDENTIAL_VOCAB.is_match(&message) {
        FailureClass::InvalidCredential
    } else if matches!(status, Some(500 | 503)) || TRANSIENT_VOCAB.is_match(&message) {
        FailureClass::Transient
    } else {
        FailureClass::Unclassified
    }
}

/// Returns `true` if an upstream 400 blames the requested voice rather than
/// the credential or the quota.
#[must_use]
pub fn is_voice_rejection(err: &YosoError) -> bool {
    let YosoError::Upstream { status: 400, body } = err else {
        return false;
    };
    VOICE_SUBJECT.is_match(body) && REJECTION_VOCAB.is_match(body)
}
