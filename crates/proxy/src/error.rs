//! API error type that maps [`YosoError`] variants to HTTP responses.
//!
//! Every failure renders as `{ "ok": false, "error": TAG, "detail"?: ..., "retryable": bool }`
//! where `TAG` is a stable upper-snake identifier clients can switch on.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use yoso_provider::recipe::MINOR_INPUT_REASON;
use yoso_types::{FailureClass, YosoError};

const DETAIL_LIMIT: usize = 300;

/// Wrapper around [`YosoError`] that implements [`IntoResponse`].
#[derive(Debug)]
pub struct ApiError(pub YosoError);

impl ApiError {
    /// Returns `(status, tag, retryable)` for the wrapped error.
    fn classify(&self) -> (StatusCode, &'static str, bool) {
        classify_error(&self.0)
    }

    /// Caller-facing detail; `None` when the tag says everything.
    fn detail(&self) -> Option<String> {
        match &self.0 {
            YosoError::InvalidRequest(_) | YosoError::NoCredentials => None,
            YosoError::ContentRejected { reason } => Some(reason.clone()),
            YosoError::Terminal { source, .. } => Some(truncate(&source.message())),
            other => Some(truncate(&other.message())),
        }
    }
}

fn classify_error(err: &YosoError) -> (StatusCode, &'static str, bool) {
    match err {
        YosoError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", false),
        YosoError::NoCredentials => (StatusCode::BAD_REQUEST, "API_KEY_MISSING", false),
        YosoError::CoolingDown { .. } => {
            (StatusCode::TOO_MANY_REQUESTS, "ALL_KEYS_COOLING_DOWN", true)
        }
        YosoError::Terminal { class, source } => match class {
            FailureClass::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", true),
            FailureClass::InvalidCredential => {
                (StatusCode::UNAUTHORIZED, "API_KEY_INVALID", false)
            }
            FailureClass::Transient => {
                (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE", true)
            }
            FailureClass::Unclassified => classify_error(source),
        },
        YosoError::ContentRejected { reason } if reason == MINOR_INPUT_REASON => (
            StatusCode::BAD_REQUEST,
            "REFERENCE_IMAGE_REJECTED_MINOR",
            false,
        ),
        YosoError::ContentRejected { .. } => (StatusCode::BAD_REQUEST, "CONTENT_REJECTED", false),
        YosoError::Upstream { status, .. } => classify_upstream(*status),
        YosoError::Http(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_UNREACHABLE", true),
        YosoError::EmptyResponse(_) => (StatusCode::BAD_GATEWAY, "EMPTY_RESPONSE", false),
        YosoError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "REQUEST_CANCELLED", true),
        YosoError::Serialization(_) | YosoError::Storage(_) | YosoError::Config(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", false)
        }
    }
}

fn classify_upstream(status: u16) -> (StatusCode, &'static str, bool) {
    match status {
        429 => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", true),
        401 | 403 => (StatusCode::UNAUTHORIZED, "CREDENTIAL_REJECTED", false),
        500 | 503 => (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE", true),
        _ => (StatusCode::BAD_GATEWAY, "UPSTREAM_FAILED", false),
    }
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(DETAIL_LIMIT) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, tag, retryable) = self.classify();
        // Request validation errors carry their own tag.
        let tag = match &self.0 {
            YosoError::InvalidRequest(t) => t.as_str(),
            _ => tag,
        };
        let mut body = json!({ "ok": false, "error": tag, "retryable": retryable });
        if let Some(detail) = self.detail() {
            body["detail"] = json!(detail);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(status = status.as_u16(), error = %self.0, "request failed");
        }
        let mut resp = (status, Json(body)).into_response();
        if let YosoError::CoolingDown { retry_after } = &self.0 {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
                resp.headers_mut().insert(RETRY_AFTER, v);
            }
        }
        resp
    }
}

impl From<YosoError> for ApiError {
    fn from(e: YosoError) -> Self {
        Self(e)
    }
}
