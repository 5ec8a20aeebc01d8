//! Text and image generation handlers, plus the single-key probe.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use yoso_provider::{
    Backoff, InlineData, classify,
    gemini::{self, extract_inline_data, extract_text},
};
use yoso_types::{FailureClass, YosoError};

use crate::pool::{normalize_keys, require_text};
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    pub prompt: Option<String>,
    pub api_keys: Option<Vec<String>>,
}

/// Handles `POST /api/yoso/generate`.
pub async fn generate_text(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<Value>, ApiError> {
    let prompt = require_text(body.prompt, "PROMPT_EMPTY")?;
    let keys = normalize_keys(body.api_keys);
    let config = state.config.load_full();
    let backoff = Backoff::from(&config.backoff);
    let request = gemini::text_request(&prompt);

    let out = state
        .rotate("generate", &keys, |lease| {
            let api = state.gemini.clone();
            let model = config.gemini.text_model.clone();
            let request = request.clone();
            async move {
                let resp = backoff
                    .retry(|| api.generate_content(&lease.secret, &model, request.clone()))
                    .await?;
                extract_text(&resp)
            }
        })
        .await?;

    Ok(Json(json!({
        "ok": true,
        "text": out.value,
        "slot": out.slot,
        "attempts": out.attempts,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagenBody {
    pub prompt: Option<String>,
    pub aspect_ratio: Option<String>,
    pub api_keys: Option<Vec<String>>,
    /// Base64 without the data URL prefix.
    pub ref_image_base64: Option<String>,
    pub ref_image_mime: Option<String>,
}

/// Handles `POST /api/yoso/imagen`.
///
/// Each attempt asks the primary image model first and the fallback model
/// once when the primary answers without an inline image.
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ImagenBody>,
) -> Result<Json<Value>, ApiError> {
    let prompt = require_text(body.prompt, "PROMPT_EMPTY")?;
    let keys = normalize_keys(body.api_keys);
    let aspect_ratio = body
        .aspect_ratio
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| "9:16".to_string());
    let reference = body
        .ref_image_base64
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .map(|data| InlineData {
            mime_type: body.ref_image_mime.unwrap_or_else(|| "image/jpeg".into()),
            data,
        });

    let config = state.config.load_full();
    let backoff = Backoff::from(&config.backoff);
    let request = gemini::image_request(&prompt, &aspect_ratio, reference.as_ref());
    let models = [
        config.gemini.image_model.clone(),
        config.gemini.image_fallback_model.clone(),
    ];

    let out = state
        .rotate("imagen", &keys, |lease| {
            let api = state.gemini.clone();
            let request = request.clone();
            let models = models.clone();
            async move {
                for model in &models {
                    let resp = backoff
                        .retry(|| api.generate_content(&lease.secret, model, request.clone()))
                        .await?;
                    if let Some(image) = extract_inline_data(&resp, "image/png") {
                        return Ok((image, model.clone()));
                    }
                    tracing::debug!(model = %model, "no inline image returned");
                }
                Err(YosoError::EmptyResponse("no image returned".into()))
            }
        })
        .await?;

    let (image, model) = out.value;
    Ok(Json(json!({
        "ok": true,
        "image": { "dataUrl": image.data_url(), "mimeType": image.mime_type },
        "model": model,
        "aspectRatio": aspect_ratio,
        "slot": out.slot,
        "attempts": out.attempts,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingBody {
    pub api_key: Option<String>,
}

/// Handles `POST /api/gemini/ping`: probes one key and reports its class.
pub async fn ping(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PingBody>,
) -> Result<impl IntoResponse, ApiError> {
    let key = require_text(body.api_key, "API_KEY_MISSING")?;
    let model = state.config.load().gemini.ping_model.clone();

    match state
        .gemini
        .generate_content(&key, &model, gemini::ping_request())
        .await
    {
        Ok(_) => Ok((StatusCode::OK, Json(json!({ "ok": true, "class": "ok" })))),
        Err(e) => {
            let class = classify(&e);
            let (status, tag) = match class {
                FailureClass::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RESOURCE_EXHAUSTED"),
                FailureClass::InvalidCredential => (StatusCode::BAD_REQUEST, "API_KEY_INVALID"),
                FailureClass::Transient => (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE"),
                FailureClass::Unclassified => (StatusCode::BAD_GATEWAY, "UPSTREAM_FAILED"),
            };
            tracing::info!(class = %class, "key probe failed");
            let detail: String = e.message().chars().take(200).collect();
            Ok((
                status,
                Json(json!({ "ok": false, "error": tag, "class": class, "detail": detail })),
            ))
        }
    }
}
