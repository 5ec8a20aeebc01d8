//! Image-recipe handlers and the bearer token store routes.

use axum::{Json, extract::State};
use rand::Rng as _;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use yoso_provider::recipe::{
    UPLOAD_PATH, extract_encoded_image, extract_media_id, generate_request, parse_data_url,
    upload_request,
};
use yoso_store::normalize_bearer;
use yoso_types::YosoError;

use crate::pool::require_text;
use crate::{ApiError, AppState};

impl AppState {
    /// The request's token, or the stored one when the request has none.
    async fn recipe_token(&self, token: Option<String>) -> Result<String, YosoError> {
        let token = normalize_bearer(token.as_deref().unwrap_or_default());
        if !token.is_empty() {
            return Ok(token);
        }
        self.tokens
            .load(self.clock.now_ms())
            .await?
            .map(|r| r.token)
            .ok_or_else(|| YosoError::InvalidRequest("WHISK_TOKEN_MISSING".into()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBody {
    pub token: Option<String>,
    pub image_data_url: Option<String>,
}

/// Handles `POST /api/yoso/whisk/upload`.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UploadBody>,
) -> Result<Json<Value>, ApiError> {
    let token = state.recipe_token(body.token).await?;
    let data_url = require_text(body.image_data_url, "IMAGE_DATAURL_MISSING")?;
    let image = parse_data_url(&data_url)
        .ok_or_else(|| YosoError::InvalidRequest("INVALID_DATAURL".into()))?;

    let outcome = async {
        let resp = state
            .recipe
            .call(&token, UPLOAD_PATH, upload_request(&image.data))
            .await?;
        extract_media_id(&resp)
    }
    .await;
    state.stats.record("whisk_upload", &outcome, 1);
    let media_id = outcome?;

    Ok(Json(json!({ "ok": true, "mediaId": media_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeGenerateBody {
    pub token: Option<String>,
    pub prompt: Option<String>,
    pub aspect_ratio: Option<String>,
    pub reference_id: Option<String>,
}

/// Handles `POST /api/yoso/whisk/generate`.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RecipeGenerateBody>,
) -> Result<Json<Value>, ApiError> {
    let token = state.recipe_token(body.token).await?;
    let prompt = require_text(body.prompt, "PROMPT_EMPTY")?;
    let aspect_ratio = body.aspect_ratio.unwrap_or_else(|| "1:1".into());
    let seed = rand::thread_rng().gen_range(100_000..1_000_000);
    let (mode, request) = generate_request(
        &prompt,
        &aspect_ratio,
        body.reference_id.as_deref(),
        seed,
        state.clock.now_ms(),
    );

    let outcome = async {
        let resp = state.recipe.call(&token, mode.path(), request).await?;
        extract_encoded_image(&resp)
    }
    .await;
    state.stats.record("whisk_generate", &outcome, 1);
    let data_url = outcome?;

    Ok(Json(json!({ "ok": true, "dataUrl": data_url, "mode": mode.as_str() })))
}

#[derive(Debug, Deserialize)]
pub struct SaveTokenBody {
    pub token: Option<String>,
}

/// Handles `POST /api/whisk/token`.
pub async fn save_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SaveTokenBody>,
) -> Result<Json<Value>, ApiError> {
    let raw = require_text(body.token, "TOKEN_EMPTY")?;
    let record = state.tokens.save(&raw, state.clock.now_ms()).await?;
    Ok(Json(json!({
        "ok": true,
        "updatedAt": record.updated_at,
        "expiresAt": record.expires_at,
    })))
}

/// Handles `GET /api/whisk/token`.
pub async fn token_status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let status = state.tokens.status(state.clock.now_ms()).await?;
    let mut body = serde_json::to_value(status).map_err(YosoError::from)?;
    body["ok"] = json!(true);
    Ok(Json(body))
}

/// Handles `DELETE /api/whisk/token`.
pub async fn reset_token(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.tokens.reset().await?;
    tracing::info!("recipe token removed");
    Ok(Json(json!({ "ok": true })))
}
