//! Image-recipe client — the sandbox "whisk" image surface.
//!
//! A single bearer token authenticates every call; it is not part of the
//! rotated slot pool. Besides the usual 401/403/429/5xx contract, a 400 can
//! carry a content-rejection reason that no retry will fix.

use crate::gemini::InlineData;
use crate::http_util::UpstreamHttp;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use yoso_types::{RecipeApi, YosoError, traits::Result};

pub const DEFAULT_BASE_URL: &str = "https://aisandbox-pa.googleapis.com";

pub const UPLOAD_PATH: &str = "/v1/media:uploadImage";
pub const GENERATE_PATH: &str = "/v1/whisk:generateImage";
pub const RECIPE_PATH: &str = "/v1/whisk:runImageRecipe";

const GENERATE_WORKFLOW: &str = "2c729f8f-048a-435a-a6a7-1faad1ae294a";
const RECIPE_WORKFLOW: &str = "9220cb1a-1624-422c-91a0-4ffc5ab2162f";

const ORIGIN: &str = "https://labs.google";
const REFERER: &str = "https://labs.google/";

/// Reason reported when a reference image appears to depict a minor.
pub const MINOR_INPUT_REASON: &str = "PUBLIC_ERROR_MINOR_INPUT_IMAGE";

#[derive(Clone)]
pub struct RecipeClient {
    http: UpstreamHttp,
    base_url: String,
}

impl RecipeClient {
    #[must_use]
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http: UpstreamHttp::new(http),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RecipeApi for RecipeClient {
    async fn call(&self, token: &str, path: &str, body: Value) -> Result<Value> {
        let builder = self
            .http
            .client()
            .post(format!("{}{path}", self.base_url))
            .header("authorization", token)
            .header("content-type", "application/json")
            .header("origin", ORIGIN)
            .header("referer", REFERER)
            .json(&body);
        self.http.send_json(builder).await.map_err(interpret_error)
    }
}

/// Maps a `W:H` ratio to the upstream enum. Anything unrecognized is square.
#[must_use]
pub fn map_aspect(aspect_ratio: &str) -> &'static str {
    match aspect_ratio.trim() {
        "16:9" => "IMAGE_ASPECT_RATIO_LANDSCAPE",
        "9:16" => "IMAGE_ASPECT_RATIO_PORTRAIT",
        _ => "IMAGE_ASPECT_RATIO_SQUARE",
    }
}

/// Which generation mode a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeMode {
    /// Prompt only.
    Imagen,
    /// Prompt plus an uploaded reference subject.
    Reference,
}

impl RecipeMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Imagen => "IMAGEN",
            Self::Reference => "R2I",
        }
    }

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Imagen => GENERATE_PATH,
            Self::Reference => RECIPE_PATH,
        }
    }
}

/// Builds a generation request. Returns the mode so the caller knows which
/// path to post to.
#[must_use]
pub fn generate_request(
    prompt: &str,
    aspect_ratio: &str,
    reference_id: Option<&str>,
    seed: u32,
    now_ms: u64,
) -> (RecipeMode, Value) {
    let aspect = map_aspect(aspect_ratio);
    let session_id = format!(";{now_ms}");
    match reference_id.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reference) => (
            RecipeMode::Reference,
            json!({
                "clientContext": {
                    "workflowId": RECIPE_WORKFLOW,
                    "tool": "BACKBONE",
                    "sessionId": session_id,
                },
                "seed": seed,
                "imageModelSettings": { "imageModel": "R2I", "aspectRatio": aspect },
                "userInstruction": prompt,
                "recipeMediaInputs": [{
                    "caption": "MAIN_CHARACTER",
                    "mediaInput": {
                        "mediaCategory": "MEDIA_CATEGORY_SUBJECT",
                        "mediaGenerationId": reference,
                    }
                }]
            }),
        ),
        None => (
            RecipeMode::Imagen,
            json!({
                "clientContext": {
                    "workflowId": GENERATE_WORKFLOW,
                    "tool": "BACKBONE",
                    "sessionId": session_id,
                },
                "imageModelSettings": { "imageModel": "IMAGEN_3_5", "aspectRatio": aspect },
                "prompt": prompt,
                "mediaCategory": "MEDIA_CATEGORY_BOARD",
            }),
        ),
    }
}

#[must_use]
pub fn upload_request(image_base64: &str) -> Value {
    json!({ "image": { "encodedImage": image_base64 } })
}

/// Splits a `data:<mime>;base64,<payload>` URL.
#[must_use]
pub fn parse_data_url(url: &str) -> Option<InlineData> {
    let rest = url.trim().strip_prefix("data:")?;
    let (mime, data) = rest.split_once(',')?;
    let mime = mime
        .strip_suffix(";base64")
        .or_else(|| mime.strip_suffix(";BASE64"))?;
    if mime.is_empty() || data.is_empty() {
        return None;
    }
    Some(InlineData {
        mime_type: mime.to_string(),
        data: data.to_string(),
    })
}

/// `error.details[0].reason` from an upstream error body.
#[must_use]
pub fn rejection_reason(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v.pointer("/error/details/0/reason")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Human-readable message from an upstream error body.
#[must_use]
pub fn error_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v.pointer("/error/message")
        .or_else(|| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Turns the minor-subject 400 into [`YosoError::ContentRejected`]; every
/// other error passes through.
#[must_use]
pub fn interpret_error(err: YosoError) -> YosoError {
    match &err {
        YosoError::Upstream { status: 400, body } => match rejection_reason(body) {
            Some(reason) if reason == MINOR_INPUT_REASON => YosoError::ContentRejected { reason },
            _ => err,
        },
        _ => err,
    }
}

/// The first generated image as a data URL.
///
/// # Errors
///
/// Returns [`YosoError::EmptyResponse`] when the response has no image.
pub fn extract_encoded_image(resp: &Value) -> Result<String> {
    let encoded = resp
        .pointer("/imagePanels/0/generatedImages/0/encodedImage")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| YosoError::EmptyResponse("no image in response".into()))?;
    if encoded.starts_with("data:") {
        Ok(encoded.to_string())
    } else {
        Ok(format!("data:image/png;base64,{encoded}"))
    }
}

/// The media id returned by an upload.
///
/// # Errors
///
/// Returns [`YosoError::EmptyResponse`] when the id is absent.
pub fn extract_media_id(resp: &Value) -> Result<String> {
    resp.get("mediaGenerationId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| YosoError::EmptyResponse("no media id in response".into()))
}
