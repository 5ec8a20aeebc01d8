//! Gemini client — Google Generative Language API (`generateContent`).
//!
//! Auth: `x-goog-api-key` header carrying one slot's secret per call.
//! Request bodies are built by the free functions below so routes and tests
//! can inspect them without a network.

use crate::http_util::UpstreamHttp;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use yoso_types::{GenerativeApi, YosoError, traits::Result};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Client for the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    http: UpstreamHttp,
    base_url: String,
}

impl GeminiClient {
    #[must_use]
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http: UpstreamHttp::new(http),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }
}

#[async_trait]
impl GenerativeApi for GeminiClient {
    async fn generate_content(&self, api_key: &str, model: &str, body: Value) -> Result<Value> {
        let builder = self
            .http
            .client()
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .header("content-type", "application/json")
            .json(&body);
        self.http.send_json(builder).await
    }
}

/// Plain text prompt.
#[must_use]
pub fn text_request(prompt: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
    })
}

/// Image generation, optionally conditioned on a reference image.
#[must_use]
pub fn image_request(prompt: &str, aspect_ratio: &str, reference: Option<&InlineData>) -> Value {
    let mut parts = Vec::with_capacity(2);
    if let Some(r) = reference {
        parts.push(json!({
            "inlineData": { "mimeType": r.mime_type, "data": r.data }
        }));
    }
    parts.push(json!({ "text": prompt }));
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": { "aspectRatio": aspect_ratio }
        }
    })
}

/// Speech synthesis with a prebuilt voice.
#[must_use]
pub fn speech_request(text: &str, voice_name: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": text }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice_name }
                }
            }
        }
    })
}

/// Minimal request used to probe a key.
#[must_use]
pub fn ping_request() -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": "ping" }] }],
        "generationConfig": { "maxOutputTokens": 8 }
    })
}

/// Binary payload returned (or sent) inline as base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

fn first_parts(resp: &Value) -> &[Value] {
    resp.pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

/// Concatenated text of the first candidate.
///
/// # Errors
///
/// Returns [`YosoError::EmptyResponse`] when no text part is present.
pub fn extract_text(resp: &Value) -> Result<String> {
    let text: String = first_parts(resp)
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    let text = text.trim();
    if text.is_empty() {
        Err(YosoError::EmptyResponse("no text in response".into()))
    } else {
        Ok(text.to_string())
    }
}

/// First inline binary part of the first candidate. Accepts both the
/// camelCase and snake_case field spellings.
#[must_use]
pub fn extract_inline_data(resp: &Value, default_mime: &str) -> Option<InlineData> {
    first_parts(resp).iter().find_map(|p| {
        let inline = p.get("inlineData").or_else(|| p.get("inline_data"))?;
        let data = inline.get("data").and_then(Value::as_str)?;
        if data.is_empty() {
            return None;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or(default_mime);
        Some(InlineData {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    })
}
