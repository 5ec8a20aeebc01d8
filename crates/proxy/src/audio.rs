//! Narration handlers: single-voice speech and the voice-fallback diorama route.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use yoso_provider::{
    Backoff,
    gemini::{self, extract_inline_data},
    is_voice_rejection,
};
use yoso_types::YosoError;

use crate::pool::{MAX_SPEECH_CHARS, clamp_chars, normalize_keys, require_text};
use crate::{ApiError, AppState};

/// Mime reported when the upstream omits one.
const DEFAULT_AUDIO_MIME: &str = "audio/wav";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechBody {
    pub text: Option<String>,
    /// Prebuilt voice name; defaults to the configured voice.
    pub voice_name: Option<String>,
    pub api_keys: Option<Vec<String>>,
}

/// Handles `POST /api/yoso/tts`.
pub async fn speech(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SpeechBody>,
) -> Result<Json<Value>, ApiError> {
    let text = clamp_chars(&require_text(body.text, "TEXT_MISSING")?, MAX_SPEECH_CHARS);
    let keys = normalize_keys(body.api_keys);
    let config = state.config.load_full();
    let voice = body
        .voice_name
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| config.gemini.default_voice.clone());
    let backoff = Backoff::from(&config.backoff);
    let request = gemini::speech_request(&text, &voice);

    let out = state
        .rotate("tts", &keys, |lease| {
            let api = state.gemini.clone();
            let model = config.gemini.tts_model.clone();
            let request = request.clone();
            async move {
                let resp = backoff
                    .retry(|| api.generate_content(&lease.secret, &model, request.clone()))
                    .await?;
                extract_inline_data(&resp, DEFAULT_AUDIO_MIME)
                    .ok_or_else(|| YosoError::EmptyResponse("no audio returned".into()))
            }
        })
        .await?;

    Ok(Json(json!({
        "ok": true,
        "audioBase64": out.value.data,
        "audioMime": out.value.mime_type,
        "voiceName": voice,
        "slot": out.slot,
        "attempts": out.attempts,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DioramaAudioBody {
    pub text: Option<String>,
    /// `"male"` or `"female"` (default).
    pub voice: Option<String>,
    pub api_keys: Option<Vec<String>>,
}

/// Handles `POST /api/yoso/diorama/audio`.
///
/// Walks ready keys × gender voice candidates. A voice the upstream rejects
/// is skipped for the same key; a rate-limited key is cooled down and skipped
/// entirely. When every combination is spent the last-resort voice is tried
/// once.
pub async fn diorama_audio(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DioramaAudioBody>,
) -> Result<Json<Value>, ApiError> {
    let text = clamp_chars(&require_text(body.text, "TEXT_MISSING")?, MAX_SPEECH_CHARS);
    let gender = match body.voice.as_deref().map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("male") => "male",
        _ => "female",
    };
    let config = state.config.load_full();
    let keys = normalize_keys(body.api_keys);
    let candidates = config.voice_candidates(gender);
    let backoff = Backoff::from(&config.backoff);
    let model = config.gemini.tts_model.as_str();

    let out = state
        .rotate_axis(
            "diorama_audio",
            &keys,
            candidates,
            config.voices.last_resort.clone(),
            is_voice_rejection,
            |lease, voice_name| {
                let api = state.gemini.clone();
                let request = gemini::speech_request(&text, &voice_name);
                async move {
                    let resp = backoff
                        .retry(|| api.generate_content(&lease.secret, model, request.clone()))
                        .await?;
                    extract_inline_data(&resp, DEFAULT_AUDIO_MIME)
                        .ok_or_else(|| YosoError::EmptyResponse("no audio returned".into()))
                }
            },
        )
        .await?;

    Ok(Json(json!({
        "ok": true,
        "audioBase64": out.value.data,
        "audioMime": out.value.mime_type,
        "voice": gender,
        "voiceNameUsed": out.secondary,
        "fallback": out.stage.is_last_resort(),
        "slot": out.slot,
        "attempts": out.attempts,
    })))
}
