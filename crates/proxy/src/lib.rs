//! HTTP layer — axum router, route handlers, and error mapping.
//!
//! Generation routes rotate across the caller's keys (or the persisted slot
//! pool), the slot routes manage that pool, and the recipe routes front the
//! single-token image-recipe API.

mod audio;
mod error;
mod generate;
pub mod pool;
mod recipe;
mod slots;
pub mod stats;

pub use error::ApiError;
pub use slots::SlotView;
pub use stats::RotationStats;

use arc_swap::ArcSwap;
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use yoso_config::Config;
use yoso_provider::{Clock, GeminiClient, RecipeClient, SystemClock};
use yoso_store::{SlotStore, TokenStore};
use yoso_types::{GenerativeApi, KvStore, RecipeApi};

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Atomically swappable for hot-reloading.
    pub config: Arc<ArcSwap<Config>>,
    pub slots: SlotStore,
    pub tokens: TokenStore,
    pub gemini: Arc<dyn GenerativeApi>,
    pub recipe: Arc<dyn RecipeApi>,
    pub stats: Arc<RotationStats>,
    pub clock: Arc<dyn Clock>,
    /// Fired on shutdown; in-flight rotations stop without blaming a slot.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Creates application state over explicit upstream collaborators.
    ///
    /// Slot capacity and token TTL are read from the config snapshot at
    /// construction time.
    pub fn new(
        config: Arc<ArcSwap<Config>>,
        kv: Arc<dyn KvStore>,
        gemini: Arc<dyn GenerativeApi>,
        recipe: Arc<dyn RecipeApi>,
    ) -> Self {
        let snapshot = config.load_full();
        Self {
            slots: SlotStore::new(kv.clone(), snapshot.rotation.slot_count),
            tokens: TokenStore::new(kv, Duration::from_secs(snapshot.recipe.token_ttl_secs)),
            config,
            gemini,
            recipe,
            stats: Arc::new(RotationStats::new()),
            clock: Arc::new(SystemClock),
            shutdown: CancellationToken::new(),
        }
    }

    /// Creates application state with the real HTTP clients.
    pub fn with_http(config: Arc<ArcSwap<Config>>, kv: Arc<dyn KvStore>) -> Self {
        let snapshot = config.load_full();
        let http = build_http_client();
        let gemini = Arc::new(GeminiClient::new(http.clone(), snapshot.gemini.base_url.clone()));
        let recipe = Arc::new(RecipeClient::new(http, snapshot.recipe.base_url.clone()));
        Self::new(config, kv, gemini, recipe)
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Build the upstream HTTP client.
fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(180))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to build configured http client, using defaults");
            reqwest::Client::new()
        })
}

/// Build the full axum router.
///
/// Routes:
/// - POST   /api/yoso/generate          text through key rotation
/// - POST   /api/yoso/imagen            image, primary then fallback model
/// - POST   /api/yoso/tts               narration with one voice
/// - POST   /api/yoso/diorama/audio     narration with voice fallback
/// - POST   /api/gemini/ping            probe one key
/// - POST   /api/yoso/whisk/upload      reference image upload
/// - POST   /api/yoso/whisk/generate    recipe image generation
/// - POST/GET/DELETE /api/whisk/token   recipe token store
/// - GET/DELETE /api/slots, PUT /api/slots/{id}
/// - GET    /api/stats
pub fn make_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/yoso/generate", post(generate::generate_text))
        .route("/api/yoso/imagen", post(generate::generate_image))
        .route("/api/yoso/tts", post(audio::speech))
        .route("/api/yoso/diorama/audio", post(audio::diorama_audio))
        .route("/api/gemini/ping", post(generate::ping))
        .route("/api/yoso/whisk/upload", post(recipe::upload))
        .route("/api/yoso/whisk/generate", post(recipe::generate))
        .route(
            "/api/whisk/token",
            post(recipe::save_token)
                .get(recipe::token_status)
                .delete(recipe::reset_token),
        )
        .route(
            "/api/slots",
            get(slots::list_slots).delete(slots::clear_slots),
        )
        .route("/api/slots/{id}", put(slots::update_slot))
        .route("/api/stats", get(stats_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snap = state.stats.snapshot();
    Json(serde_json::to_value(snap).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt as _;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tower::ServiceExt as _;
    use yoso_provider::{ManualClock, recipe::GENERATE_PATH};
    use yoso_store::InMemoryKvStore;
    use yoso_types::{YosoError, traits::Result};

    const T: u64 = 1_700_000_000_000;

    type GeminiHandler = Box<dyn Fn(&str, &str, &Value) -> Result<Value> + Send + Sync>;

    /// Scripted Gemini upstream that records every call.
    struct FakeGemini {
        handler: GeminiHandler,
        calls: Mutex<Vec<(String, String, Value)>>,
    }

    impl FakeGemini {
        fn new(f: impl Fn(&str, &str, &Value) -> Result<Value> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                handler: Box::new(f),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerativeApi for FakeGemini {
        async fn generate_content(&self, api_key: &str, model: &str, body: Value) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((api_key.to_string(), model.to_string(), body.clone()));
            (self.handler)(api_key, model, &body)
        }
    }

    type RecipeHandler = Box<dyn Fn(&str, &str, &Value) -> Result<Value> + Send + Sync>;

    struct FakeRecipe {
        handler: RecipeHandler,
    }

    #[async_trait]
    impl RecipeApi for FakeRecipe {
        async fn call(&self, token: &str, path: &str, body: Value) -> Result<Value> {
            (self.handler)(token, path, &body)
        }
    }

    fn upstream(status: u16, body: &str) -> YosoError {
        YosoError::Upstream {
            status,
            body: body.to_string(),
        }
    }

    fn text_response(text: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    fn inline_response(mime: &str, data: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [
            { "inlineData": { "mimeType": mime, "data": data } }
        ] } }] })
    }

    fn voice_of(body: &Value) -> String {
        body.pointer("/generationConfig/speechConfig/voiceConfig/prebuiltVoiceConfig/voiceName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn make_state_full(
        config: Config,
        gemini: Arc<dyn GenerativeApi>,
        recipe: Arc<dyn RecipeApi>,
    ) -> Arc<AppState> {
        let config = Arc::new(ArcSwap::from_pointee(config));
        let kv = Arc::new(InMemoryKvStore::new());
        Arc::new(AppState::new(config, kv, gemini, recipe).with_clock(Arc::new(ManualClock::at(T))))
    }

    fn unused_recipe() -> Arc<dyn RecipeApi> {
        Arc::new(FakeRecipe {
            handler: Box::new(|_, _, _| Err(upstream(500, "unused"))),
        })
    }

    fn make_state_with(gemini: Arc<dyn GenerativeApi>, recipe: Arc<dyn RecipeApi>) -> Arc<AppState> {
        make_state_full(Config::default(), gemini, recipe)
    }

    fn make_state(gemini: Arc<dyn GenerativeApi>) -> Arc<AppState> {
        make_state_with(gemini, unused_recipe())
    }

    async fn store_secret(state: &Arc<AppState>, id: u32, secret: &str) {
        let (status, _) = send(
            make_router(state.clone()),
            "PUT",
            &format!("/api/slots/{id}"),
            Some(json!({ "secret": secret })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&b).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_generate_rotates_past_invalid_key() {
        let gemini = FakeGemini::new(|key, _, _| match key {
            "bad" => Err(upstream(401, "API key not valid")),
            _ => Ok(text_response("a tale")),
        });
        let app = make_router(make_state(gemini.clone()));
        let (status, json) = send(
            app,
            "POST",
            "/api/yoso/generate",
            Some(json!({ "prompt": "tell me", "apiKeys": [" bad ", "", "good"] })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        assert_eq!(json["text"], "a tale");
        assert_eq!(json["slot"], 2);
        assert_eq!(json["attempts"], 2);
        let calls = gemini.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, "gemini-3-flash-preview");
    }

    #[tokio::test]
    async fn test_generate_missing_prompt() {
        let app = make_router(make_state(FakeGemini::new(|_, _, _| Ok(Value::Null))));
        let (status, json) = send(
            app,
            "POST",
            "/api/yoso/generate",
            Some(json!({ "prompt": "   ", "apiKeys": ["k"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "PROMPT_EMPTY");
    }

    #[tokio::test]
    async fn test_generate_without_any_key() {
        let app = make_router(make_state(FakeGemini::new(|_, _, _| Ok(Value::Null))));
        let (status, json) = send(
            app,
            "POST",
            "/api/yoso/generate",
            Some(json!({ "prompt": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "API_KEY_MISSING");
    }

    #[tokio::test]
    async fn test_persisted_pool_records_cooldown() {
        let gemini = FakeGemini::new(|_, _, _| Err(upstream(429, "RESOURCE_EXHAUSTED")));
        let state = make_state(gemini);

        let (status, json) = send(
            make_router(state.clone()),
            "PUT",
            "/api/slots/1",
            Some(json!({ "secret": "AIzaSySecretKey0001", "label": "main" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["slot"]["maskedSecret"], "********0001");
        assert_eq!(json["slot"]["label"], "main");

        let (status, json) = send(
            make_router(state.clone()),
            "POST",
            "/api/yoso/generate",
            Some(json!({ "prompt": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"], "ALL_KEYS_COOLING_DOWN");
        assert_eq!(json["detail"], "all credentials cooling down, retry in 10m");

        let (_, json) = send(make_router(state.clone()), "GET", "/api/slots", None).await;
        let first = &json["slots"][0];
        assert_eq!(first["lastError"], "rate_limited");
        assert_eq!(first["ready"], false);
        assert_eq!(first["cooldownUntil"], T + 600_000);
        assert!(!json.to_string().contains("AIzaSySecretKey0001"));
    }

    #[tokio::test]
    async fn test_slot_update_unknown_and_clear() {
        let state = make_state(FakeGemini::new(|_, _, _| Ok(Value::Null)));
        let (status, json) = send(
            make_router(state.clone()),
            "PUT",
            "/api/slots/42",
            Some(json!({ "secret": "k" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "SLOT_NOT_FOUND");

        send(
            make_router(state.clone()),
            "PUT",
            "/api/slots/2",
            Some(json!({ "secret": "k" })),
        )
        .await;
        let (status, json) = send(make_router(state.clone()), "DELETE", "/api/slots", None).await;
        assert_eq!(status, StatusCode::OK);
        let slots = json["slots"].as_array().unwrap();
        assert_eq!(slots.len(), 5);
        assert!(slots.iter().all(|s| s["configured"] == false));
    }

    #[tokio::test]
    async fn test_imagen_falls_back_to_second_model() {
        let gemini = FakeGemini::new(|_, model, _| {
            if model == "gemini-2.5-flash-image" {
                Ok(text_response("sorry, text only"))
            } else {
                Ok(inline_response("image/png", "UE5H"))
            }
        });
        let app = make_router(make_state(gemini.clone()));
        let (status, json) = send(
            app,
            "POST",
            "/api/yoso/imagen",
            Some(json!({ "prompt": "a diorama", "apiKeys": ["k"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["image"]["dataUrl"], "data:image/png;base64,UE5H");
        assert_eq!(json["model"], "gemini-3-pro-image-preview");
        assert_eq!(json["aspectRatio"], "9:16");
        assert_eq!(gemini.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_imagen_empty_everywhere_is_not_rotated() {
        let gemini = FakeGemini::new(|_, _, _| Ok(text_response("nope")));
        let app = make_router(make_state(gemini.clone()));
        let (status, json) = send(
            app,
            "POST",
            "/api/yoso/imagen",
            Some(json!({ "prompt": "a diorama", "apiKeys": ["k1", "k2"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"], "EMPTY_RESPONSE");
        // Both models on the first key only.
        assert!(gemini.calls().iter().all(|(k, _, _)| k == "k1"));
    }

    #[tokio::test]
    async fn test_tts_uses_default_voice() {
        let gemini = FakeGemini::new(|_, _, _| Ok(inline_response("audio/L16;rate=24000", "AAAA")));
        let app = make_router(make_state(gemini.clone()));
        let (status, json) = send(
            app,
            "POST",
            "/api/yoso/tts",
            Some(json!({ "text": "Once upon a time", "apiKeys": ["k"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["audioBase64"], "AAAA");
        assert_eq!(json["audioMime"], "audio/L16;rate=24000");
        assert_eq!(json["voiceName"], "Kore");
        let calls = gemini.calls();
        assert_eq!(calls[0].1, "gemini-2.5-flash-preview-tts");
        assert_eq!(voice_of(&calls[0].2), "Kore");
    }

    #[tokio::test]
    async fn test_tts_clamps_text() {
        let gemini = FakeGemini::new(|_, _, _| Ok(inline_response("audio/wav", "AAAA")));
        let app = make_router(make_state(gemini.clone()));
        let long = "x".repeat(9_000);
        send(
            app,
            "POST",
            "/api/yoso/tts",
            Some(json!({ "text": long, "apiKeys": ["k"] })),
        )
        .await;
        let calls = gemini.calls();
        let sent = calls[0].2["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert_eq!(sent.len(), 8_000);
    }

    #[tokio::test]
    async fn test_diorama_audio_skips_rejected_voices() {
        let gemini = FakeGemini::new(|_, _, body| match voice_of(body).as_str() {
            "Algenib" | "Aoede" => Err(upstream(400, "Voice name is not supported")),
            _ => Ok(inline_response("audio/wav", "BBBB")),
        });
        let app = make_router(make_state(gemini.clone()));
        let (status, json) = send(
            app,
            "POST",
            "/api/yoso/diorama/audio",
            Some(json!({ "text": "A castle rises", "apiKeys": ["k1"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["voice"], "female");
        assert_eq!(json["voiceNameUsed"], "Callisto");
        assert_eq!(json["fallback"], false);
        let voices: Vec<String> = gemini.calls().iter().map(|c| voice_of(&c.2)).collect();
        assert_eq!(voices, vec!["Algenib", "Aoede", "Callisto"]);
    }

    #[tokio::test]
    async fn test_diorama_audio_last_resort() {
        let gemini = FakeGemini::new(|_, _, body| match voice_of(body).as_str() {
            "Algenib" => Ok(inline_response("audio/wav", "CCCC")),
            _ => Err(upstream(400, "unknown voice")),
        });
        let app = make_router(make_state(gemini.clone()));
        let (status, json) = send(
            app,
            "POST",
            "/api/yoso/diorama/audio",
            Some(json!({ "text": "A castle rises", "voice": "male", "apiKeys": ["k1"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["voice"], "male");
        assert_eq!(json["voiceNameUsed"], "Algenib");
        assert_eq!(json["fallback"], true);
        assert_eq!(gemini.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_diorama_audio_hard_failure_is_fast() {
        let gemini = FakeGemini::new(|_, _, _| Err(upstream(401, "API key not valid")));
        let app = make_router(make_state(gemini.clone()));
        let (status, json) = send(
            app,
            "POST",
            "/api/yoso/diorama/audio",
            Some(json!({ "text": "A castle rises", "apiKeys": ["k1", "k2"] })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "API_KEY_INVALID");
        assert_eq!(gemini.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_diorama_audio_persisted_pool_records_cooldown() {
        let gemini = FakeGemini::new(|_, _, _| Err(upstream(429, "RESOURCE_EXHAUSTED")));
        let state = make_state(gemini.clone());
        store_secret(&state, 1, "AIzaSySecretKey0001").await;

        let (status, json) = send(
            make_router(state.clone()),
            "POST",
            "/api/yoso/diorama/audio",
            Some(json!({ "text": "A castle rises" })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"], "RATE_LIMITED");
        // First voice, then the last resort on the same key.
        assert_eq!(gemini.calls().len(), 2);

        let (_, json) = send(make_router(state.clone()), "GET", "/api/slots", None).await;
        let first = &json["slots"][0];
        assert_eq!(first["lastError"], "rate_limited");
        assert_eq!(first["ready"], false);
        assert_eq!(first["cooldownUntil"], T + 600_000);

        let (status, json) = send(
            make_router(state),
            "POST",
            "/api/yoso/diorama/audio",
            Some(json!({ "text": "A castle rises" })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"], "ALL_KEYS_COOLING_DOWN");
        assert_eq!(gemini.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_diorama_audio_persisted_pool_marks_used() {
        let gemini = FakeGemini::new(|_, _, _| Ok(inline_response("audio/wav", "DDDD")));
        let state = make_state(gemini.clone());
        store_secret(&state, 2, "AIzaSySecretKey0002").await;

        let (status, json) = send(
            make_router(state.clone()),
            "POST",
            "/api/yoso/diorama/audio",
            Some(json!({ "text": "A castle rises" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["slot"], 2);
        assert_eq!(gemini.calls()[0].0, "AIzaSySecretKey0002");

        let (_, json) = send(make_router(state), "GET", "/api/slots", None).await;
        assert_eq!(json["slots"][1]["lastUsedAt"], T);
    }

    #[tokio::test]
    async fn test_diorama_audio_cancelled_on_shutdown() {
        let gemini = FakeGemini::new(|_, _, _| Err(upstream(429, "RESOURCE_EXHAUSTED")));
        let state = make_state(gemini.clone());
        store_secret(&state, 1, "AIzaSySecretKey0001").await;
        state.shutdown.cancel();

        let (status, json) = send(
            make_router(state.clone()),
            "POST",
            "/api/yoso/diorama/audio",
            Some(json!({ "text": "A castle rises" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "REQUEST_CANCELLED");
        assert!(gemini.calls().is_empty());

        let (_, json) = send(make_router(state), "GET", "/api/slots", None).await;
        assert_eq!(json["slots"][0]["ready"], true);
        assert_eq!(json["slots"][0]["lastError"], Value::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_backs_off_on_same_slot() {
        let mut config = Config::default();
        config.backoff.max_attempts = 3;
        let failures = std::sync::atomic::AtomicUsize::new(0);
        let gemini = FakeGemini::new(move |_, _, _| {
            if failures.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2 {
                Err(upstream(503, "UNAVAILABLE"))
            } else {
                Ok(text_response("third time"))
            }
        });
        let state = make_state_full(config, gemini.clone(), unused_recipe());

        let (status, json) = send(
            make_router(state),
            "POST",
            "/api/yoso/generate",
            Some(json!({ "prompt": "hi", "apiKeys": ["k1", "k2"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["text"], "third time");
        assert_eq!(json["slot"], 1);
        assert_eq!(json["attempts"], 1);
        let calls = gemini.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(k, _, _)| k == "k1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_exhausted_backoff_cools_slot_as_transient() {
        let gemini = FakeGemini::new(|_, _, _| Err(upstream(503, "UNAVAILABLE")));
        let state = make_state(gemini.clone());
        store_secret(&state, 1, "AIzaSySecretKey0001").await;

        let (status, json) = send(
            make_router(state.clone()),
            "POST",
            "/api/yoso/generate",
            Some(json!({ "prompt": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"], "ALL_KEYS_COOLING_DOWN");
        // Default backoff: two tries on the only slot.
        assert_eq!(gemini.calls().len(), 2);

        let (_, json) = send(make_router(state), "GET", "/api/slots", None).await;
        assert_eq!(json["slots"][0]["lastError"], "transient");
        assert_eq!(json["slots"][0]["cooldownUntil"], T + 20_000);
    }

    #[tokio::test]
    async fn test_ping_reports_class() {
        let gemini = FakeGemini::new(|key, _, _| match key {
            "limited" => Err(upstream(429, "")),
            _ => Ok(text_response("pong")),
        });
        let state = make_state(gemini.clone());

        let (status, json) = send(
            make_router(state.clone()),
            "POST",
            "/api/gemini/ping",
            Some(json!({ "apiKey": "limited" })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["class"], "rate_limited");

        let (status, json) = send(
            make_router(state),
            "POST",
            "/api/gemini/ping",
            Some(json!({ "apiKey": "fine" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["class"], "ok");
        assert_eq!(gemini.calls()[1].1, "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn test_whisk_token_lifecycle_and_generate() {
        let recipe = Arc::new(FakeRecipe {
            handler: Box::new(|token, path, body| {
                assert_eq!(token, "Bearer ya29.token");
                assert_eq!(path, GENERATE_PATH);
                assert_eq!(body["imageModelSettings"]["aspectRatio"], "IMAGE_ASPECT_RATIO_LANDSCAPE");
                Ok(json!({ "imagePanels": [{ "generatedImages": [{ "encodedImage": "SU1H" }] }] }))
            }),
        });
        let state = make_state_with(FakeGemini::new(|_, _, _| Ok(Value::Null)), recipe);

        let (status, json) = send(
            make_router(state.clone()),
            "POST",
            "/api/yoso/whisk/generate",
            Some(json!({ "prompt": "a fox" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "WHISK_TOKEN_MISSING");

        let (status, json) = send(
            make_router(state.clone()),
            "POST",
            "/api/whisk/token",
            Some(json!({ "token": "ya29.token" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["expiresAt"], T + 7 * 24 * 3600 * 1000);

        let (_, json) = send(make_router(state.clone()), "GET", "/api/whisk/token", None).await;
        assert_eq!(json["hasToken"], true);

        let (status, json) = send(
            make_router(state.clone()),
            "POST",
            "/api/yoso/whisk/generate",
            Some(json!({ "prompt": "a fox", "aspectRatio": "16:9" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["dataUrl"], "data:image/png;base64,SU1H");
        assert_eq!(json["mode"], "IMAGEN");

        send(make_router(state.clone()), "DELETE", "/api/whisk/token", None).await;
        let (_, json) = send(make_router(state), "GET", "/api/whisk/token", None).await;
        assert_eq!(json["hasToken"], false);
    }

    #[tokio::test]
    async fn test_whisk_minor_rejection() {
        let recipe = Arc::new(FakeRecipe {
            handler: Box::new(|_, _, _| {
                Err(YosoError::ContentRejected {
                    reason: "PUBLIC_ERROR_MINOR_INPUT_IMAGE".into(),
                })
            }),
        });
        let state = make_state_with(FakeGemini::new(|_, _, _| Ok(Value::Null)), recipe);
        let (status, json) = send(
            make_router(state),
            "POST",
            "/api/yoso/whisk/generate",
            Some(json!({ "token": "t", "prompt": "a child", "referenceId": "m-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "REFERENCE_IMAGE_REJECTED_MINOR");
        assert_eq!(json["retryable"], false);
    }

    #[tokio::test]
    async fn test_whisk_upload() {
        let recipe = Arc::new(FakeRecipe {
            handler: Box::new(|_, _, body| {
                assert_eq!(body["image"]["encodedImage"], "QUJD");
                Ok(json!({ "mediaGenerationId": "media-9" }))
            }),
        });
        let state = make_state_with(FakeGemini::new(|_, _, _| Ok(Value::Null)), recipe);

        let (status, json) = send(
            make_router(state.clone()),
            "POST",
            "/api/yoso/whisk/upload",
            Some(json!({ "token": "t", "imageDataUrl": "not-a-data-url" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "INVALID_DATAURL");

        let (status, json) = send(
            make_router(state),
            "POST",
            "/api/yoso/whisk/upload",
            Some(json!({ "token": "t", "imageDataUrl": "data:image/jpeg;base64,QUJD" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mediaId"], "media-9");
    }

    #[tokio::test]
    async fn test_stats_counts_routes() {
        let gemini = FakeGemini::new(|key, _, _| match key {
            "bad" => Err(upstream(403, "PERMISSION_DENIED")),
            _ => Ok(text_response("ok")),
        });
        let state = make_state(gemini);
        send(
            make_router(state.clone()),
            "POST",
            "/api/yoso/generate",
            Some(json!({ "prompt": "hi", "apiKeys": ["bad", "good"] })),
        )
        .await;
        send(
            make_router(state.clone()),
            "POST",
            "/api/yoso/generate",
            Some(json!({ "prompt": "hi", "apiKeys": ["bad"] })),
        )
        .await;

        let (status, json) = send(make_router(state), "GET", "/api/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["totalRequests"], 2);
        assert_eq!(json["successRequests"], 1);
        assert_eq!(json["failovers"], 1);
        assert_eq!(json["failureClasses"]["cooling_down"], 1);
        assert_eq!(json["routes"]["generate"]["requests"], 2);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = make_router(make_state(FakeGemini::new(|_, _, _| Ok(Value::Null))));
        let (status, _) = send(app, "GET", "/v1/models", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
