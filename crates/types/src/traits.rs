//! Async traits shared across all yoso crates.
//!
//! Every cross-crate collaborator is defined here so that higher layers depend
//! only on `yoso-types`, not on each other.

use crate::YosoError;
use async_trait::async_trait;
use serde_json::Value;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, YosoError>;

/// String key-value persistence (the slot list and the recipe token live here).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Load the value stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<String>>;
    /// Store `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: &str) -> Result<()>;
    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// The pooled generative text/image/speech API.
///
/// Non-success HTTP statuses must surface as [`YosoError::Upstream`] so the
/// classifier can read the status and body.
#[async_trait]
pub trait GenerativeApi: Send + Sync {
    /// Run one `generateContent` call for `model` with the given credential.
    async fn generate_content(&self, api_key: &str, model: &str, body: Value) -> Result<Value>;
}

/// The image-recipe API, authenticated by a single bearer token.
#[async_trait]
pub trait RecipeApi: Send + Sync {
    /// POST `body` to the API path (e.g. `/v1/whisk:generateImage`).
    async fn call(&self, token: &str, path: &str, body: Value) -> Result<Value>;
}
