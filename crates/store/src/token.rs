//! Recipe API bearer token, persisted with an expiry.
//!
//! The image-recipe API authenticates with one bearer token (it is not part of
//! the rotated key pool). Tokens are short-lived upstream, so the store keeps
//! them for a fixed TTL and reports their age.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use yoso_types::{KvStore, Timestamp, YosoError, traits::Result};

/// Storage key of the recipe token.
pub const RECIPE_TOKEN_KEY: &str = "yoso:recipe_token";

const HOUR_MS: u64 = 60 * 60 * 1000;

/// Normalizes a pasted token to `Bearer <token>`. Returns an empty string for blank input.
#[must_use]
pub fn normalize_bearer(raw: &str) -> String {
    let t = raw.trim();
    if t.is_empty() {
        return String::new();
    }
    match t.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => {
            format!("Bearer {}", rest.trim_start())
        }
        _ => format!("Bearer {t}"),
    }
}

/// A stored recipe token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeToken {
    pub token: String,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
}

/// JSON-serializable token status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub has_token: bool,
    pub authenticated: bool,
    pub updated_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    pub ttl_seconds: Option<u64>,
    pub age_hours: Option<u64>,
}

/// Persisted recipe token with a fixed time-to-live.
#[derive(Clone)]
pub struct TokenStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl TokenStore {
    /// Creates a token store whose saved tokens expire after `ttl`.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Normalizes and saves `raw` at time `now`.
    ///
    /// # Errors
    ///
    /// Returns [`YosoError::InvalidRequest`] (`TOKEN_EMPTY`) for a blank token,
    /// or a storage error if the write fails.
    pub async fn save(&self, raw: &str, now: Timestamp) -> Result<RecipeToken> {
        let token = normalize_bearer(raw);
        if token.is_empty() {
            return Err(YosoError::InvalidRequest("TOKEN_EMPTY".into()));
        }
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let record = RecipeToken {
            token,
            updated_at: now,
            expires_at: now.saturating_add(ttl_ms),
        };
        self.kv
            .save(RECIPE_TOKEN_KEY, &serde_json::to_string(&record)?)
            .await?;
        tracing::info!(expires_at = record.expires_at, "recipe token saved");
        Ok(record)
    }

    /// Loads the stored token; expired or malformed records read as absent.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read.
    pub async fn load(&self, now: Timestamp) -> Result<Option<RecipeToken>> {
        let Some(raw) = self.kv.load(RECIPE_TOKEN_KEY).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str::<RecipeToken>(&raw).ok();
        Ok(record.filter(|r| !r.token.is_empty() && now < r.expires_at))
    }

    /// Reports whether a usable token is stored and how old it is.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read.
    pub async fn status(&self, now: Timestamp) -> Result<TokenStatus> {
        let status = match self.load(now).await? {
            Some(r) => TokenStatus {
                has_token: true,
                authenticated: true,
                updated_at: Some(r.updated_at),
                expires_at: Some(r.expires_at),
                ttl_seconds: Some(r.expires_at.saturating_sub(now) / 1000),
                age_hours: Some((now.saturating_sub(r.updated_at) + HOUR_MS / 2) / HOUR_MS),
            },
            None => TokenStatus {
                has_token: false,
                authenticated: false,
                updated_at: None,
                expires_at: None,
                ttl_seconds: None,
                age_hours: None,
            },
        };
        Ok(status)
    }

    /// Removes the stored token.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend write fails.
    pub async fn reset(&self) -> Result<()> {
        self.kv.remove(RECIPE_TOKEN_KEY).await
    }
}
