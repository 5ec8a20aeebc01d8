//! Credential sources and request input normalization.
//!
//! A request either carries its own keys (rotated in memory, nothing
//! persisted) or omits them, in which case the persisted slot pool is loaded,
//! rotated and saved back so cooldowns survive across requests.

use crate::AppState;
use std::fmt::Debug;
use std::future::Future;
use yoso_provider::{AxisSuccess, MultiAxisLoop, RotationExecutor, RotationPolicy, Rotated};
use yoso_types::{CredentialSlot, SlotId, SlotLease, YosoError, traits::Result};

/// Longest narration text accepted by the speech routes.
pub const MAX_SPEECH_CHARS: usize = 8000;

/// Trims keys and drops blanks.
#[must_use]
pub fn normalize_keys(keys: Option<Vec<String>>) -> Vec<String> {
    keys.unwrap_or_default()
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Trims a required text field; blank or absent fails with `tag`.
///
/// # Errors
///
/// Returns [`YosoError::InvalidRequest`] carrying `tag`.
pub fn require_text(value: Option<String>, tag: &str) -> Result<String> {
    let value = value.unwrap_or_default();
    let value = value.trim();
    if value.is_empty() {
        Err(YosoError::InvalidRequest(tag.to_string()))
    } else {
        Ok(value.to_string())
    }
}

/// Cuts `s` to at most `max` characters.
#[must_use]
pub fn clamp_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// In-memory slots for request-supplied keys.
fn request_slots(keys: &[String]) -> Vec<CredentialSlot> {
    keys.iter()
        .zip(1u32..)
        .map(|(key, n)| CredentialSlot::empty(SlotId(n), format!("Request key {n}")).with_secret(key))
        .collect()
}

/// Slots backing one call.
struct Pool {
    slots: Vec<CredentialSlot>,
    /// Loaded from the slot store and saved back after the call.
    persisted: bool,
}

impl AppState {
    fn policy(&self) -> RotationPolicy {
        RotationPolicy::from(&self.config.load().rotation)
    }

    /// Request keys become in-memory slots; no keys means the persisted pool.
    async fn checkout(&self, keys: &[String]) -> Result<Pool> {
        if keys.is_empty() {
            Ok(Pool {
                slots: self.slots.load().await?,
                persisted: true,
            })
        } else {
            Ok(Pool {
                slots: request_slots(keys),
                persisted: false,
            })
        }
    }

    /// Saves slot health back when the pool came from the store. Cooldowns
    /// are kept even when the call itself failed.
    async fn checkin(&self, route: &str, pool: &Pool) {
        if !pool.persisted {
            return;
        }
        if let Err(e) = self.slots.save(&pool.slots).await {
            tracing::warn!(route, error = %e, "failed to persist slot health");
        }
    }

    /// Runs `work` with credential rotation over the request keys, or over the
    /// persisted slot pool when `keys` is empty. Records the outcome in the
    /// rotation stats under `route`.
    ///
    /// # Errors
    ///
    /// Propagates the orchestrator's terminal error, or a storage error if the
    /// persisted pool cannot be read.
    pub async fn rotate<T, F, Fut>(
        &self,
        route: &str,
        keys: &[String],
        work: F,
    ) -> Result<Rotated<T>>
    where
        F: FnMut(SlotLease) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = match self.checkout(keys).await {
            Ok(mut pool) => {
                let executor =
                    RotationExecutor::new(self.policy()).with_clock(self.clock.clone());
                let outcome = executor
                    .run_cancellable(&mut pool.slots, &self.shutdown, work)
                    .await;
                self.checkin(route, &pool).await;
                outcome
            }
            Err(e) => Err(e),
        };

        let attempts = outcome.as_ref().map_or(0, |r| r.attempts);
        self.stats.record(route, &outcome, attempts);
        outcome
    }

    /// Runs `work` through the multi-axis loop over the same credential
    /// sources as [`AppState::rotate`], with `secondary` as the inner axis and
    /// `last_resort` as the final fallback value.
    ///
    /// # Errors
    ///
    /// Propagates the loop's terminal error, or a storage error if the
    /// persisted pool cannot be read.
    pub async fn rotate_axis<T, V, R, F, Fut>(
        &self,
        route: &str,
        keys: &[String],
        secondary: &[V],
        last_resort: V,
        is_rejection: R,
        work: F,
    ) -> Result<AxisSuccess<T, V>>
    where
        V: Clone + Debug,
        R: Fn(&YosoError) -> bool,
        F: FnMut(SlotLease, V) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = match self.checkout(keys).await {
            Ok(mut pool) => {
                let outcome = MultiAxisLoop::new(secondary, last_resort)
                    .with_policy(self.policy())
                    .with_clock(self.clock.clone())
                    .run_cancellable(&mut pool.slots, &self.shutdown, is_rejection, work)
                    .await;
                self.checkin(route, &pool).await;
                outcome
            }
            Err(e) => Err(e),
        };

        let attempts = outcome.as_ref().map_or(0, |r| r.attempts);
        self.stats.record(route, &outcome, attempts);
        outcome
    }
}
