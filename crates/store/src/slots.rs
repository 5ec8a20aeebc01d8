//! Credential slot store — a fixed-size slot list persisted as JSON under one key.
//!
//! Malformed persisted data is never an error: it degrades to the default list
//! of empty slots. Only failures of the underlying [`KvStore`] propagate.

use std::collections::HashSet;
use std::sync::Arc;
use yoso_types::{CredentialSlot, KvStore, SlotId, traits::Result};

/// Storage key of the slot list.
pub const SLOTS_KEY: &str = "yoso:api_key_slots";

/// Number of slots a store holds unless configured otherwise.
pub const DEFAULT_SLOT_COUNT: usize = 5;

/// Returns `count` empty slots with ids `1..=count` and labels `Key 1..`.
#[must_use]
pub fn default_slots(count: usize) -> Vec<CredentialSlot> {
    (1..=count)
        .map(|n| CredentialSlot::empty(SlotId(to_id(n)), format!("Key {n}")))
        .collect()
}

/// Resets every slot's secret and health fields, keeping count, ids and labels.
pub fn clear_slots(slots: &mut [CredentialSlot]) {
    for slot in slots {
        slot.reset();
    }
}

fn to_id(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Parses a persisted slot list. Returns `None` for anything malformed:
/// invalid JSON, a non-array, an entry without an id, or duplicate ids.
fn parse_slots(raw: &str, capacity: usize) -> Option<Vec<CredentialSlot>> {
    let mut slots: Vec<CredentialSlot> = serde_json::from_str(raw).ok()?;
    let mut seen = HashSet::new();
    if !slots.iter().all(|s| seen.insert(s.id)) {
        return None;
    }
    slots.truncate(capacity);

    // Pad with fresh slots; new ids continue past the highest one ever persisted.
    let mut next = slots.iter().map(|s| s.id.0).max().unwrap_or(0);
    while slots.len() < capacity {
        next = next.saturating_add(1);
        let label = format!("Key {}", slots.len() + 1);
        slots.push(CredentialSlot::empty(SlotId(next), label));
    }
    Some(slots)
}

/// Handle to the persisted credential slot list.
///
/// Cheap to clone; callers load at the start of a rotated call and save at the
/// end. Concurrent callers are not serialized: the last save wins.
#[derive(Clone)]
pub struct SlotStore {
    kv: Arc<dyn KvStore>,
    key: String,
    capacity: usize,
}

impl SlotStore {
    /// Creates a store holding `capacity` slots under [`SLOTS_KEY`].
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, capacity: usize) -> Self {
        Self {
            kv,
            key: SLOTS_KEY.to_string(),
            capacity: capacity.max(1),
        }
    }

    /// Uses a different storage key (isolated pools share one backend).
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Returns the fixed number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Loads the slot list, falling back to defaults when nothing usable is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`yoso_types::YosoError::Storage`] if the backend cannot be read.
    pub async fn load(&self) -> Result<Vec<CredentialSlot>> {
        let Some(raw) = self.kv.load(&self.key).await? else {
            return Ok(default_slots(self.capacity));
        };
        Ok(parse_slots(&raw, self.capacity).unwrap_or_else(|| {
            tracing::warn!(key = %self.key, "malformed slot list, using defaults");
            default_slots(self.capacity)
        }))
    }

    /// Persists the slot list, truncated to capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    pub async fn save(&self, slots: &[CredentialSlot]) -> Result<()> {
        let slots = &slots[..slots.len().min(self.capacity)];
        let json = serde_json::to_string(slots)?;
        self.kv.save(&self.key, &json).await
    }

    /// Clears every slot and persists the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read or write fails.
    pub async fn clear(&self) -> Result<Vec<CredentialSlot>> {
        let mut slots = self.load().await?;
        clear_slots(&mut slots);
        self.save(&slots).await?;
        tracing::info!(key = %self.key, "credential slots cleared");
        Ok(slots)
    }

    /// Updates the label and/or secret of one slot. Returns `None` if no slot has `id`.
    ///
    /// Setting a new secret resets the slot's health state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read or write fails.
    pub async fn update(
        &self,
        id: SlotId,
        label: Option<String>,
        secret: Option<String>,
    ) -> Result<Option<CredentialSlot>> {
        let mut slots = self.load().await?;
        let Some(slot) = slots.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        if let Some(label) = label {
            slot.label = label.trim().to_string();
        }
        if let Some(secret) = secret {
            slot.reset();
            slot.secret = secret.trim().to_string();
        }
        let updated = slot.clone();
        self.save(&slots).await?;
        Ok(Some(updated))
    }
}
