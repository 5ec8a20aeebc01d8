//! Slot selection — least-recently-used choice among ready credential slots.

use std::collections::HashSet;
use yoso_types::{CredentialSlot, SlotId, Timestamp};

/// Result of [`pick_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index of the chosen slot.
    Ready(usize),
    /// Nothing is usable. `earliest_ready_at` is `None` when no slot holds a
    /// secret at all, otherwise the earliest time a cooling slot frees up.
    Exhausted { earliest_ready_at: Option<Timestamp> },
}

/// Picks the next usable slot at `now`.
///
/// Empty secrets are never selected. Among ready slots the least recently
/// used one wins (never-used first); ties go to the lowest position.
#[must_use]
pub fn pick_ready(slots: &[CredentialSlot], now: Timestamp) -> Selection {
    match pick_ready_excluding(slots, now, &HashSet::new()) {
        Some(idx) => Selection::Ready(idx),
        None => Selection::Exhausted {
            earliest_ready_at: earliest_ready_at(slots),
        },
    }
}

/// Like [`pick_ready`], skipping slots already tried in the current call.
#[must_use]
pub fn pick_ready_excluding(
    slots: &[CredentialSlot],
    now: Timestamp,
    tried: &HashSet<SlotId>,
) -> Option<usize> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_ready(now) && !tried.contains(&s.id))
        .min_by_key(|(idx, s)| (s.last_used_at, *idx))
        .map(|(idx, _)| idx)
}

/// Earliest cooldown expiry across configured slots.
fn earliest_ready_at(slots: &[CredentialSlot]) -> Option<Timestamp> {
    slots
        .iter()
        .filter(|s| s.is_configured())
        .filter_map(|s| s.cooldown_until)
        .min()
}
