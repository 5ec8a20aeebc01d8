//! Credential slot data model and failure classes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Absolute time in milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Returns the current wall-clock time as a [`Timestamp`].
#[must_use]
pub fn now_ms() -> Timestamp {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Stable identifier of a slot within its store. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome class of a failed upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// 429 or quota exhaustion.
    RateLimited,
    /// 401/403 or a key the upstream does not accept.
    InvalidCredential,
    /// 500/503, timeouts and dropped connections.
    Transient,
    /// Anything else. Not retried on another slot by default.
    Unclassified,
}

impl FailureClass {
    /// Returns the snake-case tag used in logs and persisted state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::InvalidCredential => "invalid_credential",
            Self::Transient => "transient",
            Self::Unclassified => "unclassified",
        }
    }

    /// Returns all variants in classification priority order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[
            Self::RateLimited,
            Self::InvalidCredential,
            Self::Transient,
            Self::Unclassified,
        ]
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-supplied API key plus its rotation health state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSlot {
    pub id: SlotId,
    #[serde(default)]
    pub label: String,
    /// Empty means the slot is unconfigured.
    #[serde(default)]
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<FailureClass>,
}

impl CredentialSlot {
    /// Creates an unconfigured slot.
    pub fn empty(id: SlotId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            secret: String::new(),
            cooldown_until: None,
            last_used_at: None,
            last_error: None,
        }
    }

    /// Set the secret, trimming surrounding whitespace.
    #[must_use]
    pub fn with_secret(mut self, secret: impl AsRef<str>) -> Self {
        self.secret = secret.as_ref().trim().to_string();
        self
    }

    /// Returns `true` if the slot holds a secret.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.secret.trim().is_empty()
    }

    /// Returns `true` if the slot is configured and not cooling down at `now`.
    #[must_use]
    pub fn is_ready(&self, now: Timestamp) -> bool {
        self.is_configured() && self.cooldown_until.is_none_or(|until| now >= until)
    }

    /// Resets the secret and every health field, keeping `id` and `label`.
    pub fn reset(&mut self) {
        self.secret.clear();
        self.cooldown_until = None;
        self.last_used_at = None;
        self.last_error = None;
    }

    /// Records a successful use at `now`.
    pub fn mark_used(&mut self, now: Timestamp) {
        self.last_used_at = Some(now);
        self.last_error = None;
    }

    /// Records a classified failure and places the slot in cooldown.
    pub fn mark_cooldown(&mut self, class: FailureClass, until: Timestamp) {
        self.cooldown_until = Some(until);
        self.last_error = Some(class);
    }

    /// Returns the secret with everything but the last four characters
    /// masked. Secrets of eight characters or fewer are masked entirely.
    #[must_use]
    pub fn masked_secret(&self) -> String {
        const VISIBLE: usize = 4;
        const MIN_REVEALING_LEN: usize = 9;

        let chars: Vec<char> = self.secret.chars().collect();
        if chars.len() < MIN_REVEALING_LEN {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - VISIBLE..].iter().collect();
        format!("{}{tail}", "*".repeat((chars.len() - VISIBLE).min(8)))
    }

    /// Borrow-free handle passed to a unit of work.
    #[must_use]
    pub fn lease(&self) -> SlotLease {
        SlotLease {
            id: self.id,
            label: self.label.clone(),
            secret: self.secret.trim().to_string(),
        }
    }
}

/// The credential handed to one attempt of a rotated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLease {
    pub id: SlotId,
    pub label: String,
    pub secret: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> CredentialSlot {
        CredentialSlot::empty(SlotId(1), "Key 1").with_secret("  AIza-secret-1234 ")
    }

    #[test]
    fn test_with_secret_trims() {
        assert_eq!(slot().secret, "AIza-secret-1234");
    }

    #[test]
    fn test_empty_never_ready() {
        let s = CredentialSlot::empty(SlotId(1), "Key 1");
        assert!(!s.is_configured());
        assert!(!s.is_ready(0));
    }

    #[test]
    fn test_ready_respects_cooldown_boundary() {
        let mut s = slot();
        s.mark_cooldown(FailureClass::RateLimited, 1_000);
        assert!(!s.is_ready(999));
        assert!(s.is_ready(1_000));
        assert_eq!(s.last_error, Some(FailureClass::RateLimited));
    }

    #[test]
    fn test_mark_used_clears_error() {
        let mut s = slot();
        s.mark_cooldown(FailureClass::Transient, 10);
        s.mark_used(20);
        assert_eq!(s.last_used_at, Some(20));
        assert!(s.last_error.is_none());
        // Cooldown is only lifted by time or a reset.
        assert_eq!(s.cooldown_until, Some(10));
    }

    #[test]
    fn test_reset_keeps_identity() {
        let mut s = slot();
        s.mark_used(5);
        s.mark_cooldown(FailureClass::InvalidCredential, 50);
        s.reset();
        assert_eq!(s, CredentialSlot::empty(SlotId(1), "Key 1"));
    }

    #[test]
    fn test_masked_secret() {
        assert_eq!(slot().masked_secret(), "********1234");
        assert_eq!(CredentialSlot::empty(SlotId(2), "x").masked_secret(), "");
        let masked = |secret: &str| {
            CredentialSlot::empty(SlotId(3), "x")
                .with_secret(secret)
                .masked_secret()
        };
        assert_eq!(masked("abc"), "***");
        assert_eq!(masked("abcde"), "*****");
        assert_eq!(masked("abcdefgh"), "********");
        assert_eq!(masked("abcdefghi"), "*****fghi");
    }

    #[test]
    fn test_serde_skips_none_and_tags_class() {
        let mut s = slot();
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("cooldown_until"));
        s.mark_cooldown(FailureClass::InvalidCredential, 7);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"invalid_credential\""));
        let back: CredentialSlot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_failure_class_display() {
        assert_eq!(FailureClass::RateLimited.to_string(), "rate_limited");
        assert_eq!(FailureClass::all().len(), 4);
    }
}
