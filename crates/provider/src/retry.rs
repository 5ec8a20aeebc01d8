//! Rotation executor — runs a unit of work against credential slots until it
//! succeeds, the pool is exhausted, or a failure is not worth rotating past.
//!
//! Each attempt selects the least-recently-used ready slot not yet tried in
//! this call, runs the work once, and on failure classifies the error and
//! cools the slot down for a class-specific duration. Attempts are strictly
//! sequential so the cooldown written by one attempt is seen by the next.

use crate::classify::classify;
use crate::clock::{Clock, SystemClock};
use crate::routing::{Selection, pick_ready, pick_ready_excluding};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use yoso_config::RotationConfig;
use yoso_types::{
    CredentialSlot, FailureClass, SlotId, SlotLease, Timestamp, YosoError, traits::Result,
};

/// Cooldown durations and attempt bound for one rotated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_attempts: usize,
    pub rate_limited_cooldown: Duration,
    pub invalid_credential_cooldown: Duration,
    pub transient_cooldown: Duration,
    /// Rotate past [`FailureClass::Unclassified`] errors instead of stopping.
    pub continue_on_unclassified: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::from(&RotationConfig::default())
    }
}

impl From<&RotationConfig> for RotationPolicy {
    fn from(c: &RotationConfig) -> Self {
        Self {
            max_attempts: c.max_attempts.max(1),
            rate_limited_cooldown: Duration::from_secs(c.rate_limited_cooldown_secs),
            invalid_credential_cooldown: Duration::from_secs(c.invalid_credential_cooldown_secs),
            transient_cooldown: Duration::from_secs(c.transient_cooldown_secs),
            continue_on_unclassified: false,
        }
    }
}

impl RotationPolicy {
    /// Returns the cooldown for a failure class; `None` for unclassified failures.
    #[must_use]
    pub fn cooldown_for(&self, class: FailureClass) -> Option<Duration> {
        match class {
            FailureClass::RateLimited => Some(self.rate_limited_cooldown),
            FailureClass::InvalidCredential => Some(self.invalid_credential_cooldown),
            FailureClass::Transient => Some(self.transient_cooldown),
            FailureClass::Unclassified => None,
        }
    }
}

/// A successful rotated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotated<T> {
    pub value: T,
    /// The slot that served the call.
    pub slot: SlotId,
    /// Attempts made, including the successful one.
    pub attempts: usize,
}

/// Drives bounded credential rotation over a caller-owned slot list.
pub struct RotationExecutor {
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
}

impl RotationExecutor {
    /// Creates an executor using the system clock.
    #[must_use]
    pub fn new(policy: RotationPolicy) -> Self {
        Self {
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Runs `work` with rotation. See [`RotationExecutor::run_cancellable`].
    ///
    /// # Errors
    ///
    /// Same as [`RotationExecutor::run_cancellable`].
    pub async fn run<T, F, Fut>(&self, slots: &mut [CredentialSlot], work: F) -> Result<Rotated<T>>
    where
        F: FnMut(SlotLease) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_cancellable(slots, &CancellationToken::new(), work)
            .await
    }

    /// Runs `work` once per attempt against distinct ready slots.
    ///
    /// Slot health in `slots` is updated in place: the winning slot is marked
    /// used, each classified failure puts its slot in cooldown. A cancelled
    /// attempt (token fired, or the work returned [`YosoError::Cancelled`])
    /// leaves the slot untouched and ends the call.
    ///
    /// # Errors
    ///
    /// - [`YosoError::NoCredentials`] when no slot holds a secret.
    /// - [`YosoError::CoolingDown`] when every configured slot is cooling down.
    /// - [`YosoError::Terminal`] on an unclassified failure, or when the
    ///   attempt bound is hit while untried slots are still ready.
    /// - [`YosoError::Cancelled`] when the call was aborted.
    pub async fn run_cancellable<T, F, Fut>(
        &self,
        slots: &mut [CredentialSlot],
        cancel: &CancellationToken,
        mut work: F,
    ) -> Result<Rotated<T>>
    where
        F: FnMut(SlotLease) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut tried = HashSet::new();
        let mut last: Option<(FailureClass, YosoError)> = None;
        let mut attempts = 0;

        while attempts < self.policy.max_attempts {
            let now = self.clock.now_ms();
            let Some(idx) = pick_ready_excluding(slots, now, &tried) else {
                break;
            };
            let lease = slots[idx].lease();
            let id = lease.id;
            tried.insert(id);
            attempts += 1;
            tracing::debug!(slot = %id, label = %lease.label, attempt = attempts, "rotation attempt");

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(YosoError::Cancelled),
                r = work(lease) => r,
            };

            let err = match outcome {
                Ok(value) => {
                    slots[idx].mark_used(self.clock.now_ms());
                    if attempts > 1 {
                        tracing::info!(slot = %id, attempts, "rotation succeeded after failover");
                    }
                    return Ok(Rotated {
                        value,
                        slot: id,
                        attempts,
                    });
                }
                Err(YosoError::Cancelled) => {
                    tracing::info!(slot = %id, "attempt cancelled, slot health unchanged");
                    return Err(YosoError::Cancelled);
                }
                Err(err) => err,
            };

            let class = classify(&err);
            match self.policy.cooldown_for(class) {
                Some(cooldown) => {
                    let until = self.clock.now_ms().saturating_add(duration_ms(cooldown));
                    slots[idx].mark_cooldown(class, until);
                    tracing::warn!(
                        slot = %id,
                        class = %class,
                        cooldown_secs = cooldown.as_secs(),
                        error = %err,
                        "credential failed, rotating"
                    );
                }
                None if self.policy.continue_on_unclassified => {
                    tracing::warn!(slot = %id, error = %err, "unclassified failure, rotating anyway");
                }
                None => {
                    tracing::warn!(slot = %id, error = %err, "unclassified failure, not rotating");
                    return Err(YosoError::Terminal {
                        class,
                        source: Box::new(err),
                    });
                }
            }
            last = Some((class, err));
        }

        Err(self.exhausted(slots, self.clock.now_ms(), last))
    }

    /// Builds the terminal error once no further attempt will be made.
    fn exhausted(
        &self,
        slots: &[CredentialSlot],
        now: Timestamp,
        last: Option<(FailureClass, YosoError)>,
    ) -> YosoError {
        match (pick_ready(slots, now), last) {
            (
                Selection::Exhausted {
                    earliest_ready_at: None,
                },
                _,
            ) => YosoError::NoCredentials,
            (
                Selection::Exhausted {
                    earliest_ready_at: Some(at),
                },
                _,
            ) => YosoError::CoolingDown {
                retry_after: Duration::from_millis(at.saturating_sub(now)),
            },
            // Ready slots remain but were tried already or are past the bound.
            (Selection::Ready(_), Some((class, err))) => YosoError::Terminal {
                class,
                source: Box::new(err),
            },
            (Selection::Ready(_), None) => {
                tracing::debug!(max_attempts = self.policy.max_attempts, "no attempt made");
                YosoError::NoCredentials
            }
        }
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
