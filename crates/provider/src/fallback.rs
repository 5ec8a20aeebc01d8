//! Multi-axis fallback — credential slots on the outer axis, a secondary
//! parameter (a voice, a model) on the inner axis.
//!
//! A rate-limited response abandons the remaining secondary values for that
//! credential. A parameter rejection moves on to the next secondary value
//! with the same credential. Anything else stops the loop. Once every
//! combination is spent, one last-resort attempt runs with a fixed secondary
//! value against the starting credential.
//!
//! Slot health is kept the same way [`RotationExecutor`](crate::RotationExecutor)
//! keeps it: classified failures cool the slot down, a success marks it used,
//! parameter rejections and cancellations leave it alone.

use crate::classify::classify;
use crate::clock::{Clock, SystemClock};
use crate::retry::{RotationPolicy, duration_ms};
use crate::routing::{Selection, pick_ready};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use yoso_types::{
    CredentialSlot, FailureClass, SlotId, SlotLease, Timestamp, YosoError, traits::Result,
};

/// Which phase of the loop produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    /// A credential paired with one of the listed secondary values.
    Combination,
    /// The fixed fallback value on the starting credential, after every
    /// combination failed.
    LastResort,
}

impl AttemptStage {
    #[must_use]
    pub fn is_last_resort(self) -> bool {
        matches!(self, Self::LastResort)
    }
}

/// A successful multi-axis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisSuccess<T, V> {
    pub value: T,
    /// The slot that served the call.
    pub slot: SlotId,
    /// The secondary value that worked.
    pub secondary: V,
    pub stage: AttemptStage,
    /// Attempts made, including the successful one.
    pub attempts: usize,
}

/// Walks ready slots × secondary values over a caller-owned slot list.
///
/// The outer loop starts at `now % ready_slots` unless pinned with
/// [`MultiAxisLoop::starting_at`], so consecutive calls spread across keys.
pub struct MultiAxisLoop<'a, V> {
    secondary: &'a [V],
    last_resort: V,
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
    start: Option<usize>,
}

impl<'a, V: Clone + Debug> MultiAxisLoop<'a, V> {
    /// Creates a loop with the default policy and the system clock.
    #[must_use]
    pub fn new(secondary: &'a [V], last_resort: V) -> Self {
        Self {
            secondary,
            last_resort,
            policy: RotationPolicy::default(),
            clock: Arc::new(SystemClock),
            start: None,
        }
    }

    /// Replaces the cooldown durations.
    #[must_use]
    pub fn with_policy(mut self, policy: RotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Pins the outer loop's first credential (wrapped to the ready count).
    #[must_use]
    pub fn starting_at(mut self, start: usize) -> Self {
        self.start = Some(start);
        self
    }

    /// Index into the ready credentials the outer loop starts from.
    #[must_use]
    pub fn start_index(&self, ready: usize, now: Timestamp) -> usize {
        if ready == 0 {
            return 0;
        }
        let offset = self
            .start
            .unwrap_or_else(|| usize::try_from(now % ready as u64).unwrap_or(0));
        offset % ready
    }

    /// Runs the loop without an external cancellation signal.
    ///
    /// # Errors
    ///
    /// Same as [`MultiAxisLoop::run_cancellable`].
    pub async fn run<T, R, F, Fut>(
        &self,
        slots: &mut [CredentialSlot],
        is_rejection: R,
        work: F,
    ) -> Result<AxisSuccess<T, V>>
    where
        R: Fn(&YosoError) -> bool,
        F: FnMut(SlotLease, V) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_cancellable(slots, &CancellationToken::new(), is_rejection, work)
            .await
    }

    /// Runs the loop over the slots that are ready now. `is_rejection` decides
    /// whether an error blames the secondary value; `work` performs one
    /// attempt.
    ///
    /// # Errors
    ///
    /// - [`YosoError::NoCredentials`] when no slot holds a secret.
    /// - [`YosoError::CoolingDown`] when every configured slot is cooling down.
    /// - [`YosoError::Terminal`] on the first failure that is neither a rate
    ///   limit nor a parameter rejection, or when the last-resort attempt fails.
    /// - [`YosoError::Cancelled`] when the call was aborted.
    pub async fn run_cancellable<T, R, F, Fut>(
        &self,
        slots: &mut [CredentialSlot],
        cancel: &CancellationToken,
        is_rejection: R,
        mut work: F,
    ) -> Result<AxisSuccess<T, V>>
    where
        R: Fn(&YosoError) -> bool,
        F: FnMut(SlotLease, V) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let now = self.clock.now_ms();
        let ready: Vec<usize> = (0..slots.len()).filter(|&i| slots[i].is_ready(now)).collect();
        if ready.is_empty() {
            return Err(match pick_ready(slots, now) {
                Selection::Exhausted {
                    earliest_ready_at: Some(at),
                } => YosoError::CoolingDown {
                    retry_after: Duration::from_millis(at.saturating_sub(now)),
                },
                _ => YosoError::NoCredentials,
            });
        }

        let n = ready.len();
        let start = self.start_index(n, now);
        let mut attempts = 0;

        for k in 0..n {
            let idx = ready[(start + k) % n];

            for value in self.secondary {
                let lease = slots[idx].lease();
                let id = lease.id;
                attempts += 1;

                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(YosoError::Cancelled),
                    r = work(lease, value.clone()) => r,
                };
                let err = match outcome {
                    Ok(out) => {
                        slots[idx].mark_used(self.clock.now_ms());
                        return Ok(AxisSuccess {
                            value: out,
                            slot: id,
                            secondary: value.clone(),
                            stage: AttemptStage::Combination,
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
                if class == FailureClass::RateLimited {
                    self.cool_down(&mut slots[idx], class);
                    tracing::warn!(slot = %id, secondary = ?value, "rate limited, next credential");
                    break;
                }
                if is_rejection(&err) {
                    tracing::debug!(slot = %id, secondary = ?value, "parameter rejected, next value");
                    continue;
                }
                self.cool_down(&mut slots[idx], class);
                tracing::warn!(slot = %id, secondary = ?value, class = %class, error = %err, "attempt failed");
                return Err(YosoError::Terminal {
                    class,
                    source: Box::new(err),
                });
            }
        }

        let idx = ready[start];
        let lease = slots[idx].lease();
        let id = lease.id;
        attempts += 1;
        tracing::info!(slot = %id, secondary = ?self.last_resort, "combinations exhausted, last-resort attempt");

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(YosoError::Cancelled),
            r = work(lease, self.last_resort.clone()) => r,
        };
        match outcome {
            Ok(out) => {
                slots[idx].mark_used(self.clock.now_ms());
                Ok(AxisSuccess {
                    value: out,
                    slot: id,
                    secondary: self.last_resort.clone(),
                    stage: AttemptStage::LastResort,
                    attempts,
                })
            }
            Err(YosoError::Cancelled) => Err(YosoError::Cancelled),
            Err(err) => {
                let class = classify(&err);
                self.cool_down(&mut slots[idx], class);
                Err(YosoError::Terminal {
                    class,
                    source: Box::new(err),
                })
            }
        }
    }

    fn cool_down(&self, slot: &mut CredentialSlot, class: FailureClass) {
        if let Some(cooldown) = self.policy.cooldown_for(class) {
            let until = self.clock.now_ms().saturating_add(duration_ms(cooldown));
            slot.mark_cooldown(class, until);
        }
    }
}
