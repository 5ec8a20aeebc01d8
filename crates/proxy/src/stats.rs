//! In-memory rotation statistics.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use yoso_provider::classify;
use yoso_types::YosoError;

/// Global request and rotation counters.
#[derive(Default)]
pub struct RotationStats {
    pub total_requests: AtomicU64,
    pub success_requests: AtomicU64,
    pub failure_requests: AtomicU64,
    /// Upstream attempts across all rotated calls.
    pub attempts: AtomicU64,
    /// Successful calls that needed more than one attempt.
    pub failovers: AtomicU64,
    failure_classes: Mutex<HashMap<&'static str, u64>>,
    route_counts: Mutex<HashMap<String, RouteStats>>,
}

/// Per-route counters.
#[derive(Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    pub requests: u64,
    pub success: u64,
    pub failure: u64,
}

/// JSON-serializable snapshot of current counters.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub success_requests: u64,
    pub failure_requests: u64,
    pub attempts: u64,
    pub failovers: u64,
    pub failure_classes: BTreeMap<&'static str, u64>,
    pub routes: BTreeMap<String, RouteStats>,
}

/// Failure class of a call, with the two pool-level outcomes kept apart.
fn failure_tag(err: &YosoError) -> &'static str {
    match err {
        YosoError::NoCredentials => "no_credentials",
        YosoError::CoolingDown { .. } => "cooling_down",
        YosoError::Cancelled => "cancelled",
        other => classify(other).as_str(),
    }
}

impl RotationStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful call that took `attempts` upstream attempts.
    pub fn record_success(&self, route: &str, attempts: usize) {
        let attempts = attempts as u64;
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.success_requests.fetch_add(1, Ordering::Relaxed);
        self.attempts.fetch_add(attempts, Ordering::Relaxed);
        if attempts > 1 {
            self.failovers.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut map) = self.route_counts.lock() {
            let entry = map.entry(route.to_string()).or_default();
            entry.requests += 1;
            entry.success += 1;
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, route: &str, err: &YosoError) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failure_requests.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut map) = self.failure_classes.lock() {
            *map.entry(failure_tag(err)).or_default() += 1;
        }
        if let Ok(mut map) = self.route_counts.lock() {
            let entry = map.entry(route.to_string()).or_default();
            entry.requests += 1;
            entry.failure += 1;
        }
    }

    /// Record the outcome of a call in one step.
    pub fn record<T>(&self, route: &str, outcome: &Result<T, YosoError>, attempts: usize) {
        match outcome {
            Ok(_) => self.record_success(route, attempts),
            Err(e) => self.record_failure(route, e),
        }
    }

    /// Take a JSON-serializable snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let failure_classes = self
            .failure_classes
            .lock()
            .map(|m| m.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default();
        let routes = self
            .route_counts
            .lock()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            success_requests: self.success_requests.load(Ordering::Relaxed),
            failure_requests: self.failure_requests.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            failovers: self.failovers.load(Ordering::Relaxed),
            failure_classes,
            routes,
        }
    }
}
