use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Error rate above which a backend is taken out of rotation.
const UNHEALTHY_ERROR_RATE: f64 = 0.5;
/// Error rate above which a backend is reported as degraded.
const DEGRADED_ERROR_RATE: f64 = 0.1;

/// Coarse health of a backend, derived from its own metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

/// Rolling counters for one backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metrics {
    pub request_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Sum of latencies of successful calls only.
    pub total_latency_ms: u64,
    pub last_error: Option<String>,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl Metrics {
    /// Average latency of successful calls ("latency when it works").
    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.success_count == 0 {
            None
        } else {
            Some(self.total_latency_ms as f64 / self.success_count as f64)
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.request_count as f64
        }
    }
}

#[derive(Debug, Default)]
struct HealthState {
    status: HealthStatus,
    metrics: Metrics,
}

/// Metrics and health bookkeeping composed into every backend handle.
///
/// Each tracker owns its own lock, so updates to one backend never block another.
#[derive(Debug, Default)]
pub struct HealthTracker {
    state: Mutex<HealthState>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one call and recomputes the status.
    pub fn record_outcome(&self, latency: Duration, success: bool, error: Option<&str>) {
        let mut state = self.state.lock();
        let metrics = &mut state.metrics;
        metrics.request_count += 1;
        metrics.last_request_at = Some(Utc::now());

        if success {
            metrics.success_count += 1;
            metrics.total_latency_ms += latency.as_millis() as u64;
            state.status = HealthStatus::Healthy;
            return;
        }

        metrics.failure_count += 1;
        if let Some(error) = error {
            metrics.last_error = Some(error.to_string());
        }

        let error_rate = metrics.error_rate();
        if error_rate > UNHEALTHY_ERROR_RATE {
            state.status = HealthStatus::Unhealthy;
        } else if error_rate > DEGRADED_ERROR_RATE {
            state.status = HealthStatus::Degraded;
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.state.lock().status
    }

    pub fn metrics(&self) -> Metrics {
        self.state.lock().metrics.clone()
    }

    /// Status and metrics read under a single lock acquisition.
    pub fn snapshot(&self) -> (HealthStatus, Metrics) {
        let state = self.state.lock();
        (state.status, state.metrics.clone())
    }
}
