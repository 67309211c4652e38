//! # Metrics Collection Module
//!
//! Best-effort, in-process metrics for model containers.
//!
//! ## Design Principles
//!
//! - **Lock-Free**: all counters use atomic operations
//! - **Best Effort**: metric updates never fail the request path and never
//!   block; a stale or missing reading is acceptable
//! - **Thread Safe**: safe for concurrent updates from any number of
//!   connection handlers
//!
//! The collector tracks the handler-level counters only: request volume,
//! error volume, and cumulative inference latency. There is no outward
//! metrics surface; snapshots are read by the orchestrator for shutdown
//! logging and by tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Thread-safe metrics collector for inference handler operations
///
/// All counters use relaxed atomic ordering: readings are monotonic per
/// counter but a snapshot is not a consistent cut across counters, which
/// is fine for best-effort observability.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// Total number of inference requests received
    total_requests: AtomicU64,

    /// Number of requests that produced an error response
    total_errors: AtomicU64,

    /// Cumulative forward-pass latency in microseconds
    inference_time_us: AtomicU64,
}

impl MetricsCollector {
    /// Creates a new collector with all counters at zero
    pub fn new() -> Self {
        debug!("initializing metrics collector");
        Self::default()
    }

    /// Records a new incoming request
    ///
    /// Called once per request before any processing. Relaxed ordering
    /// keeps this off the request critical path.
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a request that ended in an error response
    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the wall-clock duration of one model forward pass
    pub fn record_inference_time(&self, duration: Duration) {
        self.inference_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_errors = self.total_errors.load(Ordering::Relaxed);
        let inference_time_us = self.inference_time_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests,
            total_errors,
            avg_inference_time_ms: if total_requests > 0 {
                inference_time_us as f64 / 1000.0 / total_requests as f64
            } else {
                0.0
            },
            error_rate: if total_requests > 0 {
                total_errors as f64 / total_requests as f64
            } else {
                0.0
            },
        }
    }
}

/// Point-in-time view of the collector's counters
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Total inference requests processed
    pub total_requests: u64,
    /// Total requests that produced an error response
    pub total_errors: u64,
    /// Average forward-pass latency in milliseconds
    pub avg_inference_time_ms: f64,
    /// Fraction of requests that errored, in [0, 1]
    pub error_rate: f64,
}
