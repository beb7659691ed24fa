//! # Application State Management
//!
//! Shared state that every HTTP handler and middleware instance can reach.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc<RwLock<T>> Pattern
//! - **Arc**: every worker thread holds a reference to the same data
//! - **RwLock**: many concurrent readers (config lookups on every request) or
//!   one writer (a config update, a metrics increment)
//!
//! ### RAII Guards
//! - A [`ScoringGuard`] owns one scoring slot; dropping it gives the slot
//!   back, so an early `?` return or a panic in the handler cannot leak it
//!
//! ### Lock Poisoning
//! - A panic while a lock is held marks it poisoned. Counters and config stay
//!   usable afterwards, so every access recovers the inner value with
//!   `PoisonError::into_inner` instead of unwrapping.

use mcd_backend::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The main application state shared across all HTTP request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Counters updated by middleware and the scoring handler
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected since server start.
///
/// ## Why these metrics matter:
/// - **active_scorings**: current load against `max_concurrent_scores`
/// - **scores_computed / score_failures**: how often uploads are unusable,
///   broken down by failure kind (`decode_error`, `empty_sequence_error`, ...)
/// - **endpoint_metrics**: per-endpoint latency and error rate
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of error responses since server start
    pub error_count: u64,

    /// Scores currently running on the blocking pool
    pub active_scorings: u32,

    /// Successful scores
    pub scores_computed: u64,

    /// Time spent inside the scorer for successful scores (milliseconds)
    pub total_scoring_ms: u64,

    /// Failed scores, keyed by failure kind
    pub score_failures: HashMap<String, u64>,

    /// Key: endpoint name (e.g., "POST /api/v1/mcd")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for one API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

/// One occupied scoring slot. The slot is released when the guard is dropped.
#[derive(Debug)]
pub struct ScoringGuard {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for ScoringGuard {
    fn drop(&mut self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.active_scorings = metrics.active_scorings.saturating_sub(1);
    }
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately, so a long-running score never
    /// blocks a config update.
    pub fn get_config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        new_config.validate().map_err(|e| e.to_string())?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = new_config;
        Ok(())
    }

    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    /// Record one finished request for `endpoint` (e.g. "GET /health").
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Claims a scoring slot if fewer than `max_concurrent_scores` are in use.
    ///
    /// The limit is read from the current config, so a runtime update applies
    /// to the next request.
    pub fn try_begin_scoring(&self) -> Option<ScoringGuard> {
        let limit = self.get_config().performance.max_concurrent_scores;
        let mut metrics = self.metrics_write();

        if metrics.active_scorings as usize >= limit {
            return None;
        }
        metrics.active_scorings += 1;

        Some(ScoringGuard {
            metrics: Arc::clone(&self.metrics),
        })
    }

    pub fn record_score_success(&self, duration_ms: u64) {
        let mut metrics = self.metrics_write();
        metrics.scores_computed += 1;
        metrics.total_scoring_ms += duration_ms;
    }

    /// `kind` is a stable failure name such as `ScoreError::kind()`.
    pub fn record_score_failure(&self, kind: &str) {
        *self
            .metrics_write()
            .score_failures
            .entry(kind.to_string())
            .or_default() += 1;
    }

    /// Consistent copy of all counters, taken under one read lock.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn total_score_failures(&self) -> u64 {
        self.score_failures.values().sum()
    }

    pub fn average_scoring_ms(&self) -> f64 {
        if self.scores_computed > 0 {
            self.total_scoring_ms as f64 / self.scores_computed as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
