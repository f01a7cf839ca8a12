//! Metrics hooks for interceptor events.
//!
//! Trait-based so any backend (Prometheus, StatsD, OpenTelemetry) can be
//! plugged in without this crate depending on it.

use crate::registry::ApiTarget;

/// Interceptor events worth counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptEvent {
    /// The first response was classified as unauthorized.
    Unauthorized,

    /// The request was re-sent with a refreshed credential.
    Retried,
}

impl InterceptEvent {
    #[must_use]
    pub fn metric_name(self) -> &'static str {
        match self {
            InterceptEvent::Unauthorized => "auth.interceptor.unauthorized",
            InterceptEvent::Retried => "auth.interceptor.retried",
        }
    }
}

/// Trait for metrics backends
pub trait InterceptMetrics: Send + Sync {
    fn record_event(&self, event: InterceptEvent, target: &ApiTarget);
}

/// No-op metrics implementation (default)
#[derive(Debug, Clone, Copy)]
pub struct NoOpMetrics;

impl InterceptMetrics for NoOpMetrics {
    fn record_event(&self, _event: InterceptEvent, _target: &ApiTarget) {}
}

/// Logging-based metrics implementation (for debugging)
#[derive(Debug, Clone, Copy)]
pub struct LoggingMetrics;

impl InterceptMetrics for LoggingMetrics {
    fn record_event(&self, event: InterceptEvent, target: &ApiTarget) {
        tracing::debug!(
            metric = event.metric_name(),
            target = %target,
            "Interceptor event recorded"
        );
    }
}
