// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Text exposition of every registered metric.
    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Dispatch metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    pub unhandled_requests_total: IntCounterVec,

    // Connection metrics
    pub active_connections: IntGauge,
    pub connection_errors_total: IntCounter,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("webterm_requests_total", "Requests dispatched to a routing surface"),
            &["surface", "status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "webterm_request_duration_seconds",
                "Time spent in a routing surface in seconds",
            ),
            &["surface"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let unhandled_requests_total = IntCounterVec::new(
            Opts::new(
                "webterm_unhandled_requests_total",
                "Requests dropped because no surface was attached for their kind",
            ),
            &["surface"],
        )?;
        registry.register(Box::new(unhandled_requests_total.clone()))?;

        let active_connections =
            IntGauge::new("webterm_active_connections", "Open client connections")?;
        registry.register(Box::new(active_connections.clone()))?;

        let connection_errors_total = IntCounter::new(
            "webterm_connection_errors_total",
            "Connections that ended with an error",
        )?;
        registry.register(Box::new(connection_errors_total.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            unhandled_requests_total,
            active_connections,
            connection_errors_total,
        })
    }

    pub fn record_request(&self, surface: &str, status_code: u16, duration: std::time::Duration) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[surface, &status])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[surface])
            .observe(duration.as_secs_f64());
    }

    pub fn record_unhandled(&self, surface: &str) {
        self.unhandled_requests_total
            .with_label_values(&[surface])
            .inc();
    }

    pub fn increment_active_connections(&self) {
        self.active_connections.inc();
    }

    pub fn decrement_active_connections(&self) {
        self.active_connections.dec();
    }

    pub fn record_connection_error(&self) {
        self.connection_errors_total.inc();
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
