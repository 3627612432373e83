// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::{start_metrics_server, ExporterInfo};

// ============================================================================
// Metrics Module - Prometheus metrics for the mediator
// ============================================================================
//
// Covers:
// - Publish outcomes and latency per event name
// - Handler failures and publishes with no subscribers
// - Event store operations per backend
//
// Registered on a private Registry, scraped via /metrics
// ============================================================================

pub struct MediatorMetrics {
    registry: Registry,

    // Dispatch
    pub events_published: IntCounterVec,
    pub publish_duration: HistogramVec,
    pub handler_failures: IntCounterVec,
    pub no_handlers: IntCounterVec,

    // Persistence
    pub store_operations: IntCounterVec,
}

impl MediatorMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_published = IntCounterVec::new(
            Opts::new("mediator_events_published_total", "Total publish calls by outcome"),
            &["event_name", "outcome"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let publish_duration = HistogramVec::new(
            HistogramOpts::new(
                "mediator_publish_duration_seconds",
                "Time spent in publish, handlers and store write included",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["event_name"],
        )?;
        registry.register(Box::new(publish_duration.clone()))?;

        let handler_failures = IntCounterVec::new(
            Opts::new("mediator_handler_failures_total", "Handler invocations that returned an error"),
            &["event_name"],
        )?;
        registry.register(Box::new(handler_failures.clone()))?;

        let no_handlers = IntCounterVec::new(
            Opts::new("mediator_no_handlers_total", "Publishes to names without subscribers"),
            &["event_name"],
        )?;
        registry.register(Box::new(no_handlers.clone()))?;

        let store_operations = IntCounterVec::new(
            Opts::new("mediator_store_operations_total", "Event store calls by backend and outcome"),
            &["backend", "operation", "outcome"],
        )?;
        registry.register(Box::new(store_operations.clone()))?;

        Ok(Self {
            registry,
            events_published,
            publish_duration,
            handler_failures,
            no_handlers,
            store_operations,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_publish(&self, event_name: &str, duration_secs: f64, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.events_published.with_label_values(&[event_name, outcome]).inc();
        self.publish_duration.with_label_values(&[event_name]).observe(duration_secs);
    }

    pub fn record_handler_failure(&self, event_name: &str) {
        self.handler_failures.with_label_values(&[event_name]).inc();
    }

    pub fn record_no_handlers(&self, event_name: &str) {
        self.no_handlers.with_label_values(&[event_name]).inc();
    }

    pub fn record_store_operation(&self, backend: &str, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.store_operations.with_label_values(&[backend, operation, outcome]).inc();
    }
}
