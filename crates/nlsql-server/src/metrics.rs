//! Prometheus metrics for the translation pipeline

use prometheus::{Encoder, HistogramOpts, HistogramTimer, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    translations_total: IntCounterVec,
    executions_total: IntCounterVec,
    request_duration: HistogramVec,
}

/// Create a labelled int counter and register it with the registry
fn add_int_counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl PipelineMetrics {
    /// Metrics on a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let translations_total = add_int_counter_vec(
            &registry,
            "nlsql_translations_total",
            "Translations attempted, by strategy and artifact outcome.",
            &["strategy", "outcome"],
        )?;

        let executions_total = add_int_counter_vec(
            &registry,
            "nlsql_executions_total",
            "SQL executions, by outcome.",
            &["outcome"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "nlsql_request_duration_seconds",
                "Pipeline request duration in seconds, by operation.",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            translations_total,
            executions_total,
            request_duration,
        })
    }

    pub fn record_translation(&self, strategy: &str, outcome: &str) {
        self.translations_total.with_label_values(&[strategy, outcome]).inc();
    }

    pub fn record_execution(&self, outcome: &str) {
        self.executions_total.with_label_values(&[outcome]).inc();
    }

    /// Observes the elapsed time when dropped
    pub fn start_timer(&self, operation: &str) -> HistogramTimer {
        self.request_duration.with_label_values(&[operation]).start_timer()
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
