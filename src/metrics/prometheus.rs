//! Prometheus metrics registration and export.
//!
//! Defines the metrics recorded while a batch runs and the functions for
//! initializing and exporting them.

use prometheus::{CounterVec, Encoder, Histogram, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

/// Process-local registry for all agent-bench metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Pairings finished, labeled by agent and status.
pub static PAIRINGS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Pairing wall time in seconds, labeled by agent.
pub static PAIRING_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Distribution of overall scores of complete pairings.
pub static OVERALL_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Agent spend in USD, labeled by agent.
pub static COST_USD_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Serializes `init_metrics` so every static comes from the same registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Later calls are no-ops.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric definition is invalid.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let pairings_total = CounterVec::new(
        Opts::new("agent_bench_pairings_total", "Total pairings finished"),
        &["agent", "status"],
    )?;

    let pairing_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "agent_bench_pairing_duration_seconds",
            "Pairing wall time in seconds",
        )
        .buckets(vec![1.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["agent"],
    )?;

    let overall_score = Histogram::with_opts(
        prometheus::HistogramOpts::new("agent_bench_overall_score", "Distribution of overall scores")
            .buckets(vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]),
    )?;

    let cost_usd_total = CounterVec::new(
        Opts::new("agent_bench_cost_usd_total", "Agent spend in USD"),
        &["agent"],
    )?;

    registry.register(Box::new(pairings_total.clone()))?;
    registry.register(Box::new(pairing_duration.clone()))?;
    registry.register(Box::new(overall_score.clone()))?;
    registry.register(Box::new(cost_usd_total.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = PAIRINGS_TOTAL.set(pairings_total);
    let _ = PAIRING_DURATION.set(pairing_duration);
    let _ = OVERALL_SCORE.set(overall_score);
    let _ = COST_USD_TOTAL.set(cost_usd_total);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead when the registry is not initialized or
/// encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_after_recording() {
        init_metrics().unwrap();
        PAIRINGS_TOTAL
            .get()
            .unwrap()
            .with_label_values(&["export-test-agent", "success"])
            .inc();

        let text = export_metrics();
        assert!(!text.starts_with("# Error"));
        assert!(text.contains("agent_bench_pairings_total"));
        assert!(text.contains("export-test-agent"));
    }
}
