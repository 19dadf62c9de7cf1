//! Recording interface over the raw Prometheus metrics.

use super::prometheus::{COST_USD_TOTAL, OVERALL_SCORE, PAIRINGS_TOTAL, PAIRING_DURATION};

/// Final status label of a pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    Success,
    Failure,
    Timeout,
    InfraFailure,
}

impl PairingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::InfraFailure => "infra_failure",
        }
    }
}

/// Records pairing metrics.
///
/// Recording is a no-op until `init_metrics()` has run.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Records a scored pairing.
    pub fn record_pairing(
        &self,
        agent: &str,
        status: PairingStatus,
        wall_time_secs: f64,
        overall: Option<f64>,
        cost_usd: f64,
    ) {
        if let Some(total) = PAIRINGS_TOTAL.get() {
            total.with_label_values(&[agent, status.as_str()]).inc();
        }

        if let Some(duration) = PAIRING_DURATION.get() {
            duration.with_label_values(&[agent]).observe(wall_time_secs);
        }

        if let (Some(hist), Some(overall)) = (OVERALL_SCORE.get(), overall) {
            hist.observe(overall);
        }

        // Counters reject negative increments.
        if let Some(cost) = COST_USD_TOTAL.get() {
            if cost_usd.is_finite() && cost_usd > 0.0 {
                cost.with_label_values(&[agent]).inc_by(cost_usd);
            }
        }

        tracing::trace!(
            agent = agent,
            status = status.as_str(),
            wall_time_secs = wall_time_secs,
            "Recorded pairing metric"
        );
    }

    /// Records a pairing that never produced a result.
    pub fn record_infra_failure(&self, agent: &str) {
        if let Some(total) = PAIRINGS_TOTAL.get() {
            total
                .with_label_values(&[agent, PairingStatus::InfraFailure.as_str()])
                .inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_status_labels() {
        assert_eq!(PairingStatus::Success.as_str(), "success");
        assert_eq!(PairingStatus::InfraFailure.as_str(), "infra_failure");
    }

    #[test]
    fn test_record_pairing_shows_in_export() {
        init_metrics().unwrap();
        let collector = MetricsCollector::new();
        collector.record_pairing("collector-agent", PairingStatus::Timeout, 42.0, None, 0.02);
        collector.record_pairing("collector-agent", PairingStatus::Success, 12.0, Some(91.0), -1.0);
        collector.record_infra_failure("collector-agent");

        let text = export_metrics();
        assert!(text.contains("agent_bench_cost_usd_total{agent=\"collector-agent\"}"));
        assert!(text.contains("status=\"timeout\""));
        assert!(text.contains("status=\"infra_failure\""));
    }
}
