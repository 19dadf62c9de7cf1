//! Prometheus metrics for batch execution.
//!
//! # Example
//!
//! ```ignore
//! use agent_bench::metrics::{init_metrics, export_metrics, MetricsCollector, PairingStatus};
//!
//! init_metrics()?;
//!
//! let collector = MetricsCollector::new();
//! collector.record_pairing("claude-code", PairingStatus::Success, 95.0, Some(96.0), 0.03);
//!
//! std::fs::write("metrics.prom", export_metrics())?;
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{MetricsCollector, PairingStatus};
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{COST_USD_TOTAL, OVERALL_SCORE, PAIRINGS_TOTAL, PAIRING_DURATION, REGISTRY};
