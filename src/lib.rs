//! agent-bench: benchmark orchestration and scoring for autonomous coding
//! agents.
//!
//! Tasks are loaded from a directory corpus, run against one or more agents
//! in isolated workspaces, verified, scored across five weighted dimensions,
//! and stored in an append-only SQLite database for comparison over time.

pub mod cli;
pub mod comparison;
pub mod config;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod scoring;
pub mod storage;
pub mod task;

pub use config::{AgentKind, AgentSettings, BenchConfig};
pub use error::{ConfigError, PersistenceError, StoreError, TaskLoadError};
pub use runner::{AgentAdapter, AgentRegistry, BatchReport, BenchmarkResult, Coordinator};
pub use scoring::{score_pairing, ScoredResult};
pub use storage::{ResultRecord, ResultsStore};
pub use task::{Task, TaskSelection};
