//! Agent runner for benchmark evaluation.
//!
//! This module runs external coding agents against benchmark tasks, verifies
//! what they produced and hands scored records to the results store.
//!
//! # Architecture
//!
//! ```text
//! Task (prompt.md) → Workspace → Agent Adapter → Agent Process → Verifier → Scoring → Store
//! ```
//!
//! For each (agent, task, trial) pairing the [`Coordinator`]:
//! 1. Creates an isolated workspace seeded with the task's files
//! 2. Sets up a fresh adapter and runs the agent under the task timeout
//! 3. Runs the task's test and quality commands in the workspace
//! 4. Cleans up, scores and persists the result
//!
//! # Example
//!
//! ```ignore
//! use agent_bench::runner::{AgentRegistry, Coordinator};
//!
//! let registry = AgentRegistry::from_config(&config);
//! let coordinator = Coordinator::new(config, registry).with_store(store);
//! let report = coordinator.run(&["claude-code".to_string()], &tasks).await?;
//!
//! println!("{} of {} pairings succeeded", report.success_count(), report.outcomes.len());
//! ```

pub mod agents;
pub mod coordinator;
pub mod process;
pub mod result;
pub mod verifier;
pub mod workspace;

pub use agents::{
    AdapterError, AgentAdapter, AgentRegistry, AiderAdapter, ClaudeCodeAdapter, CommandAdapter,
    MockAdapter, MockProfile,
};
pub use coordinator::{
    plan, BatchReport, Coordinator, InfraFailure, Pairing, PairingOutcome, Phase, RunId,
};
pub use process::{run_process, ProcessOutput, ProcessSpec};
pub use result::{BenchmarkResult, TestCounts, TokenUsage, VerificationOutcome};
pub use verifier::Verifier;
pub use workspace::{Workspace, WorkspaceError};
