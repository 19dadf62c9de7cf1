//! SQLite persistent storage for benchmark results.
//!
//! Every scored pairing becomes one row in an append-only table. The store
//! serializes writes from concurrent pairings and exposes aggregate views
//! used by the `compare` and `history` commands.
//!
//! # Usage
//!
//! ```rust,ignore
//! use agent_bench::storage::{ResultsStore, RetryPolicy};
//!
//! let store = ResultsStore::open(Path::new("./agent-bench.db")).await?;
//! store.append_with_retry(&record, RetryPolicy::default()).await?;
//!
//! for avg in store.task_agent_averages().await? {
//!     println!("{} / {}: {:?}", avg.task_name, avg.agent_name, avg.avg_overall);
//! }
//! ```

pub mod results;

pub use results::{
    AgentCategoryProfile, ResultRecord, ResultsStore, RetryPolicy, RunSummary, TaskAgentAverage,
};
