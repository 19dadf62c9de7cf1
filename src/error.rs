//! Error types for agent-bench operations.
//!
//! Defines the error taxonomy for every subsystem that can fail:
//! - Task loading (manifest and prompt parsing)
//! - Configuration (environment, agent definitions, task/agent selection)
//! - Results store (SQLite persistence)
//!
//! Adapter infrastructure errors live next to the adapter trait in
//! [`crate::runner::agents::AdapterError`]. Execution timeouts and agent
//! failures are not errors at all: they are recorded as failed
//! [`crate::runner::BenchmarkResult`] values.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a task from disk.
///
/// A load error is fatal for that task only; a batch continues with the
/// remaining tasks.
#[derive(Debug, Error)]
pub enum TaskLoadError {
    #[error("Task not found: {path} ({reason})")]
    TaskNotFound { path: PathBuf, reason: String },

    #[error("Invalid task manifest {path}: {reason}")]
    TaskManifestInvalid { path: PathBuf, reason: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TaskLoadError {
    pub(crate) fn not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::TaskNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::TaskManifestInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while building or validating configuration.
///
/// Configuration errors abort a batch before any pairing starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("No tasks selected")]
    NoTasks,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur in the results store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value in column '{column}': {message}")]
    InvalidRow { column: String, message: String },
}

/// A row write that still failed after every retry attempt.
///
/// Surfaced as a batch-level warning; the in-memory record is kept so it can
/// be exported or written again later.
#[derive(Debug, Error)]
#[error("Failed to persist result after {attempts} attempt(s): {last}")]
pub struct PersistenceError {
    pub attempts: u32,
    #[source]
    pub last: StoreError,
}
