//! Raw execution results and verification outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error text recorded when an execution hits its time limit.
pub const TIMEOUT_ERROR: &str = "timeout";

/// Logs kept per result; the rest is cut.
pub const MAX_LOG_BYTES: usize = 64 * 1024;

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input/prompt tokens.
    pub input: u64,
    /// Output/completion tokens.
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    /// Returns total tokens used.
    pub fn total(&self) -> u64 {
        self.input.saturating_add(self.output)
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
    }
}

/// Raw metrics of one (agent, task, trial) execution.
///
/// Task-level failures (non-zero exit, timeout, crash of the agent process)
/// are represented here with `success == false`; they are never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub success: bool,
    /// Seconds of wall-clock time.
    pub wall_time: f64,
    pub token_count: TokenUsage,
    /// USD.
    pub cost: f64,
    pub retries: u32,
    pub tool_calls: u32,
    pub error_recovered: bool,
    /// Workspace-relative paths created by the agent.
    pub generated_files: Vec<String>,
    /// Raw transcript, truncated to [`MAX_LOG_BYTES`].
    pub logs: String,
    pub recording_path: Option<String>,
    pub error: Option<String>,
}

impl BenchmarkResult {
    /// Creates a successful result.
    pub fn success(wall_time: f64) -> Self {
        Self {
            success: true,
            wall_time: non_negative(wall_time),
            token_count: TokenUsage::default(),
            cost: 0.0,
            retries: 0,
            tool_calls: 0,
            error_recovered: false,
            generated_files: Vec::new(),
            logs: String::new(),
            recording_path: None,
            error: None,
        }
    }

    /// Creates a failed result.
    pub fn failure(wall_time: f64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::success(wall_time)
        }
    }

    /// Creates the result of an execution stopped at `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        Self::failure(timeout.as_secs_f64(), TIMEOUT_ERROR)
    }

    pub fn is_timeout(&self) -> bool {
        self.error.as_deref() == Some(TIMEOUT_ERROR)
    }

    pub fn with_tokens(mut self, usage: TokenUsage) -> Self {
        self.token_count = usage;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = non_negative(cost);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: u32) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_error_recovered(mut self, recovered: bool) -> Self {
        self.error_recovered = recovered;
        self
    }

    pub fn with_generated_files(mut self, files: Vec<String>) -> Self {
        self.generated_files = files;
        self
    }

    /// Sets the transcript, truncated to [`MAX_LOG_BYTES`].
    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = truncate_string(logs.into(), MAX_LOG_BYTES);
        self
    }

    pub fn with_recording(mut self, path: impl Into<String>) -> Self {
        self.recording_path = Some(path.into());
        self
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Test counts reported by a task's test harness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
}

impl TestCounts {
    pub fn new(passed: u32, failed: u32) -> Self {
        Self {
            total: passed + failed,
            passed,
            failed,
        }
    }
}

/// What the verifier found in a pairing's workspace after execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// `None` when the task has no harness or the harness produced no counts.
    pub tests: Option<TestCounts>,
    /// Static-analysis score in 0-100, `None` when no probe is available.
    pub code_quality: Option<f64>,
    /// Expected outputs absent from the workspace.
    pub missing_outputs: Vec<String>,
}

/// Truncates a string to at most `max_len` bytes on a char boundary.
pub fn truncate_string(s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}
