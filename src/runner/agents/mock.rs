//! Simulated agent for offline runs.
//!
//! The mock writes the task's expected outputs and reports metrics derived
//! only from its profile and the task, so repeated runs are identical
//! regardless of scheduling.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AdapterError, AgentAdapter};
use crate::runner::result::{BenchmarkResult, TokenUsage};
use crate::runner::workspace::{join_inside, Workspace};
use crate::task::{ExpectedOutput, Task};

/// Behaviour of a mock agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockProfile {
    pub success: bool,
    /// Reported wall time as a fraction of the task's estimate.
    pub time_factor: f64,
    /// Reported cost in USD.
    pub cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub retries: u32,
    pub tool_calls: u32,
    /// Write every expected output file into the workspace.
    pub write_outputs: bool,
    /// Extra files to write, path to content.
    pub files: BTreeMap<String, String>,
    /// Tasks for which `setup` fails with an infrastructure error.
    pub fail_setup_for: Vec<String>,
    /// Real time spent in `execute_task`, in milliseconds.
    pub delay_ms: u64,
}

impl Default for MockProfile {
    fn default() -> Self {
        Self {
            success: true,
            time_factor: 0.5,
            cost: 0.01,
            input_tokens: 1200,
            output_tokens: 400,
            retries: 0,
            tool_calls: 6,
            write_outputs: true,
            files: BTreeMap::new(),
            fail_setup_for: Vec::new(),
            delay_ms: 0,
        }
    }
}

/// Adapter that simulates an agent.
pub struct MockAdapter {
    name: String,
    profile: MockProfile,
    workspace: Option<PathBuf>,
    estimated_time: f64,
    outputs: Vec<ExpectedOutput>,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>, profile: MockProfile) -> Self {
        Self {
            name: name.into(),
            profile,
            workspace: None,
            estimated_time: 0.0,
            outputs: Vec::new(),
        }
    }

    fn write_files(&self, dir: &std::path::Path) -> std::io::Result<Vec<String>> {
        let mut written = Vec::new();
        let outputs = self
            .outputs
            .iter()
            .filter(|_| self.profile.write_outputs)
            .map(|o| (o.path.clone(), format!("# {} generated by {}\n", o.kind, self.name)));

        for (path, content) in outputs.chain(self.profile.files.iter().map(|(p, c)| (p.clone(), c.clone()))) {
            let Some(target) = join_inside(dir, &path) else {
                warn!(agent = %self.name, path = %path, "Skipping file outside the workspace");
                continue;
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)?;
            written.push(path);
        }
        written.sort();
        written.dedup();
        Ok(written)
    }
}

#[async_trait]
impl AgentAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn version(&self) -> Option<String> {
        Some(format!("mock-{}", env!("CARGO_PKG_VERSION")))
    }

    async fn setup(&mut self, workspace: &Workspace, task: &Task) -> Result<(), AdapterError> {
        if self.profile.fail_setup_for.contains(&task.name) {
            return Err(AdapterError::Setup(format!(
                "simulated setup failure for task '{}'",
                task.name
            )));
        }
        self.workspace = Some(workspace.path.clone());
        self.estimated_time = task.estimated_time;
        self.outputs = task.expected_outputs.clone();
        Ok(())
    }

    async fn execute_task(&mut self, prompt: &str, timeout: Duration) -> BenchmarkResult {
        let Some(dir) = self.workspace.clone() else {
            return BenchmarkResult::failure(0.0, "adapter used before setup");
        };

        if self.profile.delay_ms > 0 {
            let delay = Duration::from_millis(self.profile.delay_ms);
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return BenchmarkResult::timeout(timeout);
            }
            tokio::time::sleep(delay).await;
        }

        let wall_time = self.estimated_time * self.profile.time_factor;
        if wall_time > timeout.as_secs_f64() {
            return BenchmarkResult::timeout(timeout);
        }

        let generated = match self.write_files(&dir) {
            Ok(files) => files,
            Err(e) => return BenchmarkResult::failure(wall_time, format!("mock write failed: {}", e)),
        };

        debug!(agent = %self.name, prompt_len = prompt.len(), files = generated.len(), "Mock run");

        let result = if self.profile.success {
            BenchmarkResult::success(wall_time)
        } else {
            BenchmarkResult::failure(wall_time, "simulated failure")
        };

        let recovered = self.profile.success && self.profile.retries > 0;
        result
            .with_tokens(TokenUsage::new(self.profile.input_tokens, self.profile.output_tokens))
            .with_cost(self.profile.cost)
            .with_retries(self.profile.retries)
            .with_tool_calls(self.profile.tool_calls)
            .with_error_recovered(recovered)
            .with_generated_files(generated)
            .with_logs(format!("mock agent {} ran {} byte prompt", self.name, prompt.len()))
    }

    async fn cleanup(&mut self) -> Result<(), AdapterError> {
        self.workspace = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::manifest::fixtures::quicksort;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_mock_writes_outputs_and_reports_profile() {
        let temp = TempDir::new().unwrap();
        let task = quicksort();
        let ws = Workspace::create(temp.path(), "run", "mock", &task, 1).unwrap();
        let mut adapter = MockAdapter::new("mock", MockProfile::default());

        adapter.setup(&ws, &task).await.unwrap();
        let result = adapter.execute_task(&task.prompt, task.timeout()).await;
        adapter.cleanup().await.unwrap();

        assert!(result.success);
        assert_eq!(result.wall_time, 90.0);
        assert_eq!(result.cost, 0.01);
        assert_eq!(result.generated_files, vec!["quicksort.py"]);
        assert!(ws.path.join("quicksort.py").exists());
    }

    #[tokio::test]
    async fn test_mock_simulated_timeout() {
        let temp = TempDir::new().unwrap();
        let task = quicksort();
        let ws = Workspace::create(temp.path(), "run", "slow", &task, 1).unwrap();
        let profile = MockProfile {
            time_factor: 4.0,
            ..MockProfile::default()
        };
        let mut adapter = MockAdapter::new("slow", profile);

        adapter.setup(&ws, &task).await.unwrap();
        let result = adapter.execute_task(&task.prompt, task.timeout()).await;
        assert!(result.is_timeout());
        assert_eq!(result.wall_time, 540.0);
    }

    #[tokio::test]
    async fn test_mock_setup_failure() {
        let temp = TempDir::new().unwrap();
        let task = quicksort();
        let ws = Workspace::create(temp.path(), "run", "flaky", &task, 1).unwrap();
        let profile = MockProfile {
            fail_setup_for: vec!["quicksort".to_string()],
            ..MockProfile::default()
        };
        let mut adapter = MockAdapter::new("flaky", profile);

        assert!(matches!(
            adapter.setup(&ws, &task).await,
            Err(AdapterError::Setup(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_skips_files_outside_workspace() {
        let temp = TempDir::new().unwrap();
        let mut task = quicksort();
        task.expected_outputs.push(ExpectedOutput {
            path: "../escaped.py".to_string(),
            kind: "source".to_string(),
        });
        let ws = Workspace::create(&temp.path().join("ws"), "run", "mock", &task, 1).unwrap();
        let mut files = BTreeMap::new();
        files.insert("/tmp/agent-bench-escape.txt".to_string(), "x".to_string());
        files.insert("notes/plan.md".to_string(), "plan".to_string());
        let profile = MockProfile {
            files,
            ..MockProfile::default()
        };
        let mut adapter = MockAdapter::new("mock", profile);

        adapter.setup(&ws, &task).await.unwrap();
        let result = adapter.execute_task(&task.prompt, task.timeout()).await;

        assert!(result.success);
        assert_eq!(result.generated_files, vec!["notes/plan.md", "quicksort.py"]);
        assert!(!ws.path.parent().unwrap().join("escaped.py").exists());
    }

    #[test]
    fn test_profile_from_yaml() {
        let profile: MockProfile = serde_yaml::from_str("cost: 0.2\nretries: 4\n").unwrap();
        assert_eq!(profile.cost, 0.2);
        assert_eq!(profile.retries, 4);
        assert!(profile.success);
    }
}
