//! Command adapter.
//!
//! Runs any command-line agent that accepts a prompt via stdin or argument.
//! The agent may report its own metrics by printing JSON lines on stdout:
//!
//! ```text
//! {"type": "tool_call", "name": "edit_file"}
//! {"type": "retry", "reason": "syntax error"}
//! {"type": "metrics", "input_tokens": 1200, "output_tokens": 300, "cost": 0.004}
//! {"type": "recording", "path": "session.cast"}
//! ```
//!
//! Any other output is treated as transcript.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{process_env, AdapterError, AgentAdapter};
use crate::config::{AgentSettings, PromptMode};
use crate::runner::process::{probe_version, run_process, ProcessOutput, ProcessSpec};
use crate::runner::result::{BenchmarkResult, TokenUsage};
use crate::runner::workspace::Workspace;
use crate::task::Task;

/// One metric event printed by an agent.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MetricEvent {
    ToolCall,
    Retry,
    Recovered,
    Metrics {
        #[serde(default)]
        input_tokens: u64,
        #[serde(default)]
        output_tokens: u64,
        #[serde(default)]
        cost: f64,
    },
    Recording {
        path: String,
    },
}

/// Totals accumulated from an agent's metric events.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventTotals {
    pub tokens: TokenUsage,
    pub cost: f64,
    pub tool_calls: u32,
    pub retries: u32,
    pub recovered: bool,
    pub recording_path: Option<String>,
}

/// Parses JSON metric lines out of stdout. Unknown lines are ignored.
pub fn parse_metric_events(stdout: &str) -> EventTotals {
    let mut totals = EventTotals::default();

    for line in stdout.lines() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        let Ok(event) = serde_json::from_str::<MetricEvent>(line) else {
            continue;
        };
        match event {
            MetricEvent::ToolCall => totals.tool_calls = totals.tool_calls.saturating_add(1),
            MetricEvent::Retry => totals.retries = totals.retries.saturating_add(1),
            MetricEvent::Recovered => totals.recovered = true,
            MetricEvent::Metrics {
                input_tokens,
                output_tokens,
                cost,
            } => {
                totals.tokens.add(TokenUsage::new(input_tokens, output_tokens));
                if cost.is_finite() && cost > 0.0 {
                    totals.cost += cost;
                }
            }
            MetricEvent::Recording { path } => totals.recording_path = Some(path),
        }
    }

    totals
}

/// Finds an executable by path or on `PATH`.
pub(crate) fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// State common to adapters that drive an external process.
#[derive(Debug)]
pub(crate) struct ProcessAgent {
    pub settings: AgentSettings,
    pub api_env: Vec<(String, String)>,
    pub workspace: Option<Workspace>,
    pub env: Vec<(String, String)>,
}

impl ProcessAgent {
    pub fn new(settings: AgentSettings, api_env: Vec<(String, String)>) -> Self {
        Self {
            settings,
            api_env,
            workspace: None,
            env: Vec::new(),
        }
    }

    pub fn program(&self) -> &str {
        self.settings.program().unwrap_or("")
    }

    /// Checks the executable exists and resolves the process environment.
    pub fn setup(&mut self, workspace: &Workspace) -> Result<(), AdapterError> {
        let program = self.program().to_string();
        if program.is_empty() || resolve_program(&program).is_none() {
            return Err(AdapterError::Spawn {
                program,
                reason: "executable not found".to_string(),
            });
        }
        self.env = process_env(&self.settings, &self.api_env)?;
        self.workspace = Some(workspace.clone());
        Ok(())
    }

    pub fn spec(&self, args: Vec<String>) -> Option<ProcessSpec> {
        let workspace = self.workspace.as_ref()?;
        Some(
            ProcessSpec::new(self.program(), &workspace.path)
                .with_args(args)
                .with_env(self.env.clone()),
        )
    }

    /// Runs the process; spawn errors become failed results.
    pub async fn run(&self, spec: ProcessSpec, timeout: Duration) -> Result<ProcessOutput, BenchmarkResult> {
        run_process(&spec, timeout).await.map_err(|e| {
            warn!(agent = %self.settings.name, error = %e, "Agent process failed to start");
            BenchmarkResult::failure(0.0, format!("failed to spawn {}: {}", spec.program, e))
        })
    }

    pub fn generated_files(&self) -> Vec<String> {
        self.workspace
            .as_ref()
            .map(Workspace::generated_files)
            .unwrap_or_default()
    }

    pub fn not_set_up(&self) -> BenchmarkResult {
        BenchmarkResult::failure(0.0, "adapter used before setup")
    }

    pub fn cleanup(&mut self) {
        self.workspace = None;
        self.env.clear();
    }
}

/// Adapter for any CLI agent.
pub struct CommandAdapter {
    inner: ProcessAgent,
}

impl CommandAdapter {
    pub fn new(settings: AgentSettings, api_env: Vec<(String, String)>) -> Self {
        Self {
            inner: ProcessAgent::new(settings, api_env),
        }
    }
}

#[async_trait]
impl AgentAdapter for CommandAdapter {
    fn name(&self) -> &str {
        &self.inner.settings.name
    }

    async fn version(&self) -> Option<String> {
        probe_version(self.inner.program()).await
    }

    async fn setup(&mut self, workspace: &Workspace, _task: &Task) -> Result<(), AdapterError> {
        self.inner.setup(workspace)
    }

    async fn execute_task(&mut self, prompt: &str, timeout: Duration) -> BenchmarkResult {
        let settings = &self.inner.settings;
        let mut args = settings.args.clone();
        if let Some(model) = &settings.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if settings.prompt_mode == PromptMode::Argument {
            args.push(prompt.to_string());
        }

        let Some(mut spec) = self.inner.spec(args) else {
            return self.inner.not_set_up();
        };
        if settings.prompt_mode == PromptMode::Stdin {
            spec = spec.with_stdin(prompt);
        }

        info!(agent = %settings.name, program = %spec.program, "Starting command agent");
        let output = match self.inner.run(spec, timeout).await {
            Ok(output) => output,
            Err(failed) => return failed,
        };

        let totals = parse_metric_events(&output.stdout);
        debug!(
            agent = %settings.name,
            exit_code = ?output.exit_code,
            tool_calls = totals.tool_calls,
            "Command agent finished"
        );

        let result = if output.timed_out {
            BenchmarkResult::timeout(timeout)
        } else if output.success() {
            BenchmarkResult::success(output.wall_time)
        } else {
            BenchmarkResult::failure(output.wall_time, output.failure_reason())
        };

        let success = result.success;
        let mut result = result
            .with_tokens(totals.tokens)
            .with_cost(totals.cost)
            .with_retries(totals.retries)
            .with_tool_calls(totals.tool_calls)
            .with_error_recovered(totals.recovered || (success && totals.retries > 0))
            .with_generated_files(self.inner.generated_files())
            .with_logs(output.transcript());
        if let Some(path) = totals.recording_path {
            result = result.with_recording(path);
        }
        result
    }

    async fn cleanup(&mut self) -> Result<(), AdapterError> {
        self.inner.cleanup();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentKind;
    use crate::task::manifest::fixtures::quicksort;
    use tempfile::TempDir;

    fn shell_agent(script: &str) -> CommandAdapter {
        let settings = AgentSettings::new("sh-agent", AgentKind::Command)
            .with_command("/bin/sh")
            .with_args(vec!["-c".to_string(), script.to_string()]);
        CommandAdapter::new(settings, Vec::new())
    }

    async fn ready(adapter: &mut CommandAdapter, temp: &TempDir) {
        let task = quicksort();
        let ws = Workspace::create(temp.path(), "run", adapter.name(), &task, 1).unwrap();
        adapter.setup(&ws, &task).await.unwrap();
    }

    #[test]
    fn test_repeated_huge_metrics_saturate() {
        let line = r#"{"type": "metrics", "input_tokens": 18446744073709551615, "output_tokens": 1, "cost": 0.0}"#;
        let totals = parse_metric_events(&format!("{}\n{}\n", line, line));
        assert_eq!(totals.tokens, TokenUsage::new(u64::MAX, 2));
    }

    #[test]
    fn test_parse_metric_events() {
        let stdout = r#"thinking...
{"type": "tool_call", "name": "write"}
{"type": "tool_call"}
{"type": "retry"}
{"type": "metrics", "input_tokens": 100, "output_tokens": 20, "cost": 0.01}
{"type": "metrics", "input_tokens": 50, "output_tokens": 5, "cost": 0.02}
{"type": "recording", "path": "run.cast"}
{"not": "an event"}
"#;
        let totals = parse_metric_events(stdout);
        assert_eq!(totals.tool_calls, 2);
        assert_eq!(totals.retries, 1);
        assert_eq!(totals.tokens, TokenUsage::new(150, 25));
        assert!((totals.cost - 0.03).abs() < 1e-12);
        assert_eq!(totals.recording_path.as_deref(), Some("run.cast"));
    }

    #[tokio::test]
    async fn test_successful_run_with_metrics() {
        let temp = TempDir::new().unwrap();
        let mut adapter = shell_agent(
            r#"read prompt; echo "$prompt" > answer.txt; echo '{"type":"tool_call"}'; echo '{"type":"metrics","input_tokens":10,"output_tokens":2,"cost":0.5}'"#,
        );
        ready(&mut adapter, &temp).await;

        let result = adapter.execute_task("write quicksort", Duration::from_secs(10)).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.tool_calls, 1);
        assert_eq!(result.cost, 0.5);
        assert_eq!(result.generated_files, vec!["answer.txt"]);
        adapter.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed_result() {
        let temp = TempDir::new().unwrap();
        let mut adapter = shell_agent("echo boom >&2; exit 2");
        ready(&mut adapter, &temp).await;

        let result = adapter.execute_task("p", Duration::from_secs(10)).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("exit code 2: boom"));
    }

    #[tokio::test]
    async fn test_timeout_is_failed_result() {
        let temp = TempDir::new().unwrap();
        let mut adapter = shell_agent("exec sleep 30");
        ready(&mut adapter, &temp).await;

        let result = adapter.execute_task("p", Duration::from_millis(300)).await;
        assert!(!result.success);
        assert!(result.is_timeout());
        assert!((result.wall_time - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_executable_fails_setup() {
        let temp = TempDir::new().unwrap();
        let settings = AgentSettings::new("ghost", AgentKind::Command).with_command("/no/such/agent");
        let mut adapter = CommandAdapter::new(settings, Vec::new());
        let task = quicksort();
        let ws = Workspace::create(temp.path(), "run", "ghost", &task, 1).unwrap();

        let err = adapter.setup(&ws, &task).await.unwrap_err();
        assert!(matches!(err, AdapterError::Spawn { .. }));
    }

    #[test]
    fn test_resolve_program() {
        assert!(resolve_program("sh").is_some());
        assert!(resolve_program("/bin/sh").is_some());
        assert!(resolve_program("definitely-not-an-agent-binary").is_none());
    }
}
