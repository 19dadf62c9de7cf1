//! Claude Code adapter.
//!
//! Runs `claude -p --output-format stream-json --verbose` with the prompt on
//! stdin and reads the event stream:
//! - every `tool_use` block in an `assistant` message is a tool call,
//! - every `tool_result` block flagged `is_error` is a retry,
//! - the final `result` event carries cost, usage and the outcome.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::command::ProcessAgent;
use super::{AdapterError, AgentAdapter};
use crate::config::AgentSettings;
use crate::runner::process::probe_version;
use crate::runner::result::{BenchmarkResult, TokenUsage};
use crate::runner::workspace::Workspace;
use crate::task::Task;

/// Metrics extracted from a stream-json transcript.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StreamSummary {
    pub tool_calls: u32,
    pub failed_tool_results: u32,
    pub tokens: TokenUsage,
    pub cost: f64,
    /// `Some(is_error)` once a `result` event was seen.
    pub result_is_error: Option<bool>,
    pub result_text: Option<String>,
}

/// Parses a stream-json transcript. Lines that are not JSON are skipped.
pub fn parse_stream(stdout: &str) -> StreamSummary {
    let mut summary = StreamSummary::default();

    for line in stdout.lines() {
        let Ok(event) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };

        match event.get("type").and_then(Value::as_str) {
            Some("assistant") => {
                summary.tool_calls = summary.tool_calls.saturating_add(count_blocks(&event, |block| {
                    block.get("type").and_then(Value::as_str) == Some("tool_use")
                }));
            }
            Some("user") => {
                summary.failed_tool_results =
                    summary.failed_tool_results.saturating_add(count_blocks(&event, |block| {
                        block.get("type").and_then(Value::as_str) == Some("tool_result")
                            && block.get("is_error").and_then(Value::as_bool) == Some(true)
                    }));
            }
            Some("result") => {
                summary.result_is_error = Some(
                    event.get("is_error").and_then(Value::as_bool).unwrap_or(false)
                        || event.get("subtype").and_then(Value::as_str) != Some("success"),
                );
                summary.cost = event
                    .get("total_cost_usd")
                    .or_else(|| event.get("cost_usd"))
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                if let Some(usage) = event.get("usage") {
                    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
                    summary.tokens = TokenUsage::new(
                        field("input_tokens")
                            .saturating_add(field("cache_creation_input_tokens"))
                            .saturating_add(field("cache_read_input_tokens")),
                        field("output_tokens"),
                    );
                }
                summary.result_text = event
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            _ => {}
        }
    }

    summary
}

fn count_blocks(event: &Value, predicate: impl Fn(&Value) -> bool) -> u32 {
    event
        .pointer("/message/content")
        .and_then(Value::as_array)
        .map(|blocks| blocks.iter().filter(|b| predicate(b)).count())
        .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// Adapter for Claude Code.
pub struct ClaudeCodeAdapter {
    inner: ProcessAgent,
}

impl ClaudeCodeAdapter {
    pub fn new(settings: AgentSettings, api_env: Vec<(String, String)>) -> Self {
        Self {
            inner: ProcessAgent::new(settings, api_env),
        }
    }

    fn args(&self) -> Vec<String> {
        let settings = &self.inner.settings;
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];
        if let Some(model) = &settings.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.extend(settings.args.iter().cloned());
        args
    }
}

#[async_trait]
impl AgentAdapter for ClaudeCodeAdapter {
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
        let Some(spec) = self.inner.spec(self.args()) else {
            return self.inner.not_set_up();
        };
        let spec = spec.with_stdin(prompt);

        info!(agent = %self.name(), "Starting Claude Code");
        let output = match self.inner.run(spec, timeout).await {
            Ok(output) => output,
            Err(failed) => return failed,
        };

        let summary = parse_stream(&output.stdout);
        debug!(
            agent = %self.name(),
            tool_calls = summary.tool_calls,
            failed_tool_results = summary.failed_tool_results,
            cost = summary.cost,
            "Claude Code finished"
        );

        let result = if output.timed_out {
            BenchmarkResult::timeout(timeout)
        } else if !output.success() {
            BenchmarkResult::failure(output.wall_time, output.failure_reason())
        } else if summary.result_is_error != Some(false) {
            let reason = summary
                .result_text
                .clone()
                .unwrap_or_else(|| "no successful result event".to_string());
            BenchmarkResult::failure(output.wall_time, reason)
        } else {
            BenchmarkResult::success(output.wall_time)
        };

        let recovered = result.success && summary.failed_tool_results > 0;
        result
            .with_tokens(summary.tokens)
            .with_cost(summary.cost)
            .with_retries(summary.failed_tool_results)
            .with_tool_calls(summary.tool_calls)
            .with_error_recovered(recovered)
            .with_generated_files(self.inner.generated_files())
            .with_logs(output.transcript())
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

    const STREAM: &str = r#"{"type":"system","subtype":"init","session_id":"abc"}
{"type":"assistant","message":{"content":[{"type":"text","text":"Writing"},{"type":"tool_use","name":"Write","input":{}}]}}
{"type":"user","message":{"content":[{"type":"tool_result","is_error":true,"content":"SyntaxError"}]}}
{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Edit"},{"type":"tool_use","name":"Bash"}]}}
{"type":"user","message":{"content":[{"type":"tool_result","content":"ok"}]}}
{"type":"result","subtype":"success","is_error":false,"total_cost_usd":0.031,"usage":{"input_tokens":1200,"cache_read_input_tokens":300,"output_tokens":450},"result":"Done"}
"#;

    #[test]
    fn test_parse_stream() {
        let summary = parse_stream(STREAM);
        assert_eq!(summary.tool_calls, 3);
        assert_eq!(summary.failed_tool_results, 1);
        assert_eq!(summary.tokens, TokenUsage::new(1500, 450));
        assert!((summary.cost - 0.031).abs() < 1e-12);
        assert_eq!(summary.result_is_error, Some(false));
    }

    #[test]
    fn test_parse_stream_error_result() {
        let summary = parse_stream(
            r#"{"type":"result","subtype":"error_max_turns","is_error":true,"total_cost_usd":0.2}"#,
        );
        assert_eq!(summary.result_is_error, Some(true));
        assert_eq!(summary.cost, 0.2);
    }

    #[test]
    fn test_parse_stream_huge_usage_saturates() {
        let summary = parse_stream(
            r#"{"type":"result","subtype":"success","usage":{"input_tokens":18446744073709551615,"cache_read_input_tokens":18446744073709551615,"output_tokens":7}}"#,
        );
        assert_eq!(summary.tokens, TokenUsage::new(u64::MAX, 7));
    }

    #[test]
    fn test_parse_stream_without_result() {
        let summary = parse_stream("not json\n");
        assert_eq!(summary, StreamSummary::default());
    }

    #[test]
    fn test_args_include_model() {
        let settings = AgentSettings::new("claude-code", AgentKind::ClaudeCode).with_model("sonnet");
        let adapter = ClaudeCodeAdapter::new(settings, Vec::new());
        let args = adapter.args();
        assert_eq!(args[0], "-p");
        assert!(args.windows(2).any(|w| w == ["--model", "sonnet"]));
    }
}
