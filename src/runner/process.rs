//! Child process driver shared by the process-based adapters and the verifier.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// What to spawn.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    /// Written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            stdin: None,
        }
    }

    /// A `sh -c <script>` invocation.
    pub fn shell(script: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self::new("sh", cwd).with_args(vec!["-c".to_string(), script.into()])
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Captured result of a finished (or killed) process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Seconds between spawn and exit (or kill).
    pub wall_time: f64,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, for transcripts.
    pub fn transcript(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n--- stderr ---\n{}", self.stdout, self.stderr)
        }
    }

    /// Short description of a non-successful exit.
    pub fn failure_reason(&self) -> String {
        let last_err = self
            .stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim();
        match (self.exit_code, last_err.is_empty()) {
            (Some(code), true) => format!("exit code {}", code),
            (Some(code), false) => format!("exit code {}: {}", code, last_err),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => format!("terminated by signal: {}", last_err),
        }
    }
}

/// Runs a process to completion or until `timeout`, capturing its output.
///
/// On timeout the child is killed and whatever it printed so far is kept.
/// Only spawn and stdin errors are returned as `Err`.
pub async fn run_process(spec: &ProcessSpec, timeout: Duration) -> std::io::Result<ProcessOutput> {
    let start = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    cmd.stdin(if spec.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    debug!(program = %spec.program, cwd = %spec.cwd.display(), "Spawning process");
    let mut child = cmd.spawn()?;

    if let (Some(input), Some(mut stdin)) = (spec.stdin.clone(), child.stdin.take()) {
        // A child that never reads stdin must not block us.
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %e, "Child closed stdin early");
            }
            let _ = stdin.shutdown().await;
        });
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();

    let mut stdout_content = String::new();
    let mut stderr_content = String::new();
    let mut stdout_done = false;
    let mut stderr_done = false;

    let waited = tokio::time::timeout(timeout, async {
        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_done => match line {
                    Ok(Some(l)) => {
                        stdout_content.push_str(&l);
                        stdout_content.push('\n');
                    }
                    Ok(None) => stdout_done = true,
                    Err(e) => {
                        warn!(error = %e, "Error reading stdout");
                        stdout_done = true;
                    }
                },
                line = stderr_lines.next_line(), if !stderr_done => match line {
                    Ok(Some(l)) => {
                        stderr_content.push_str(&l);
                        stderr_content.push('\n');
                    }
                    Ok(None) => stderr_done = true,
                    Err(e) => {
                        warn!(error = %e, "Error reading stderr");
                        stderr_done = true;
                    }
                },
            }
        }

        child.wait().await
    })
    .await;

    let (exit_code, timed_out) = match waited {
        Ok(Ok(status)) => (status.code(), false),
        Ok(Err(e)) => {
            warn!(program = %spec.program, error = %e, "Failed to wait for process");
            (None, false)
        }
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!(program = %spec.program, error = %e, "Failed to kill timed out process");
            }
            (None, true)
        }
    };

    let wall_time = if timed_out {
        timeout.as_secs_f64()
    } else {
        start.elapsed().as_secs_f64()
    };

    Ok(ProcessOutput {
        exit_code,
        stdout: stdout_content,
        stderr: stderr_content,
        wall_time,
        timed_out,
    })
}

/// Runs `<program> --version` and returns its first output line.
pub async fn probe_version(program: &str) -> Option<String> {
    let spec = ProcessSpec::new(program, ".").with_args(vec!["--version".to_string()]);
    let output = run_process(&spec, Duration::from_secs(10)).await.ok()?;
    if !output.success() {
        return None;
    }
    output
        .stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let spec = ProcessSpec::shell("echo out; echo err >&2; exit 3", ".");
        let output = run_process(&spec, Duration::from_secs(10)).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
        assert_eq!(output.failure_reason(), "exit code 3: err");
    }

    #[tokio::test]
    async fn test_stdin_is_delivered() {
        let spec = ProcessSpec::shell("cat", ".").with_stdin("hello prompt");
        let output = run_process(&spec, Duration::from_secs(10)).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello prompt");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let spec = ProcessSpec::shell("echo started; exec sleep 30", ".");
        let start = Instant::now();
        let output = run_process(&spec, Duration::from_millis(500)).await.unwrap();
        assert!(output.timed_out);
        assert!(!output.success());
        assert_eq!(output.wall_time, 0.5);
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(output.stdout.contains("started"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let spec = ProcessSpec::new("/nonexistent/agent-binary", ".");
        assert!(run_process(&spec, Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let spec = ProcessSpec::shell("echo $BENCH_TEST_VALUE", ".")
            .with_env(vec![("BENCH_TEST_VALUE".to_string(), "42".to_string())]);
        let output = run_process(&spec, Duration::from_secs(10)).await.unwrap();
        assert_eq!(output.stdout.trim(), "42");
    }
}
