//! Loads tasks from disk.
//!
//! A task directory holds a manifest (`task.yaml`) and the prompt shown to
//! the agent (`prompt.md`):
//!
//! ```text
//! tasks/
//! └── quicksort/
//!     ├── task.yaml
//!     ├── prompt.md
//!     └── tests/          (optional fixtures copied into the workspace)
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::manifest::{
    AutonomyCriteria, Difficulty, Dimension, ExpectedOutput, Task, Weights, MAX_TASK_SECONDS,
};
use crate::error::TaskLoadError;
use crate::runner::workspace::join_inside;

/// Manifest file names, in lookup order. All are parsed as YAML.
pub const MANIFEST_FILES: [&str; 3] = ["task.yaml", "task.yml", "task.json"];

/// Prompt file name.
pub const PROMPT_FILE: &str = "prompt.md";

/// Manifest as written on disk, before validation.
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    category: Option<String>,
    difficulty: Option<String>,
    estimated_time: Option<f64>,
    #[serde(default)]
    description: String,
    weights: Option<BTreeMap<String, i64>>,
    #[serde(default)]
    cost_budget: BTreeMap<String, f64>,
    #[serde(default)]
    expected_outputs: Vec<ExpectedOutput>,
    #[serde(default)]
    autonomy_criteria: AutonomyCriteria,
    timeout: Option<f64>,
    test_command: Option<String>,
    quality_command: Option<String>,
}

/// A task that could not be loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLoadFailure {
    pub path: PathBuf,
    /// Name declared in the manifest, when it could still be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub error: String,
}

impl TaskLoadFailure {
    /// Whether a requested task name refers to this failure, by declared
    /// name or by directory name.
    pub fn matches(&self, requested: &str) -> bool {
        self.name.as_deref() == Some(requested)
            || self.path.file_name().and_then(|n| n.to_str()) == Some(requested)
    }
}

/// Reads the `name` field of a manifest that may otherwise be invalid.
fn declared_name(dir: &Path) -> Option<String> {
    let content = fs::read_to_string(manifest_path(dir)?).ok()?;
    let value: serde_yaml::Value = serde_yaml::from_str(&content).ok()?;
    value.get("name")?.as_str().map(str::to_string)
}

/// Finds the manifest file inside a task directory.
pub fn manifest_path(dir: &Path) -> Option<PathBuf> {
    MANIFEST_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Loads a single task from its directory.
pub fn load(dir: &Path) -> Result<Task, TaskLoadError> {
    if !dir.is_dir() {
        return Err(TaskLoadError::not_found(dir, "task directory does not exist"));
    }

    let manifest = manifest_path(dir)
        .ok_or_else(|| TaskLoadError::not_found(dir, "no task.yaml manifest"))?;

    let prompt_path = dir.join(PROMPT_FILE);
    if !prompt_path.is_file() {
        return Err(TaskLoadError::not_found(dir, "no prompt.md"));
    }

    let content = fs::read_to_string(&manifest).map_err(|source| TaskLoadError::Io {
        path: manifest.clone(),
        source,
    })?;
    let prompt = fs::read_to_string(&prompt_path).map_err(|source| TaskLoadError::Io {
        path: prompt_path.clone(),
        source,
    })?;

    let raw: RawManifest = serde_yaml::from_str(&content)
        .map_err(|e| TaskLoadError::invalid(&manifest, e.to_string()))?;

    let task = validate(raw, prompt, dir).map_err(|reason| TaskLoadError::invalid(&manifest, reason))?;
    debug!(task = %task.name, category = %task.category, "Loaded task");
    Ok(task)
}

fn validate(raw: RawManifest, prompt: String, dir: &Path) -> Result<Task, String> {
    let name = required_string(raw.name, "name")?;
    let category = required_string(raw.category, "category")?;
    let difficulty: Difficulty = raw
        .difficulty
        .ok_or_else(|| "missing required field 'difficulty'".to_string())?
        .parse()?;

    let estimated_time = raw
        .estimated_time
        .ok_or_else(|| "missing required field 'estimated_time'".to_string())?;
    if !estimated_time.is_finite() || estimated_time <= 0.0 || estimated_time > MAX_TASK_SECONDS {
        return Err(format!(
            "estimated_time must be a positive number of seconds up to {}, got {}",
            MAX_TASK_SECONDS, estimated_time
        ));
    }

    let weights = parse_weights(
        raw.weights
            .ok_or_else(|| "missing required field 'weights'".to_string())?,
    )?;

    for (agent, budget) in &raw.cost_budget {
        if !budget.is_finite() || *budget < 0.0 {
            return Err(format!(
                "cost_budget for '{}' must be a non-negative amount, got {}",
                agent, budget
            ));
        }
    }

    if let Some(timeout) = raw.timeout {
        if !timeout.is_finite() || timeout <= 0.0 || timeout > MAX_TASK_SECONDS {
            return Err(format!(
                "timeout must be positive and at most {} seconds, got {}",
                MAX_TASK_SECONDS, timeout
            ));
        }
    }

    for output in &raw.expected_outputs {
        if join_inside(dir, &output.path).is_none() {
            return Err(format!(
                "expected output '{}' must be a relative path inside the workspace",
                output.path
            ));
        }
    }

    if prompt.trim().is_empty() {
        return Err("prompt.md is empty".to_string());
    }

    Ok(Task {
        name,
        category,
        difficulty,
        estimated_time,
        description: raw.description,
        weights,
        cost_budget: raw.cost_budget,
        expected_outputs: raw.expected_outputs,
        autonomy_criteria: raw.autonomy_criteria,
        prompt,
        timeout: raw.timeout,
        test_command: raw.test_command.filter(|c| !c.trim().is_empty()),
        quality_command: raw.quality_command.filter(|c| !c.trim().is_empty()),
        dir: dir.to_path_buf(),
    })
}

fn required_string(value: Option<String>, field: &str) -> Result<String, String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(format!("missing required field '{}'", field)),
    }
}

fn parse_weights(raw: BTreeMap<String, i64>) -> Result<Weights, String> {
    for key in raw.keys() {
        key.parse::<Dimension>()?;
    }

    let weight = |d: Dimension| -> Result<u32, String> {
        let value = *raw
            .get(d.as_str())
            .ok_or_else(|| format!("missing weight for '{}'", d))?;
        if value <= 0 {
            return Err(format!("weight '{}' must be a positive integer, got {}", d, value));
        }
        u32::try_from(value).map_err(|_| format!("weight '{}' is too large: {}", d, value))
    };

    Ok(Weights {
        correctness: weight(Dimension::Correctness)?,
        speed: weight(Dimension::Speed)?,
        cost: weight(Dimension::Cost)?,
        autonomy: weight(Dimension::Autonomy)?,
        code_quality: weight(Dimension::CodeQuality)?,
    })
}

/// Discovers every task directory under `root` (directories holding a manifest).
pub fn discover(root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| MANIFEST_FILES.contains(&name))
                .unwrap_or(false)
        })
        .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
        .collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

/// Loads every task under `root`. A broken task is reported, not fatal.
///
/// Task names must be unique: a later directory declaring a name already
/// loaded is reported as a failure.
pub fn load_all(root: &Path) -> (Vec<Task>, Vec<TaskLoadFailure>) {
    let mut tasks: Vec<Task> = Vec::new();
    let mut failures = Vec::new();

    for dir in discover(root) {
        match load(&dir) {
            Ok(task) => {
                let first = tasks
                    .iter()
                    .find(|t| t.name == task.name)
                    .map(|t| t.dir.clone());
                match first {
                    Some(first) => {
                        warn!(
                            path = %dir.display(),
                            task = %task.name,
                            first = %first.display(),
                            "Skipping task with duplicate name"
                        );
                        failures.push(TaskLoadFailure {
                            error: format!(
                                "duplicate task name '{}' (already loaded from {})",
                                task.name,
                                first.display()
                            ),
                            name: Some(task.name),
                            path: dir,
                        });
                    }
                    None => tasks.push(task),
                }
            }
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping task that failed to load");
                failures.push(TaskLoadFailure {
                    name: declared_name(&dir),
                    path: dir,
                    error: e.to_string(),
                });
            }
        }
    }

    (tasks, failures)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::Path;

    pub const QUICKSORT_YAML: &str = r#"
name: quicksort
category: algorithms
difficulty: easy
estimated_time: 180
description: Implement an in-place quicksort.
weights:
  correctness: 40
  speed: 25
  cost: 15
  autonomy: 12
  code_quality: 8
cost_budget:
  agentX: 0.05
  default: 0.10
expected_outputs:
  - path: quicksort.py
    type: source
autonomy_criteria:
  max_retries: 2
  max_tool_calls: 20
  error_recovery: true
"#;

    /// Writes a task directory with the given manifest and prompt.
    pub fn write_task(root: &Path, dir_name: &str, manifest: &str, prompt: &str) -> std::path::PathBuf {
        let dir = root.join(dir_name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("task.yaml"), manifest).unwrap();
        fs::write(dir.join("prompt.md"), prompt).unwrap();
        dir
    }
}
