//! Per-pairing working directories.
//!
//! Every (agent, task, trial) pairing runs in its own directory under
//! `workspace_root/<run>/<agent>/<task>/trial-<n>`, seeded with a copy of the
//! task's fixture files. The manifest stays hidden from the agent.
//!
//! Copying, listing and removal are blocking filesystem calls. Async callers
//! use the `*_async` variants, which run them on the blocking pool.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::task::{Task, MANIFEST_FILES};

/// Error types for workspace operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy task files into {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove workspace {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace task did not complete: {0}")]
    Join(String),
}

fn join_err(e: tokio::task::JoinError) -> WorkspaceError {
    WorkspaceError::Join(e.to_string())
}

/// Joins `relative` onto `root` when it names a path inside `root`.
///
/// Absolute paths and `..` components are refused.
pub fn join_inside(root: &Path, relative: &str) -> Option<PathBuf> {
    let rel = Path::new(relative);
    let mut parts = 0;
    for component in rel.components() {
        match component {
            Component::Normal(_) => parts += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (parts > 0).then(|| root.join(rel))
}

/// An isolated working directory for one pairing.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub path: PathBuf,
    pub agent: String,
    pub task: String,
    pub trial: u32,
    /// Files seeded from the task directory, relative to `path`.
    seeded: HashSet<String>,
}

impl Workspace {
    /// Directory a pairing's workspace lives in.
    pub fn path_for(root: &Path, run_id: &str, agent: &str, task: &str, trial: u32) -> PathBuf {
        root.join(run_id)
            .join(sanitize(agent))
            .join(sanitize(task))
            .join(format!("trial-{}", trial))
    }

    /// Creates the workspace and copies the task's fixture files into it.
    pub fn create(
        root: &Path,
        run_id: &str,
        agent: &str,
        task: &Task,
        trial: u32,
    ) -> Result<Self, WorkspaceError> {
        let path = Self::path_for(root, run_id, agent, &task.name, trial);

        fs::create_dir_all(&path).map_err(|source| WorkspaceError::Create {
            path: path.clone(),
            source,
        })?;

        let mut seeded = HashSet::new();
        if task.dir.is_dir() {
            copy_task_files(&task.dir, &path, &path, &mut seeded).map_err(|source| {
                WorkspaceError::Copy {
                    path: path.clone(),
                    source,
                }
            })?;
        }

        debug!(
            workspace = %path.display(),
            files = seeded.len(),
            "Workspace ready"
        );

        Ok(Self {
            path,
            agent: agent.to_string(),
            task: task.name.clone(),
            trial,
            seeded,
        })
    }

    /// [`Workspace::create`] on the blocking pool.
    pub async fn create_async(
        root: &Path,
        run_id: &str,
        agent: &str,
        task: Arc<Task>,
        trial: u32,
    ) -> Result<Self, WorkspaceError> {
        let root = root.to_path_buf();
        let run_id = run_id.to_string();
        let agent = agent.to_string();
        tokio::task::spawn_blocking(move || Self::create(&root, &run_id, &agent, &task, trial))
            .await
            .map_err(join_err)?
    }

    /// [`Workspace::generated_files`] on the blocking pool.
    pub async fn generated_files_async(&self) -> Vec<String> {
        let workspace = self.clone();
        tokio::task::spawn_blocking(move || workspace.generated_files())
            .await
            .unwrap_or_else(|e| {
                warn!(workspace = %self.path.display(), error = %e, "Listing generated files failed");
                Vec::new()
            })
    }

    /// [`Workspace::remove`] on the blocking pool.
    pub async fn remove_async(&self) -> Result<(), WorkspaceError> {
        let workspace = self.clone();
        tokio::task::spawn_blocking(move || workspace.remove())
            .await
            .map_err(join_err)?
    }

    /// Files present now that were not seeded from the task, sorted.
    ///
    /// Dotfiles and anything under a dot-directory are ignored.
    pub fn generated_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        collect_files(&self.path, &self.path, &mut files);
        let mut created: Vec<String> = files
            .into_iter()
            .filter(|f| !self.seeded.contains(f))
            .filter(|f| !f.split('/').any(|part| part.starts_with('.')))
            .collect();
        created.sort();
        created
    }

    /// Deletes the workspace directory.
    pub fn remove(&self) -> Result<(), WorkspaceError> {
        if !self.path.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&self.path).map_err(|source| WorkspaceError::Remove {
            path: self.path.clone(),
            source,
        })
    }
}

/// Recursively copies a task directory, skipping manifests at the top level.
fn copy_task_files(
    src: &Path,
    dst: &Path,
    base: &Path,
    seeded: &mut HashSet<String>,
) -> std::io::Result<()> {
    let top_level = dst == base;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let dest_path = dst.join(&name);

        if top_level {
            if let Some(name) = name.to_str() {
                if MANIFEST_FILES.contains(&name) {
                    continue;
                }
            }
        }

        if path.is_dir() {
            fs::create_dir_all(&dest_path)?;
            copy_task_files(&path, &dest_path, base, seeded)?;
        } else {
            fs::copy(&path, &dest_path)?;
            if let Ok(rel) = dest_path.strip_prefix(base) {
                seeded.insert(relative_string(rel));
            }
        }
    }

    Ok(())
}

fn collect_files(dir: &Path, base: &Path, files: &mut Vec<String>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot list workspace directory");
            return;
        }
    };

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.is_file() {
            if let Ok(rel) = path.strip_prefix(base) {
                files.push(relative_string(rel));
            }
        } else if path.is_dir() {
            collect_files(&path, base, files);
        }
    }
}

fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Keeps a name usable as a single path component.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::manifest::fixtures::quicksort;
    use tempfile::TempDir;

    fn task_in(dir: &Path) -> Task {
        fs::create_dir_all(dir.join("tests")).unwrap();
        fs::write(dir.join("task.yaml"), "name: quicksort").unwrap();
        fs::write(dir.join("prompt.md"), "Sort it").unwrap();
        fs::write(dir.join("tests/test_sort.py"), "def test(): pass").unwrap();
        let mut task = quicksort();
        task.dir = dir.to_path_buf();
        task
    }

    #[test]
    fn test_path_layout() {
        let path = Workspace::path_for(Path::new("/ws"), "run-1", "claude code", "quicksort", 2);
        assert_eq!(path, PathBuf::from("/ws/run-1/claude_code/quicksort/trial-2"));
    }

    #[test]
    fn test_create_copies_fixtures_but_hides_manifest() {
        let temp = TempDir::new().unwrap();
        let task = task_in(&temp.path().join("task"));
        let root = temp.path().join("ws");

        let ws = Workspace::create(&root, "run-1", "agentX", &task, 1).unwrap();
        assert!(ws.path.join("prompt.md").exists());
        assert!(ws.path.join("tests/test_sort.py").exists());
        assert!(!ws.path.join("task.yaml").exists());
        assert!(ws.generated_files().is_empty());
    }

    #[test]
    fn test_generated_files() {
        let temp = TempDir::new().unwrap();
        let task = task_in(&temp.path().join("task"));
        let ws = Workspace::create(&temp.path().join("ws"), "run-1", "agentX", &task, 1).unwrap();

        fs::write(ws.path.join("quicksort.py"), "def quicksort(): ...").unwrap();
        fs::create_dir_all(ws.path.join("src")).unwrap();
        fs::write(ws.path.join("src/util.py"), "").unwrap();
        fs::create_dir_all(ws.path.join(".cache")).unwrap();
        fs::write(ws.path.join(".cache/blob"), "").unwrap();

        assert_eq!(ws.generated_files(), vec!["quicksort.py", "src/util.py"]);
    }

    #[test]
    fn test_join_inside_refuses_escapes() {
        let root = Path::new("/ws/run/agent/task/trial-1");
        assert_eq!(join_inside(root, "src/lib.rs"), Some(root.join("src/lib.rs")));
        assert_eq!(join_inside(root, "./out.txt"), Some(root.join("./out.txt")));
        assert_eq!(join_inside(root, "../escape.py"), None);
        assert_eq!(join_inside(root, "src/../../escape.py"), None);
        assert_eq!(join_inside(root, "/etc/passwd"), None);
        assert_eq!(join_inside(root, ""), None);
        assert_eq!(join_inside(root, "."), None);
    }

    #[tokio::test]
    async fn test_async_lifecycle() {
        let temp = TempDir::new().unwrap();
        let task = Arc::new(task_in(&temp.path().join("task")));
        let ws = Workspace::create_async(&temp.path().join("ws"), "run-1", "agentX", task, 1)
            .await
            .unwrap();
        assert!(ws.path.join("tests/test_sort.py").exists());

        fs::write(ws.path.join("quicksort.py"), "").unwrap();
        assert_eq!(ws.generated_files_async().await, vec!["quicksort.py"]);

        ws.remove_async().await.unwrap();
        assert!(!ws.path.exists());
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let task = task_in(&temp.path().join("task"));
        let ws = Workspace::create(&temp.path().join("ws"), "run-1", "agentX", &task, 1).unwrap();

        ws.remove().unwrap();
        assert!(!ws.path.exists());
        ws.remove().unwrap();
    }
}
