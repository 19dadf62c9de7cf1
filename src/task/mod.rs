//! Benchmark tasks: the manifest model, loading from disk, and selection.

pub mod loader;
pub mod manifest;

pub use loader::{discover, load, load_all, TaskLoadFailure, MANIFEST_FILES, PROMPT_FILE};
pub use manifest::{
    AutonomyCriteria, Difficulty, Dimension, ExpectedOutput, Task, Weights, DEFAULT_BUDGET_KEY,
};

use crate::error::ConfigError;

/// Filter applied to the loaded task corpus before a batch runs.
///
/// An empty selection keeps every task.
#[derive(Debug, Clone, Default)]
pub struct TaskSelection {
    /// Task names to keep. Empty means all.
    pub names: Vec<String>,
    /// Category to keep.
    pub category: Option<String>,
}

impl TaskSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Applies the selection. Requested names absent from `tasks` are an error.
    ///
    /// `known_failed` lists names that exist on disk but failed to load; they
    /// are not reported as unknown since the load failure is surfaced separately.
    pub fn apply(&self, tasks: Vec<Task>, known_failed: &[String]) -> Result<Vec<Task>, ConfigError> {
        for name in &self.names {
            if !tasks.iter().any(|t| &t.name == name) && !known_failed.contains(name) {
                return Err(ConfigError::UnknownTask(name.clone()));
            }
        }

        let selected: Vec<Task> = tasks
            .into_iter()
            .filter(|t| self.names.is_empty() || self.names.contains(&t.name))
            .filter(|t| {
                self.category
                    .as_deref()
                    .map(|c| t.category.eq_ignore_ascii_case(c))
                    .unwrap_or(true)
            })
            .collect();

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::manifest::fixtures::quicksort;
    use super::*;

    fn corpus() -> Vec<Task> {
        let mut lru = quicksort();
        lru.name = "lru_cache".to_string();
        lru.category = "data_structures".to_string();
        vec![quicksort(), lru]
    }

    #[test]
    fn test_empty_selection_keeps_all() {
        let tasks = TaskSelection::all().apply(corpus(), &[]).unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn test_select_by_name_and_category() {
        let tasks = TaskSelection::all()
            .with_names(vec!["lru_cache".to_string()])
            .apply(corpus(), &[])
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "lru_cache");

        let tasks = TaskSelection::all()
            .with_category("Algorithms")
            .apply(corpus(), &[])
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "quicksort");
    }

    #[test]
    fn test_unknown_task_is_config_error() {
        let err = TaskSelection::all()
            .with_names(vec!["fizzbuzz".to_string()])
            .apply(corpus(), &[])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTask(name) if name == "fizzbuzz"));
    }

    #[test]
    fn test_failed_task_is_not_unknown() {
        let tasks = TaskSelection::all()
            .with_names(vec!["broken".to_string()])
            .apply(corpus(), &["broken".to_string()])
            .unwrap();
        assert!(tasks.is_empty());
    }
}
