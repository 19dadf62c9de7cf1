//! Batch execution: expands agents × tasks × trials into pairings and runs
//! each one through its full lifecycle under a global concurrency limit.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::agents::{AgentAdapter, AgentRegistry};
use super::result::BenchmarkResult;
use super::verifier::Verifier;
use super::workspace::Workspace;
use crate::config::BenchConfig;
use crate::error::ConfigError;
use crate::metrics::{MetricsCollector, PairingStatus};
use crate::scoring::score_pairing;
use crate::storage::{ResultRecord, ResultsStore};
use crate::task::{Task, TaskLoadFailure};

/// Identifier shared by every row of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One (agent, task, trial) unit of work.
#[derive(Debug, Clone)]
pub struct Pairing {
    pub agent: String,
    pub task: Arc<Task>,
    pub trial: u32,
}

/// Expands the agent × task × trial product, agent-major.
pub fn plan(agents: &[String], tasks: &[Task], trials: u32) -> Vec<Pairing> {
    let tasks: Vec<Arc<Task>> = tasks.iter().cloned().map(Arc::new).collect();
    let mut pairings = Vec::with_capacity(agents.len() * tasks.len() * trials as usize);
    for agent in agents {
        for task in &tasks {
            for trial in 1..=trials.max(1) {
                pairings.push(Pairing {
                    agent: agent.clone(),
                    task: Arc::clone(task),
                    trial,
                });
            }
        }
    }
    pairings
}

/// Lifecycle step in which an infrastructure failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Workspace,
    Setup,
    Execute,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Workspace => "workspace",
            Self::Setup => "setup",
            Self::Execute => "execute",
            Self::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// A pairing that never produced a scorable result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraFailure {
    pub agent: String,
    pub task: String,
    pub trial: u32,
    pub phase: Phase,
    pub reason: String,
}

/// Final state of one pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairingOutcome {
    Scored(Box<ResultRecord>),
    InfraFailure(InfraFailure),
}

impl PairingOutcome {
    pub fn agent(&self) -> &str {
        match self {
            Self::Scored(r) => &r.agent_name,
            Self::InfraFailure(f) => &f.agent,
        }
    }

    pub fn task(&self) -> &str {
        match self {
            Self::Scored(r) => &r.task_name,
            Self::InfraFailure(f) => &f.task,
        }
    }

    pub fn record(&self) -> Option<&ResultRecord> {
        match self {
            Self::Scored(r) => Some(r),
            Self::InfraFailure(_) => None,
        }
    }
}

/// Everything a batch produced, in pairing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<PairingOutcome>,
    /// Tasks skipped because they failed to load.
    pub load_failures: Vec<TaskLoadFailure>,
    /// Records that could not be persisted; they remain in `outcomes`.
    pub persistence_warnings: Vec<String>,
}

impl BatchReport {
    pub fn with_load_failures(mut self, failures: Vec<TaskLoadFailure>) -> Self {
        self.load_failures = failures;
        self
    }

    pub fn records(&self) -> impl Iterator<Item = &ResultRecord> {
        self.outcomes.iter().filter_map(PairingOutcome::record)
    }

    pub fn infra_failures(&self) -> impl Iterator<Item = &InfraFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            PairingOutcome::InfraFailure(f) => Some(f),
            PairingOutcome::Scored(_) => None,
        })
    }

    pub fn scored_count(&self) -> usize {
        self.records().count()
    }

    pub fn success_count(&self) -> usize {
        self.records().filter(|r| r.success).count()
    }

    pub fn infra_failure_count(&self) -> usize {
        self.infra_failures().count()
    }

    /// Whether any selected task failed to load.
    pub fn has_load_failures(&self) -> bool {
        !self.load_failures.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Drives pairings through setup, execution, verification, cleanup,
/// scoring and persistence.
pub struct Coordinator {
    config: BenchConfig,
    registry: AgentRegistry,
    store: Option<ResultsStore>,
    verifier: Verifier,
    metrics: MetricsCollector,
}

impl Coordinator {
    pub fn new(config: BenchConfig, registry: AgentRegistry) -> Self {
        let verifier = Verifier::new(config.verify_timeout);
        Self {
            config,
            registry,
            store: None,
            verifier,
            metrics: MetricsCollector::new(),
        }
    }

    /// Persists every scored pairing into `store`.
    pub fn with_store(mut self, store: ResultsStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Runs every pairing of `agents` × `tasks`.
    ///
    /// An empty agent list selects every registered agent. Unknown agent
    /// names and an empty task list abort before anything executes.
    pub async fn run(&self, agents: &[String], tasks: &[Task]) -> Result<BatchReport, ConfigError> {
        let agents = self.registry.resolve(agents)?;
        if tasks.is_empty() {
            return Err(ConfigError::NoTasks);
        }

        let run_id = RunId::new();
        let started_at = Utc::now();
        let pairings = plan(&agents, tasks, self.config.trials);

        info!(
            run_id = %run_id,
            agents = agents.len(),
            tasks = tasks.len(),
            trials = self.config.trials,
            pairings = pairings.len(),
            max_concurrent = self.config.max_concurrent,
            "Starting batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let futures: Vec<_> = pairings
            .iter()
            .map(|pairing| {
                let sem = Arc::clone(&semaphore);
                let run_id = &run_id;
                async move {
                    let _permit = match sem.acquire().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            return (
                                infra(pairing, Phase::Workspace, format!("concurrency limiter closed: {}", e)),
                                None,
                            )
                        }
                    };
                    self.run_pairing(run_id, pairing).await
                }
            })
            .collect();

        let mut outcomes = Vec::with_capacity(pairings.len());
        let mut persistence_warnings = Vec::new();
        for (outcome, warning) in futures::future::join_all(futures).await {
            outcomes.push(outcome);
            persistence_warnings.extend(warning);
        }

        let report = BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            load_failures: Vec::new(),
            persistence_warnings,
        };

        info!(
            run_id = %report.run_id,
            scored = report.scored_count(),
            succeeded = report.success_count(),
            infra_failures = report.infra_failure_count(),
            persistence_warnings = report.persistence_warnings.len(),
            "Batch complete"
        );

        Ok(report)
    }

    /// Runs one pairing. Returns its outcome and, if the record could not be
    /// persisted, a warning.
    async fn run_pairing(&self, run_id: &RunId, pairing: &Pairing) -> (PairingOutcome, Option<String>) {
        let task = pairing.task.as_ref();
        let agent = pairing.agent.as_str();

        let mut adapter = match self.registry.create(agent) {
            Ok(adapter) => adapter,
            Err(e) => return (self.infra(pairing, Phase::Setup, e.to_string()), None),
        };

        let workspace = match Workspace::create_async(
            &self.config.workspace_root,
            run_id.as_str(),
            agent,
            Arc::clone(&pairing.task),
            pairing.trial,
        )
        .await
        {
            Ok(ws) => ws,
            Err(e) => return (self.infra(pairing, Phase::Workspace, e.to_string()), None),
        };

        info!(
            run_id = %run_id,
            agent = %agent,
            task = %task.name,
            trial = pairing.trial,
            workspace = %workspace.path.display(),
            "Pairing started"
        );

        let version = adapter.version().await;

        if let Err(e) = adapter.setup(&workspace, task).await {
            self.cleanup_quietly(adapter.as_mut(), pairing).await;
            self.discard_workspace(&workspace).await;
            return (self.infra(pairing, Phase::Setup, e.to_string()), None);
        }

        let timeout = self.config.timeout_for(task);
        let backstop = timeout.saturating_add(self.config.timeout_grace);
        let timer = Instant::now();

        let execution = AssertUnwindSafe(adapter.execute_task(&task.prompt, timeout)).catch_unwind();
        let mut result = match tokio::time::timeout(backstop, execution).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let reason = format!("adapter panicked: {}", panic_message(panic.as_ref()));
                self.cleanup_quietly(adapter.as_mut(), pairing).await;
                self.discard_workspace(&workspace).await;
                return (self.infra(pairing, Phase::Execute, reason), None);
            }
            Err(_) => {
                warn!(
                    agent = %agent,
                    task = %task.name,
                    trial = pairing.trial,
                    "Adapter ignored its timeout, abandoned after {:?}",
                    backstop
                );
                BenchmarkResult::timeout(timeout)
            }
        };

        debug!(
            agent = %agent,
            task = %task.name,
            elapsed = ?timer.elapsed(),
            reported = result.wall_time,
            "Execution finished"
        );

        if result.generated_files.is_empty() {
            result.generated_files = workspace.generated_files_async().await;
        }

        let verification = self.verifier.verify(task, &workspace.path).await;

        if let Err(e) = adapter.cleanup().await {
            self.discard_workspace(&workspace).await;
            return (self.infra(pairing, Phase::Cleanup, e.to_string()), None);
        }
        self.discard_workspace(&workspace).await;

        let scored = score_pairing(task, agent, &result, &verification);
        let record = ResultRecord::build(
            run_id.as_str(),
            pairing.trial,
            task,
            agent,
            version,
            &result,
            &verification,
            &scored,
        );

        let status = if result.success {
            PairingStatus::Success
        } else if result.is_timeout() {
            PairingStatus::Timeout
        } else {
            PairingStatus::Failure
        };
        self.metrics
            .record_pairing(agent, status, result.wall_time, scored.overall, result.cost);

        info!(
            run_id = %run_id,
            agent = %agent,
            task = %task.name,
            trial = pairing.trial,
            success = result.success,
            overall = ?scored.overall,
            incomplete = scored.incomplete,
            error = ?result.error,
            "Pairing scored"
        );

        let warning = match &self.store {
            Some(store) => match store.append_with_retry(&record, self.config.persist_policy()).await {
                Ok(_) => None,
                Err(e) => {
                    error!(agent = %agent, task = %task.name, trial = pairing.trial, error = %e, "Result not persisted");
                    Some(format!("{} / {} trial {}: {}", agent, task.name, pairing.trial, e))
                }
            },
            None => None,
        };

        (PairingOutcome::Scored(Box::new(record)), warning)
    }

    async fn cleanup_quietly(&self, adapter: &mut dyn AgentAdapter, pairing: &Pairing) {
        if let Err(e) = adapter.cleanup().await {
            warn!(
                agent = %pairing.agent,
                task = %pairing.task.name,
                error = %e,
                "Cleanup after failure also failed"
            );
        }
    }

    async fn discard_workspace(&self, workspace: &Workspace) {
        if self.config.keep_workspaces {
            return;
        }
        if let Err(e) = workspace.remove_async().await {
            warn!(workspace = %workspace.path.display(), error = %e, "Failed to remove workspace");
        }
    }

    fn infra(&self, pairing: &Pairing, phase: Phase, reason: String) -> PairingOutcome {
        self.metrics.record_infra_failure(&pairing.agent);
        warn!(
            agent = %pairing.agent,
            task = %pairing.task.name,
            trial = pairing.trial,
            phase = %phase,
            reason = %reason,
            "Pairing infrastructure failure"
        );
        infra(pairing, phase, reason)
    }
}

fn infra(pairing: &Pairing, phase: Phase, reason: String) -> PairingOutcome {
    PairingOutcome::InfraFailure(InfraFailure {
        agent: pairing.agent.clone(),
        task: pairing.task.name.clone(),
        trial: pairing.trial,
        phase,
        reason,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
