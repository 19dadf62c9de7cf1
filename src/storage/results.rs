//! SQLite-backed, append-only store of benchmark results.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, StoreError};
use crate::runner::result::{BenchmarkResult, VerificationOutcome};
use crate::scoring::ScoredResult;
use crate::task::Task;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS benchmark_results (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,

    -- Identification
    run_id          TEXT    NOT NULL,
    trial           INTEGER NOT NULL,
    task_name       TEXT    NOT NULL,
    task_category   TEXT    NOT NULL,
    task_difficulty TEXT    NOT NULL,
    agent_name      TEXT    NOT NULL,
    agent_version   TEXT,

    -- Scores (correctness and overall are NULL for incomplete pairings)
    score_correctness  REAL,
    score_speed        REAL NOT NULL,
    score_cost         REAL NOT NULL,
    score_autonomy     REAL NOT NULL,
    score_code_quality REAL NOT NULL,
    overall            REAL,
    incomplete         INTEGER NOT NULL,

    -- Raw metrics
    success         INTEGER NOT NULL,
    wall_time       REAL    NOT NULL,
    cost            REAL    NOT NULL,
    budgeted_cost   REAL,
    input_tokens    INTEGER NOT NULL,
    output_tokens   INTEGER NOT NULL,
    retries         INTEGER NOT NULL,
    tool_calls      INTEGER NOT NULL,
    error_recovered INTEGER NOT NULL,

    -- Test counts
    tests_total     INTEGER,
    tests_passed    INTEGER,
    tests_failed    INTEGER,

    -- Artifacts
    recording_path  TEXT,
    generated_files TEXT    NOT NULL DEFAULT '[]',
    logs            TEXT    NOT NULL DEFAULT '',

    error           TEXT,
    notes           TEXT,
    created_at      TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_run ON benchmark_results(run_id);
CREATE INDEX IF NOT EXISTS idx_results_task_agent ON benchmark_results(task_name, agent_name);
CREATE INDEX IF NOT EXISTS idx_results_agent_category ON benchmark_results(agent_name, task_category);

CREATE TRIGGER IF NOT EXISTS benchmark_results_no_update
BEFORE UPDATE ON benchmark_results
BEGIN
    SELECT RAISE(ABORT, 'benchmark_results is append-only');
END;

CREATE TRIGGER IF NOT EXISTS benchmark_results_no_delete
BEFORE DELETE ON benchmark_results
BEGIN
    SELECT RAISE(ABORT, 'benchmark_results is append-only');
END;
"#;

/// One persisted row: a scored pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub run_id: String,
    pub trial: u32,
    pub task_name: String,
    pub task_category: String,
    pub task_difficulty: String,
    pub agent_name: String,
    pub agent_version: Option<String>,

    pub score_correctness: Option<f64>,
    pub score_speed: f64,
    pub score_cost: f64,
    pub score_autonomy: f64,
    pub score_code_quality: f64,
    pub overall: Option<f64>,
    pub incomplete: bool,

    pub success: bool,
    pub wall_time: f64,
    pub cost: f64,
    pub budgeted_cost: Option<f64>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub retries: u32,
    pub tool_calls: u32,
    pub error_recovered: bool,

    pub tests_total: Option<u32>,
    pub tests_passed: Option<u32>,
    pub tests_failed: Option<u32>,

    pub recording_path: Option<String>,
    pub generated_files: Vec<String>,
    pub logs: String,

    pub error: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ResultRecord {
    /// Assembles the row for a scored pairing.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        run_id: &str,
        trial: u32,
        task: &Task,
        agent_name: &str,
        agent_version: Option<String>,
        result: &BenchmarkResult,
        verification: &VerificationOutcome,
        scored: &ScoredResult,
    ) -> Self {
        let notes = if verification.missing_outputs.is_empty() {
            None
        } else {
            Some(format!(
                "missing expected outputs: {}",
                verification.missing_outputs.join(", ")
            ))
        };

        Self {
            run_id: run_id.to_string(),
            trial,
            task_name: task.name.clone(),
            task_category: task.category.clone(),
            task_difficulty: task.difficulty.to_string(),
            agent_name: agent_name.to_string(),
            agent_version,

            score_correctness: scored.scores.correctness,
            score_speed: scored.scores.speed,
            score_cost: scored.scores.cost,
            score_autonomy: scored.scores.autonomy,
            score_code_quality: scored.scores.code_quality,
            overall: scored.overall,
            incomplete: scored.incomplete,

            success: result.success,
            wall_time: result.wall_time,
            cost: result.cost,
            budgeted_cost: task.budget_for(agent_name),
            input_tokens: result.token_count.input,
            output_tokens: result.token_count.output,
            retries: result.retries,
            tool_calls: result.tool_calls,
            error_recovered: result.error_recovered,

            tests_total: verification.tests.map(|t| t.total),
            tests_passed: verification.tests.map(|t| t.passed),
            tests_failed: verification.tests.map(|t| t.failed),

            recording_path: result.recording_path.clone(),
            generated_files: result.generated_files.clone(),
            logs: result.logs.clone(),

            error: result.error.clone(),
            notes,
            // Stored with microsecond precision.
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}

/// Bounded exponential backoff for result writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay after the first failure; doubled after each further failure.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `n + 1`, given `n` failures so far.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

/// Per-(task, agent) averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAgentAverage {
    pub task_name: String,
    pub task_category: String,
    pub agent_name: String,
    pub runs: u32,
    pub success_rate: f64,
    pub avg_overall: Option<f64>,
    pub avg_correctness: Option<f64>,
    pub avg_speed: f64,
    pub avg_cost_score: f64,
    pub avg_autonomy: f64,
    pub avg_code_quality: f64,
    pub avg_cost: f64,
    pub avg_wall_time: f64,
}

/// Per-(agent, category) strength profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCategoryProfile {
    pub agent_name: String,
    pub category: String,
    pub runs: u32,
    pub success_rate: f64,
    pub avg_overall: Option<f64>,
    pub avg_correctness: Option<f64>,
    pub avg_speed: f64,
    pub avg_cost_score: f64,
    pub avg_autonomy: f64,
    pub avg_code_quality: f64,
    pub avg_cost: f64,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pairings: u32,
    pub successes: u32,
    pub agents: u32,
    pub tasks: u32,
    pub avg_overall: Option<f64>,
    pub total_cost: f64,
}

/// Append-only results store.
#[derive(Clone)]
pub struct ResultsStore {
    pool: SqlitePool,
    /// Serializes row inserts across concurrent pairings.
    write_lock: Arc<Mutex<()>>,
}

impl ResultsStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        info!(path = %path.display(), "Results store opened");
        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Closes the connection pool. Later calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Inserts one row and returns its id.
    pub async fn append(&self, r: &ResultRecord) -> Result<i64, StoreError> {
        let generated_files = serde_json::to_string(&r.generated_files)?;
        let _guard = self.write_lock.lock().await;

        let done = sqlx::query(
            "INSERT INTO benchmark_results (
                run_id, trial, task_name, task_category, task_difficulty,
                agent_name, agent_version,
                score_correctness, score_speed, score_cost, score_autonomy,
                score_code_quality, overall, incomplete,
                success, wall_time, cost, budgeted_cost, input_tokens, output_tokens,
                retries, tool_calls, error_recovered,
                tests_total, tests_passed, tests_failed,
                recording_path, generated_files, logs,
                error, notes, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32)",
        )
        .bind(&r.run_id)
        .bind(i64::from(r.trial))
        .bind(&r.task_name)
        .bind(&r.task_category)
        .bind(&r.task_difficulty)
        .bind(&r.agent_name)
        .bind(&r.agent_version)
        .bind(r.score_correctness)
        .bind(r.score_speed)
        .bind(r.score_cost)
        .bind(r.score_autonomy)
        .bind(r.score_code_quality)
        .bind(r.overall)
        .bind(r.incomplete)
        .bind(r.success)
        .bind(r.wall_time)
        .bind(r.cost)
        .bind(r.budgeted_cost)
        .bind(to_i64(r.input_tokens))
        .bind(to_i64(r.output_tokens))
        .bind(i64::from(r.retries))
        .bind(i64::from(r.tool_calls))
        .bind(r.error_recovered)
        .bind(r.tests_total.map(i64::from))
        .bind(r.tests_passed.map(i64::from))
        .bind(r.tests_failed.map(i64::from))
        .bind(&r.recording_path)
        .bind(generated_files)
        .bind(&r.logs)
        .bind(&r.error)
        .bind(&r.notes)
        .bind(format_timestamp(&r.created_at))
        .execute(&self.pool)
        .await?;

        let id = done.last_insert_rowid();
        debug!(id, run_id = %r.run_id, agent = %r.agent_name, task = %r.task_name, "Result appended");
        Ok(id)
    }

    /// Appends with bounded exponential backoff.
    pub async fn append_with_retry(
        &self,
        record: &ResultRecord,
        policy: RetryPolicy,
    ) -> Result<i64, PersistenceError> {
        let attempts = policy.attempts.max(1);
        let mut failures = 0;

        loop {
            match self.append(record).await {
                Ok(id) => return Ok(id),
                Err(e) => {
                    failures += 1;
                    if failures >= attempts {
                        return Err(PersistenceError {
                            attempts: failures,
                            last: e,
                        });
                    }
                    let delay = policy.backoff(failures);
                    warn!(
                        agent = %record.agent_name,
                        task = %record.task_name,
                        attempt = failures,
                        error = %e,
                        "Result write failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Every row of a run, in insertion order.
    pub async fn records_for_run(&self, run_id: &str) -> Result<Vec<ResultRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM benchmark_results WHERE run_id = ?1 ORDER BY id")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM benchmark_results")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n").max(0) as u64)
    }

    /// Averages per (task, agent).
    pub async fn task_agent_averages(&self) -> Result<Vec<TaskAgentAverage>, StoreError> {
        let rows = sqlx::query(
            "SELECT task_name, MAX(task_category) AS task_category, agent_name,
                    COUNT(*) AS runs,
                    AVG(success) AS success_rate,
                    AVG(overall) AS avg_overall,
                    AVG(score_correctness) AS avg_correctness,
                    AVG(score_speed) AS avg_speed,
                    AVG(score_cost) AS avg_cost_score,
                    AVG(score_autonomy) AS avg_autonomy,
                    AVG(score_code_quality) AS avg_code_quality,
                    AVG(cost) AS avg_cost,
                    AVG(wall_time) AS avg_wall_time
             FROM benchmark_results
             GROUP BY task_name, agent_name
             ORDER BY task_name, agent_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TaskAgentAverage {
                task_name: row.get("task_name"),
                task_category: row.get("task_category"),
                agent_name: row.get("agent_name"),
                runs: row.get::<i64, _>("runs") as u32,
                success_rate: row.get::<Option<f64>, _>("success_rate").unwrap_or(0.0),
                avg_overall: row.get("avg_overall"),
                avg_correctness: row.get("avg_correctness"),
                avg_speed: row.get::<Option<f64>, _>("avg_speed").unwrap_or(0.0),
                avg_cost_score: row.get::<Option<f64>, _>("avg_cost_score").unwrap_or(0.0),
                avg_autonomy: row.get::<Option<f64>, _>("avg_autonomy").unwrap_or(0.0),
                avg_code_quality: row.get::<Option<f64>, _>("avg_code_quality").unwrap_or(0.0),
                avg_cost: row.get::<Option<f64>, _>("avg_cost").unwrap_or(0.0),
                avg_wall_time: row.get::<Option<f64>, _>("avg_wall_time").unwrap_or(0.0),
            })
            .collect())
    }

    /// Averages per (agent, category).
    pub async fn agent_category_profile(&self) -> Result<Vec<AgentCategoryProfile>, StoreError> {
        let rows = sqlx::query(
            "SELECT agent_name, task_category,
                    COUNT(*) AS runs,
                    AVG(success) AS success_rate,
                    AVG(overall) AS avg_overall,
                    AVG(score_correctness) AS avg_correctness,
                    AVG(score_speed) AS avg_speed,
                    AVG(score_cost) AS avg_cost_score,
                    AVG(score_autonomy) AS avg_autonomy,
                    AVG(score_code_quality) AS avg_code_quality,
                    AVG(cost) AS avg_cost
             FROM benchmark_results
             GROUP BY agent_name, task_category
             ORDER BY agent_name, task_category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AgentCategoryProfile {
                agent_name: row.get("agent_name"),
                category: row.get("task_category"),
                runs: row.get::<i64, _>("runs") as u32,
                success_rate: row.get::<Option<f64>, _>("success_rate").unwrap_or(0.0),
                avg_overall: row.get("avg_overall"),
                avg_correctness: row.get("avg_correctness"),
                avg_speed: row.get::<Option<f64>, _>("avg_speed").unwrap_or(0.0),
                avg_cost_score: row.get::<Option<f64>, _>("avg_cost_score").unwrap_or(0.0),
                avg_autonomy: row.get::<Option<f64>, _>("avg_autonomy").unwrap_or(0.0),
                avg_code_quality: row.get::<Option<f64>, _>("avg_code_quality").unwrap_or(0.0),
                avg_cost: row.get::<Option<f64>, _>("avg_cost").unwrap_or(0.0),
            })
            .collect())
    }

    /// The `limit` most recent runs, newest first.
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT run_id,
                    MIN(created_at) AS started_at,
                    MAX(created_at) AS finished_at,
                    COUNT(*) AS pairings,
                    SUM(success) AS successes,
                    COUNT(DISTINCT agent_name) AS agents,
                    COUNT(DISTINCT task_name) AS tasks,
                    AVG(overall) AS avg_overall,
                    SUM(cost) AS total_cost
             FROM benchmark_results
             GROUP BY run_id
             ORDER BY MAX(created_at) DESC, MAX(id) DESC
             LIMIT ?1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RunSummary {
                    run_id: row.get("run_id"),
                    started_at: parse_timestamp("started_at", row.get("started_at"))?,
                    finished_at: parse_timestamp("finished_at", row.get("finished_at"))?,
                    pairings: row.get::<i64, _>("pairings") as u32,
                    successes: row.get::<Option<i64>, _>("successes").unwrap_or(0) as u32,
                    agents: row.get::<i64, _>("agents") as u32,
                    tasks: row.get::<i64, _>("tasks") as u32,
                    avg_overall: row.get("avg_overall"),
                    total_cost: row.get::<Option<f64>, _>("total_cost").unwrap_or(0.0),
                })
            })
            .collect()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<ResultRecord, StoreError> {
    let generated_files: String = row.get("generated_files");
    let generated_files: Vec<String> =
        serde_json::from_str(&generated_files).map_err(|e| StoreError::InvalidRow {
            column: "generated_files".to_string(),
            message: e.to_string(),
        })?;

    Ok(ResultRecord {
        run_id: row.get("run_id"),
        trial: row.get::<i64, _>("trial") as u32,
        task_name: row.get("task_name"),
        task_category: row.get("task_category"),
        task_difficulty: row.get("task_difficulty"),
        agent_name: row.get("agent_name"),
        agent_version: row.get("agent_version"),

        score_correctness: row.get("score_correctness"),
        score_speed: row.get("score_speed"),
        score_cost: row.get("score_cost"),
        score_autonomy: row.get("score_autonomy"),
        score_code_quality: row.get("score_code_quality"),
        overall: row.get("overall"),
        incomplete: row.get::<i64, _>("incomplete") != 0,

        success: row.get::<i64, _>("success") != 0,
        wall_time: row.get("wall_time"),
        cost: row.get("cost"),
        budgeted_cost: row.get("budgeted_cost"),
        input_tokens: row.get::<i64, _>("input_tokens").max(0) as u64,
        output_tokens: row.get::<i64, _>("output_tokens").max(0) as u64,
        retries: row.get::<i64, _>("retries") as u32,
        tool_calls: row.get::<i64, _>("tool_calls") as u32,
        error_recovered: row.get::<i64, _>("error_recovered") != 0,

        tests_total: row.get::<Option<i64>, _>("tests_total").map(|v| v as u32),
        tests_passed: row.get::<Option<i64>, _>("tests_passed").map(|v| v as u32),
        tests_failed: row.get::<Option<i64>, _>("tests_failed").map(|v| v as u32),

        recording_path: row.get("recording_path"),
        generated_files,
        logs: row.get("logs"),

        error: row.get("error"),
        notes: row.get("notes"),
        created_at: parse_timestamp("created_at", row.get("created_at"))?,
    })
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidRow {
            column: column.to_string(),
            message: format!("'{}': {}", value, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::result::TestCounts;
    use crate::scoring::score_pairing;
    use crate::task::manifest::fixtures::quicksort;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, ResultsStore) {
        let temp = TempDir::new().unwrap();
        let store = ResultsStore::open(&temp.path().join("results.db")).await.unwrap();
        (temp, store)
    }

    fn record(run_id: &str, agent: &str, tests: Option<TestCounts>, cost: f64) -> ResultRecord {
        let task = quicksort();
        let result = BenchmarkResult::success(90.0)
            .with_cost(cost)
            .with_tool_calls(10)
            .with_generated_files(vec!["quicksort.py".to_string()]);
        let verification = VerificationOutcome {
            tests,
            code_quality: Some(80.0),
            missing_outputs: Vec::new(),
        };
        let scored = score_pairing(&task, agent, &result, &verification);
        ResultRecord::build(run_id, 1, &task, agent, Some("1.0".to_string()), &result, &verification, &scored)
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let (_temp, store) = open_temp().await;
        let rec = record("run-1", "agentX", Some(TestCounts::new(10, 0)), 0.03);

        let id = store.append(&rec).await.unwrap();
        assert!(id > 0);

        let rows = store.records_for_run("run-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], rec);
        assert!(store.records_for_run("run-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_row_average_round_trip() {
        let (_temp, store) = open_temp().await;
        let rec = record("run-1", "agentX", Some(TestCounts::new(10, 0)), 0.03);
        store.append(&rec).await.unwrap();

        let averages = store.task_agent_averages().await.unwrap();
        assert_eq!(averages.len(), 1);
        let avg = &averages[0];
        assert_eq!(avg.runs, 1);
        assert_eq!(avg.avg_overall, rec.overall);
        assert_eq!(avg.avg_correctness, rec.score_correctness);
        assert_eq!(avg.avg_speed, rec.score_speed);
        assert_eq!(avg.avg_cost, rec.cost);
        assert_eq!(avg.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_incomplete_rows_do_not_skew_averages() {
        let (_temp, store) = open_temp().await;
        let complete = record("run-1", "agentX", Some(TestCounts::new(10, 0)), 0.03);
        let incomplete = record("run-1", "agentX", None, 0.03);
        assert!(incomplete.incomplete);
        assert_eq!(incomplete.overall, None);

        store.append(&complete).await.unwrap();
        store.append(&incomplete).await.unwrap();

        let avg = &store.task_agent_averages().await.unwrap()[0];
        assert_eq!(avg.runs, 2);
        assert_eq!(avg.avg_overall, complete.overall);
        assert_eq!(avg.avg_correctness, Some(100.0));
    }

    #[tokio::test]
    async fn test_agent_category_profile() {
        let (_temp, store) = open_temp().await;
        store.append(&record("run-1", "agentX", Some(TestCounts::new(10, 0)), 0.03)).await.unwrap();
        store.append(&record("run-1", "agentY", Some(TestCounts::new(5, 5)), 0.03)).await.unwrap();

        let profile = store.agent_category_profile().await.unwrap();
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[0].agent_name, "agentX");
        assert_eq!(profile[0].category, "algorithms");
        assert_eq!(profile[1].avg_correctness, Some(50.0));
    }

    #[tokio::test]
    async fn test_recent_runs_newest_first() {
        let (_temp, store) = open_temp().await;
        let mut old = record("run-old", "agentX", Some(TestCounts::new(10, 0)), 0.03);
        old.created_at = Utc::now() - chrono::Duration::hours(1);
        store.append(&old).await.unwrap();
        store.append(&record("run-new", "agentX", Some(TestCounts::new(10, 0)), 0.03)).await.unwrap();
        store.append(&record("run-new", "agentY", Some(TestCounts::new(10, 0)), 0.02)).await.unwrap();

        let runs = store.recent_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, "run-new");
        assert_eq!(runs[0].pairings, 2);
        assert_eq!(runs[0].agents, 2);
        assert!((runs[0].total_cost - 0.05).abs() < 1e-12);
        assert_eq!(runs[1].run_id, "run-old");

        assert_eq!(store.recent_runs(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rows_cannot_be_updated_or_deleted() {
        let (_temp, store) = open_temp().await;
        store.append(&record("run-1", "agentX", None, 0.03)).await.unwrap();

        assert!(sqlx::query("UPDATE benchmark_results SET cost = 0").execute(&store.pool).await.is_err());
        assert!(sqlx::query("DELETE FROM benchmark_results").execute(&store.pool).await.is_err());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_with_retry_gives_up() {
        let (_temp, store) = open_temp().await;
        store.close().await;

        let policy = RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::from_millis(1),
        };
        let err = store
            .append_with_retry(&record("run-1", "agentX", None, 0.03), policy)
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 3);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            attempts: 4,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }
}
