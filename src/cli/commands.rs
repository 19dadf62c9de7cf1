//! CLI command definitions for agent-bench.
//!
//! Commands run a batch of agents against the task corpus, list tasks, and
//! read rankings and run history back out of the results store.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::comparison::{self, GroupBy};
use crate::config::BenchConfig;
use crate::metrics::{export_metrics, init_metrics};
use crate::runner::{AgentRegistry, BatchReport, Coordinator, PairingOutcome};
use crate::storage::ResultsStore;
use crate::task::{self, TaskLoadFailure, TaskSelection};

/// Benchmark harness for autonomous coding agents.
#[derive(Parser, Debug)]
#[command(name = "agent-bench")]
#[command(about = "Run coding tasks against autonomous agents, then score and compare them")]
#[command(version)]
#[command(
    long_about = "agent-bench runs each selected agent on each selected task in an isolated workspace,\nverifies the result with the task's tests, scores it across correctness, speed, cost,\nautonomy and code quality, and stores every scored run in a local SQLite database.\n\nExample usage:\n  agent-bench run --agent claude-code --agent aider --category algorithms --trials 3\n  agent-bench compare --by category"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Root directory of the task corpus.
    #[arg(long, global = true)]
    pub tasks_dir: Option<PathBuf>,

    /// SQLite results database.
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// YAML file with agent definitions.
    #[arg(long, global = true)]
    pub agents_file: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// List the tasks in the corpus.
    #[command(alias = "ls")]
    List,

    /// Run agents against tasks and record the scored results.
    Run(RunArgs),

    /// Rank agents from recorded results.
    Compare(CompareArgs),

    /// Show the most recent runs.
    History(HistoryArgs),
}

/// Arguments for `agent-bench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Agent to run (repeatable). Defaults to every configured agent.
    #[arg(short, long = "agent")]
    pub agents: Vec<String>,

    /// Task to run (repeatable).
    #[arg(short, long = "task")]
    pub tasks: Vec<String>,

    /// Only run tasks in this category.
    #[arg(short, long)]
    pub category: Option<String>,

    /// Run every task in the corpus.
    #[arg(long)]
    pub all: bool,

    /// Trials per (agent, task) pair.
    #[arg(long)]
    pub trials: Option<u32>,

    /// Maximum pairings executing at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Override every task's timeout, in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Use simulated agents instead of launching real ones.
    #[arg(long)]
    pub mock: bool,

    /// Parent directory for per-pairing workspaces.
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,

    /// Keep workspaces after the run.
    #[arg(long)]
    pub keep_workspaces: bool,

    /// Write the batch report as JSON.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Write Prometheus metrics in text format.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

/// Arguments for `agent-bench compare`.
#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// Group rankings by task or category.
    #[arg(long, default_value = "task")]
    pub by: GroupBy,

    /// Print JSON instead of tables.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `agent-bench history`.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Number of runs to show.
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: u32,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = base_config(&cli)?;
    match cli.command {
        Commands::List => run_list_command(&config),
        Commands::Run(args) => run_bench_command(config, args).await,
        Commands::Compare(args) => run_compare_command(&config, args).await,
        Commands::History(args) => run_history_command(&config, args).await,
    }
}

/// Environment configuration with the global flags applied on top.
fn base_config(cli: &Cli) -> anyhow::Result<BenchConfig> {
    let mut config = BenchConfig::from_env().context("Invalid environment configuration")?;
    if let Some(dir) = &cli.tasks_dir {
        config = config.with_tasks_dir(dir);
    }
    if let Some(db) = &cli.database {
        config = config.with_database_path(db);
    }
    if let Some(file) = &cli.agents_file {
        config = config
            .with_agents_file(file)
            .with_context(|| format!("Failed to load agents file {}", file.display()))?;
    }
    Ok(config)
}

/// Applies `run` flags to the configuration.
fn apply_run_args(mut config: BenchConfig, args: &RunArgs) -> BenchConfig {
    if let Some(trials) = args.trials {
        config = config.with_trials(trials);
    }
    if let Some(n) = args.concurrency {
        config = config.with_max_concurrent(n);
    }
    if let Some(secs) = args.timeout {
        config = config.with_task_timeout(Duration::from_secs(secs));
    }
    if args.mock {
        config = config.with_mock_agents(true);
    }
    if let Some(root) = &args.workspace_root {
        config = config.with_workspace_root(root);
    }
    if args.keep_workspaces {
        config = config.with_keep_workspaces(true);
    }
    config
}

// ============================================================================
// list
// ============================================================================

fn run_list_command(config: &BenchConfig) -> anyhow::Result<()> {
    let (tasks, failures) = task::load_all(&config.tasks_dir);

    if tasks.is_empty() && failures.is_empty() {
        println!("No tasks found under {}", config.tasks_dir.display());
        return Ok(());
    }

    println!(
        "{:<28} {:<20} {:<8} {:>8} {:>6}",
        "Task", "Category", "Level", "Est (s)", "Tests"
    );
    println!("{}", "-".repeat(74));
    for t in &tasks {
        println!(
            "{:<28} {:<20} {:<8} {:>8.0} {:>6}",
            t.name,
            t.category,
            t.difficulty.as_str(),
            t.estimated_time,
            if t.test_command.is_some() { "yes" } else { "no" }
        );
    }
    println!("\n{} task(s)", tasks.len());

    print_load_failures(&failures);
    Ok(())
}

// ============================================================================
// run
// ============================================================================

async fn run_bench_command(config: BenchConfig, args: RunArgs) -> anyhow::Result<()> {
    let config = apply_run_args(config, &args);
    config.validate()?;

    if args.tasks.is_empty() && args.category.is_none() && !args.all {
        anyhow::bail!("Select tasks with --task, --category or --all");
    }

    init_metrics().context("Failed to initialize metrics")?;

    let (tasks, failures) = task::load_all(&config.tasks_dir);
    let known_failed: Vec<String> = args
        .tasks
        .iter()
        .filter(|name| failures.iter().any(|f| f.matches(name)))
        .cloned()
        .collect();

    let mut selection = TaskSelection::all().with_names(args.tasks.clone());
    if let Some(category) = &args.category {
        selection = selection.with_category(category.clone());
    }
    let selected = selection.apply(tasks, &known_failed)?;

    // A load failure counts against the batch when it could have been selected.
    let relevant_failures: Vec<TaskLoadFailure> = failures
        .into_iter()
        .filter(|f| {
            args.tasks.is_empty() || args.tasks.iter().any(|name| f.matches(name))
        })
        .collect();

    let registry = AgentRegistry::from_config(&config);
    let agents = registry.resolve(&args.agents)?;

    if selected.is_empty() {
        print_load_failures(&relevant_failures);
        if relevant_failures.is_empty() {
            anyhow::bail!("No tasks match the selection");
        }
        anyhow::bail!("{} selected task(s) failed to load", relevant_failures.len());
    }

    let store = ResultsStore::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open results store {}", config.database_path.display()))?;

    info!(
        agents = ?agents,
        tasks = selected.len(),
        mock = config.mock_agents,
        "Running benchmark"
    );

    let coordinator = Coordinator::new(config, registry).with_store(store);
    let report = coordinator
        .run(&agents, &selected)
        .await?
        .with_load_failures(relevant_failures);

    print_report(&report);

    if let Some(path) = &args.export {
        write_file(path, &report.to_json()?)?;
        println!("\nReport saved to: {}", path.display());
    }

    if let Some(path) = &args.metrics_out {
        write_file(path, &export_metrics())?;
        println!("Metrics saved to: {}", path.display());
    }

    if report.has_load_failures() {
        anyhow::bail!(
            "{} selected task(s) failed to load",
            report.load_failures.len()
        );
    }

    Ok(())
}

fn print_report(report: &BatchReport) {
    println!("{}", "=".repeat(78));
    println!("Run {}", report.run_id);
    println!("{}", "=".repeat(78));
    println!(
        "{:<20} {:<24} {:>5} {:>8} {:>9} {:>9}  {}",
        "Agent", "Task", "Trial", "Overall", "Time (s)", "Cost ($)", "Status"
    );
    println!("{}", "-".repeat(78));

    for outcome in &report.outcomes {
        match outcome {
            PairingOutcome::Scored(r) => {
                let overall = r
                    .overall
                    .map(|o| format!("{:.1}", o))
                    .unwrap_or_else(|| "n/a".to_string());
                let status = match (&r.error, r.success, r.incomplete) {
                    (_, true, false) => "ok".to_string(),
                    (_, true, true) => "ok (no tests)".to_string(),
                    (Some(err), false, _) => format!("failed: {}", err),
                    (None, false, _) => "failed".to_string(),
                };
                println!(
                    "{:<20} {:<24} {:>5} {:>8} {:>9.1} {:>9.4}  {}",
                    r.agent_name, r.task_name, r.trial, overall, r.wall_time, r.cost, status
                );
            }
            PairingOutcome::InfraFailure(f) => {
                println!(
                    "{:<20} {:<24} {:>5} {:>8} {:>9} {:>9}  infra failure ({}): {}",
                    f.agent, f.task, f.trial, "-", "-", "-", f.phase, f.reason
                );
            }
        }
    }

    println!("{}", "-".repeat(78));
    println!(
        "Pairings: {}  Scored: {}  Succeeded: {}  Infra failures: {}",
        report.outcomes.len(),
        report.scored_count(),
        report.success_count(),
        report.infra_failure_count()
    );

    for warning in &report.persistence_warnings {
        println!("⚠ Not persisted: {}", warning);
    }
    print_load_failures(&report.load_failures);
}

fn print_load_failures(failures: &[TaskLoadFailure]) {
    for f in failures {
        warn!(path = %f.path.display(), error = %f.error, "Task failed to load");
        println!("⚠ Task {} failed to load: {}", f.path.display(), f.error);
    }
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

// ============================================================================
// compare / history
// ============================================================================

async fn run_compare_command(config: &BenchConfig, args: CompareArgs) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let rankings = comparison::compare(&store, args.by).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rankings)?);
    } else {
        print!("{}", comparison::render(&rankings, args.by));
    }
    Ok(())
}

async fn run_history_command(config: &BenchConfig, args: HistoryArgs) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let runs = store.recent_runs(args.limit).await?;

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    println!(
        "{:<36} {:<20} {:>8} {:>9} {:>7} {:>8} {:>10}",
        "Run", "Started", "Pairings", "Succeeded", "Agents", "Overall", "Cost ($)"
    );
    println!("{}", "-".repeat(104));
    for run in &runs {
        let overall = run
            .avg_overall
            .map(|o| format!("{:.1}", o))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "{:<36} {:<20} {:>8} {:>9} {:>7} {:>8} {:>10.4}",
            run.run_id,
            run.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            run.pairings,
            run.successes,
            run.agents,
            overall,
            run.total_cost
        );
    }
    Ok(())
}

async fn open_store(config: &BenchConfig) -> anyhow::Result<ResultsStore> {
    ResultsStore::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open results store {}", config.database_path.display()))
}
