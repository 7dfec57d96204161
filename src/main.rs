//! Waveplan CLI entry point
//!
//! Usage:
//!   waveplan plan                          Build conflict graph and execution plan
//!   waveplan conflicts                     Build and write only the conflict graph
//!   waveplan mark-complete <task> ...      Record a task's completion
//!   waveplan check-incidental <task> ...   Complete a task and detect side completions
//!   waveplan report                        Show plan progress
//!   waveplan verify                        Re-check scheduling guarantees of a plan

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use waveplan::core::{write_json_atomic, StagedJson};
use waveplan::inputs;
use waveplan::{
    CompletionEvent, Config, ConflictGraph, ExecutionPlan, MarkOutcome, PlanDocument, Planner,
    ProgressReport, StatusTracker, TaskSpec,
};

#[derive(Parser)]
#[command(name = "waveplan")]
#[command(author, version, about = "Conflict-aware parallel execution planner")]
struct Cli {
    /// Config file (defaults to ./waveplan.yml, then ~/.waveplan/config.yml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the conflict graph and execution plan from the input files
    Plan {
        #[command(flatten)]
        inputs: InputArgs,

        /// Use this conflict specification instead of deriving one from file patterns
        #[arg(long, value_name = "FILE")]
        conflict_spec: Option<PathBuf>,

        /// Where to write the conflict graph
        #[arg(long, value_name = "FILE")]
        conflict_graph_out: Option<PathBuf>,

        /// Where to write the execution plan
        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,
    },

    /// Build and write only the conflict graph
    Conflicts {
        #[command(flatten)]
        inputs: InputArgs,

        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Mark a task as completed
    MarkComplete {
        task_id: String,

        /// Pull request number
        #[arg(long)]
        pr: u64,

        /// Pull request URL
        #[arg(long)]
        url: String,

        /// Actual runtime in minutes
        #[arg(long)]
        runtime: Option<u32>,

        /// Files modified by the change
        #[arg(long, num_args = 1..)]
        files: Vec<String>,

        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,
    },

    /// Mark a task as completed, then complete tasks its change covered
    CheckIncidental {
        task_id: String,

        #[arg(long)]
        pr: u64,

        #[arg(long)]
        url: String,

        /// Files modified by the change
        #[arg(long, num_args = 1.., required = true)]
        files: Vec<String>,

        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,
    },

    /// Show completion progress
    Report {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,
    },

    /// Re-check dependency order, conflicts and numbering of a plan
    Verify {
        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// Task descriptor list
    #[arg(long, value_name = "FILE")]
    tasks: Option<PathBuf>,

    /// File list with declared patterns
    #[arg(long, value_name = "FILE")]
    files: Option<PathBuf>,

    /// Optional task descriptions
    #[arg(long, value_name = "FILE")]
    descriptions: Option<PathBuf>,
}

impl InputArgs {
    fn load(&self, config: &Config) -> Result<Vec<TaskSpec>> {
        let tasks = self.tasks.as_ref().unwrap_or(&config.tasks);
        let files = self.files.as_ref().unwrap_or(&config.files);
        let descriptions = self.descriptions.as_ref().or(config.descriptions.as_ref());

        log::info!("Loading tasks from {}", tasks.display());
        let specs = inputs::load_inputs(tasks, files, descriptions.map(PathBuf::as_path))
            .context("failed to load planning inputs")?;
        log::info!("Loaded {} tasks", specs.len());
        Ok(specs)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = Config::auto_load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Plan {
            inputs,
            conflict_spec,
            conflict_graph_out,
            plan,
        } => cmd_plan(&config, &inputs, conflict_spec, conflict_graph_out, plan),
        Commands::Conflicts { inputs, out } => cmd_conflicts(&config, &inputs, out),
        Commands::MarkComplete {
            task_id,
            pr,
            url,
            runtime,
            files,
            plan,
        } => cmd_mark_complete(&config, &task_id, pr, url, runtime, files, plan),
        Commands::CheckIncidental {
            task_id,
            pr,
            url,
            files,
            plan,
        } => cmd_check_incidental(&config, &task_id, pr, url, files, plan),
        Commands::Report { json, plan } => cmd_report(&config, json, plan),
        Commands::Verify { plan } => cmd_verify(&config, plan),
    }
}

fn cmd_plan(
    config: &Config,
    inputs: &InputArgs,
    conflict_spec: Option<PathBuf>,
    conflict_graph_out: Option<PathBuf>,
    plan_path: Option<PathBuf>,
) -> Result<()> {
    let tasks = inputs.load(config)?;
    let planner = Planner::new();

    let (conflicts, plan) = match conflict_spec {
        Some(path) => {
            log::info!("Using conflict specification {}", path.display());
            let spec = ConflictGraph::from_file(&path)?;
            planner.plan_with_conflicts(&tasks, spec)?
        }
        None => planner.plan(&tasks)?,
    };

    let conflict_path = conflict_graph_out.unwrap_or_else(|| config.conflict_graph.clone());
    let plan_path = plan_path.unwrap_or_else(|| config.plan.clone());

    // Nothing is published unless both documents were staged
    let staged_conflicts = StagedJson::write(&conflict_path, &conflicts)
        .with_context(|| format!("failed to write {}", conflict_path.display()))?;
    let staged_plan = StagedJson::write(&plan_path, &PlanDocument::new(plan.clone()))
        .with_context(|| format!("failed to write {}", plan_path.display()))?;
    staged_plan
        .commit()
        .with_context(|| format!("failed to write {}", plan_path.display()))?;
    staged_conflicts
        .commit()
        .with_context(|| format!("failed to write {}", conflict_path.display()))?;

    print_plan(&plan);
    println!();
    println!("Conflict graph: {}", conflict_path.display());
    println!("Execution plan: {}", plan_path.display());
    Ok(())
}

fn cmd_conflicts(config: &Config, inputs: &InputArgs, out: Option<PathBuf>) -> Result<()> {
    let tasks = inputs.load(config)?;
    let conflicts = Planner::new().conflicts(&tasks);
    let out = out.unwrap_or_else(|| config.conflict_graph.clone());

    write_json_atomic(&out, &conflicts)
        .with_context(|| format!("failed to write {}", out.display()))?;

    println!(
        "🔀 {} tasks, {} with conflicts, {} conflicting pairs",
        conflicts.metadata.total_tasks,
        conflicts.metadata.tasks_with_conflicts,
        conflicts.metadata.total_conflict_pairs
    );
    for entry in conflicts.conflicts.iter().filter(|e| e.conflict_count > 0) {
        let ids: Vec<&str> = entry
            .conflicts_with
            .iter()
            .map(|c| c.task_id.as_str())
            .collect();
        println!("   {} ({}): {}", entry.task_id, entry.conflict_count, ids.join(", "));
    }
    println!("Conflict graph: {}", out.display());
    Ok(())
}

fn cmd_mark_complete(
    config: &Config,
    task_id: &str,
    pr: u64,
    url: String,
    runtime: Option<u32>,
    files: Vec<String>,
    plan_path: Option<PathBuf>,
) -> Result<()> {
    let plan_path = plan_path.unwrap_or_else(|| config.plan.clone());
    let mut doc = load_plan(&plan_path)?;

    let event = CompletionEvent::direct(pr, url)
        .with_runtime(runtime)
        .with_files(Some(files));
    let outcome = StatusTracker::new(&mut doc.execution_plan).mark_complete(task_id, event)?;

    match outcome {
        MarkOutcome::Completed => {
            doc.save(&plan_path)
                .with_context(|| format!("failed to write {}", plan_path.display()))?;
            println!("✅ {} marked complete (PR #{})", task_id, pr);
        }
        MarkOutcome::AlreadyCompleted => {
            println!("⚠️  {} already completed, nothing changed", task_id);
        }
    }
    Ok(())
}

fn cmd_check_incidental(
    config: &Config,
    task_id: &str,
    pr: u64,
    url: String,
    files: Vec<String>,
    plan_path: Option<PathBuf>,
) -> Result<()> {
    let plan_path = plan_path.unwrap_or_else(|| config.plan.clone());
    let mut doc = load_plan(&plan_path)?;

    let mut tracker = StatusTracker::new(&mut doc.execution_plan)
        .with_threshold(config.incidental_threshold);
    let event = CompletionEvent::direct(pr, url.clone()).with_files(Some(files.clone()));
    let outcome = tracker.mark_complete(task_id, event)?;
    let incidental = tracker.detect_incidental_completions(task_id, &files, pr, &url)?;

    if outcome == MarkOutcome::Completed || !incidental.is_empty() {
        doc.save(&plan_path)
            .with_context(|| format!("failed to write {}", plan_path.display()))?;
    }

    match outcome {
        MarkOutcome::Completed => println!("✅ {} marked complete (PR #{})", task_id, pr),
        MarkOutcome::AlreadyCompleted => println!("⚠️  {} already completed", task_id),
    }
    if incidental.is_empty() {
        println!("No incidental completions");
    } else {
        println!("Incidentally completed: {}", incidental.join(", "));
    }
    Ok(())
}

fn cmd_report(config: &Config, json: bool, plan_path: Option<PathBuf>) -> Result<()> {
    let plan_path = plan_path.unwrap_or_else(|| config.plan.clone());
    let doc = load_plan(&plan_path)?;
    let report = ProgressReport::from_plan(&doc.execution_plan);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

fn cmd_verify(config: &Config, plan_path: Option<PathBuf>) -> Result<()> {
    let plan_path = plan_path.unwrap_or_else(|| config.plan.clone());
    let doc = load_plan(&plan_path)?;
    let violations = doc.execution_plan.verify();

    if violations.is_empty() {
        println!(
            "✅ Plan OK: {} tasks in {} waves",
            doc.execution_plan.summary.total_tasks, doc.execution_plan.summary.total_waves
        );
        return Ok(());
    }

    for violation in &violations {
        println!("❌ {}", violation);
    }
    bail!("{} violation(s) found in {}", violations.len(), plan_path.display())
}

fn load_plan(path: &Path) -> Result<PlanDocument> {
    PlanDocument::load(path).with_context(|| format!("failed to load plan {}", path.display()))
}

fn print_plan(plan: &ExecutionPlan) {
    for wave in &plan.waves {
        let ids: Vec<&str> = wave.tasks.iter().map(|t| t.id()).collect();
        println!(
            "▶  Wave {}: {} task(s), {} min  [{}]",
            wave.wave_number,
            wave.parallel_task_count,
            wave.estimated_wave_time_min,
            ids.join(", ")
        );
    }

    let s = &plan.summary;
    println!();
    println!("📈 Summary:");
    println!("   Waves: {}", s.total_waves);
    println!("   Tasks: {}", s.total_tasks);
    println!("   Estimated time: {} min", s.estimated_total_time_min);
    println!(
        "   Parallelism: {:.2} avg, {} max",
        s.average_parallelism, s.max_parallelism
    );
    println!(
        "   Sequential: {} min, parallel: {} min ({:.1}% saved)",
        s.efficiency_metrics.sequential_time_min,
        s.efficiency_metrics.parallel_time_min,
        s.efficiency_metrics.time_savings_percent
    );
}
