//! The `replay` batch driver.
//!
//! Loops over historical merge commits: derives left/right tips, checks
//! preconditions, consults the completion ledger, resolves scenarios,
//! materializes staging trees, executes the merge tool per strategy,
//! records result rows, prunes successful scenarios, and updates the
//! ledger. Failures are scenario-scoped — a broken scenario or commit never
//! aborts its siblings.

use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use crate::config::ReplayConfig;
use crate::engine::{Engine, prune_scenario};
use crate::error::ReplayError;
use crate::ledger::CompletionLedger;
use crate::model::RevId;
use crate::repo::GitRepo;
use crate::report::{ResultSink, RunResult, format_human};
use crate::resolve::{FileFilter, resolve_scenarios};
use crate::stage::StagingArea;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// Replay historical merges against the external merge tool
///
/// Each argument is a historical merge commit whose two parents are
/// replayed. With --pair, exactly two arguments form an explicit
/// left/right tip pair instead (no merge commit, no ledger resumability).
///
/// Results are appended to `results.csv` under the output directory and
/// printed as colorized lines; failures are appended to `errors.log`.
///
/// Examples:
///   remerge replay 1a2b3c4
///   remerge replay -p -o /data/replay $(git rev-list --merges v1..v2)
///   remerge replay --pair feature-tip main-tip
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Store staging trees and logs in this directory
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Prune staged artifacts of fully successful scenarios
    #[arg(short, long)]
    pub prune: bool,

    /// Timed measure runs per (job, strategy)
    #[arg(short, long)]
    pub repeat: Option<u32>,

    /// Kill a tool invocation after this many seconds
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Comma-separated strategies (overrides the config file)
    #[arg(long, value_delimiter = ',')]
    pub strategies: Vec<String>,

    /// Configuration file
    #[arg(long, default_value = ".remerge.toml")]
    pub config: PathBuf,

    /// Treat the two arguments as an explicit left/right pair
    #[arg(long)]
    pub pair: bool,

    /// Merge commits to replay (or one left/right pair with --pair)
    #[arg(required = true)]
    pub commits: Vec<String>,
}

// ---------------------------------------------------------------------------
// Batch accounting
// ---------------------------------------------------------------------------

/// Per-commit outcome counts.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommitReport {
    /// Scenarios that ran the tool.
    pub merged: usize,
    /// Skip records.
    pub skipped: usize,
    /// Scenarios with at least one failed strategy.
    pub failed: usize,
    /// The ledger already carried every configured strategy.
    pub already_done: bool,
}

/// One unit of batch work: a merge commit or an explicit tip pair.
struct CommitTask {
    merge: Option<RevId>,
    left: RevId,
    right: RevId,
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Run the replay batch.
///
/// # Errors
/// Fails on configuration problems or when any commit could not be
/// processed; scenario-level failures are recorded, not raised.
pub fn run(args: &ReplayArgs) -> Result<()> {
    let cfg = merged_config(args)?;
    let cwd = std::env::current_dir().context("failed to determine working directory")?;
    let repo = GitRepo::new(cwd);
    let project = repo.project_name();

    let output_root = match args.output.clone().or_else(|| cfg.paths.output_dir.clone()) {
        Some(dir) => dir,
        None => tempfile::Builder::new()
            .prefix("remerge.")
            .tempdir()
            .context("failed to create temp output directory")?
            .keep(),
    };
    std::fs::create_dir_all(&output_root)
        .with_context(|| format!("failed to create {}", output_root.display()))?;

    let ledger_dir = cfg
        .paths
        .ledger_dir
        .clone()
        .unwrap_or_else(|| output_root.clone());
    let ledger = CompletionLedger::open(&ledger_dir, &project);
    let engine = Engine::new(&cfg.tool, &cfg.replay, output_root.join("errors.log"));
    let filter = FileFilter::new(&cfg.replay.file_extensions);

    let results_path = output_root.join("results.csv");
    let header_needed = !results_path.exists();
    let results_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&results_path)
        .with_context(|| format!("failed to open {}", results_path.display()))?;
    let mut sink = ResultSink::new(results_file, header_needed);

    let mut totals = CommitReport::default();
    let mut erroneous_commits = 0usize;

    for task in build_tasks(&repo, args) {
        let task = match task {
            Ok(t) => t,
            Err(e) => {
                // Precondition failures abort only this commit's processing.
                eprintln!("error: {e}");
                erroneous_commits += 1;
                continue;
            }
        };
        match process_commit(
            &repo, &cfg, &engine, &ledger, &filter, &output_root, &project, &mut sink, &task,
        ) {
            Ok(report) => {
                totals.merged += report.merged;
                totals.skipped += report.skipped;
                totals.failed += report.failed;
            }
            Err(e) => {
                eprintln!("error: {e}");
                erroneous_commits += 1;
            }
        }
    }

    let stored_label = if cfg.replay.prune { "Erroneous" } else { "All" };
    let stored = if cfg.replay.prune {
        totals.failed
    } else {
        totals.merged
    };
    println!(
        "{} merged, {} skipped, {} failed ({} commit(s) in error).",
        totals.merged, totals.skipped, totals.failed, erroneous_commits
    );
    println!(
        "Stored ({stored_label}): {stored} scenario(s) under {}",
        output_root.display()
    );

    if erroneous_commits > 0 {
        bail!("{erroneous_commits} commit(s) could not be processed");
    }
    Ok(())
}

/// Load the config file and fold in command-line overrides.
fn merged_config(args: &ReplayArgs) -> Result<ReplayConfig> {
    let mut cfg = ReplayConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{e}"))?;
    if !args.strategies.is_empty() {
        cfg.replay.strategies = args.strategies.clone();
    }
    if let Some(repeat) = args.repeat {
        cfg.replay.repeat = repeat;
    }
    if let Some(timeout) = args.timeout {
        cfg.replay.timeout_secs = Some(timeout);
    }
    if args.pair && args.commits.len() != 2 {
        bail!("--pair requires exactly two revisions, got {}", args.commits.len());
    }
    cfg.replay.prune = cfg.replay.prune || args.prune;
    Ok(cfg)
}

/// Expand command-line arguments into commit tasks.
fn build_tasks(repo: &GitRepo, args: &ReplayArgs) -> Vec<Result<CommitTask, ReplayError>> {
    if args.pair {
        let task = resolve_pair(repo, &args.commits[0], &args.commits[1]);
        return vec![task];
    }
    args.commits
        .iter()
        .map(|spec| resolve_merge_commit(repo, spec))
        .collect()
}

fn resolve_pair(repo: &GitRepo, left: &str, right: &str) -> Result<CommitTask, ReplayError> {
    Ok(CommitTask {
        merge: None,
        left: repo.rev_parse(left)?,
        right: repo.rev_parse(right)?,
    })
}

/// Resolve a historical merge commit into its left/right parents.
///
/// An octopus merge (more than two parents) has no defined left/right and
/// fails before resolution begins.
fn resolve_merge_commit(repo: &GitRepo, spec: &str) -> Result<CommitTask, ReplayError> {
    let merge = repo.rev_parse(spec)?;
    let parents = repo.parents(&merge)?;
    match parents.as_slice() {
        [left, right] => Ok(CommitTask {
            left: left.clone(),
            right: right.clone(),
            merge: Some(merge),
        }),
        more if more.len() > 2 => Err(ReplayError::OctopusMerge {
            commit: merge.short().to_owned(),
            parent_count: more.len(),
        }),
        _ => Err(ReplayError::NotAMerge {
            commit: merge.short().to_owned(),
        }),
    }
}

// ---------------------------------------------------------------------------
// process_commit
// ---------------------------------------------------------------------------

/// Replay one commit: resolve, materialize, execute, record, prune, and
/// mark the ledger.
#[allow(clippy::too_many_arguments)]
fn process_commit<W: IoWrite>(
    repo: &GitRepo,
    cfg: &ReplayConfig,
    engine: &Engine,
    ledger: &CompletionLedger,
    filter: &FileFilter,
    output_root: &std::path::Path,
    project: &str,
    sink: &mut ResultSink<W>,
    task: &CommitTask,
) -> Result<CommitReport, ReplayError> {
    let mut report = CommitReport::default();

    // Ledger consultation: read once per commit. Explicit pairs have no
    // merge commit to key facts by and always run.
    let done = match &task.merge {
        Some(merge) => ledger.completed_strategies(merge)?,
        None => std::collections::BTreeSet::new(),
    };
    let pending: Vec<String> = cfg
        .replay
        .strategies
        .iter()
        .filter(|s| !done.contains(*s))
        .cloned()
        .collect();
    if pending.is_empty() {
        info!(
            merge = task.merge.as_ref().map(RevId::short),
            "all strategies already in ledger, skipping"
        );
        report.already_done = true;
        return Ok(report);
    }

    let base = repo.merge_base(&task.left, &task.right)?;
    let set = resolve_scenarios(repo, &task.left, &task.right, base.as_ref(), filter)?;
    if set.fast_forward {
        info!(
            left = task.left.short(),
            right = task.right.short(),
            "merge base coincides with a tip; commit is a fast-forward"
        );
    }
    report.skipped = set.skipped.len();
    for skip in &set.skipped {
        info!(path = %skip.path.display(), reason = %skip.reason, "skipped");
    }

    let staging_name = task.merge.as_ref().map_or_else(
        || format!("{}-{}", task.left.short(), task.right.short()),
        |m| m.short().to_owned(),
    );
    let staging = StagingArea::create(output_root.join(staging_name))?;

    let timestamp = match &task.merge {
        Some(merge) => Some(repo.commit_timestamp(merge)?),
        None => None,
    };

    let mut failed_strategies: std::collections::BTreeSet<String> =
        std::collections::BTreeSet::new();

    for scenario in &set.scenarios {
        report.merged += 1;
        let scenario_id = format!(
            "{} {} {} {}",
            project,
            task.left.short(),
            task.right.short(),
            scenario.output_path().display()
        );

        let job = match staging.materialize(repo, scenario, &task.left, base.as_ref(), &task.right)
        {
            Ok(job) => job,
            Err(e) => {
                // Scenario-scoped: record and continue with the next file.
                engine
                    .error_log()
                    .append(&scenario_id, "(materialize)", &e.to_string())?;
                report.failed += 1;
                failed_strategies.extend(pending.iter().cloned());
                continue;
            }
        };

        let mut scenario_failed = false;
        for strategy in &pending {
            let outcome = engine.execute(&job, strategy, &scenario_id)?;
            if outcome.exit.is_failure() {
                scenario_failed = true;
                failed_strategies.insert(strategy.clone());
            }
            let result = RunResult {
                project: project.to_owned(),
                timestamp,
                merge_commit: task.merge.clone(),
                left: task.left.clone(),
                right: task.right.clone(),
                file: job.scenario.output_path().clone(),
                merge_type: job.scenario.arity,
                strategy: strategy.clone(),
                stats: outcome.stats,
                observed_conflicts: outcome.observed_conflicts,
                runtime: outcome.runtime,
                exit: outcome.exit,
            };
            sink.write_row(&result)?;
            println!("{}", format_human(&result));
        }

        if scenario_failed {
            report.failed += 1;
        } else if cfg.replay.prune {
            let removed = prune_scenario(staging.root(), job.scenario.output_path())?;
            info!(
                file = %job.scenario.output_path().display(),
                removed, "pruned scenario artifacts"
            );
        }
    }

    // Ledger update: once per commit, one fact per strategy that completed
    // with zero failures.
    if let Some(merge) = &task.merge {
        for strategy in &pending {
            if !failed_strategies.contains(strategy) {
                ledger.append(merge, strategy)?;
            }
        }
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// prepare
// ---------------------------------------------------------------------------

/// Resolve and materialize one commit's scenarios without running the tool
///
/// Prints one row per (scenario, strategy) to stdout:
///
///   project;left;right;file;strategy;invocation
///
/// Examples:
///   remerge prepare -o /tmp/staging 1a2b3c4
///   remerge prepare --pair feature-tip main-tip
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Store staging trees in this directory
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Configuration file
    #[arg(long, default_value = ".remerge.toml")]
    pub config: PathBuf,

    /// Treat the two arguments as an explicit left/right pair
    #[arg(long)]
    pub pair: bool,

    /// The merge commit (or a left/right pair with --pair)
    #[arg(required = true)]
    pub commits: Vec<String>,
}

/// Run scenario preparation only.
///
/// # Errors
/// Fails on configuration, resolution, or staging problems.
pub fn prepare(args: &PrepareArgs) -> Result<()> {
    let cfg = ReplayConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{e}"))?;
    let cwd = std::env::current_dir().context("failed to determine working directory")?;
    let repo = GitRepo::new(cwd);
    let project = repo.project_name();

    let task = if args.pair {
        if args.commits.len() != 2 {
            bail!("--pair requires exactly two revisions, got {}", args.commits.len());
        }
        resolve_pair(&repo, &args.commits[0], &args.commits[1])?
    } else {
        if args.commits.len() != 1 {
            bail!("prepare takes exactly one merge commit (or --pair with two revisions)");
        }
        resolve_merge_commit(&repo, &args.commits[0])?
    };

    let output_root = match args.output.clone().or_else(|| cfg.paths.output_dir.clone()) {
        Some(dir) => dir,
        None => tempfile::Builder::new()
            .prefix("remerge.")
            .tempdir()
            .context("failed to create temp output directory")?
            .keep(),
    };
    std::fs::create_dir_all(&output_root)?;

    let staging_name = task.merge.as_ref().map_or_else(
        || format!("{}-{}", task.left.short(), task.right.short()),
        |m| m.short().to_owned(),
    );
    let staging = StagingArea::create(output_root.join(staging_name))?;

    let filter = FileFilter::new(&cfg.replay.file_extensions);
    let base = repo.merge_base(&task.left, &task.right)?;
    let set = resolve_scenarios(&repo, &task.left, &task.right, base.as_ref(), &filter)?;

    let engine = Engine::new(&cfg.tool, &cfg.replay, output_root.join("errors.log"));
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for scenario in &set.scenarios {
        let job = staging.materialize(&repo, scenario, &task.left, base.as_ref(), &task.right)?;
        for strategy in &cfg.replay.strategies {
            writeln!(
                out,
                "{};{};{};{};{};{}",
                project,
                task.left.as_str(),
                task.right.as_str(),
                job.scenario.output_path().display(),
                strategy,
                engine.invocation_for(&job, strategy),
            )?;
        }
    }
    for skip in &set.skipped {
        info!(path = %skip.path.display(), reason = %skip.reason, "skipped");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// colorize
// ---------------------------------------------------------------------------

/// Colorize a result stream from stdin
///
/// Reads result rows (as written to results.csv) on stdin and prints one
/// colorized line each. Header and malformed lines are ignored.
///
/// Examples:
///   remerge colorize < /data/replay/results.csv
#[derive(Args, Debug)]
pub struct ColorizeArgs {}

/// Run the colorizer over stdin.
///
/// # Errors
/// Fails when stdin cannot be read.
pub fn colorize(_args: &ColorizeArgs) -> Result<()> {
    use std::io::BufRead as _;
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if let Some(colored) = crate::report::colorize_row(&line) {
            println!("{colored}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::report::ExitDisposition;

    #[test]
    fn exit_disposition_gates_pruning() {
        // Sanity: the gate used by process_commit matches the report layer.
        assert!(ExitDisposition::Failed { code: Some(255) }.is_failure());
        assert!(ExitDisposition::TimedOut.is_failure());
        assert!(!ExitDisposition::Success { code: 5 }.is_failure());
    }
}
