//! Job execution engine.
//!
//! Runs each materialized job against the external merge tool, once per
//! configured strategy: builds the invocation, executes it as a blocking
//! child process (optionally under a timeout), classifies the exit code,
//! parses the statistics document, cross-checks conflict markers in the
//! produced output, and records failures to the append-only error log.
//!
//! State machine per `(job, strategy)`:
//!
//! ```text
//! Pending → Running → Succeeded(conflicts) | Failed(exit)
//! ```
//!
//! with an `AlreadyDone` short-circuit applied by the batch driver when the
//! completion ledger already carries the `(project, merge, strategy)` fact.
//!
//! Benchmark timings and correctness artifacts are kept apart: with repeat
//! `R > 1` the engine performs `R` discarded, timed measure runs and then
//! one produce run whose exit code and output are authoritative.

use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::{RunConfig, ToolConfig};
use crate::report::ExitDisposition;
use crate::stage::Job;
use crate::stats::{MergeStatistics, count_conflict_markers};

/// Separator width of error-log blocks.
const SEPARATOR_WIDTH: usize = 72;

/// Poll interval while waiting on a child under a timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// ErrorLog
// ---------------------------------------------------------------------------

/// The per-run failure log: append-only, shared by all jobs in one
/// invocation, never pruned.
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    /// Create a handle for the log at `path` (the file is created lazily).
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failure block.
    ///
    /// # Errors
    /// Fails when the log file cannot be created or appended.
    pub fn append(
        &self,
        scenario: &str,
        invocation: &str,
        stderr: &str,
    ) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", "=".repeat(SEPARATOR_WIDTH))?;
        writeln!(file, "scenario: {scenario}")?;
        writeln!(file, "invocation: {invocation}")?;
        writeln!(file, "{}", "-".repeat(SEPARATOR_WIDTH))?;
        writeln!(file, "{}", stderr.trim_end())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExecutionOutcome
// ---------------------------------------------------------------------------

/// What one `(job, strategy)` execution produced.
#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    /// Classified exit of the authoritative produce run.
    pub exit: ExitDisposition,
    /// Parsed tool statistics (empty on failure).
    pub stats: MergeStatistics,
    /// Marker-scan conflict count of the produced output, when one exists.
    pub observed_conflicts: Option<u32>,
    /// Median wall-clock duration over the timed runs, in seconds.
    pub runtime: Option<f64>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives the external merge tool for one invocation of the batch.
pub struct Engine {
    tool_path: String,
    log_level: String,
    extra_opts: Vec<String>,
    repeat: u32,
    timeout: Option<Duration>,
    error_log: ErrorLog,
}

impl Engine {
    /// Build an engine from configuration, logging failures to
    /// `error_log_path`.
    #[must_use]
    pub fn new(tool: &ToolConfig, run: &RunConfig, error_log_path: PathBuf) -> Self {
        Self {
            tool_path: tool.path.clone(),
            log_level: tool.log_level.clone(),
            extra_opts: tool.extra_opts.clone(),
            repeat: run.repeat.max(1),
            timeout: run.timeout_secs.map(Duration::from_secs),
            error_log: ErrorLog::new(error_log_path),
        }
    }

    /// Override the timeout (used by tests with sub-second limits).
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The failure log.
    #[must_use]
    pub const fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// The exact command line [`Self::execute`] runs for `strategy`.
    #[must_use]
    pub fn invocation_for(&self, job: &Job, strategy: &str) -> String {
        self.invocation_line(strategy, &job.output_for(strategy), &job.input_files)
    }

    /// Execute one job under one strategy.
    ///
    /// `scenario_id` identifies the scenario in error-log blocks.
    ///
    /// # Errors
    /// Fails only on I/O problems spawning the tool or writing the error
    /// log; tool failures are classified outcomes, not errors.
    pub fn execute(
        &self,
        job: &Job,
        strategy: &str,
        scenario_id: &str,
    ) -> std::io::Result<ExecutionOutcome> {
        let output_path = job.output_for(strategy);
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let invocation = self.invocation_line(strategy, &output_path, &job.input_files);
        debug!(strategy, %scenario_id, "running merge tool");

        let mut durations = Vec::new();

        // Measure runs: timing only, artifacts discarded.
        if self.repeat > 1 {
            for _ in 0..self.repeat {
                remove_stale(&output_path)?;
                let run = self.run_once(strategy, &output_path, &job.input_files)?;
                match run {
                    RawRun::Completed { duration, .. } => durations.push(duration.as_secs_f64()),
                    RawRun::TimedOut { stderr } => {
                        return self.fail(scenario_id, &invocation, ExitDisposition::TimedOut, &stderr, durations);
                    }
                }
            }
        }

        // Produce run: exit code, stdout, and output file are authoritative.
        remove_stale(&output_path)?;
        let run = self.run_once(strategy, &output_path, &job.input_files)?;
        let (code, stdout, stderr, duration) = match run {
            RawRun::Completed {
                code,
                stdout,
                stderr,
                duration,
            } => (code, stdout, stderr, duration),
            RawRun::TimedOut { stderr } => {
                return self.fail(scenario_id, &invocation, ExitDisposition::TimedOut, &stderr, durations);
            }
        };
        if self.repeat <= 1 {
            durations.push(duration.as_secs_f64());
        }

        match code {
            Some(c) if (0..=127).contains(&c) => {
                let stats = MergeStatistics::parse(&stdout);
                let observed = match fs::read(&output_path) {
                    Ok(bytes) => Some(count_conflict_markers(&bytes)),
                    Err(_) => None,
                };
                Ok(ExecutionOutcome {
                    exit: ExitDisposition::Success { code: c },
                    stats,
                    observed_conflicts: observed,
                    runtime: median(durations),
                })
            }
            code => self.fail(
                scenario_id,
                &invocation,
                ExitDisposition::Failed { code },
                &stderr,
                durations,
            ),
        }
    }

    /// Record a failure block and build the failed outcome.
    fn fail(
        &self,
        scenario_id: &str,
        invocation: &str,
        exit: ExitDisposition,
        stderr: &str,
        durations: Vec<f64>,
    ) -> std::io::Result<ExecutionOutcome> {
        warn!(%scenario_id, %exit, "merge tool failed");
        self.error_log.append(scenario_id, invocation, stderr)?;
        Ok(ExecutionOutcome {
            exit,
            stats: MergeStatistics::empty(),
            observed_conflicts: None,
            runtime: median(durations),
        })
    }

    /// The fixed-shape tool command line:
    /// `<tool> -eoe -log <level> -s -m <strategy> -o <output> [<extra>] <inputs...>`.
    fn tool_args(&self, strategy: &str, output: &Path, inputs: &[PathBuf]) -> Vec<String> {
        let mut args = vec![
            "-eoe".to_owned(),
            "-log".to_owned(),
            self.log_level.clone(),
            "-s".to_owned(),
            "-m".to_owned(),
            strategy.to_owned(),
            "-o".to_owned(),
            output.display().to_string(),
        ];
        args.extend(self.extra_opts.iter().cloned());
        args.extend(inputs.iter().map(|p| p.display().to_string()));
        args
    }

    fn invocation_line(&self, strategy: &str, output: &Path, inputs: &[PathBuf]) -> String {
        let mut line = self.tool_path.clone();
        for arg in self.tool_args(strategy, output, inputs) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }

    /// One blocking tool run, optionally under the timeout.
    fn run_once(
        &self,
        strategy: &str,
        output: &Path,
        inputs: &[PathBuf],
    ) -> std::io::Result<RawRun> {
        let mut cmd = Command::new(&self.tool_path);
        cmd.args(self.tool_args(strategy, output, inputs));

        let start = Instant::now();
        let Some(limit) = self.timeout else {
            let out = cmd.output()?;
            return Ok(RawRun::Completed {
                code: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                duration: start.elapsed(),
            });
        };

        let mut child = cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
        loop {
            if child.try_wait()?.is_some() {
                let duration = start.elapsed();
                let out = child.wait_with_output()?;
                return Ok(RawRun::Completed {
                    code: out.status.code(),
                    stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                    duration,
                });
            }
            if start.elapsed() >= limit {
                child.kill()?;
                let out = child.wait_with_output()?;
                let mut stderr = String::from_utf8_lossy(&out.stderr).into_owned();
                if stderr.is_empty() {
                    stderr = format!("killed after exceeding timeout of {limit:?}");
                }
                return Ok(RawRun::TimedOut { stderr });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

enum RawRun {
    Completed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
        duration: Duration,
    },
    TimedOut {
        stderr: String,
    },
}

fn remove_stale(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Statistical median; even-length inputs average the two middle values.
fn median(mut durations: Vec<f64>) -> Option<f64> {
    if durations.is_empty() {
        return None;
    }
    durations.sort_by(f64::total_cmp);
    let mid = durations.len() / 2;
    if durations.len() % 2 == 1 {
        Some(durations[mid])
    } else {
        Some(f64::midpoint(durations[mid - 1], durations[mid]))
    }
}

// ---------------------------------------------------------------------------
// Pruning
// ---------------------------------------------------------------------------

/// Delete every staged file ending with `output_rel` under `staging_root`,
/// then remove now-empty directories bottom-up.
///
/// Called only after every configured strategy succeeded for the scenario.
/// The error log and the ledger live outside the staging tree and are never
/// touched. Returns the number of files removed.
pub fn prune_scenario(staging_root: &Path, output_rel: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    prune_matching(staging_root, output_rel, &mut removed)?;
    remove_empty_dirs(staging_root)?;
    Ok(removed)
}

fn prune_matching(dir: &Path, suffix: &Path, removed: &mut usize) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_symlink() {
            continue;
        }
        if path.is_dir() {
            prune_matching(&path, suffix, removed)?;
        } else if path.ends_with(suffix) {
            fs::remove_file(&path)?;
            *removed += 1;
        }
    }
    Ok(())
}

/// Remove empty directories bottom-up, including `dir` itself when it ends
/// up empty.
fn remove_empty_dirs(dir: &Path) -> std::io::Result<bool> {
    let mut is_empty = true;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && !path.is_symlink() {
            if !remove_empty_dirs(&path)? {
                is_empty = false;
            }
        } else {
            is_empty = false;
        }
    }
    if is_empty {
        fs::remove_dir(dir)?;
    }
    Ok(is_empty)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
