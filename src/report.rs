//! Result stream and human-readable reporting.
//!
//! Each `(job, strategy)` execution yields one immutable [`RunResult`] row,
//! appended to a delimiter-separated stream with a fixed, versioned column
//! schema for downstream analysis. The same rows can be rendered as
//! colorized one-liners, either live during a replay or after the fact by
//! piping the stream through `remerge colorize`.
//!
//! Absent metrics serialize as empty fields — a missing count is
//! distinguishable from a verified zero.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use owo_colors::OwoColorize;

use crate::model::{MergeArity, RevId};
use crate::stats::MergeStatistics;

/// Result stream schema version. Bump when columns change.
pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// Field delimiter of the result stream.
pub const DELIMITER: char = ';';

/// Column order of the result stream.
pub const RESULT_COLUMNS: [&str; 19] = [
    "project",
    "timestamp",
    "mergecommit",
    "left",
    "right",
    "file",
    "mergetype",
    "strategy",
    "conflicts",
    "clines",
    "ctokens",
    "observed",
    "runtime",
    "t_merge",
    "t_parse",
    "t_semistructure",
    "timings",
    "toolversion",
    "exit",
];

// ---------------------------------------------------------------------------
// ExitDisposition
// ---------------------------------------------------------------------------

/// How a tool invocation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Exit code in the structured-success range (0..=127).
    Success {
        /// The exit code.
        code: i32,
    },
    /// Exit code outside the success range, or death by signal (no code).
    Failed {
        /// The exit code, if any.
        code: Option<i32>,
    },
    /// The invocation exceeded the configured timeout and was killed.
    TimedOut,
}

impl ExitDisposition {
    /// Whether this disposition blocks pruning and ledger-marking.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::Success { .. })
    }
}

impl fmt::Display for ExitDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { code } => write!(f, "{code}"),
            Self::Failed { code: Some(code) } => write!(f, "FAIL({code})"),
            Self::Failed { code: None } => write!(f, "FAIL(signal)"),
            Self::TimedOut => write!(f, "TIMEOUT"),
        }
    }
}

// ---------------------------------------------------------------------------
// RunResult
// ---------------------------------------------------------------------------

/// One execution outcome: immutable once written, one row per
/// `(job, strategy)`.
#[derive(Clone, Debug)]
pub struct RunResult {
    /// The project (repository) name.
    pub project: String,
    /// The replayed merge commit's timestamp, when known.
    pub timestamp: Option<i64>,
    /// The historical merge commit, when known.
    pub merge_commit: Option<RevId>,
    /// The left tip.
    pub left: RevId,
    /// The right tip.
    pub right: RevId,
    /// The merged file (the scenario's output path).
    pub file: PathBuf,
    /// Three-way or two-way.
    pub merge_type: MergeArity,
    /// The strategy this row was produced under.
    pub strategy: String,
    /// Tool-reported statistics (all fields optional).
    pub stats: MergeStatistics,
    /// Conflict count observed by scanning the output for marker lines.
    /// Absent when no output file was produced.
    pub observed_conflicts: Option<u32>,
    /// Median wall-clock runtime over the measure runs, in seconds.
    pub runtime: Option<f64>,
    /// How the invocation ended.
    pub exit: ExitDisposition,
}

impl RunResult {
    /// Reported and observed conflict counts disagree (both present).
    #[must_use]
    pub fn has_count_mismatch(&self) -> bool {
        match (self.stats.conflicts, self.observed_conflicts) {
            (Some(reported), Some(observed)) => reported != observed,
            _ => false,
        }
    }

    /// Serialize to one result-stream row.
    #[must_use]
    pub fn to_row(&self) -> String {
        let fields: [String; 19] = [
            self.project.clone(),
            opt_field(self.timestamp),
            self.merge_commit
                .as_ref()
                .map_or_else(String::new, |r| r.as_str().to_owned()),
            self.left.as_str().to_owned(),
            self.right.as_str().to_owned(),
            self.file.display().to_string(),
            self.merge_type.to_string(),
            self.strategy.clone(),
            opt_field(self.stats.conflicts),
            opt_field(self.stats.conflicted_lines),
            opt_field(self.stats.conflicted_tokens),
            opt_field(self.observed_conflicts),
            self.runtime.map_or_else(String::new, |r| format!("{r:.4}")),
            timing_field(&self.stats, "merge"),
            timing_field(&self.stats, "parse"),
            timing_field(&self.stats, "semistructure"),
            extra_timings(&self.stats),
            self.stats.tool_version.clone().unwrap_or_default(),
            self.exit.to_string(),
        ];
        fields.join(&DELIMITER.to_string())
    }
}

fn opt_field<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

fn timing_field(stats: &MergeStatistics, phase: &str) -> String {
    stats
        .phase_timings
        .get(phase)
        .map_or_else(String::new, |t| format!("{t:.4}"))
}

/// Phases beyond the three fixed columns, as `name=seconds` pairs.
fn extra_timings(stats: &MergeStatistics) -> String {
    stats
        .phase_timings
        .iter()
        .filter(|(name, _)| !matches!(name.as_str(), "merge" | "parse" | "semistructure"))
        .map(|(name, t)| format!("{name}={t:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// ResultSink
// ---------------------------------------------------------------------------

/// Appends result rows to a writer, emitting the header once.
pub struct ResultSink<W: Write> {
    out: W,
    wrote_header: bool,
}

impl<W: Write> ResultSink<W> {
    /// Create a sink. `header_needed` is false when appending to a stream
    /// that already carries one.
    pub const fn new(out: W, header_needed: bool) -> Self {
        Self {
            out,
            wrote_header: !header_needed,
        }
    }

    /// Append one row (and the header, first time).
    pub fn write_row(&mut self, result: &RunResult) -> io::Result<()> {
        if !self.wrote_header {
            writeln!(
                self.out,
                "# remerge result schema v{RESULT_SCHEMA_VERSION}"
            )?;
            writeln!(self.out, "{}", RESULT_COLUMNS.join(&DELIMITER.to_string()))?;
            self.wrote_header = true;
        }
        writeln!(self.out, "{}", result.to_row())?;
        self.out.flush()
    }
}

// ---------------------------------------------------------------------------
// Colorized display
// ---------------------------------------------------------------------------

/// Render a result as a colorized one-liner.
///
/// Precedence: failure (red) over count mismatch (cyan) over conflicts
/// (blue) over clean success (green). Two-way merges carry a magenta
/// annotation.
#[must_use]
pub fn format_human(result: &RunResult) -> String {
    let scenario = format!(
        "{} {} {} {} {} {}",
        result.project,
        result.merge_commit
            .as_ref()
            .map_or("-", |r| r.short()),
        result.left.short(),
        result.right.short(),
        result.file.display(),
        result.strategy,
    );

    let line = if result.exit.is_failure() {
        let msg = format!("FAILED ({})", result.exit);
        format!("{scenario}: {}", msg.red().bold())
    } else if result.has_count_mismatch() {
        let msg = format!(
            "MISMATCH ({}/{} conflicts)",
            opt_field(result.observed_conflicts),
            opt_field(result.stats.conflicts),
        );
        format!("{scenario}: {}", msg.cyan().bold())
    } else if result.stats.conflicts.unwrap_or(0) > 0
        || result.observed_conflicts.unwrap_or(0) > 0
    {
        let msg = format!(
            "OK ({} conflicts, {} lines, {} tokens)",
            opt_field(result.stats.conflicts.or(result.observed_conflicts)),
            opt_field(result.stats.conflicted_lines),
            opt_field(result.stats.conflicted_tokens),
        );
        format!("{scenario}: {}", msg.blue().bold())
    } else {
        format!("{scenario}: {}", "OK".green().bold())
    };

    if result.merge_type == MergeArity::TwoWay {
        format!("{line} {}", "2-way".magenta())
    } else {
        line
    }
}

/// Colorize one raw result-stream row (the `colorize` subcommand).
///
/// Header and comment lines yield `None`.
#[must_use]
pub fn colorize_row(line: &str) -> Option<String> {
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    if fields.len() != RESULT_COLUMNS.len() || fields[0].starts_with('#') || fields[0] == "project"
    {
        return None;
    }

    let parse_u32 = |s: &str| -> Option<u32> { s.parse().ok() };
    let reported = parse_u32(fields[8]);
    let observed = parse_u32(fields[11]);
    let exit = fields[18];
    let failed = exit.starts_with("FAIL") || exit == "TIMEOUT";

    let scenario = format!(
        "{} {} {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[7],
    );

    let line = if failed {
        format!("{scenario}: {}", format!("FAILED ({exit})").red().bold())
    } else if let (Some(r), Some(o)) = (reported, observed)
        && r != o
    {
        format!(
            "{scenario}: {}",
            format!("MISMATCH ({o}/{r} conflicts)").cyan().bold()
        )
    } else if reported.unwrap_or(0) > 0 || observed.unwrap_or(0) > 0 {
        let n = reported.or(observed).unwrap_or(0);
        format!("{scenario}: {}", format!("OK ({n} conflicts)").blue().bold())
    } else {
        format!("{scenario}: {}", "OK".green().bold())
    };

    if fields[6] == "2-way" {
        Some(format!("{line} {}", "2-way".magenta()))
    } else {
        Some(line)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn rev(fill: char) -> RevId {
        RevId::new(&fill.to_string().repeat(40)).unwrap()
    }

    fn sample(conflicts: Option<u32>, observed: Option<u32>, exit: ExitDisposition) -> RunResult {
        RunResult {
            project: "demo".to_owned(),
            timestamp: Some(1_500_000_000),
            merge_commit: Some(rev('c')),
            left: rev('a'),
            right: rev('b'),
            file: PathBuf::from("src/Main.java"),
            merge_type: MergeArity::ThreeWay,
            strategy: "structured".to_owned(),
            stats: MergeStatistics {
                conflicts,
                conflicted_lines: conflicts.map(|c| c * 7),
                conflicted_tokens: None,
                phase_timings: BTreeMap::new(),
                tool_version: Some("0.4.1".to_owned()),
            },
            observed_conflicts: observed,
            runtime: Some(1.2345),
            exit,
        }
    }

    #[test]
    fn row_has_stable_column_count() {
        let result = sample(Some(2), Some(2), ExitDisposition::Success { code: 0 });
        let row = result.to_row();
        assert_eq!(row.split(DELIMITER).count(), RESULT_COLUMNS.len());
    }

    #[test]
    fn absent_metrics_serialize_as_empty_fields() {
        let result = sample(None, None, ExitDisposition::Success { code: 0 });
        let row = result.to_row();
        let fields: Vec<&str> = row.split(DELIMITER).collect();
        assert_eq!(fields[8], "", "conflicts should be empty, not 0");
        assert_eq!(fields[11], "", "observed should be empty, not 0");
    }

    #[test]
    fn zero_metrics_serialize_as_zero() {
        let result = sample(Some(0), Some(0), ExitDisposition::Success { code: 0 });
        let fields_string = result.to_row();
        let fields: Vec<&str> = fields_string.split(DELIMITER).collect();
        assert_eq!(fields[8], "0");
        assert_eq!(fields[11], "0");
    }

    #[test]
    fn timings_land_in_fixed_and_extra_columns() {
        let mut result = sample(Some(0), Some(0), ExitDisposition::Success { code: 0 });
        result.stats.phase_timings = [
            ("merge".to_owned(), 0.5),
            ("parse".to_owned(), 0.25),
            ("StructuredStrategy".to_owned(), 1.0),
        ]
        .into_iter()
        .collect();

        let row = result.to_row();
        let fields: Vec<&str> = row.split(DELIMITER).collect();
        assert_eq!(fields[13], "0.5000");
        assert_eq!(fields[14], "0.2500");
        assert_eq!(fields[15], "", "semistructure not reported");
        assert_eq!(fields[16], "StructuredStrategy=1.0000");
    }

    #[test]
    fn mismatch_detection_requires_both_counts() {
        assert!(sample(Some(2), Some(1), ExitDisposition::Success { code: 0 }).has_count_mismatch());
        assert!(!sample(Some(2), Some(2), ExitDisposition::Success { code: 0 }).has_count_mismatch());
        assert!(!sample(Some(2), None, ExitDisposition::Success { code: 0 }).has_count_mismatch());
        assert!(!sample(None, Some(2), ExitDisposition::Success { code: 0 }).has_count_mismatch());
    }

    #[test]
    fn mismatch_flagged_when_both_nonzero() {
        // Disagreement matters even when neither count is zero.
        let result = sample(Some(3), Some(2), ExitDisposition::Success { code: 0 });
        assert!(result.has_count_mismatch());
        assert!(format_human(&result).contains("MISMATCH"));
    }

    #[test]
    fn sink_writes_header_once() {
        let mut buf = Vec::new();
        {
            let mut sink = ResultSink::new(&mut buf, true);
            let result = sample(Some(0), Some(0), ExitDisposition::Success { code: 0 });
            sink.write_row(&result).unwrap();
            sink.write_row(&result).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("# remerge result schema v"));
        assert_eq!(lines[1], RESULT_COLUMNS.join(";"));
    }

    #[test]
    fn sink_skips_header_when_appending() {
        let mut buf = Vec::new();
        {
            let mut sink = ResultSink::new(&mut buf, false);
            let result = sample(Some(0), Some(0), ExitDisposition::Success { code: 0 });
            sink.write_row(&result).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    // -- display precedence --

    #[test]
    fn failure_takes_precedence_over_mismatch() {
        let result = sample(Some(2), Some(1), ExitDisposition::Failed { code: Some(255) });
        let line = format_human(&result);
        assert!(line.contains("FAILED"), "{line}");
        assert!(!line.contains("MISMATCH"));
    }

    #[test]
    fn mismatch_takes_precedence_over_conflicts() {
        let result = sample(Some(2), Some(1), ExitDisposition::Success { code: 0 });
        let line = format_human(&result);
        assert!(line.contains("MISMATCH"), "{line}");
    }

    #[test]
    fn conflicts_reported_as_ok_with_count() {
        let result = sample(Some(2), Some(2), ExitDisposition::Success { code: 0 });
        let line = format_human(&result);
        assert!(line.contains("OK (2 conflicts"), "{line}");
    }

    #[test]
    fn clean_success_is_plain_ok() {
        let result = sample(Some(0), Some(0), ExitDisposition::Success { code: 0 });
        let line = format_human(&result);
        assert!(line.contains("OK"), "{line}");
        assert!(!line.contains("conflicts"));
    }

    #[test]
    fn two_way_is_annotated() {
        let mut result = sample(Some(0), Some(0), ExitDisposition::Success { code: 0 });
        result.merge_type = MergeArity::TwoWay;
        assert!(format_human(&result).contains("2-way"));
    }

    #[test]
    fn exit_disposition_display() {
        assert_eq!(ExitDisposition::Success { code: 3 }.to_string(), "3");
        assert_eq!(
            ExitDisposition::Failed { code: Some(200) }.to_string(),
            "FAIL(200)"
        );
        assert_eq!(ExitDisposition::Failed { code: None }.to_string(), "FAIL(signal)");
        assert_eq!(ExitDisposition::TimedOut.to_string(), "TIMEOUT");
    }

    // -- colorize_row --

    #[test]
    fn colorize_row_skips_header_lines() {
        assert!(colorize_row("# remerge result schema v1").is_none());
        assert!(colorize_row(&RESULT_COLUMNS.join(";")).is_none());
        assert!(colorize_row("short;row").is_none());
    }

    #[test]
    fn colorize_row_roundtrips_a_written_row() {
        let result = sample(Some(2), Some(1), ExitDisposition::Success { code: 0 });
        let line = colorize_row(&result.to_row()).expect("data row should colorize");
        assert!(line.contains("MISMATCH"), "{line}");
        assert!(line.contains("demo"));
    }

    #[test]
    fn colorize_row_flags_failures() {
        let result = sample(None, None, ExitDisposition::TimedOut);
        let line = colorize_row(&result.to_row()).expect("data row should colorize");
        assert!(line.contains("FAILED"), "{line}");
    }
}
