//! Merge-tool statistics.
//!
//! The external tool's success-range output is an XML statistics document:
//!
//! ```text
//! <statistics version="0.4.1">
//!   <merge conflicts="2" clines="14" ctokens="37"/>
//!   <timings>
//!     <phase name="merge" time="0.8130"/>
//!     <phase name="parse" time="0.2210"/>
//!   </timings>
//! </statistics>
//! ```
//!
//! Parsing is deliberately lenient: a malformed document or missing fields
//! degrade to absent values, never to a batch failure. Absence is
//! distinguishable from a verified zero everywhere downstream.

use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// MergeStatistics
// ---------------------------------------------------------------------------

/// Tool-reported merge statistics. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeStatistics {
    /// Number of conflicts the tool reports.
    pub conflicts: Option<u32>,
    /// Number of conflicted lines.
    pub conflicted_lines: Option<u32>,
    /// Number of conflicted tokens.
    pub conflicted_tokens: Option<u32>,
    /// Named sub-phase timings, in seconds.
    pub phase_timings: BTreeMap<String, f64>,
    /// The tool's version tag.
    pub tool_version: Option<String>,
}

impl MergeStatistics {
    /// Statistics with every field absent.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a statistics document from the tool's standard output.
    ///
    /// Unparseable input yields [`Self::empty`]; individually missing or
    /// malformed fields are simply absent.
    #[must_use]
    pub fn parse(stdout: &str) -> Self {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Self::empty();
        }
        let Ok(doc) = roxmltree::Document::parse(trimmed) else {
            return Self::empty();
        };

        let mut stats = Self {
            tool_version: doc
                .root_element()
                .attribute("version")
                .map(ToOwned::to_owned),
            ..Self::default()
        };

        for node in doc.descendants().filter(roxmltree::Node::is_element) {
            if stats.conflicts.is_none() {
                stats.conflicts = parse_attr(&node, "conflicts");
            }
            if stats.conflicted_lines.is_none() {
                stats.conflicted_lines = parse_attr(&node, "clines");
            }
            if stats.conflicted_tokens.is_none() {
                stats.conflicted_tokens = parse_attr(&node, "ctokens");
            }
            if node.has_tag_name("phase") {
                if let (Some(name), Some(time)) = (
                    node.attribute("name"),
                    node.attribute("time").and_then(|t| t.parse::<f64>().ok()),
                ) {
                    stats.phase_timings.insert(name.to_owned(), time);
                }
            }
        }
        stats
    }
}

fn parse_attr(node: &roxmltree::Node<'_, '_>, name: &str) -> Option<u32> {
    node.attribute(name).and_then(|v| v.parse().ok())
}

// ---------------------------------------------------------------------------
// Conflict markers
// ---------------------------------------------------------------------------

/// Count merge-conflict marker lines in produced output.
///
/// A well-formed conflict contributes one `<<<<<<<`, one `=======`, and one
/// `>>>>>>>` line; the observed count is the minimum of the three marker
/// counts so that stray separator lines in content don't inflate it. This
/// is a cross-check against the tool's self-reported count, not a
/// replacement.
#[must_use]
pub fn count_conflict_markers(content: &[u8]) -> u32 {
    let text = String::from_utf8_lossy(content);
    let mut opens: u32 = 0;
    let mut seps: u32 = 0;
    let mut closes: u32 = 0;
    for line in text.lines() {
        if line.starts_with("<<<<<<<") {
            opens += 1;
        } else if line.starts_with("=======") {
            seps += 1;
        } else if line.starts_with(">>>>>>>") {
            closes += 1;
        }
    }
    opens.min(seps).min(closes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
