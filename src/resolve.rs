//! Scenario resolution.
//!
//! Classifies the files touched by two divergent revisions into an ordered
//! set of per-file merge scenarios plus skip records. Identity across the
//! two sides is reconciled through rename tracking: entries pair up when
//! their pre-rename origin paths match, or when a rename target on one side
//! lands on a path the other side touched.
//!
//! A path is "touched" on a side iff it appears as an add, modify, or
//! rename target in the ancestor-relative diff from the merge base to that
//! side's tip. Deletions are never touched. With no merge base, the diff
//! runs from the opposite tip and scenarios are two-way.
//!
//! Classification is pure: this module performs no I/O beyond the diffs its
//! caller supplies. When the two sides disagree on a file's identity, the
//! file is skipped rather than guessed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::model::{
    ChangeStatus, ChangedPath, MergeArity, MergeScenario, RevId, SkipReason, SkipRecord,
};
use crate::repo::{GitError, GitRepo};

// ---------------------------------------------------------------------------
// FileFilter
// ---------------------------------------------------------------------------

/// Predicate selecting which files are merge targets, by extension.
#[derive(Clone, Debug)]
pub struct FileFilter {
    extensions: Vec<String>,
}

impl FileFilter {
    /// Build a filter from extensions (without the leading dot).
    #[must_use]
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions.to_vec(),
        }
    }

    /// Whether `path` is a target file.
    #[must_use]
    pub fn is_target(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|t| t == ext))
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            extensions: vec!["java".to_owned()],
        }
    }
}

// ---------------------------------------------------------------------------
// ScenarioSet
// ---------------------------------------------------------------------------

/// The resolver's output: scheduled scenarios and skip records.
///
/// Every touched logical file lands in exactly one of the two collections.
#[derive(Clone, Debug, Default)]
pub struct ScenarioSet {
    /// Scheduled merge scenarios, ordered by left-tip path.
    pub scenarios: Vec<MergeScenario>,
    /// Files classified but not scheduled.
    pub skipped: Vec<SkipRecord>,
    /// The merge base coincides with one tip — the whole commit is a
    /// fast-forward. Scenarios are still emitted; callers may short-circuit.
    pub fast_forward: bool,
}

impl ScenarioSet {
    /// Total number of classified files.
    #[must_use]
    pub fn classified_count(&self) -> usize {
        self.scenarios.len() + self.skipped.len()
    }
}

// ---------------------------------------------------------------------------
// Side entries
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TouchKind {
    Added,
    Modified,
    Renamed,
}

#[derive(Clone, Debug)]
struct SideEntry {
    tip: PathBuf,
    kind: TouchKind,
}

/// origin path → entry. Deletions are excluded: they are not "touched".
fn side_map(changes: &[ChangedPath]) -> BTreeMap<PathBuf, SideEntry> {
    let mut map = BTreeMap::new();
    for change in changes {
        let (origin, entry) = match &change.status {
            ChangeStatus::Added => (
                change.path.clone(),
                SideEntry {
                    tip: change.path.clone(),
                    kind: TouchKind::Added,
                },
            ),
            ChangeStatus::Modified => (
                change.path.clone(),
                SideEntry {
                    tip: change.path.clone(),
                    kind: TouchKind::Modified,
                },
            ),
            ChangeStatus::Renamed { old } => (
                old.clone(),
                SideEntry {
                    tip: change.path.clone(),
                    kind: TouchKind::Renamed,
                },
            ),
            ChangeStatus::Deleted => continue,
        };
        map.insert(origin, entry);
    }
    map
}

// ---------------------------------------------------------------------------
// classify
// ---------------------------------------------------------------------------

/// Classify two per-side change lists into scenarios and skips.
///
/// `has_base` selects whether scheduled scenarios get a candidate base path
/// (three-way) or none (two-way). The base blob's actual existence is
/// probed later, at materialization.
#[must_use]
pub fn classify(
    left_changes: &[ChangedPath],
    right_changes: &[ChangedPath],
    has_base: bool,
    filter: &FileFilter,
) -> ScenarioSet {
    let mut left = side_map(left_changes);
    let mut right = side_map(right_changes);

    let mut scenarios = Vec::new();
    let mut skipped: BTreeMap<PathBuf, SkipReason> = BTreeMap::new();

    // Unsupported file types are skipped before any pairing, so that a
    // non-target file is reported as such even when only one side touched it.
    for map in [&mut left, &mut right] {
        map.retain(|_, entry| {
            if filter.is_target(&entry.tip) {
                true
            } else {
                skipped.insert(entry.tip.clone(), SkipReason::UnsupportedFileType);
                false
            }
        });
    }

    // Pair by origin: the same pre-rename identity touched on both sides.
    let shared_origins: Vec<PathBuf> = left
        .keys()
        .filter(|o| right.contains_key(*o))
        .cloned()
        .collect();

    for origin in shared_origins {
        let (Some(l), Some(r)) = (left.remove(&origin), right.remove(&origin)) else {
            continue;
        };
        if l.kind == TouchKind::Renamed && r.kind == TouchKind::Renamed && l.tip != r.tip {
            skipped.insert(origin, SkipReason::RenameRenameConflict);
            continue;
        }
        let both_added = l.kind == TouchKind::Added && r.kind == TouchKind::Added;
        let (base_path, arity) = if has_base && !both_added {
            (Some(origin), MergeArity::ThreeWay)
        } else {
            (None, MergeArity::TwoWay)
        };
        scenarios.push(MergeScenario {
            left_path: l.tip,
            base_path,
            right_path: r.tip,
            arity,
        });
    }

    // Pair remaining entries by tip: a rename target on one side landing on
    // a path the other side touched under a different identity.
    let left_tips: BTreeMap<PathBuf, PathBuf> = left
        .iter()
        .map(|(origin, e)| (e.tip.clone(), origin.clone()))
        .collect();
    for (tip, left_origin) in left_tips {
        let Some(right_origin) = right
            .iter()
            .find(|(_, e)| e.tip == tip)
            .map(|(origin, _)| origin.clone())
        else {
            continue;
        };
        let (Some(l), Some(r)) = (left.remove(&left_origin), right.remove(&right_origin)) else {
            continue;
        };
        match (l.kind, r.kind) {
            // A fresh addition colliding with a carried-over rename: the
            // path cannot be both. Skipped rather than guessed.
            (TouchKind::Added, TouchKind::Renamed) | (TouchKind::Renamed, TouchKind::Added) => {
                skipped.insert(tip, SkipReason::AddRenameConflict);
            }
            // Two different files renamed onto the same destination.
            (TouchKind::Renamed, TouchKind::Renamed) => {
                skipped.insert(tip, SkipReason::RenameRenameConflict);
            }
            // One side edited in place, the other renamed something onto the
            // same path; the rename supplies the base identity.
            _ => {
                let rename_origin = if l.kind == TouchKind::Renamed {
                    left_origin
                } else {
                    right_origin
                };
                let (base_path, arity) = if has_base {
                    (Some(rename_origin), MergeArity::ThreeWay)
                } else {
                    (None, MergeArity::TwoWay)
                };
                scenarios.push(MergeScenario {
                    left_path: l.tip,
                    base_path,
                    right_path: r.tip,
                    arity,
                });
            }
        }
    }

    // Everything left was touched on exactly one side.
    for entry in left.values().chain(right.values()) {
        skipped.entry(entry.tip.clone()).or_insert(SkipReason::FastForward);
    }

    scenarios.sort_by(|a, b| a.left_path.cmp(&b.left_path));
    let skipped = skipped
        .into_iter()
        .map(|(path, reason)| SkipRecord::new(path, reason))
        .collect();

    ScenarioSet {
        scenarios,
        skipped,
        fast_forward: false,
    }
}

// ---------------------------------------------------------------------------
// resolve_scenarios
// ---------------------------------------------------------------------------

/// Resolve the merge scenarios between two tips.
///
/// Computes the two ancestor-relative diffs (from `base` to each tip, or
/// from the opposite tip when no base exists) and classifies them.
///
/// # Errors
/// Fails when the underlying diff queries fail.
pub fn resolve_scenarios(
    repo: &GitRepo,
    left: &RevId,
    right: &RevId,
    base: Option<&RevId>,
    filter: &FileFilter,
) -> Result<ScenarioSet, GitError> {
    let left_from = base.unwrap_or(right);
    let right_from = base.unwrap_or(left);

    let left_changes = repo.changed_paths(left_from, left)?;
    let right_changes = repo.changed_paths(right_from, right)?;

    let mut set = classify(&left_changes, &right_changes, base.is_some(), filter);
    set.fast_forward = base == Some(left) || base == Some(right);
    Ok(set)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
