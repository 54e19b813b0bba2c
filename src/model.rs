//! Core replay types.
//!
//! Foundation types used throughout remerge: validated revision identifiers,
//! changed-path records from the history provider, classified merge
//! scenarios, and skip records.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RevId
// ---------------------------------------------------------------------------

/// A validated 40-character lowercase hex revision identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevId(String);

impl RevId {
    /// Create a new `RevId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 40 lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the inner hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the abbreviated 7-character form used in human-readable output.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.len() != 40 {
            return Err(ValidationError {
                value: s.to_owned(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ValidationError {
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for RevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RevId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RevId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<RevId> for String {
    fn from(rev: RevId) -> Self {
        rev.0
    }
}

/// A revision identifier failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// The invalid value that was provided.
    pub value: String,
    /// Why the value is invalid.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid revision id '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// ChangedPath
// ---------------------------------------------------------------------------

/// How a path changed between two revisions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeStatus {
    /// The path exists only in the newer revision.
    Added,
    /// The path exists in both revisions with different content.
    Modified,
    /// The path exists only in the older revision.
    Deleted,
    /// The path was moved; `old` is its name in the older revision.
    Renamed {
        /// The path's name in the older revision.
        old: PathBuf,
    },
}

/// One row of a `--name-status` diff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedPath {
    /// The path as it appears in the newer revision (for deletions, the
    /// path in the older revision).
    pub path: PathBuf,
    /// The kind of change.
    pub status: ChangeStatus,
}

impl ChangedPath {
    /// Create a changed-path record.
    #[must_use]
    pub const fn new(path: PathBuf, status: ChangeStatus) -> Self {
        Self { path, status }
    }

    /// The path this file had in the older revision, accounting for renames.
    #[must_use]
    pub const fn origin(&self) -> &PathBuf {
        match &self.status {
            ChangeStatus::Renamed { old } => old,
            _ => &self.path,
        }
    }
}

// ---------------------------------------------------------------------------
// MergeScenario
// ---------------------------------------------------------------------------

/// Whether a merge has three inputs (left/base/right) or two (no ancestor).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MergeArity {
    /// left, base, right.
    ThreeWay,
    /// left, right — no common-ancestor content.
    TwoWay,
}

impl fmt::Display for MergeArity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreeWay => write!(f, "3-way"),
            Self::TwoWay => write!(f, "2-way"),
        }
    }
}

/// A classified description of how one file should be merged.
///
/// `left_path` and `right_path` denote the same logical file as it appears
/// on each tip after rename reconciliation. `base_path` is present iff a
/// blob exists at the base revision under the reconciled origin path; the
/// materializer finalizes this by probing the base blob and downgrading
/// `arity` to [`MergeArity::TwoWay`] when it is absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeScenario {
    /// The file's path on the left tip.
    pub left_path: PathBuf,
    /// The reconciled path at the base revision, when one may exist.
    pub base_path: Option<PathBuf>,
    /// The file's path on the right tip.
    pub right_path: PathBuf,
    /// Input arity.
    pub arity: MergeArity,
}

impl MergeScenario {
    /// The path the merged output is written under (the left tip's name).
    #[must_use]
    pub const fn output_path(&self) -> &PathBuf {
        &self.left_path
    }
}

impl fmt::Display for MergeScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.left_path.display(), self.arity)?;
        if self.right_path != self.left_path {
            write!(f, " [right: {}]", self.right_path.display())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SkipRecord
// ---------------------------------------------------------------------------

/// Why a touched path was not scheduled for merging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The path is not a target file type (fails the file filter).
    UnsupportedFileType,
    /// Only one side touched the path; that side's version wins trivially.
    FastForward,
    /// Both sides renamed the file to different destinations.
    RenameRenameConflict,
    /// One side added the path fresh while the other carried it in via a
    /// rename; the path cannot be both.
    AddRenameConflict,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFileType => write!(f, "unsupported file type"),
            Self::FastForward => write!(f, "fast-forward"),
            Self::RenameRenameConflict => write!(f, "rename/rename conflict"),
            Self::AddRenameConflict => write!(f, "add/rename conflict"),
        }
    }
}

/// A path that was classified but not scheduled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkipRecord {
    /// The logical file (origin path where one exists, tip path otherwise).
    pub path: PathBuf,
    /// Why the path was skipped.
    pub reason: SkipReason,
}

impl SkipRecord {
    /// Create a skip record.
    #[must_use]
    pub const fn new(path: PathBuf, reason: SkipReason) -> Self {
        Self { path, reason }
    }
}

impl fmt::Display for SkipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
