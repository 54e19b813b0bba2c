//! Replay error types.
//!
//! Defines [`ReplayError`], the unified error type for batch replay
//! operations. Precondition failures abort a single commit's processing;
//! everything scenario-scoped is recorded in result rows and the error log
//! instead of being raised through this type.

use std::fmt;
use std::path::PathBuf;

use crate::ledger::LedgerError;
use crate::repo::GitError;

// ---------------------------------------------------------------------------
// ReplayError
// ---------------------------------------------------------------------------

/// Unified error type for replay operations.
#[derive(Debug)]
pub enum ReplayError {
    /// The merge commit has more than two parents; "left/right" is undefined.
    OctopusMerge {
        /// The offending commit.
        commit: String,
        /// How many parents it has.
        parent_count: usize,
    },

    /// The commit is not a merge (fewer than two parents) and no explicit
    /// left/right pair was given.
    NotAMerge {
        /// The offending commit.
        commit: String,
    },

    /// The staging target directory already exists.
    ///
    /// Re-running into a populated staging tree would silently mix results
    /// from two runs, so this fails before any work.
    StagingExists {
        /// The pre-existing directory.
        path: PathBuf,
    },

    /// A blob that must exist (a tip-side input) could not be read.
    MissingBlob {
        /// The revision the blob was expected at.
        rev: String,
        /// The path within that revision.
        path: PathBuf,
    },

    /// A git query failed.
    Git(GitError),

    /// A ledger read or append failed.
    Ledger(LedgerError),

    /// An I/O error occurred during staging or logging.
    Io(std::io::Error),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OctopusMerge {
                commit,
                parent_count,
            } => {
                write!(
                    f,
                    "commit {commit} has {parent_count} parents — octopus merges have no left/right sides.\n  To fix: replay each parent pair explicitly: remerge replay <left> <right>"
                )
            }
            Self::NotAMerge { commit } => {
                write!(
                    f,
                    "commit {commit} is not a merge commit.\n  To fix: pass a merge commit, or an explicit pair: remerge replay <left> <right>"
                )
            }
            Self::StagingExists { path } => {
                write!(
                    f,
                    "staging directory already exists: {}\n  To fix: remove it or choose another output directory with -o.",
                    path.display()
                )
            }
            Self::MissingBlob { rev, path } => {
                write!(
                    f,
                    "blob {}:{} does not exist but was scheduled for merging.\n  To fix: this indicates stale resolution state; re-run against a clean staging directory.",
                    rev,
                    path.display()
                )
            }
            Self::Git(e) => write!(f, "{e}"),
            Self::Ledger(e) => write!(f, "{e}"),
            Self::Io(e) => {
                write!(
                    f,
                    "I/O error: {e}\n  To fix: check file permissions and disk space."
                )
            }
        }
    }
}

impl std::error::Error for ReplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Git(e) => Some(e),
            Self::Ledger(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GitError> for ReplayError {
    fn from(e: GitError) -> Self {
        Self::Git(e)
    }
}

impl From<LedgerError> for ReplayError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

impl From<std::io::Error> for ReplayError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_octopus() {
        let err = ReplayError::OctopusMerge {
            commit: "abc1234".to_owned(),
            parent_count: 3,
        };
        let msg = format!("{err}");
        assert!(msg.contains("abc1234"));
        assert!(msg.contains("3 parents"));
        assert!(msg.contains("remerge replay <left> <right>"));
    }

    #[test]
    fn display_not_a_merge() {
        let err = ReplayError::NotAMerge {
            commit: "deadbee".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("deadbee"));
        assert!(msg.contains("not a merge"));
    }

    #[test]
    fn display_staging_exists() {
        let err = ReplayError::StagingExists {
            path: PathBuf::from("/tmp/out/abc"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("/tmp/out/abc"));
        assert!(msg.contains("already exists"));
    }

    #[test]
    fn display_missing_blob() {
        let err = ReplayError::MissingBlob {
            rev: "aabbccd".to_owned(),
            path: PathBuf::from("src/A.java"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("aabbccd"));
        assert!(msg.contains("src/A.java"));
    }

    #[test]
    fn from_io_error() {
        let err: ReplayError = std::io::Error::other("disk full").into();
        assert!(matches!(err, ReplayError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
