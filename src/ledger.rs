//! Completion ledger.
//!
//! An append-only fact file per project recording which `(merge commit,
//! strategy)` pairs have already been processed successfully, enabling
//! resumable batches across invocations spanning days or weeks. Facts are
//! never deleted — pruning removes merge artifacts, not ledger facts.
//!
//! Row format, one fact per line:
//!
//! ```text
//! <project>;<merge commit>;<strategy>
//! ```
//!
//! The ledger is read once per commit and appended once per commit; a
//! single writer per invocation is assumed.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use crate::model::RevId;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from ledger reads and appends.
#[derive(Debug)]
pub enum LedgerError {
    /// The ledger file could not be read or appended.
    Io {
        /// The ledger file path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(
                    f,
                    "ledger file '{}' could not be accessed: {source}\n  To fix: check permissions on the ledger directory.",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// CompletionLedger
// ---------------------------------------------------------------------------

/// The per-project completion ledger.
pub struct CompletionLedger {
    project: String,
    path: PathBuf,
}

impl CompletionLedger {
    /// Open (without creating) the ledger for `project` under `dir`.
    #[must_use]
    pub fn open(dir: &Path, project: &str) -> Self {
        Self {
            project: project.to_owned(),
            path: dir.join(format!("{project}.ledger")),
        }
    }

    /// The ledger file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strategies already completed for `merge`.
    ///
    /// A missing ledger file means no work has been recorded yet. Malformed
    /// rows are skipped.
    ///
    /// # Errors
    /// Fails when the ledger file exists but cannot be read.
    pub fn completed_strategies(&self, merge: &RevId) -> Result<BTreeSet<String>, LedgerError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let mut done = BTreeSet::new();
        for line in content.lines() {
            let mut fields = line.split(';');
            let (Some(project), Some(commit), Some(strategy)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            if project == self.project && commit == merge.as_str() && !strategy.is_empty() {
                done.insert(strategy.to_owned());
            }
        }
        Ok(done)
    }

    /// Append one completion fact. Callers guard against duplicates with
    /// the set returned by [`Self::completed_strategies`].
    ///
    /// # Errors
    /// Fails when the ledger file cannot be created or appended.
    pub fn append(&self, merge: &RevId, strategy: &str) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        writeln!(file, "{};{};{}", self.project, merge.as_str(), strategy).map_err(|e| {
            LedgerError::Io {
                path: self.path.clone(),
                source: e,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
