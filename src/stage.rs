//! Staging-tree materialization.
//!
//! For each scheduled scenario, writes the participating `(revision, path)`
//! blobs verbatim into an isolated per-commit staging tree and builds the
//! merge-tool invocation inputs:
//!
//! ```text
//! <root>/left/<path>       left tip content
//! <root>/base/<path>       base content (three-way only)
//! <root>/right/<path>      right tip content
//! <root>/<strategy>/<path> merge output, one tree per strategy
//! ```
//!
//! The staging root is owned by one invocation: a pre-existing target
//! directory is rejected before any work, so results from two runs can
//! never silently mix.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ReplayError;
use crate::model::{MergeArity, MergeScenario, RevId};
use crate::repo::{BlobContent, GitRepo};

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A materialized merge job: the staged inputs for one scenario.
///
/// Invariant: `input_files` holds exactly 2 entries for a two-way scenario
/// and 3 for a three-way one, ordered left[, base], right — the external
/// tool treats the middle argument specially.
#[derive(Clone, Debug)]
pub struct Job {
    /// The scenario, with arity finalized against the actual base blob.
    pub scenario: MergeScenario,
    /// Absolute staged input paths, ordered left[, base], right.
    pub input_files: Vec<PathBuf>,
    /// The commit's staging root.
    pub work_dir: PathBuf,
}

impl Job {
    /// The output file the tool writes for `strategy`.
    #[must_use]
    pub fn output_for(&self, strategy: &str) -> PathBuf {
        self.work_dir.join(strategy).join(self.scenario.output_path())
    }
}

// ---------------------------------------------------------------------------
// StagingArea
// ---------------------------------------------------------------------------

/// An isolated staging directory tree for one replayed commit.
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Claim `root` as a fresh staging tree.
    ///
    /// # Errors
    /// Fails with [`ReplayError::StagingExists`] if the directory already
    /// exists, before any engine work runs.
    pub fn create(root: PathBuf) -> Result<Self, ReplayError> {
        if root.exists() {
            return Err(ReplayError::StagingExists { path: root });
        }
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The staging root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stage one scenario's inputs and build its [`Job`].
    ///
    /// The base role is probed here: an absent base blob omits the role and
    /// downgrades the scenario to two-way.
    ///
    /// # Errors
    /// An absent left or right blob is a [`ReplayError::MissingBlob`] — the
    /// resolver only schedules paths present on both tips. Staging I/O
    /// failures propagate.
    pub fn materialize(
        &self,
        repo: &GitRepo,
        scenario: &MergeScenario,
        left: &RevId,
        base: Option<&RevId>,
        right: &RevId,
    ) -> Result<Job, ReplayError> {
        let mut scenario = scenario.clone();
        let mut input_files = Vec::with_capacity(3);

        input_files.push(self.stage_role(repo, left, &scenario.left_path, "left")?);

        match (base, scenario.base_path.take()) {
            (Some(base_rev), Some(base_path)) => {
                match repo.read_blob(base_rev, &base_path)? {
                    BlobContent::Found(bytes) => {
                        let staged = self.write_role("base", &base_path, &bytes)?;
                        input_files.push(staged);
                        scenario.base_path = Some(base_path);
                    }
                    BlobContent::Absent => {
                        // The base blob turned out not to exist (deleted or
                        // never present): automatic two-way downgrade.
                        scenario.arity = MergeArity::TwoWay;
                    }
                }
            }
            _ => {
                scenario.arity = MergeArity::TwoWay;
            }
        }

        input_files.push(self.stage_role(repo, right, &scenario.right_path, "right")?);

        debug_assert_eq!(
            input_files.len(),
            match scenario.arity {
                MergeArity::ThreeWay => 3,
                MergeArity::TwoWay => 2,
            }
        );

        Ok(Job {
            scenario,
            input_files,
            work_dir: self.root.clone(),
        })
    }

    /// Stage a role that must exist; absence is an error.
    fn stage_role(
        &self,
        repo: &GitRepo,
        rev: &RevId,
        path: &Path,
        role: &str,
    ) -> Result<PathBuf, ReplayError> {
        match repo.read_blob(rev, path)? {
            BlobContent::Found(bytes) => self.write_role(role, path, &bytes),
            BlobContent::Absent => Err(ReplayError::MissingBlob {
                rev: rev.short().to_owned(),
                path: path.to_path_buf(),
            }),
        }
    }

    /// Write blob bytes under `<root>/<role>/<path>`, creating parents.
    fn write_role(&self, role: &str, path: &Path, bytes: &[u8]) -> Result<PathBuf, ReplayError> {
        let target = self.root.join(role).join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, bytes)?;
        Ok(target)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
