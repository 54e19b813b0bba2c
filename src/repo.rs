//! Git history provider.
//!
//! Wraps the `git` binary as a black-box query interface: changed paths
//! between revisions (rename detection on), blob content at a revision,
//! merge bases, commit parents, and commit timestamps. All queries run as
//! blocking subprocesses with stderr captured into structured errors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::model::{ChangeStatus, ChangedPath, RevId};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from the git history provider.
#[derive(Debug)]
pub enum GitError {
    /// A git command failed.
    GitCommand {
        /// The command that was run (e.g. `"git diff --name-status"`).
        command: String,
        /// Captured stderr from git.
        stderr: String,
        /// Process exit code, if available.
        exit_code: Option<i32>,
    },
    /// Git printed a revision id that failed validation.
    InvalidRev {
        /// The raw bytes git printed.
        raw: String,
    },
    /// An I/O error occurred spawning git.
    Io(std::io::Error),
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitCommand {
                command,
                stderr,
                exit_code,
            } => {
                write!(f, "`{command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::InvalidRev { raw } => {
                write!(
                    f,
                    "git returned an invalid revision id: {raw:?} (expected 40 lowercase hex characters)"
                )
            }
            Self::Io(e) => write!(f, "I/O error running git: {e}"),
        }
    }
}

impl std::error::Error for GitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GitError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// BlobContent
// ---------------------------------------------------------------------------

/// The result of looking up a blob at `(revision, path)`.
///
/// "Absent at that revision" is an expected outcome (a deleted base, a
/// fresh addition), so it is a typed case rather than an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobContent {
    /// The blob exists; its verbatim bytes.
    Found(Vec<u8>),
    /// No blob exists at that path in that revision.
    Absent,
}

impl BlobContent {
    /// Returns `true` for the [`Self::Found`] case.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

// ---------------------------------------------------------------------------
// GitRepo
// ---------------------------------------------------------------------------

/// A history provider backed by the `git` binary.
pub struct GitRepo {
    /// The repository working directory.
    root: PathBuf,
}

impl GitRepo {
    /// Create a provider for the repository at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The repository root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The project name: the repository directory's basename.
    #[must_use]
    pub fn project_name(&self) -> String {
        self.root
            .file_name()
            .map_or_else(|| "unknown".to_owned(), |n| n.to_string_lossy().into_owned())
    }

    /// Run a git command and return its raw output.
    fn git_output(&self, args: &[&str]) -> Result<std::process::Output, GitError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(GitError::Io)
    }

    /// Run a git command and return its stdout, treating failure as an error.
    fn git_stdout(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.git_output(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(GitError::GitCommand {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                exit_code: output.status.code(),
            })
        }
    }

    /// Resolve any revision spec (ref name, abbreviated hash) to a full id.
    ///
    /// # Errors
    /// Fails when the spec does not name a commit in this repository.
    pub fn rev_parse(&self, spec: &str) -> Result<RevId, GitError> {
        let verify = format!("{spec}^{{commit}}");
        let out = self.git_stdout(&["rev-parse", "--verify", &verify])?;
        parse_rev(out.trim())
    }

    /// List changed paths between two revisions with rename detection.
    ///
    /// `from` is the older side; statuses are relative to it (an `Added`
    /// path exists only in `to`).
    ///
    /// # Errors
    /// Fails when either revision is unknown or git cannot be run.
    pub fn changed_paths(&self, from: &RevId, to: &RevId) -> Result<Vec<ChangedPath>, GitError> {
        let out = self.git_stdout(&[
            "diff",
            "--name-status",
            "-M",
            from.as_str(),
            to.as_str(),
        ])?;
        Ok(parse_name_status(&out))
    }

    /// Read the blob at `rev:path`.
    ///
    /// A path that does not exist at that revision is the typed
    /// [`BlobContent::Absent`] case; other git failures are errors.
    ///
    /// # Errors
    /// Fails when the revision is unknown or git cannot be run.
    pub fn read_blob(&self, rev: &RevId, path: &Path) -> Result<BlobContent, GitError> {
        let spec = format!("{}:{}", rev.as_str(), path.display());
        let output = self.git_output(&["show", &spec])?;
        if output.status.success() {
            return Ok(BlobContent::Found(output.stdout));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("does not exist") || stderr.contains("exists on disk, but not in") {
            return Ok(BlobContent::Absent);
        }
        Err(GitError::GitCommand {
            command: format!("git show {spec}"),
            stderr: stderr.trim().to_owned(),
            exit_code: output.status.code(),
        })
    }

    /// Find the nearest common ancestor of two revisions.
    ///
    /// Returns `None` when no common ancestor exists (unrelated histories),
    /// which switches downstream merges to two-way.
    ///
    /// # Errors
    /// Fails when either revision is unknown or git cannot be run.
    pub fn merge_base(&self, a: &RevId, b: &RevId) -> Result<Option<RevId>, GitError> {
        let output = self.git_output(&["merge-base", a.as_str(), b.as_str()])?;
        if output.status.success() {
            let raw = String::from_utf8_lossy(&output.stdout);
            return parse_rev(raw.trim()).map(Some);
        }
        // Exit code 1 = no common ancestor; anything else is a real failure.
        if output.status.code() == Some(1) {
            return Ok(None);
        }
        Err(GitError::GitCommand {
            command: format!("git merge-base {} {}", a.short(), b.short()),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            exit_code: output.status.code(),
        })
    }

    /// List a commit's parents in order.
    ///
    /// # Errors
    /// Fails when the commit is unknown or git prints a malformed id.
    pub fn parents(&self, commit: &RevId) -> Result<Vec<RevId>, GitError> {
        let out = self.git_stdout(&["log", "--pretty=%P", "-n1", commit.as_str()])?;
        out.split_whitespace().map(parse_rev).collect()
    }

    /// The commit's committer timestamp, in seconds since the epoch.
    ///
    /// # Errors
    /// Fails when the commit is unknown or git prints a malformed value.
    pub fn commit_timestamp(&self, commit: &RevId) -> Result<i64, GitError> {
        let out = self.git_stdout(&["log", "--pretty=%ct", "-n1", commit.as_str()])?;
        out.trim().parse().map_err(|_| GitError::InvalidRev {
            raw: out.trim().to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Porcelain parsers
// ---------------------------------------------------------------------------

fn parse_rev(raw: &str) -> Result<RevId, GitError> {
    RevId::new(raw).map_err(|_| GitError::InvalidRev {
        raw: raw.to_owned(),
    })
}

/// Parse `git diff --name-status -M` output.
///
/// Format, one record per line:
/// ```text
/// M\tpath
/// A\tpath
/// D\tpath
/// R<score>\told\tnew
/// ```
/// Copy records (`C<score>`) are treated as additions of the new path.
/// Unknown status letters are skipped.
fn parse_name_status(output: &str) -> Vec<ChangedPath> {
    let mut changes = Vec::new();
    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let Some(status) = fields.next() else {
            continue;
        };
        let Some(first) = fields.next() else {
            continue;
        };
        match status.chars().next() {
            Some('A') => changes.push(ChangedPath::new(PathBuf::from(first), ChangeStatus::Added)),
            Some('M') => {
                changes.push(ChangedPath::new(PathBuf::from(first), ChangeStatus::Modified));
            }
            Some('D') => {
                changes.push(ChangedPath::new(PathBuf::from(first), ChangeStatus::Deleted));
            }
            Some('R') => {
                if let Some(new) = fields.next() {
                    changes.push(ChangedPath::new(
                        PathBuf::from(new),
                        ChangeStatus::Renamed {
                            old: PathBuf::from(first),
                        },
                    ));
                }
            }
            Some('C') => {
                if let Some(new) = fields.next() {
                    changes.push(ChangedPath::new(PathBuf::from(new), ChangeStatus::Added));
                }
            }
            _ => {}
        }
    }
    changes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Helper: set up a fresh git repo with one commit.
    fn setup_git_repo() -> (TempDir, RevId) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.name", "Test User"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "commit.gpgsign", "false"],
        ] {
            let out = Command::new("git")
                .args(&args)
                .current_dir(root)
                .output()
                .unwrap();
            assert!(out.status.success(), "git {args:?} failed");
        }

        fs::write(root.join("README.md"), "# Test Repo\n").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-m", "initial"]);

        let repo = GitRepo::new(root.to_path_buf());
        let head = repo.rev_parse("HEAD").unwrap();
        (temp_dir, head)
    }

    fn git(dir: &Path, args: &[&str]) {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr)
        );
    }

    fn commit_all(dir: &Path, msg: &str) -> RevId {
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-m", msg]);
        GitRepo::new(dir.to_path_buf()).rev_parse("HEAD").unwrap()
    }

    // -- rev_parse --

    #[test]
    fn rev_parse_head() {
        let (dir, head) = setup_git_repo();
        let repo = GitRepo::new(dir.path().to_path_buf());
        assert_eq!(repo.rev_parse("HEAD").unwrap(), head);
    }

    #[test]
    fn rev_parse_unknown_ref_fails() {
        let (dir, _) = setup_git_repo();
        let repo = GitRepo::new(dir.path().to_path_buf());
        let err = repo.rev_parse("no-such-branch").unwrap_err();
        assert!(matches!(err, GitError::GitCommand { .. }), "{err}");
    }

    // -- changed_paths --

    #[test]
    fn changed_paths_statuses() {
        let (dir, base) = setup_git_repo();
        let root = dir.path();

        fs::write(root.join("added.java"), "class A {}\n").unwrap();
        fs::write(root.join("README.md"), "# changed\n").unwrap();
        let tip = commit_all(root, "add and modify");

        let repo = GitRepo::new(root.to_path_buf());
        let changes = repo.changed_paths(&base, &tip).unwrap();
        assert_eq!(changes.len(), 2, "{changes:?}");
        assert!(changes.contains(&ChangedPath::new(
            PathBuf::from("added.java"),
            ChangeStatus::Added
        )));
        assert!(changes.contains(&ChangedPath::new(
            PathBuf::from("README.md"),
            ChangeStatus::Modified
        )));
    }

    #[test]
    fn changed_paths_detects_rename() {
        let (dir, _) = setup_git_repo();
        let root = dir.path();

        // A file large enough for rename detection to be unambiguous.
        let body = "class Widget {\n    int field;\n    void method() {}\n}\n".repeat(5);
        fs::write(root.join("Widget.java"), &body).unwrap();
        let before = commit_all(root, "add widget");

        git(root, &["mv", "Widget.java", "Gadget.java"]);
        let after = commit_all(root, "rename widget");

        let repo = GitRepo::new(root.to_path_buf());
        let changes = repo.changed_paths(&before, &after).unwrap();
        assert_eq!(changes.len(), 1, "{changes:?}");
        assert_eq!(changes[0].path, PathBuf::from("Gadget.java"));
        assert_eq!(
            changes[0].status,
            ChangeStatus::Renamed {
                old: PathBuf::from("Widget.java")
            }
        );
        assert_eq!(changes[0].origin(), &PathBuf::from("Widget.java"));
    }

    #[test]
    fn changed_paths_deletion() {
        let (dir, base) = setup_git_repo();
        let root = dir.path();

        fs::remove_file(root.join("README.md")).unwrap();
        let tip = commit_all(root, "delete readme");

        let repo = GitRepo::new(root.to_path_buf());
        let changes = repo.changed_paths(&base, &tip).unwrap();
        assert_eq!(
            changes,
            vec![ChangedPath::new(
                PathBuf::from("README.md"),
                ChangeStatus::Deleted
            )]
        );
    }

    // -- read_blob --

    #[test]
    fn read_blob_found() {
        let (dir, head) = setup_git_repo();
        let repo = GitRepo::new(dir.path().to_path_buf());
        let blob = repo.read_blob(&head, Path::new("README.md")).unwrap();
        assert_eq!(blob, BlobContent::Found(b"# Test Repo\n".to_vec()));
    }

    #[test]
    fn read_blob_absent() {
        let (dir, head) = setup_git_repo();
        let repo = GitRepo::new(dir.path().to_path_buf());
        let blob = repo.read_blob(&head, Path::new("no/such/File.java")).unwrap();
        assert_eq!(blob, BlobContent::Absent);
        assert!(!blob.is_found());
    }

    // -- merge_base / parents --

    #[test]
    fn merge_base_of_diverged_branches() {
        let (dir, base) = setup_git_repo();
        let root = dir.path();
        let repo = GitRepo::new(root.to_path_buf());

        git(root, &["checkout", "-b", "left"]);
        fs::write(root.join("left.java"), "class L {}\n").unwrap();
        let left = commit_all(root, "left work");

        git(root, &["checkout", "-b", "right", "main"]);
        fs::write(root.join("right.java"), "class R {}\n").unwrap();
        let right = commit_all(root, "right work");

        let found = repo.merge_base(&left, &right).unwrap();
        assert_eq!(found, Some(base));
    }

    #[test]
    fn parents_of_merge_commit() {
        let (dir, _) = setup_git_repo();
        let root = dir.path();
        let repo = GitRepo::new(root.to_path_buf());

        git(root, &["checkout", "-b", "left"]);
        fs::write(root.join("left.java"), "class L {}\n").unwrap();
        let left = commit_all(root, "left work");

        git(root, &["checkout", "-b", "right", "main"]);
        fs::write(root.join("right.java"), "class R {}\n").unwrap();
        let right = commit_all(root, "right work");

        git(root, &["checkout", "left"]);
        git(root, &["merge", "--no-ff", "-m", "merge right", "right"]);
        let merge = repo.rev_parse("HEAD").unwrap();

        let parents = repo.parents(&merge).unwrap();
        assert_eq!(parents, vec![left, right]);
    }

    #[test]
    fn commit_timestamp_is_positive() {
        let (dir, head) = setup_git_repo();
        let repo = GitRepo::new(dir.path().to_path_buf());
        assert!(repo.commit_timestamp(&head).unwrap() > 0);
    }

    #[test]
    fn project_name_is_directory_basename() {
        let (dir, _) = setup_git_repo();
        let repo = GitRepo::new(dir.path().to_path_buf());
        let expected = dir.path().file_name().unwrap().to_string_lossy();
        assert_eq!(repo.project_name(), expected);
    }

    // -- parse_name_status --

    #[test]
    fn parse_name_status_all_statuses() {
        let out = "A\tsrc/New.java\nM\tsrc/Mod.java\nD\tsrc/Gone.java\nR087\tsrc/Old.java\tsrc/Moved.java\n";
        let changes = parse_name_status(out);
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0].status, ChangeStatus::Added);
        assert_eq!(changes[1].status, ChangeStatus::Modified);
        assert_eq!(changes[2].status, ChangeStatus::Deleted);
        assert_eq!(
            changes[3].status,
            ChangeStatus::Renamed {
                old: PathBuf::from("src/Old.java")
            }
        );
        assert_eq!(changes[3].path, PathBuf::from("src/Moved.java"));
    }

    #[test]
    fn parse_name_status_copy_is_addition() {
        let changes = parse_name_status("C075\tsrc/A.java\tsrc/B.java\n");
        assert_eq!(
            changes,
            vec![ChangedPath::new(
                PathBuf::from("src/B.java"),
                ChangeStatus::Added
            )]
        );
    }

    #[test]
    fn parse_name_status_skips_junk() {
        let changes = parse_name_status("\nX\tweird\nnot-a-record\n");
        assert!(changes.is_empty(), "{changes:?}");
    }

    // -- error display --

    #[test]
    fn error_display() {
        let err = GitError::GitCommand {
            command: "git diff".to_owned(),
            stderr: "fatal: bad revision".to_owned(),
            exit_code: Some(128),
        };
        let msg = format!("{err}");
        assert!(msg.contains("git diff"));
        assert!(msg.contains("128"));
        assert!(msg.contains("fatal: bad revision"));
    }
}
