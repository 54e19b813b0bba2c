//! Shared test helpers for remerge integration tests.
//!
//! All tests use temp directories — no side effects on the real repo. Each
//! test gets its own git repo via `setup_repo()` and drives the merge tool
//! through a stub shell script fixture.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Create a fresh git repo in a temp directory with one initial commit.
pub fn setup_repo() -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    let root = dir.path();

    for args in [
        vec!["init", "-b", "main"],
        vec!["config", "user.name", "Test User"],
        vec!["config", "user.email", "test@example.com"],
        vec!["config", "commit.gpgsign", "false"],
    ] {
        git(root, &args);
    }

    std::fs::write(root.join("Shared.java"), "class Shared { int v = 0; }\n").unwrap();
    std::fs::write(root.join("README.md"), "# test repo\n").unwrap();
    git(root, &["add", "-A"]);
    git(root, &["commit", "-m", "initial"]);

    dir
}

/// Run a git command in the given directory. Panics on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {}: {e}", args.join(" ")));
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "git {} failed:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
    );
    stdout.to_string()
}

/// Stage everything and commit; returns the new HEAD hash.
pub fn commit_all(dir: &Path, msg: &str) -> String {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-m", msg]);
    git(dir, &["rev-parse", "HEAD"]).trim().to_string()
}

/// A repo with a historical merge commit whose parents diverge on
/// `Shared.java` (both modified) and each add a side-only file.
pub struct MergeFixture {
    pub dir: TempDir,
    pub left: String,
    pub right: String,
    pub merge: String,
}

pub fn setup_merge_repo() -> MergeFixture {
    let dir = setup_repo();
    let root = dir.path();

    git(root, &["checkout", "-b", "left"]);
    std::fs::write(root.join("Shared.java"), "class Shared { int v = 1; }\n").unwrap();
    std::fs::write(root.join("Left.java"), "class Left {}\n").unwrap();
    let left = commit_all(root, "left work");

    git(root, &["checkout", "-b", "right", "main"]);
    std::fs::write(root.join("Shared.java"), "class Shared { int v = 2; }\n").unwrap();
    let right = commit_all(root, "right work");

    // Record the historical merge without resolving conflicts: reuse the
    // left tree and stamp both parents via commit-tree.
    let tree = git(root, &["rev-parse", &format!("{left}^{{tree}}")])
        .trim()
        .to_string();
    let merge = git(
        root,
        &[
            "commit-tree", &tree, "-p", &left, "-p", &right, "-m", "historical merge",
        ],
    )
    .trim()
    .to_string();

    MergeFixture {
        dir,
        left,
        right,
        merge,
    }
}

/// Write an executable stub merge tool.
///
/// The wrapper locates the `-o <output>` argument and exposes it to `body`
/// as `$out`. The stub also appends one line per invocation to
/// `invocations.txt` next to the script, so tests can assert on call
/// counts.
pub fn write_stub_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("mergestub");
    let script = format!(
        "#!/bin/sh\nout=\"\"\nprev=\"\"\nfor a in \"$@\"; do\n  if [ \"$prev\" = \"-o\" ]; then out=\"$a\"; fi\n  prev=\"$a\"\ndone\necho \"run $*\" >> \"$(dirname \"$0\")/invocations.txt\"\n{body}\n"
    );
    std::fs::write(&path, script).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// Stub body: clean merge, zero conflicts, statistics document on stdout.
pub const STUB_CLEAN: &str = r#"mkdir -p "$(dirname "$out")"
printf 'class Merged {}\n' > "$out"
printf '<statistics version="stub"><merge conflicts="0" clines="0" ctokens="0"/></statistics>'
exit 0"#;

/// Stub body: one conflict in the output, matching reported count.
pub const STUB_CONFLICT: &str = r#"mkdir -p "$(dirname "$out")"
printf 'class Merged {\n<<<<<<< left\nint v = 1;\n=======\nint v = 2;\n>>>>>>> right\n}\n' > "$out"
printf '<statistics version="stub"><merge conflicts="1" clines="2" ctokens="5"/></statistics>'
exit 0"#;

/// Stub body: hard failure outside the success range.
pub const STUB_FAIL: &str = r#"echo 'stub: cannot merge' >&2
exit 200"#;

/// Count the stub tool's recorded invocations.
pub fn invocation_count(tool: &Path) -> usize {
    let log = tool.with_file_name("invocations.txt");
    match std::fs::read_to_string(log) {
        Ok(content) => content.lines().count(),
        Err(_) => 0,
    }
}

/// Write a `.remerge.toml` pointing at the stub tool.
pub fn write_config(repo: &Path, tool: &Path, extra: &str) {
    std::fs::write(
        repo.join(".remerge.toml"),
        format!("[tool]\npath = \"{}\"\n{extra}", tool.display()),
    )
    .unwrap();
}

/// Run the remerge binary in the given directory.
pub fn remerge_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_remerge"))
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to execute remerge")
}

/// Run remerge and assert it succeeds. Returns stdout as string.
pub fn remerge_ok(dir: &Path, args: &[&str]) -> String {
    let out = remerge_in(dir, args);
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "remerge {} failed:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
    );
    stdout.to_string()
}
