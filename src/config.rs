//! Replay configuration (`.remerge.toml`).
//!
//! Typed configuration for the replay batch: the external tool invocation,
//! strategy/repeat/prune settings, and output locations. Missing fields use
//! defaults; a missing file means all defaults (no error). Command-line
//! flags override individual fields after loading.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level replay configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    /// External merge tool settings.
    #[serde(default)]
    pub tool: ToolConfig,

    /// Batch behaviour settings.
    #[serde(default)]
    pub replay: RunConfig,

    /// Output locations.
    #[serde(default)]
    pub paths: PathsConfig,
}

impl ReplayConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file yields all defaults.
    ///
    /// # Errors
    /// A present-but-invalid file is an error — silently ignoring a broken
    /// config hides typos.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_path_buf()),
                    message: format!("failed to read: {e}"),
                });
            }
        };
        toml::from_str(&content).map_err(|e| ConfigError {
            path: Some(path.to_path_buf()),
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// ToolConfig
// ---------------------------------------------------------------------------

/// External merge tool invocation settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// The tool executable (default: `"jdime"`).
    #[serde(default = "default_tool_path")]
    pub path: String,

    /// The tool's log level, passed via `-log` (default: `"WARNING"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Extra options appended before the input files.
    #[serde(default)]
    pub extra_opts: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: default_tool_path(),
            log_level: default_log_level(),
            extra_opts: Vec::new(),
        }
    }
}

fn default_tool_path() -> String {
    "jdime".to_owned()
}

fn default_log_level() -> String {
    "WARNING".to_owned()
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Batch behaviour settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Merge strategies to run per scenario (default: `["structured"]`).
    #[serde(default = "default_strategies")]
    pub strategies: Vec<String>,

    /// Timed measure runs per (job, strategy) for benchmark stability.
    /// `1` means a single produce run supplies the timing.
    #[serde(default = "default_repeat")]
    pub repeat: u32,

    /// Delete staged artifacts of fully successful scenarios.
    #[serde(default)]
    pub prune: bool,

    /// Kill a tool invocation after this many seconds. Unset = no timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// File extensions (without dot) eligible for merging.
    #[serde(default = "default_extensions")]
    pub file_extensions: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            repeat: default_repeat(),
            prune: false,
            timeout_secs: None,
            file_extensions: default_extensions(),
        }
    }
}

fn default_strategies() -> Vec<String> {
    vec!["structured".to_owned()]
}

const fn default_repeat() -> u32 {
    1
}

fn default_extensions() -> Vec<String> {
    vec!["java".to_owned()]
}

// ---------------------------------------------------------------------------
// PathsConfig
// ---------------------------------------------------------------------------

/// Output locations.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Staging output directory. Unset = a fresh temp directory per run.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Directory holding per-project ledger files (default: the output
    /// directory's parent).
    #[serde(default)]
    pub ledger_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file could not be loaded or parsed.
#[derive(Debug)]
pub struct ConfigError {
    /// Path to the configuration file, when known.
    pub path: Option<PathBuf>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(p) => write!(
                f,
                "configuration error in '{}': {}\n  To fix: edit the config file and correct the issue.",
                p.display(),
                self.message
            ),
            None => write!(f, "configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
