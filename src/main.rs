use anyhow::Result;
use clap::{Parser, Subcommand};

use remerge::replay;
use remerge::telemetry;

/// Historical merge replay driver
///
/// remerge replays the file-level merges of historical merge commits
/// against an external structured merge tool, once per configured
/// strategy, and records the outcomes in a durable, resumable result
/// stream.
///
/// QUICK START:
///
///   # Replay one historical merge commit
///   remerge replay 1a2b3c4
///
///   # Replay every merge between two releases, pruning clean results
///   remerge replay -p -o /data/replay $(git rev-list --merges v1..v2)
///
///   # Re-render a result stream with colors
///   remerge colorize < /data/replay/results.csv
///
/// Already-completed (merge commit, strategy) pairs are skipped via the
/// per-project ledger, so a long batch can be interrupted and resumed at
/// any point.
#[derive(Parser)]
#[command(name = "remerge")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'remerge <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay historical merges against the merge tool
    Replay(replay::ReplayArgs),

    /// Resolve and materialize scenarios without running the tool
    Prepare(replay::PrepareArgs),

    /// Colorize a result stream from stdin
    Colorize(replay::ColorizeArgs),
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay(ref args) => replay::run(args),
        Commands::Prepare(ref args) => replay::prepare(args),
        Commands::Colorize(ref args) => replay::colorize(args),
    }
}
