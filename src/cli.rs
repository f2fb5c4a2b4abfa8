use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "chatcheck",
    about = "Scripted test harness for replicated chat clusters",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive the cluster through a command script and capture chat logs
    Run {
        /// Script file ("-" or absent reads stdin)
        script: Option<PathBuf>,

        /// Grade the captured output against this expected specification
        #[arg(long)]
        expected: Option<PathBuf>,

        /// Override the node executable
        #[arg(long)]
        program: Option<String>,

        /// Override the cluster-teardown command
        #[arg(long)]
        teardown: Option<String>,

        /// Pass node stdout/stderr through instead of discarding them
        #[arg(long)]
        passthrough: bool,

        /// Write a JSONL run log to this path
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Validate a previously captured output file against an expected
    /// specification
    Check {
        /// Captured output file (one chat-log snapshot per line)
        output: PathBuf,

        /// Expected-specification file (one JSON record per line)
        expected: PathBuf,
    },

    /// Show the resolved harness configuration
    Config {
        /// Emit JSON instead of the human-readable layout
        #[arg(long)]
        json: bool,
    },
}
