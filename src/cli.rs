// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fastssh")]
#[command(about = "Run commands and move files over SSH")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: fastssh.yml in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which host to talk to and how to authenticate.
#[derive(Args)]
pub struct Target {
    /// Host name from the config file, or [user@]host[:port]
    pub target: String,

    /// Private key file
    #[arg(short = 'i', long)]
    pub identity: Option<PathBuf>,

    /// Environment variable holding the password
    #[arg(long, default_value = "FASTSSH_PASSWORD")]
    pub password_env: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the credentials are accepted
    Check {
        #[command(flatten)]
        target: Target,
    },

    /// Run a command and print its output when it finishes
    Exec {
        #[command(flatten)]
        target: Target,

        /// Give up after this long (e.g. 30s, 5m)
        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Command to run; several words are joined with spaces
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Run a command and print its output as it arrives
    Stream {
        #[command(flatten)]
        target: Target,

        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Upload a local file
    Put {
        #[command(flatten)]
        target: Target,

        local: PathBuf,

        remote: String,
    },

    /// Download a remote file (to stdout when no local path is given)
    Get {
        #[command(flatten)]
        target: Target,

        remote: String,

        local: Option<PathBuf>,
    },

    /// Compare a remote file with a local one by SHA-256
    Verify {
        #[command(flatten)]
        target: Target,

        remote: String,

        local: PathBuf,
    },

    /// Replace text inside a remote file
    Replace {
        #[command(flatten)]
        target: Target,

        remote: String,

        old: String,

        new: String,

        /// Treat OLD as a regular expression
        #[arg(long)]
        regex: bool,

        /// Replace at most this many occurrences
        #[arg(long)]
        count: Option<usize>,
    },
}
