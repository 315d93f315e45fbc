//! CLI command definitions for the `arrival` binary.

pub mod config;
pub mod dispatch;
pub mod execution;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::state::StateOptions;

/// React to objects landing in a bucket by dispatching tracked jobs.
#[derive(Parser)]
#[command(name = "arrival", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory (default ~/.arrival).
    #[arg(long, global = true, env = "ARRIVAL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Config file (default <data-dir>/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Keep execution history in memory for this process only.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn state_options(&self) -> StateOptions {
        StateOptions {
            data_dir: self.data_dir.clone(),
            config_path: self.config.clone(),
            ephemeral: self.ephemeral,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP ingress and, optionally, watch the bucket directory.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Watch the bucket directory even if `storage.watch` is off.
        #[arg(long)]
        watch: bool,
    },

    /// Dispatch a notification read from a JSON file (`-` for stdin) and
    /// wait for its execution to finish.
    Dispatch {
        file: PathBuf,

        /// Print lifecycle events as they happen.
        #[arg(long)]
        follow: bool,
    },

    /// Check a notification against the rule without dispatching it.
    Match { file: PathBuf },

    /// Store a local file as an object in the bucket.
    Put {
        file: PathBuf,

        /// Object key, e.g. `input/report.csv`.
        #[arg(long)]
        key: String,

        /// Target bucket (defaults to the configured bucket).
        #[arg(long)]
        bucket: Option<String>,

        /// Dispatch the resulting notification and wait for the execution.
        #[arg(long)]
        dispatch: bool,
    },

    /// Inspect execution history.
    #[command(alias = "exec")]
    Executions {
        #[command(subcommand)]
        action: execution::ExecutionCommand,
    },

    /// Inspect the resolved configuration.
    Config {
        #[command(subcommand)]
        action: config::ConfigCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "arrival",
            "executions",
            "list",
            "--status",
            "failed",
            "--json",
            "--ephemeral",
            "-vv",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(cli.ephemeral);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Executions { .. }));
    }

    #[test]
    fn put_requires_key() {
        assert!(Cli::try_parse_from(["arrival", "put", "report.csv"]).is_err());
        let cli = Cli::try_parse_from([
            "arrival",
            "put",
            "report.csv",
            "--key",
            "input/report.csv",
            "--dispatch",
        ])
        .unwrap();
        match cli.command {
            Commands::Put { key, dispatch, bucket, .. } => {
                assert_eq!(key, "input/report.csv");
                assert!(dispatch);
                assert!(bucket.is_none());
            }
            _ => panic!("expected put"),
        }
    }
}
