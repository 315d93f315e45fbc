//! Arrival CLI and HTTP entry point.
//!
//! Binary name: `arrival`
//!
//! Parses CLI arguments, loads configuration and the execution history, then
//! runs the requested command or serves the notification ingress.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use arrival_observe::tracing_setup::{default_directive, init_tracing, shutdown_tracing};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(default_directive(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "arrival", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.state_options()).await?;

    match cli.command {
        Commands::Serve { port, host, watch } => {
            cli::serve::serve(state, &host, port, watch).await?;
        }

        Commands::Dispatch { file, follow } => {
            cli::dispatch::dispatch_file(&state, &file, follow, cli.json).await?;
        }

        Commands::Match { file } => {
            cli::dispatch::match_file(&state, &file, cli.json).await?;
        }

        Commands::Put {
            file,
            key,
            bucket,
            dispatch,
        } => {
            cli::dispatch::put_object(&state, &file, &key, bucket.as_deref(), dispatch, cli.json)
                .await?;
        }

        Commands::Executions { action } => {
            cli::execution::handle_execution_command(action, &state, cli.json).await?;
        }

        Commands::Config { action } => {
            cli::config::handle_config_command(action, &state, cli.config.as_deref(), cli.json)
                .await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
