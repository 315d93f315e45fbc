//! Configuration inspection.

use anyhow::Result;
use clap::Subcommand;
use console::style;

use arrival_infra::paths::config_path;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the resolved configuration (defaults and derived names filled).
    Show,
}

pub async fn handle_config_command(
    cmd: ConfigCommand,
    state: &AppState,
    explicit_path: Option<&std::path::Path>,
    json: bool,
) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            if json {
                println!("{}", serde_json::to_string_pretty(&*state.config)?);
                return Ok(());
            }

            let path = explicit_path
                .map(std::path::Path::to_path_buf)
                .unwrap_or_else(|| config_path(state.data_dir()));
            let origin = if path.exists() {
                path.display().to_string()
            } else {
                format!("{} (not found, defaults)", path.display())
            };

            println!();
            println!("  {} {}", style("#").dim(), style(origin).dim());
            println!();
            for line in toml::to_string_pretty(&*state.config)?.lines() {
                println!("  {line}");
            }
            println!();
            Ok(())
        }
    }
}
