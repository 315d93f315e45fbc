//! Execution history commands: list and show.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use arrival_core::repository::SortOrder;
use arrival_core::repository::execution::{ExecutionFilter, ExecutionRepository};
use arrival_types::execution::{Execution, ExecutionStatus};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum ExecutionCommand {
    /// List recent executions, newest first.
    #[command(alias = "ls")]
    List {
        /// Only executions in this status (pending, running, succeeded,
        /// failed, timed_out).
        #[arg(long)]
        status: Option<ExecutionStatus>,

        /// Only executions for this object key.
        #[arg(long)]
        key: Option<String>,

        /// Maximum number of executions.
        #[arg(long, default_value = "20")]
        limit: i64,

        /// Oldest first.
        #[arg(long)]
        asc: bool,
    },

    /// Show one execution in full.
    Show {
        /// Execution ID.
        id: Uuid,
    },
}

pub async fn handle_execution_command(
    cmd: ExecutionCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        ExecutionCommand::List {
            status,
            key,
            limit,
            asc,
        } => {
            let filter = ExecutionFilter {
                status,
                object_key: key,
                sort_order: Some(if asc { SortOrder::Asc } else { SortOrder::Desc }),
                limit: Some(limit.max(1)),
            };
            list_executions(state, &filter, json).await
        }
        ExecutionCommand::Show { id } => show_execution(state, &id, json).await,
    }
}

async fn list_executions(state: &AppState, filter: &ExecutionFilter, json: bool) -> Result<()> {
    let executions = state.executions().list(filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&executions)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!();
        println!("  No executions recorded yet.");
        println!(
            "  Drop an object into the bucket or run {}",
            style("arrival dispatch <file>").cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Object Key").fg(Color::White),
        Cell::new("Created").fg(Color::White),
        Cell::new("Duration").fg(Color::White),
        Cell::new("Detail").fg(Color::White),
    ]);

    for execution in &executions {
        table.add_row(vec![
            Cell::new(short_id(&execution.id)).fg(Color::DarkGrey),
            status_cell(execution.status),
            Cell::new(execution.object_key().unwrap_or("-")).fg(Color::Cyan),
            Cell::new(execution.created_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(format_duration(execution)),
            Cell::new(truncate(execution.failure_detail.as_deref().unwrap_or(""), 48)),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} execution{}",
        style(executions.len()).bold(),
        if executions.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

async fn show_execution(state: &AppState, id: &Uuid, json: bool) -> Result<()> {
    let execution = state
        .executions()
        .get(id)
        .await?
        .with_context(|| format!("Execution {id} not found"))?;
    print_execution(&execution, json)
}

/// Print a single execution record, styled or as JSON.
pub fn print_execution(execution: &Execution, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(execution)?);
        return Ok(());
    }

    let when = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
    };

    println!();
    println!(
        "  {} {}",
        style("Execution").bold(),
        style(execution.id.to_string()).dim()
    );
    println!();
    println!("  {}     {}", style("Status:").bold(), format_status(execution.status));
    println!(
        "  {}    {}",
        style("Command:").bold(),
        execution.input.command.join(" ")
    );
    println!("  {}    {}", style("Created:").bold(), execution.created_at.to_rfc3339());
    println!("  {}    {}", style("Started:").bold(), when(execution.started_at));
    println!("  {}      {}", style("Ended:").bold(), when(execution.ended_at));
    println!("  {}   {}", style("Duration:").bold(), format_duration(execution));
    if let Some(job_id) = &execution.job_id {
        println!("  {}     {}", style("Job ID:").bold(), style(job_id).dim());
    }
    if let Some(code) = execution.exit_code {
        println!("  {}  {}", style("Exit code:").bold(), code);
    }
    if let Some(detail) = &execution.failure_detail {
        println!("  {}     {}", style("Detail:").bold(), style(detail).red());
    }
    println!();

    Ok(())
}

pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => format!("{}", style("◌ pending").dim()),
        ExecutionStatus::Running => format!("{}", style("● running").cyan()),
        ExecutionStatus::Succeeded => format!("{}", style("✓ succeeded").green()),
        ExecutionStatus::Failed => format!("{}", style("✗ failed").red()),
        ExecutionStatus::TimedOut => format!("{}", style("⏱ timed out").yellow()),
    }
}

fn status_cell(status: ExecutionStatus) -> Cell {
    match status {
        ExecutionStatus::Pending => Cell::new("◌ pending").fg(Color::DarkGrey),
        ExecutionStatus::Running => Cell::new("● running").fg(Color::Cyan),
        ExecutionStatus::Succeeded => Cell::new("✓ succeeded").fg(Color::Green),
        ExecutionStatus::Failed => Cell::new("✗ failed").fg(Color::Red),
        ExecutionStatus::TimedOut => Cell::new("⏱ timed out").fg(Color::Yellow),
    }
}

fn short_id(id: &Uuid) -> String {
    let simple = id.simple().to_string();
    simple[simple.len() - 12..].to_string()
}

fn format_duration(execution: &Execution) -> String {
    let Some(duration) = execution.duration() else {
        return "-".to_string();
    };
    let ms = duration.num_milliseconds().max(0);
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
