//! One-shot dispatch commands: `dispatch`, `match` and `put`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use tokio::io::AsyncReadExt;

use arrival_types::event::DispatchEvent;
use arrival_types::execution::ExecutionStatus;
use arrival_types::notification::{Notification, NotificationPayload};

use crate::cli::execution::{format_status, print_execution};
use crate::state::AppState;

/// How long the event follower may lag behind the terminal record.
const FOLLOW_DRAIN: Duration = Duration::from_secs(1);

/// Read a notification from a JSON file, or stdin for `-`.
pub async fn read_notification(path: &Path) -> Result<Notification> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read notification from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    parse_notification(&raw)
}

fn parse_notification(raw: &str) -> Result<Notification> {
    let payload: NotificationPayload =
        serde_json::from_str(raw).context("Not a storage notification")?;
    Ok(payload.into())
}

/// `arrival match <file>`: report whether the rule accepts the notification.
pub async fn match_file(state: &AppState, path: &Path, json: bool) -> Result<()> {
    let notification = read_notification(path).await?;
    let matcher = state.dispatcher.matcher();
    let invocation = matcher.match_notification(&notification);
    let reason = matcher.explain(&notification).err().map(|m| m.to_string());

    if json {
        let result = serde_json::json!({
            "matched": invocation.is_some(),
            "command": invocation.as_ref().map(|i| &i.command),
            "reason": reason,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    match (invocation, reason) {
        (Some(invocation), _) => {
            println!("  {} Notification matches the rule", style("✓").green().bold());
            println!(
                "  {}  {}",
                style("Command:").bold(),
                style(invocation.command.join(" ")).cyan()
            );
        }
        (None, reason) => {
            println!("  {} Notification would be dropped", style("✗").red().bold());
            if let Some(reason) = reason {
                println!("  {}  {}", style("Reason:").bold(), reason);
            }
        }
    }
    println!();
    Ok(())
}

/// `arrival dispatch <file>`: dispatch and wait for the terminal record.
pub async fn dispatch_file(state: &AppState, path: &Path, follow: bool, json: bool) -> Result<()> {
    let notification = read_notification(path).await?;
    dispatch_and_wait(state, &notification, follow, json).await
}

/// `arrival put <file> --key <key>`: store an object, optionally dispatching it.
pub async fn put_object(
    state: &AppState,
    file: &Path,
    key: &str,
    bucket: Option<&str>,
    dispatch: bool,
    json: bool,
) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let bucket = bucket.unwrap_or_else(|| state.config.bucket_name());

    let notification = state
        .store
        .put(bucket, key, &bytes)
        .await
        .with_context(|| format!("Failed to store {key} in {bucket}"))?;

    if json && !dispatch {
        println!("{}", serde_json::to_string_pretty(&notification)?);
    } else if !json {
        println!();
        println!(
            "  {} Stored {} in {} ({} bytes)",
            style("ok").green(),
            style(key).cyan(),
            style(bucket).cyan(),
            notification.object_size
        );
    }

    if dispatch {
        dispatch_and_wait(state, &notification, false, json).await?;
    } else if !json {
        println!();
    }
    Ok(())
}

async fn dispatch_and_wait(
    state: &AppState,
    notification: &Notification,
    follow: bool,
    json: bool,
) -> Result<()> {
    let matcher = state.dispatcher.matcher();
    let Some(invocation) = matcher.match_notification(notification) else {
        let reason = matcher
            .explain(notification)
            .err()
            .map(|m| m.to_string())
            .unwrap_or_default();
        if json {
            let result = serde_json::json!({ "matched": false, "reason": reason });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            println!();
            println!("  {} Not dispatched: {}", style("✗").red().bold(), reason);
            println!();
        }
        return Ok(());
    };

    // Subscribe before submitting so no event is missed.
    let events = follow.then(|| state.orchestrator().event_bus().subscribe());
    let ticket = state.orchestrator().submit(invocation).await?;
    let execution_id = ticket.execution_id();

    if !json {
        println!();
        println!(
            "  {} Dispatched {} as {}",
            style("→").cyan().bold(),
            style(&notification.object_key).cyan(),
            style(execution_id).dim()
        );
    }

    let follower = events.map(|mut rx| {
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if event.execution_id() != execution_id {
                    continue;
                }
                print_event(&event, json);
                if event.is_terminal() {
                    break;
                }
            }
        })
    });

    let execution = ticket.wait().await?;
    if let Some(follower) = follower {
        if tokio::time::timeout(FOLLOW_DRAIN, follower).await.is_err() {
            tracing::debug!(execution_id = %execution_id, "event follower did not drain");
        }
    }

    print_execution(&execution, json)?;
    if execution.status != ExecutionStatus::Succeeded {
        anyhow::bail!("execution {execution_id} finished {}", execution.status);
    }
    Ok(())
}

fn print_event(event: &DispatchEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
        }
        return;
    }

    let line = match event {
        DispatchEvent::ExecutionAccepted { object_key, .. } => {
            format!("{} accepted {object_key}", format_status(ExecutionStatus::Pending))
        }
        DispatchEvent::ExecutionStarted { job_id, .. } => {
            format!("{} job {job_id}", format_status(ExecutionStatus::Running))
        }
        DispatchEvent::ExecutionSucceeded { duration_ms, .. } => {
            format!("{} in {duration_ms}ms", format_status(ExecutionStatus::Succeeded))
        }
        DispatchEvent::ExecutionFailed { detail, .. } => {
            format!("{} {detail}", format_status(ExecutionStatus::Failed))
        }
        DispatchEvent::ExecutionTimedOut { timeout_secs, .. } => {
            format!(
                "{} after {timeout_secs}s",
                format_status(ExecutionStatus::TimedOut)
            )
        }
    };
    println!("    {line}");
}
