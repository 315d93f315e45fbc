//! `arrival serve`: HTTP ingress plus the optional bucket watcher.
//!
//! Startup order: resolve executions a previous process left unfinished,
//! start the watcher and its reaction loop, then serve HTTP until Ctrl+C or
//! SIGTERM. Executions still in flight at shutdown are resolved as
//! interrupted on the next start.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use arrival_infra::storage::start_bucket_watcher;

use crate::http;
use crate::state::{AppState, resolve_ingress_secret};

/// Notifications buffered between the watcher and the dispatcher.
const NOTIFICATION_BUFFER: usize = 256;

pub async fn serve(state: AppState, host: &str, port: u16, watch: bool) -> Result<()> {
    let recovered = state
        .orchestrator()
        .recover_interrupted()
        .await
        .context("Failed to resolve interrupted executions")?;
    if recovered > 0 {
        println!(
            "  {} Marked {} interrupted execution{} as failed",
            style("!").yellow().bold(),
            recovered,
            if recovered == 1 { "" } else { "s" }
        );
    }

    let secret = resolve_ingress_secret(&state.config)?;
    let state = state.with_ingress_secret(secret);
    let cancel = CancellationToken::new();

    let mut watcher = None;
    let mut reactor = None;
    if watch || state.config.storage.watch {
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let bucket = state.config.bucket_name();
        let debounce = Duration::from_millis(state.config.storage.debounce_ms);
        let guard = start_bucket_watcher(&state.store, bucket, debounce, tx)
            .with_context(|| format!("Failed to watch bucket {bucket}"))?;
        println!(
            "  {} Watching {}",
            style("👁").bold(),
            style(guard.dir().display()).cyan()
        );
        watcher = Some(guard);

        let dispatcher = Arc::clone(&state.dispatcher);
        let token = cancel.clone();
        reactor = Some(tokio::spawn(async move { dispatcher.run(rx, token).await }));
    }

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    println!(
        "  {} Arrival listening on {}",
        style("⚡").bold(),
        style(format!("http://{addr}")).cyan()
    );
    if state.ingress_secret.is_some() {
        println!("  {}", style("Ingress requires signed requests").dim());
    }
    println!("  {}", style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    drop(watcher);
    if let Some(reactor) = reactor {
        let accepted = reactor.await.context("Dispatcher loop panicked")?;
        tracing::info!(accepted, "dispatcher loop finished");
    }

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
