//! Dispatcher: wires storage notifications to the orchestrator.
//!
//! Holds no state beyond the read-only matcher. Matching notifications become
//! executions; everything else is dropped with a debug log. Repository
//! failures while accepting are logged and the notification is dropped, so a
//! storage hiccup never stops the reaction loop.

use arrival_types::config::DispatcherConfig;
use arrival_types::notification::Notification;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::launcher::ComputeProvider;
use crate::matcher::EventMatcher;
use crate::orchestrator::{ExecutionTicket, Orchestrator};
use crate::repository::execution::ExecutionRepository;

pub struct Dispatcher<R, P> {
    matcher: EventMatcher,
    orchestrator: Orchestrator<R, P>,
}

impl<R, P> Dispatcher<R, P>
where
    R: ExecutionRepository + 'static,
    P: ComputeProvider + 'static,
{
    pub fn new(matcher: EventMatcher, orchestrator: Orchestrator<R, P>) -> Self {
        Self {
            matcher,
            orchestrator,
        }
    }

    pub fn from_config(config: &DispatcherConfig, orchestrator: Orchestrator<R, P>) -> Self {
        Self::new(
            EventMatcher::new(config.rule.clone(), config.entry_path.clone()),
            orchestrator,
        )
    }

    pub fn matcher(&self) -> &EventMatcher {
        &self.matcher
    }

    pub fn orchestrator(&self) -> &Orchestrator<R, P> {
        &self.orchestrator
    }

    /// React to one notification. `None` means it was dropped.
    pub async fn dispatch(&self, notification: &Notification) -> Option<ExecutionTicket> {
        let Some(invocation) = self.matcher.match_notification(notification) else {
            if let Err(mismatch) = self.matcher.explain(notification) {
                tracing::debug!(
                    bucket = notification.bucket_name.as_str(),
                    object_key = notification.object_key.as_str(),
                    reason = %mismatch,
                    "notification dropped"
                );
            }
            return None;
        };

        match self.orchestrator.submit(invocation).await {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                tracing::error!(
                    object_key = notification.object_key.as_str(),
                    error = %e,
                    "failed to accept notification"
                );
                None
            }
        }
    }

    /// Dispatch notifications from `rx` until it closes or `cancel` fires.
    ///
    /// Accepted executions keep running after this returns. Returns the
    /// number of notifications that produced an execution.
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<Notification>,
        cancel: CancellationToken,
    ) -> usize {
        let mut accepted = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("dispatcher stopping");
                    break;
                }
                next = rx.recv() => {
                    let Some(notification) = next else {
                        tracing::debug!("notification channel closed");
                        break;
                    };
                    if self.dispatch(&notification).await.is_some() {
                        accepted += 1;
                    }
                }
            }
        }
        accepted
    }
}
