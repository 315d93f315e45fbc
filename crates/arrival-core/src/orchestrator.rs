//! Workflow orchestrator: one tracked execution per accepted invocation.
//!
//! # Execution flow
//!
//! 1. Persist a PENDING `Execution` and publish `ExecutionAccepted`.
//! 2. Spawn a task that owns the execution from here on.
//! 3. (Optional) wait for an admission permit; the record stays PENDING.
//! 4. Submit the job. Failure resolves PENDING -> FAILED.
//! 5. Record `started_at`/`job_id`, move to RUNNING, start the deadline clock.
//! 6. Await the job up to the deadline and record the terminal status.
//!
//! Each execution is independent: no deduplication by key, no retry, and no
//! execution waits on another (except for admission permits when a limit is
//! configured).

use std::sync::Arc;
use std::time::Duration;

use arrival_types::config::{DispatcherConfig, TimeoutPolicy};
use arrival_types::error::RepositoryError;
use arrival_types::event::DispatchEvent;
use arrival_types::execution::{Execution, ExecutionStatus, Invocation};
use arrival_types::job::JobOutcome;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::event::bus::EventBus;
use crate::launcher::{ComputeProvider, JobLauncher};
use crate::repository::execution::ExecutionRepository;

/// Failure detail recorded on executions found unfinished at startup.
pub const INTERRUPTED_DETAIL: &str = "interrupted by dispatcher restart";

// ---------------------------------------------------------------------------
// Transitions (pure state machine)
// ---------------------------------------------------------------------------

/// One lifecycle step applied to an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The job was submitted.
    Started { job_id: String, at: DateTime<Utc> },
    /// The job exited with a status code.
    Exited { code: i32, at: DateTime<Utc> },
    /// The job ended without a usable status.
    Crashed { reason: String, at: DateTime<Utc> },
    /// The job could not be submitted.
    LaunchFailed { reason: String, at: DateTime<Utc> },
    /// No terminal report within the ceiling.
    TimedOut { timeout_secs: u64, at: DateTime<Utc> },
    /// A previous dispatcher process stopped while this execution was live.
    Interrupted { at: DateTime<Utc> },
}

impl Transition {
    /// Map a launcher outcome to the transition that records it.
    pub fn from_outcome(outcome: JobOutcome, timeout_secs: u64, at: DateTime<Utc>) -> Self {
        match outcome {
            JobOutcome::Exited { code } => Transition::Exited { code, at },
            JobOutcome::TimedOut => Transition::TimedOut { timeout_secs, at },
            JobOutcome::Crashed { reason } => Transition::Crashed { reason, at },
        }
    }

    /// Status the execution ends up in.
    pub fn target(&self) -> ExecutionStatus {
        match self {
            Transition::Started { .. } => ExecutionStatus::Running,
            Transition::Exited { code: 0, .. } => ExecutionStatus::Succeeded,
            Transition::Exited { .. }
            | Transition::Crashed { .. }
            | Transition::LaunchFailed { .. }
            | Transition::Interrupted { .. } => ExecutionStatus::Failed,
            Transition::TimedOut { .. } => ExecutionStatus::TimedOut,
        }
    }

    fn at(&self) -> DateTime<Utc> {
        match self {
            Transition::Started { at, .. }
            | Transition::Exited { at, .. }
            | Transition::Crashed { at, .. }
            | Transition::LaunchFailed { at, .. }
            | Transition::TimedOut { at, .. }
            | Transition::Interrupted { at } => *at,
        }
    }
}

/// Apply `transition` to `execution`, returning the updated record.
///
/// Rejects steps the lifecycle does not allow, including any change to a
/// terminal execution and a launch failure after the job started.
pub fn advance_execution(
    execution: &Execution,
    transition: Transition,
) -> Result<Execution, OrchestratorError> {
    let from = execution.status;
    let to = transition.target();
    let legal = match &transition {
        Transition::LaunchFailed { .. } => from == ExecutionStatus::Pending,
        Transition::Interrupted { .. } => !from.is_terminal(),
        _ => from.can_transition_to(to),
    };
    if !legal {
        return Err(OrchestratorError::IllegalTransition { from, to });
    }

    let mut next = execution.clone();
    next.status = to;
    let at = transition.at();
    match transition {
        Transition::Started { job_id, .. } => {
            next.started_at = Some(at);
            next.job_id = Some(job_id);
        }
        Transition::Exited { code, .. } => {
            next.exit_code = Some(code);
            if code != 0 {
                next.failure_detail = Some(format!("task exited with code {code}"));
            }
        }
        Transition::Crashed { reason, .. } => {
            next.failure_detail = Some(format!("task crashed: {reason}"));
        }
        Transition::LaunchFailed { reason, .. } => {
            next.failure_detail = Some(format!("launch failed: {reason}"));
        }
        Transition::TimedOut { timeout_secs, .. } => {
            next.failure_detail = Some(format!(
                "no terminal report within {timeout_secs}s"
            ));
        }
        Transition::Interrupted { .. } => {
            next.failure_detail = Some(INTERRUPTED_DETAIL.to_string());
        }
    }
    if to.is_terminal() {
        next.ended_at = Some(at);
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// ExecutionTicket
// ---------------------------------------------------------------------------

/// Handle to an accepted execution: its ID now, its terminal record later.
#[derive(Debug)]
pub struct ExecutionTicket {
    execution_id: Uuid,
    handle: JoinHandle<Execution>,
}

impl ExecutionTicket {
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Wait for the execution to reach a terminal status.
    pub async fn wait(self) -> Result<Execution, OrchestratorError> {
        self.handle
            .await
            .map_err(|e| OrchestratorError::Join(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<R, P> {
    repo: Arc<R>,
    launcher: Arc<JobLauncher<P>>,
    event_bus: EventBus,
    timeout: Duration,
    timeout_policy: TimeoutPolicy,
    admission: Option<Arc<Semaphore>>,
}

impl<R, P> Clone for Orchestrator<R, P> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            launcher: self.launcher.clone(),
            event_bus: self.event_bus.clone(),
            timeout: self.timeout,
            timeout_policy: self.timeout_policy,
            admission: self.admission.clone(),
        }
    }
}

impl<R, P> Orchestrator<R, P>
where
    R: ExecutionRepository + 'static,
    P: ComputeProvider + 'static,
{
    pub fn new(
        repo: Arc<R>,
        launcher: Arc<JobLauncher<P>>,
        event_bus: EventBus,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            launcher,
            event_bus,
            timeout,
            timeout_policy: TimeoutPolicy::default(),
            admission: None,
        }
    }

    /// Build from the dispatcher config: ceiling, timeout policy and
    /// admission limit.
    pub fn from_config(
        repo: Arc<R>,
        provider: Arc<P>,
        event_bus: EventBus,
        config: &DispatcherConfig,
    ) -> Self {
        let launcher = Arc::new(JobLauncher::from_config(provider, config));
        let mut orchestrator = Self::new(repo, launcher, event_bus, config.timeout())
            .with_timeout_policy(config.timeout_policy);
        if let Some(limit) = config.max_concurrent_executions {
            orchestrator = orchestrator.with_max_concurrent(limit as usize);
        }
        orchestrator
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// Limit how many executions may be RUNNING at once.
    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.admission = Some(Arc::new(Semaphore::new(limit)));
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Accept `invocation`: persist a PENDING execution and drive it in the
    /// background. Returns as soon as the record exists.
    pub async fn submit(&self, invocation: Invocation) -> Result<ExecutionTicket, OrchestratorError> {
        if invocation.command.is_empty() {
            return Err(OrchestratorError::InvalidInvocation);
        }

        let execution = Execution::pending(invocation);
        self.repo.create(&execution).await?;

        let execution_id = execution.id;
        let object_key = execution.object_key().unwrap_or_default().to_string();
        tracing::info!(
            execution_id = %execution_id,
            object_key = object_key.as_str(),
            "execution accepted"
        );
        self.event_bus.publish(DispatchEvent::ExecutionAccepted {
            execution_id,
            object_key,
        });

        let this = self.clone();
        let handle = tokio::spawn(async move { this.drive(execution).await });
        Ok(ExecutionTicket {
            execution_id,
            handle,
        })
    }

    /// Accept `invocation` and wait for its terminal record.
    pub async fn run(&self, invocation: Invocation) -> Result<Execution, OrchestratorError> {
        self.submit(invocation).await?.wait().await
    }

    /// Resolve executions a previous process left PENDING or RUNNING.
    ///
    /// Their jobs are no longer observed, so they are recorded FAILED.
    /// Returns the number of executions resolved.
    pub async fn recover_interrupted(&self) -> Result<usize, OrchestratorError> {
        let unfinished = self.repo.list_unfinished().await?;
        let mut recovered = 0;
        for execution in unfinished {
            let next = advance_execution(&execution, Transition::Interrupted { at: Utc::now() })?;
            self.repo.update(&next).await?;
            tracing::warn!(
                execution_id = %next.id,
                previous_status = %execution.status,
                "execution interrupted by restart, marked failed"
            );
            self.event_bus.publish(DispatchEvent::ExecutionFailed {
                execution_id: next.id,
                detail: INTERRUPTED_DETAIL.to_string(),
            });
            recovered += 1;
        }
        Ok(recovered)
    }

    // -----------------------------------------------------------------------
    // Per-execution task
    // -----------------------------------------------------------------------

    async fn drive(self, execution: Execution) -> Execution {
        let _permit = match &self.admission {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        };

        let handle = match self.launcher.launch(execution.id, &execution.input).await {
            Ok(handle) => handle,
            Err(e) => {
                let reason = e.to_string();
                return self
                    .apply(&execution, Transition::LaunchFailed { reason, at: Utc::now() })
                    .await;
            }
        };

        let running = self
            .apply(
                &execution,
                Transition::Started {
                    job_id: handle.job_id.clone(),
                    at: Utc::now(),
                },
            )
            .await;
        let deadline = Instant::now() + self.timeout;

        let outcome = self.launcher.await_completion(&handle, deadline).await;

        if outcome == JobOutcome::TimedOut && self.timeout_policy == TimeoutPolicy::Terminate {
            if let Err(e) = self.launcher.terminate(&handle).await {
                tracing::warn!(
                    execution_id = %running.id,
                    job_id = handle.job_id.as_str(),
                    error = %e,
                    "failed to terminate timed-out job"
                );
            }
        }

        let transition = Transition::from_outcome(outcome, self.timeout.as_secs(), Utc::now());
        self.apply(&running, transition).await
    }

    /// Advance, persist, log and publish. Persistence failures are logged;
    /// the in-memory record is still returned to the ticket holder.
    async fn apply(&self, execution: &Execution, transition: Transition) -> Execution {
        let next = match advance_execution(execution, transition) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(execution_id = %execution.id, error = %e, "rejected transition");
                return execution.clone();
            }
        };

        if let Err(e) = self.repo.update(&next).await {
            tracing::error!(
                execution_id = %next.id,
                status = %next.status,
                error = %e,
                "failed to persist execution"
            );
        }

        self.announce(&next);
        next
    }

    fn announce(&self, execution: &Execution) {
        let execution_id = execution.id;
        let detail = execution.failure_detail.clone().unwrap_or_default();
        match execution.status {
            ExecutionStatus::Pending => {}
            ExecutionStatus::Running => {
                let job_id = execution.job_id.clone().unwrap_or_default();
                tracing::info!(
                    execution_id = %execution_id,
                    job_id = job_id.as_str(),
                    "execution running"
                );
                self.event_bus
                    .publish(DispatchEvent::ExecutionStarted { execution_id, job_id });
            }
            ExecutionStatus::Succeeded => {
                let duration_ms = execution
                    .duration()
                    .map(|d| d.num_milliseconds().max(0) as u64)
                    .unwrap_or_default();
                tracing::info!(
                    execution_id = %execution_id,
                    duration_ms,
                    "execution succeeded"
                );
                self.event_bus.publish(DispatchEvent::ExecutionSucceeded {
                    execution_id,
                    duration_ms,
                });
            }
            ExecutionStatus::Failed => {
                tracing::warn!(
                    execution_id = %execution_id,
                    detail = detail.as_str(),
                    "execution failed"
                );
                self.event_bus
                    .publish(DispatchEvent::ExecutionFailed { execution_id, detail });
            }
            ExecutionStatus::TimedOut => {
                tracing::warn!(
                    execution_id = %execution_id,
                    timeout_secs = self.timeout.as_secs(),
                    "execution timed out"
                );
                self.event_bus.publish(DispatchEvent::ExecutionTimedOut {
                    execution_id,
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OrchestratorError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("invocation command is empty")]
    InvalidInvocation,

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("execution task ended abnormally: {0}")]
    Join(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
