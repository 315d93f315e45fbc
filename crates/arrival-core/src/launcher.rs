//! Job launcher: turns an invocation into exactly one compute job.
//!
//! The launcher owns the fixed task template and network placement. It builds
//! a `JobSpec` whose command override is the invocation command, submits it
//! through a `ComputeProvider`, and waits for the job with a deadline that is
//! enforced locally rather than trusted to the provider.

use std::sync::Arc;

use arrival_types::config::DispatcherConfig;
use arrival_types::execution::Invocation;
use arrival_types::job::{JobHandle, JobOutcome, JobSpec, NetworkContext, TaskTemplate};
use tokio::time::Instant;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ComputeProvider port
// ---------------------------------------------------------------------------

/// Errors reported by a compute provider.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// The provider has no room for another job.
    #[error("compute capacity exhausted: {0}")]
    Capacity(String),

    /// The task could not be started.
    #[error("failed to start task: {0}")]
    Start(String),

    /// The provider does not know the job.
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    /// The task's status could not be observed.
    #[error("task status unavailable: {0}")]
    Status(String),
}

/// Runs single tasks to completion.
///
/// Implementations live in arrival-infra (e.g. `ProcessComputeProvider`).
pub trait ComputeProvider: Send + Sync {
    /// Start a job. Returns once the provider accepted it.
    fn submit(
        &self,
        spec: &JobSpec,
    ) -> impl std::future::Future<Output = Result<JobHandle, ComputeError>> + Send;

    /// Wait until the job stops and return its exit code.
    fn wait(
        &self,
        handle: &JobHandle,
    ) -> impl std::future::Future<Output = Result<i32, ComputeError>> + Send;

    /// Forcibly stop the job.
    fn terminate(
        &self,
        handle: &JobHandle,
    ) -> impl std::future::Future<Output = Result<(), ComputeError>> + Send;
}

// ---------------------------------------------------------------------------
// LaunchError
// ---------------------------------------------------------------------------

/// Why a job could not be submitted.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("invocation command is empty")]
    EmptyCommand,

    #[error("malformed task template: {0}")]
    Template(String),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}

// ---------------------------------------------------------------------------
// JobLauncher
// ---------------------------------------------------------------------------

pub struct JobLauncher<P> {
    provider: Arc<P>,
    template: TaskTemplate,
    network: NetworkContext,
    timeout_secs: u64,
}

impl<P: ComputeProvider> JobLauncher<P> {
    pub fn new(
        provider: Arc<P>,
        template: TaskTemplate,
        network: NetworkContext,
        timeout_secs: u64,
    ) -> Self {
        Self {
            provider,
            template,
            network,
            timeout_secs,
        }
    }

    pub fn from_config(provider: Arc<P>, config: &DispatcherConfig) -> Self {
        Self::new(
            provider,
            config.task.clone(),
            config.network.clone(),
            config.timeout_secs,
        )
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn template(&self) -> &TaskTemplate {
        &self.template
    }

    /// The job spec for `invocation`; its override is exactly the command.
    pub fn build_spec(&self, execution_id: Uuid, invocation: &Invocation) -> JobSpec {
        JobSpec::from_template(
            execution_id,
            &self.template,
            &self.network,
            invocation.command.clone(),
            self.timeout_secs,
        )
    }

    /// Submit one job for `invocation`.
    pub async fn launch(
        &self,
        execution_id: Uuid,
        invocation: &Invocation,
    ) -> Result<JobHandle, LaunchError> {
        if invocation.command.is_empty() {
            return Err(LaunchError::EmptyCommand);
        }
        if self.template.program.trim().is_empty() {
            return Err(LaunchError::Template("program is empty".into()));
        }

        let spec = self.build_spec(execution_id, invocation);
        let handle = self.provider.submit(&spec).await?;

        tracing::debug!(
            execution_id = %execution_id,
            job_id = handle.job_id.as_str(),
            task = spec.task_template.as_str(),
            cpu = spec.cpu,
            memory_mib = spec.memory_mib,
            "job submitted"
        );
        Ok(handle)
    }

    /// Wait for `handle` until `deadline`.
    ///
    /// A wait error becomes `Crashed`; reaching the deadline becomes
    /// `TimedOut`. The job is not terminated here.
    pub async fn await_completion(&self, handle: &JobHandle, deadline: Instant) -> JobOutcome {
        match tokio::time::timeout_at(deadline, self.provider.wait(handle)).await {
            Ok(Ok(code)) => JobOutcome::Exited { code },
            Ok(Err(e)) => JobOutcome::Crashed {
                reason: e.to_string(),
            },
            Err(_) => JobOutcome::TimedOut,
        }
    }

    pub async fn terminate(&self, handle: &JobHandle) -> Result<(), ComputeError> {
        self.provider.terminate(handle).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
