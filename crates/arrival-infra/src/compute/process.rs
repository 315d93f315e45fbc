//! Local compute provider that runs each job as a child process.
//!
//! The child runs `program args... command_override...` with a cleared
//! environment: only the task template's variables, `PATH` (inherited unless
//! the template sets it), and the job metadata variables are visible. The
//! network context is only passed through by name; a local process shares
//! the host network. Output lines are forwarded to the log tagged with the
//! execution ID.
//!
//! Each job gets a monitor task that owns the `Child`. It publishes the exit
//! status on a `watch` channel and kills the child when the job's
//! cancellation token fires. A job's entry is released by `terminate`, by a
//! `wait` that saw the exit, or, once a waiter gave up early, by the monitor
//! when the process exits.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arrival_core::launcher::{ComputeError, ComputeProvider};
use arrival_types::job::{JobHandle, JobSpec};
use chrono::Utc;
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Variable carrying the owning execution's ID into the task.
pub const EXECUTION_ID_ENV: &str = "ARRIVAL_EXECUTION_ID";

/// How a child process ended.
#[derive(Debug, Clone)]
enum ProcessExit {
    Code(i32),
    /// Ended without an exit code (killed by a signal).
    Abnormal(String),
    /// The OS wait call failed.
    WaitFailed(String),
}

struct JobEntry {
    exit: watch::Receiver<Option<ProcessExit>>,
    kill: CancellationToken,
    /// Set when a `wait` was dropped before the exit arrived.
    detached: Arc<AtomicBool>,
}

/// Releases the job entry when a `wait` ends, however it ends.
struct WaitGuard<'a> {
    jobs: &'a DashMap<String, JobEntry>,
    job_id: &'a str,
    exit: watch::Receiver<Option<ProcessExit>>,
    detached: Arc<AtomicBool>,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.detached.store(true, Ordering::SeqCst);
        let exited = self.exit.borrow().is_some();
        if exited {
            self.jobs.remove(self.job_id);
        }
    }
}

/// Runs jobs as local child processes.
pub struct ProcessComputeProvider {
    jobs: Arc<DashMap<String, JobEntry>>,
    running: Arc<AtomicUsize>,
    max_running: Option<usize>,
}

impl ProcessComputeProvider {
    pub fn new(max_running: Option<usize>) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            running: Arc::new(AtomicUsize::new(0)),
            max_running,
        }
    }

    /// Number of jobs whose process has not exited yet.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of jobs still held for `wait` or `terminate`.
    pub fn tracked(&self) -> usize {
        self.jobs.len()
    }

    fn reserve_slot(&self) -> Result<(), ComputeError> {
        let Some(max) = self.max_running else {
            self.running.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        };
        self.running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .map(|_| ())
            .map_err(|n| ComputeError::Capacity(format!("{n} of {max} job slots in use")))
    }

    fn command_for(spec: &JobSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(spec.argv())
            .env_clear()
            .envs(&spec.environment)
            .env(EXECUTION_ID_ENV, spec.execution_id.to_string())
            .env("ARRIVAL_TASK_NAME", &spec.task_template)
            .env("ARRIVAL_TASK_CPU", spec.cpu.to_string())
            .env("ARRIVAL_TASK_MEMORY_MIB", spec.memory_mib.to_string())
            .env("ARRIVAL_NETWORK_NAME", &spec.network.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !spec.environment.contains_key("PATH") {
            if let Ok(path) = std::env::var("PATH") {
                cmd.env("PATH", path);
            }
        }
        cmd
    }
}

impl Default for ProcessComputeProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

fn exit_from(status: std::io::Result<ExitStatus>) -> ProcessExit {
    match status {
        Ok(status) => match status.code() {
            Some(code) => ProcessExit::Code(code),
            None => ProcessExit::Abnormal(format!("process ended without exit code ({status})")),
        },
        Err(e) => ProcessExit::WaitFailed(e.to_string()),
    }
}

/// Forward each output line to the log until the stream closes.
fn forward_lines<S>(stream: S, execution_id: Uuid, name: &'static str)
where
    S: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::info!(execution_id = %execution_id, stream = name, "{line}");
        }
    });
}

impl ComputeProvider for ProcessComputeProvider {
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, ComputeError> {
        self.reserve_slot()?;

        let mut child = match Self::command_for(spec).spawn() {
            Ok(child) => child,
            Err(e) => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                return Err(ComputeError::Start(format!("{}: {e}", spec.program)));
            }
        };

        let pid = child.id().unwrap_or_default();
        let job_id = format!("proc-{}-{pid}", spec.execution_id.simple());

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, spec.execution_id, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, spec.execution_id, "stderr");
        }

        let (tx, rx) = watch::channel(None);
        let kill = CancellationToken::new();
        let detached = Arc::new(AtomicBool::new(false));
        let running = self.running.clone();
        let jobs = self.jobs.clone();
        let monitor_kill = kill.clone();
        let monitor_detached = detached.clone();
        let monitor_job = job_id.clone();
        tokio::spawn(async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = monitor_kill.cancelled() => None,
            };
            let status = match finished {
                Some(status) => status,
                None => {
                    tracing::info!(job_id = monitor_job.as_str(), "killing job");
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            running.fetch_sub(1, Ordering::SeqCst);
            let _ = tx.send(Some(exit_from(status)));
            if monitor_detached.load(Ordering::SeqCst) {
                jobs.remove(&monitor_job);
            }
        });

        self.jobs.insert(
            job_id.clone(),
            JobEntry {
                exit: rx,
                kill,
                detached,
            },
        );

        tracing::debug!(
            execution_id = %spec.execution_id,
            job_id = job_id.as_str(),
            program = spec.program.as_str(),
            "process started"
        );

        Ok(JobHandle {
            job_id,
            execution_id: spec.execution_id,
            submitted_at: Utc::now(),
        })
    }

    async fn wait(&self, handle: &JobHandle) -> Result<i32, ComputeError> {
        let (mut exit, detached) = self
            .jobs
            .get(&handle.job_id)
            .map(|entry| (entry.exit.clone(), entry.detached.clone()))
            .ok_or_else(|| ComputeError::UnknownJob(handle.job_id.clone()))?;
        let _guard = WaitGuard {
            jobs: &self.jobs,
            job_id: &handle.job_id,
            exit: exit.clone(),
            detached,
        };

        let result = exit
            .wait_for(Option::is_some)
            .await
            .map(|value| value.clone())
            .map_err(|_| ComputeError::Status("job monitor stopped".into()))?;

        match result {
            Some(ProcessExit::Code(code)) => Ok(code),
            Some(ProcessExit::Abnormal(reason)) | Some(ProcessExit::WaitFailed(reason)) => {
                Err(ComputeError::Status(reason))
            }
            None => Err(ComputeError::Status("job monitor stopped".into())),
        }
    }

    async fn terminate(&self, handle: &JobHandle) -> Result<(), ComputeError> {
        let (_, entry) = self
            .jobs
            .remove(&handle.job_id)
            .ok_or_else(|| ComputeError::UnknownJob(handle.job_id.clone()))?;
        entry.kill.cancel();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;
    use arrival_types::job::{NetworkContext, TaskTemplate};

    /// Spec running `sh -c <script> task <entry> <key>`, so `$2` is the key.
    fn sh_spec(script: &str) -> JobSpec {
        let template = TaskTemplate {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "task".into()],
            ..TaskTemplate::default()
        };
        JobSpec::from_template(
            Uuid::now_v7(),
            &template,
            &NetworkContext::default(),
            vec!["/entry.js".into(), "input/foo.csv".into()],
            60,
        )
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let provider = ProcessComputeProvider::default();
        let handle = provider.submit(&sh_spec("exit 7")).await.unwrap();
        assert_eq!(provider.wait(&handle).await.unwrap(), 7);
        assert_eq!(provider.running(), 0);
        assert_eq!(provider.tracked(), 0);
    }

    #[tokio::test]
    async fn abandoned_waits_release_jobs_on_exit() {
        let provider = ProcessComputeProvider::default();
        for _ in 0..3 {
            let handle = provider.submit(&sh_spec("sleep 0.5")).await.unwrap();
            let waited =
                tokio::time::timeout(Duration::from_millis(50), provider.wait(&handle)).await;
            assert!(waited.is_err(), "job should still be running");
        }
        assert_eq!(provider.tracked(), 3);

        tokio::time::timeout(Duration::from_secs(5), async {
            while provider.running() > 0 || provider.tracked() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn terminate_after_abandoned_wait() {
        let provider = ProcessComputeProvider::default();
        let handle = provider.submit(&sh_spec("sleep 30")).await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(50), provider.wait(&handle)).await;
        assert!(waited.is_err());

        provider.terminate(&handle).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while provider.running() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(provider.tracked(), 0);
    }

    #[tokio::test]
    async fn command_override_reaches_the_process() {
        let provider = ProcessComputeProvider::default();
        let handle = provider
            .submit(&sh_spec(r#"[ "$1" = "/entry.js" ] && [ "$2" = "input/foo.csv" ]"#))
            .await
            .unwrap();
        assert_eq!(provider.wait(&handle).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn environment_is_cleared_and_tagged() {
        let mut spec = sh_spec(
            r#"[ -z "$HOME" ] && [ "$GREETING" = "hi" ] && [ "$ARRIVAL_EXECUTION_ID" = "$EXPECTED_ID" ] && [ "$ARRIVAL_NETWORK_NAME" = "arrival-isolated" ]"#,
        );
        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "hi".to_string());
        env.insert("EXPECTED_ID".to_string(), spec.execution_id.to_string());
        spec.environment = env;

        let provider = ProcessComputeProvider::default();
        let handle = provider.submit(&spec).await.unwrap();
        assert_eq!(provider.wait(&handle).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let provider = ProcessComputeProvider::new(Some(1));
        let mut spec = sh_spec("exit 0");
        spec.program = "/nonexistent/arrival-task".into();
        let err = provider.submit(&spec).await.unwrap_err();
        assert!(matches!(err, ComputeError::Start(_)));
        assert_eq!(provider.running(), 0, "slot released after failed start");
    }

    #[tokio::test]
    async fn capacity_limit_rejects_submission() {
        let provider = ProcessComputeProvider::new(Some(1));
        let first = provider.submit(&sh_spec("sleep 5")).await.unwrap();
        let err = provider.submit(&sh_spec("exit 0")).await.unwrap_err();
        assert!(matches!(err, ComputeError::Capacity(_)));

        provider.terminate(&first).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while provider.running() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        let next = provider.submit(&sh_spec("exit 0")).await.unwrap();
        assert_eq!(provider.wait(&next).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn terminate_kills_running_job() {
        let provider = ProcessComputeProvider::default();
        let handle = provider.submit(&sh_spec("sleep 30")).await.unwrap();
        provider.terminate(&handle).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while provider.running() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(matches!(
            provider.wait(&handle).await,
            Err(ComputeError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn killed_process_has_no_exit_code() {
        let provider = ProcessComputeProvider::default();
        let handle = provider.submit(&sh_spec("kill -9 $$")).await.unwrap();
        assert!(matches!(
            provider.wait(&handle).await,
            Err(ComputeError::Status(_))
        ));
    }
}
