//! Scripted compute provider for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arrival_types::job::{JobHandle, JobSpec};
use chrono::Utc;

use crate::launcher::{ComputeError, ComputeProvider};

/// What a scripted job does once submitted.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Exit with `code` after `after`.
    Exit { code: i32, after: Duration },
    /// Never report.
    Hang,
    /// Refuse submission with a capacity error.
    Reject(String),
    /// Accept, then fail the wait.
    LoseTrack(String),
}

impl Behavior {
    pub fn exit(code: i32) -> Self {
        Behavior::Exit {
            code,
            after: Duration::ZERO,
        }
    }
}

/// Provider whose jobs follow a per-object-key script.
pub struct FakeProvider {
    default: Behavior,
    by_key: Mutex<HashMap<String, Behavior>>,
    jobs: Mutex<HashMap<String, Behavior>>,
    submitted: Mutex<Vec<JobSpec>>,
    terminated: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl FakeProvider {
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            by_key: Mutex::new(HashMap::new()),
            jobs: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Script the job for a given object key.
    pub fn with_key(self, key: &str, behavior: Behavior) -> Self {
        self.by_key.lock().unwrap().insert(key.to_string(), behavior);
        self
    }

    pub fn submitted(&self) -> Vec<JobSpec> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

impl ComputeProvider for FakeProvider {
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, ComputeError> {
        let key = spec.command_override.last().cloned().unwrap_or_default();
        let behavior = self
            .by_key
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        if let Behavior::Reject(reason) = &behavior {
            return Err(ComputeError::Capacity(reason.clone()));
        }

        let job_id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.jobs.lock().unwrap().insert(job_id.clone(), behavior);
        self.submitted.lock().unwrap().push(spec.clone());
        Ok(JobHandle {
            job_id,
            execution_id: spec.execution_id,
            submitted_at: Utc::now(),
        })
    }

    async fn wait(&self, handle: &JobHandle) -> Result<i32, ComputeError> {
        let behavior = self
            .jobs
            .lock()
            .unwrap()
            .get(&handle.job_id)
            .cloned()
            .ok_or_else(|| ComputeError::UnknownJob(handle.job_id.clone()))?;

        match behavior {
            Behavior::Exit { code, after } => {
                tokio::time::sleep(after).await;
                Ok(code)
            }
            Behavior::Hang | Behavior::Reject(_) => std::future::pending().await,
            Behavior::LoseTrack(reason) => Err(ComputeError::Status(reason)),
        }
    }

    async fn terminate(&self, handle: &JobHandle) -> Result<(), ComputeError> {
        self.terminated.lock().unwrap().push(handle.job_id.clone());
        Ok(())
    }
}
