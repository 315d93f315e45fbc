//! Execution tracking types.
//!
//! An `Execution` is the lifecycle record the orchestrator keeps for one
//! accepted `Invocation`. Status moves forward only:
//!
//! ```text
//! PENDING -> RUNNING -> SUCCEEDED | FAILED | TIMED_OUT
//! PENDING -> FAILED                (launch failure, no job ever existed)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// Command line handed to the processing task: `[entry_path, object_key]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub command: Vec<String>,
}

impl Invocation {
    pub fn new(entry_path: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            command: vec![entry_path.into(), object_key.into()],
        }
    }

    /// The task entry point (first command element).
    pub fn entry_path(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    /// The object key the task should process (second command element).
    pub fn object_key(&self) -> Option<&str> {
        self.command.get(1).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Execution status
// ---------------------------------------------------------------------------

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 5] = [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Succeeded,
        ExecutionStatus::Failed,
        ExecutionStatus::TimedOut,
    ];

    /// Storage/display form (snake_case).
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::TimedOut => "timed_out",
        }
    }

    /// Whether the status is final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::TimedOut
        )
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Failed) | (Running, Succeeded | Failed | TimedOut)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ExecutionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown execution status '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One tracked run of the processing task for one accepted invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    pub status: ExecutionStatus,
    /// The invocation this execution was created for.
    pub input: Invocation,
    /// When the invocation was accepted.
    pub created_at: DateTime<Utc>,
    /// When the job was submitted (None while PENDING).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal status was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Compute provider task handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Task exit code, when the task exited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Cause of a FAILED or TIMED_OUT status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

impl Execution {
    /// A fresh PENDING execution for `input`.
    pub fn pending(input: Invocation) -> Self {
        Self {
            id: Uuid::now_v7(),
            status: ExecutionStatus::Pending,
            input,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            job_id: None,
            exit_code: None,
            failure_detail: None,
        }
    }

    pub fn object_key(&self) -> Option<&str> {
        self.input.object_key()
    }

    /// Time between job submission and the terminal status, if both are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_command_shape() {
        let inv = Invocation::new("/usr/src/app/lib/index.js", "input/foo.csv");
        assert_eq!(
            inv.command,
            vec!["/usr/src/app/lib/index.js".to_string(), "input/foo.csv".to_string()]
        );
        assert_eq!(inv.entry_path(), Some("/usr/src/app/lib/index.js"));
        assert_eq!(inv.object_key(), Some("input/foo.csv"));

        let json = serde_json::to_value(&inv).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "command": ["/usr/src/app/lib/index.js", "input/foo.csv"] })
        );
    }

    #[test]
    fn test_status_serde_and_parse() {
        for status in ExecutionStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            let parsed: ExecutionStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert_eq!(
            "TIMED-OUT".parse::<ExecutionStatus>().unwrap(),
            ExecutionStatus::TimedOut
        );
        assert!("done".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_status_transitions() {
        use ExecutionStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Succeeded));
        assert!(!Pending.can_transition_to(TimedOut));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(TimedOut));
        assert!(!Running.can_transition_to(Pending));
        for terminal in [Succeeded, Failed, TimedOut] {
            assert!(terminal.is_terminal());
            for next in ExecutionStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_pending_execution() {
        let exec = Execution::pending(Invocation::new("/entry.js", "input/a"));
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert!(exec.started_at.is_none());
        assert!(exec.duration().is_none());
        assert_eq!(exec.id.get_version_num(), 7);
        assert_eq!(exec.object_key(), Some("input/a"));
    }
}
