//! Event types for the Arrival dispatch event bus.
//!
//! `DispatchEvent` is broadcast by the orchestrator at every execution
//! lifecycle step. All variants are Clone + Send + Sync for use with tokio
//! broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// An invocation was accepted and a PENDING execution recorded.
    ExecutionAccepted {
        execution_id: Uuid,
        object_key: String,
    },

    /// The job was submitted; the execution is RUNNING.
    ExecutionStarted { execution_id: Uuid, job_id: String },

    /// The job exited 0.
    ExecutionSucceeded {
        execution_id: Uuid,
        duration_ms: u64,
    },

    /// The job failed, crashed, or could not be launched.
    ExecutionFailed { execution_id: Uuid, detail: String },

    /// The deadline passed before the job reported.
    ExecutionTimedOut {
        execution_id: Uuid,
        timeout_secs: u64,
    },
}

impl DispatchEvent {
    pub fn execution_id(&self) -> Uuid {
        match self {
            DispatchEvent::ExecutionAccepted { execution_id, .. }
            | DispatchEvent::ExecutionStarted { execution_id, .. }
            | DispatchEvent::ExecutionSucceeded { execution_id, .. }
            | DispatchEvent::ExecutionFailed { execution_id, .. }
            | DispatchEvent::ExecutionTimedOut { execution_id, .. } => *execution_id,
        }
    }

    /// Whether this event resolves its execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchEvent::ExecutionSucceeded { .. }
                | DispatchEvent::ExecutionFailed { .. }
                | DispatchEvent::ExecutionTimedOut { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let id = Uuid::now_v7();
        let event = DispatchEvent::ExecutionStarted {
            execution_id: id,
            job_id: "proc-1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "execution_started");
        assert_eq!(json["job_id"], "proc-1");
        assert_eq!(event.execution_id(), id);
    }

    #[test]
    fn terminal_events() {
        let id = Uuid::now_v7();
        assert!(!DispatchEvent::ExecutionStarted { execution_id: id, job_id: "j".into() }.is_terminal());
        assert!(DispatchEvent::ExecutionTimedOut { execution_id: id, timeout_secs: 1 }.is_terminal());
        assert!(DispatchEvent::ExecutionFailed { execution_id: id, detail: "x".into() }.is_terminal());
    }
}
