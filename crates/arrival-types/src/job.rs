//! Compute job types.
//!
//! A job is one run of the fixed task template, launched by the job launcher
//! with the execution's command as the command override.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task template + network placement
// ---------------------------------------------------------------------------

/// The fixed processing task every job is launched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    /// Template name recorded on each job.
    #[serde(default = "default_task_name")]
    pub name: String,
    /// Program the local provider executes (the container entry point).
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the command override.
    #[serde(default)]
    pub args: Vec<String>,
    /// CPU units (1024 = one vCPU).
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    /// Memory in MiB.
    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,
    /// Environment passed to the task.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Upper bound on concurrently running jobs for the local provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_running: Option<u32>,
}

fn default_task_name() -> String {
    "arrival-task".to_string()
}

fn default_program() -> String {
    "node".to_string()
}

fn default_cpu() -> u32 {
    1024
}

fn default_memory_mib() -> u32 {
    2048
}

impl Default for TaskTemplate {
    fn default() -> Self {
        Self {
            name: default_task_name(),
            program: default_program(),
            args: Vec::new(),
            cpu: default_cpu(),
            memory_mib: default_memory_mib(),
            environment: BTreeMap::new(),
            max_running: None,
        }
    }
}

/// Dedicated network placement for jobs: outbound open, inbound closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkContext {
    #[serde(default = "default_network_name")]
    pub name: String,
    #[serde(default = "default_true")]
    pub assign_public_ip: bool,
    #[serde(default = "default_true")]
    pub egress_open: bool,
    #[serde(default)]
    pub ingress_open: bool,
}

fn default_network_name() -> String {
    "arrival-isolated".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for NetworkContext {
    fn default() -> Self {
        Self {
            name: default_network_name(),
            assign_public_ip: true,
            egress_open: true,
            ingress_open: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Job spec / handle / outcome
// ---------------------------------------------------------------------------

/// Everything a compute provider needs to start one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Execution that owns this job.
    pub execution_id: Uuid,
    /// Name of the task template the job runs.
    pub task_template: String,
    pub program: String,
    pub args: Vec<String>,
    /// Replaces the template's default command; equals the invocation command.
    pub command_override: Vec<String>,
    pub cpu: u32,
    pub memory_mib: u32,
    pub environment: BTreeMap<String, String>,
    pub network: NetworkContext,
    pub timeout_secs: u64,
}

impl JobSpec {
    pub fn from_template(
        execution_id: Uuid,
        template: &TaskTemplate,
        network: &NetworkContext,
        command_override: Vec<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            execution_id,
            task_template: template.name.clone(),
            program: template.program.clone(),
            args: template.args.clone(),
            command_override,
            cpu: template.cpu,
            memory_mib: template.memory_mib,
            environment: template.environment.clone(),
            network: network.clone(),
            timeout_secs,
        }
    }

    /// Full argument vector after the program: template args then the override.
    pub fn argv(&self) -> Vec<String> {
        self.args
            .iter()
            .chain(self.command_override.iter())
            .cloned()
            .collect()
    }
}

/// Provider-issued handle to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub execution_id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

/// How a job ended, as observed by the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The task exited with a status code.
    Exited { code: i32 },
    /// The deadline passed before a terminal report.
    TimedOut,
    /// The task ended without a usable exit status, or it could not be observed.
    Crashed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_defaults() {
        let t = TaskTemplate::default();
        assert_eq!(t.cpu, 1024);
        assert_eq!(t.memory_mib, 2048);
        assert_eq!(t.program, "node");
        assert!(t.max_running.is_none());

        let n = NetworkContext::default();
        assert!(n.egress_open);
        assert!(!n.ingress_open);
    }

    #[test]
    fn test_spec_argv_appends_override() {
        let template = TaskTemplate {
            program: "sh".into(),
            args: vec!["-c".into(), "exit 0".into(), "task".into()],
            ..TaskTemplate::default()
        };
        let command = vec!["/entry.js".to_string(), "input/a.csv".to_string()];
        let spec = JobSpec::from_template(
            Uuid::now_v7(),
            &template,
            &NetworkContext::default(),
            command.clone(),
            60,
        );
        assert_eq!(spec.command_override, command);
        assert_eq!(
            spec.argv(),
            vec!["-c", "exit 0", "task", "/entry.js", "input/a.csv"]
        );
        assert_eq!(spec.task_template, "arrival-task");
    }

    #[test]
    fn test_outcome_serde_tag() {
        let json = serde_json::to_value(JobOutcome::Exited { code: 3 }).unwrap();
        assert_eq!(json["type"], "exited");
        assert_eq!(json["code"], 3);
        let json = serde_json::to_value(JobOutcome::TimedOut).unwrap();
        assert_eq!(json["type"], "timed_out");
    }
}
