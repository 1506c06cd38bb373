//! Run reporting types, serialized for operators and the CLI.

use slipway_core::{JobId, RunId};
use slipway_core::job::{JobStatus, RunStatus, SkipReason};
use slipway_core::trigger::Trigger;
use serde::Serialize;

/// Outcome of one matrix instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceReport {
    pub display_name: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Outcome of one declared job, including all of its instances.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: JobId,
    pub uses: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Which predecessors caused an upstream-failure skip.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_needs: Vec<JobId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<InstanceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl JobReport {
    pub fn skipped(job: JobId, uses: String, reason: SkipReason, failed_needs: Vec<JobId>) -> Self {
        Self {
            job,
            uses,
            status: JobStatus::Skipped,
            skip_reason: Some(reason),
            failed_needs,
            instances: vec![],
            error: None,
            duration_ms: 0,
        }
    }
}

/// Outcome of a whole pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub pipeline: String,
    pub trigger: Trigger,
    pub status: RunStatus,
    /// Jobs in topological order of the declared graph.
    pub jobs: Vec<JobReport>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn job(&self, id: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.job.as_str() == id)
    }

    /// Jobs that ended in failure.
    pub fn failed(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|j| j.status == JobStatus::Failed)
    }
}
