//! Pipeline and job definition types.
//!
//! These types represent the declared job graph: jobs with dependency
//! edges (`needs`), run conditions, and optional matrix expansions.

use crate::ids::{InstanceId, JobId};
use crate::trigger::RunCondition;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The declared pipeline: a static set of jobs with dependency edges.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineDefinition {
    pub name: String,
    /// Name of the tool the pipeline ships; artifact names derive from it.
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Prefix that distinguishes release tags from other tags.
    #[serde(default = "default_tag_prefix")]
    pub release_tag_prefix: String,
    /// When true, release publishing also `needs` the verification jobs.
    ///
    /// The historical wiring gates the release on the build jobs only, so a
    /// release can publish even when the test matrix has failures. That is
    /// preserved as the default; set this to make tests a hard release gate.
    #[serde(default)]
    pub require_tests_for_release: bool,
    pub jobs: Vec<JobDefinition>,
}

fn default_tool() -> String {
    "gprofiler".to_string()
}

fn default_tag_prefix() -> String {
    "v".to_string()
}

impl PipelineDefinition {
    pub fn job(&self, id: &JobId) -> Option<&JobDefinition> {
        self.jobs.iter().find(|j| &j.id == id)
    }
}

/// A declared unit of work with dependency edges and a run condition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobDefinition {
    pub id: JobId,
    /// Jobs that must reach a satisfying terminal state before this one runs.
    #[serde(default)]
    pub needs: Vec<JobId>,
    #[serde(default)]
    pub condition: RunCondition,
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,
    /// Executor key this job dispatches to (e.g. `build-executable`).
    pub uses: String,
    /// Free-form parameters handed to the executor.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Artifact names this job publishes. Exactly one producer per name is
    /// allowed in a pipeline; the scheduler marks these unavailable when the
    /// job terminates without publishing.
    #[serde(default)]
    pub produces: Vec<String>,
}

/// Matrix expansion: a set of parameter tuples that multiplies one job into
/// many independent instances.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatrixConfig {
    pub dimensions: HashMap<String, Vec<serde_json::Value>>,
    #[serde(default)]
    pub include: Vec<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub exclude: Vec<HashMap<String, serde_json::Value>>,
    /// Disabled by default: one cell's failure never cancels its siblings.
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub max_parallel: Option<u32>,
    /// Cells whose value for the filter key is not listed are expanded but
    /// marked skipped instead of run (e.g. scenarios that only apply to one
    /// architecture).
    #[serde(default)]
    pub run_only: Option<InstanceFilter>,
}

/// Filter deciding which expanded cells actually execute.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstanceFilter {
    pub key: String,
    pub values: Vec<serde_json::Value>,
}

impl InstanceFilter {
    /// A cell without the filter key runs; a cell with it runs only when the
    /// value is listed.
    pub fn allows(&self, cell: &HashMap<String, serde_json::Value>) -> bool {
        match cell.get(&self.key) {
            Some(value) => self.values.contains(value),
            None => true,
        }
    }
}

/// One concrete execution of a job for one matrix tuple.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobInstance {
    pub id: InstanceId,
    pub job: JobId,
    pub index: usize,
    pub cell: HashMap<String, serde_json::Value>,
    pub display_name: String,
}

impl JobInstance {
    /// Construct the single implicit instance of a non-matrixed job.
    pub fn singleton(job: JobId) -> Self {
        let display_name = job.to_string();
        Self {
            id: InstanceId::new(),
            job,
            index: 0,
            cell: HashMap::new(),
            display_name,
        }
    }

    /// String value of a matrix cell key, if present.
    pub fn cell_str(&self, key: &str) -> Option<&str> {
        self.cell.get(key).and_then(|v| v.as_str())
    }
}

/// Lifecycle status shared by jobs and job instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Skipped
        )
    }

    /// Whether this terminal state completes a `needs` edge. A skipped
    /// predecessor counts as satisfied; whether the skip also poisons
    /// dependents is tracked separately via [`SkipReason`].
    pub fn satisfies_needs(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Skipped)
    }
}

/// Why a job was skipped. Operators must be able to tell "did not run due to
/// trigger" apart from "did not run because an upstream failed"; only the
/// latter propagates to dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ConditionUnmet,
    UpstreamFailed,
}

/// Terminal status of the run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}
