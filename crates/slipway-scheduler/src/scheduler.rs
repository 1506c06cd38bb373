//! The run orchestrator.
//!
//! Builds the job graph, evaluates run conditions once against the trigger,
//! then executes every eligible job as its own task. Dependencies are
//! honored through [`crate::barrier::JoinBarrier`]s over a shared status board; artifacts
//! flow through the [`ArtifactStore`], whose blocking fetch lets a dependent
//! start before its producer has published.

use crate::barrier::{JobStatusEntry, JoinOutcome, StatusBoard};
use crate::dag::JobGraph;
use crate::matrix::{ExpandedInstance, MatrixExpander};
use crate::report::{InstanceReport, JobReport, RunReport};
use async_trait::async_trait;
use slipway_core::job::{
    JobDefinition, JobInstance, JobStatus, PipelineDefinition, RunStatus, SkipReason,
};
use slipway_core::trigger::Trigger;
use slipway_core::{Error, JobId, Result, RunId};
use slipway_store::ArtifactStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Everything an executor needs to do its work for one job.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub trigger: Trigger,
    pub store: ArtifactStore,
    pub workspace: PathBuf,
    /// Tool name artifact names derive from.
    pub tool: String,
    pub release_tag_prefix: String,
    /// The job's declared parameters.
    pub params: HashMap<String, String>,
}

impl RunContext {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// A registered step implementation. One executor serves every instance of
/// every job that `uses` its key.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, instance: &JobInstance, ctx: &RunContext) -> Result<()>;
}

/// Runs pipelines to completion.
pub struct Scheduler {
    executors: HashMap<String, Arc<dyn JobExecutor>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    pub fn register(mut self, key: impl Into<String>, executor: Arc<dyn JobExecutor>) -> Self {
        self.executors.insert(key.into(), executor);
        self
    }

    /// Run a pipeline to completion. Always returns a full report; job
    /// failures surface in the report, not as an `Err`. `Err` is reserved
    /// for pipelines that cannot start at all.
    #[instrument(skip_all, fields(pipeline = %pipeline.name))]
    pub async fn run(
        &self,
        pipeline: &PipelineDefinition,
        trigger: Trigger,
        store: ArtifactStore,
        workspace: PathBuf,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let graph =
            JobGraph::build(pipeline).map_err(|e| Error::InvalidPipeline(e.to_string()))?;

        let run_id = RunId::new();
        info!(%run_id, jobs = graph.len(), ?trigger, "run starting");

        let board = Arc::new(StatusBoard::new(
            graph.jobs().map(|n| n.id.clone()),
        ));
        let base = RunContext {
            run_id,
            trigger: trigger.clone(),
            store: store.clone(),
            workspace,
            tool: pipeline.tool.clone(),
            release_tag_prefix: pipeline.release_tag_prefix.clone(),
            params: HashMap::new(),
        };

        let mut reports: HashMap<JobId, JobReport> = HashMap::new();
        let mut tasks: JoinSet<(JobId, JobReport)> = JoinSet::new();

        for node in graph.jobs() {
            let job = node.definition.clone();
            let eligible = job
                .condition
                .eligible(&trigger, &pipeline.release_tag_prefix);
            if !eligible {
                // Condition skips satisfy needs edges and never poison.
                board.set(&job.id, JobStatusEntry::terminal(JobStatus::Skipped, false));
                for name in &job.produces {
                    store.mark_unavailable(name, &job.id);
                }
                info!(job = %job.id, "skipped, condition unmet");
                reports.insert(
                    job.id.clone(),
                    JobReport::skipped(job.id.clone(), job.uses, SkipReason::ConditionUnmet, vec![]),
                );
                continue;
            }

            let board = Arc::clone(&board);
            let executor = self.executors.get(&job.uses).cloned();
            let mut ctx = base.clone();
            ctx.params = job.params.clone();
            tasks.spawn(async move {
                let report = run_job(job.clone(), executor, ctx, board).await;
                (job.id, report)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (id, report) = joined.map_err(|e| Error::Internal(e.to_string()))?;
            reports.insert(id, report);
        }

        let ordered: Vec<JobReport> = graph
            .topological_order()
            .map_err(|e| Error::InvalidPipeline(e.to_string()))?
            .into_iter()
            .filter_map(|n| reports.remove(&n.id))
            .collect();
        let status = if ordered.iter().any(|j| j.status == JobStatus::Failed) {
            RunStatus::Failure
        } else {
            RunStatus::Success
        };
        info!(%run_id, ?status, "run finished");

        Ok(RunReport {
            run_id,
            pipeline: pipeline.name.clone(),
            trigger,
            status,
            jobs: ordered,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive one job: wait on its needs, execute its instances, post the
/// terminal status to the board.
async fn run_job(
    job: JobDefinition,
    executor: Option<Arc<dyn JobExecutor>>,
    ctx: RunContext,
    board: Arc<StatusBoard>,
) -> JobReport {
    let started = Instant::now();
    let mut barrier = board.subscribe();

    match barrier.wait_for(&job.needs).await {
        JoinOutcome::Satisfied => {}
        JoinOutcome::UpstreamFailed(failed) => {
            warn!(job = %job.id, ?failed, "skipped, upstream failed");
            board.set(&job.id, JobStatusEntry::terminal(JobStatus::Skipped, true));
            for name in &job.produces {
                ctx.store.mark_unavailable(name, &job.id);
            }
            return JobReport::skipped(
                job.id.clone(),
                job.uses.clone(),
                SkipReason::UpstreamFailed,
                failed,
            );
        }
        JoinOutcome::Cancelled => {
            for name in &job.produces {
                ctx.store.mark_unavailable(name, &job.id);
            }
            return JobReport {
                job: job.id.clone(),
                uses: job.uses.clone(),
                status: JobStatus::Failed,
                skip_reason: None,
                failed_needs: vec![],
                instances: vec![],
                error: Some("run cancelled".to_string()),
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }
    }

    let Some(executor) = executor else {
        let err = Error::ExecutorNotFound(job.uses.clone());
        error!(job = %job.id, %err, "no executor registered");
        board.set(&job.id, JobStatusEntry::terminal(JobStatus::Failed, true));
        for name in &job.produces {
            ctx.store.mark_unavailable(name, &job.id);
        }
        return JobReport {
            job: job.id.clone(),
            uses: job.uses.clone(),
            status: JobStatus::Failed,
            skip_reason: None,
            failed_needs: vec![],
            instances: vec![],
            error: Some(err.to_string()),
            duration_ms: started.elapsed().as_millis() as u64,
        };
    };

    board.set(&job.id, JobStatusEntry::running());
    info!(job = %job.id, "job starting");

    let instances = run_instances(&job, executor, &ctx).await;
    let failed = instances.iter().any(|i| i.status == JobStatus::Failed);
    let status = if failed {
        JobStatus::Failed
    } else {
        JobStatus::Succeeded
    };
    board.set(&job.id, JobStatusEntry::terminal(status, failed));
    if failed {
        for name in &job.produces {
            ctx.store.mark_unavailable(name, &job.id);
        }
        error!(job = %job.id, "job failed");
    } else {
        info!(job = %job.id, "job succeeded");
    }

    JobReport {
        job: job.id.clone(),
        uses: job.uses.clone(),
        status,
        skip_reason: None,
        failed_needs: vec![],
        instances,
        error: None,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Execute every instance of a job: the singleton for plain jobs, the
/// expanded cells for matrixed ones.
async fn run_instances(
    job: &JobDefinition,
    executor: Arc<dyn JobExecutor>,
    ctx: &RunContext,
) -> Vec<InstanceReport> {
    let Some(expansion) = MatrixExpander::expand(job) else {
        let instance = JobInstance::singleton(job.id.clone());
        return vec![run_instance(&instance, executor.as_ref(), ctx).await];
    };

    if expansion.fail_fast {
        return run_sequential(expansion.instances, executor, ctx).await;
    }

    let semaphore = expansion
        .max_parallel
        .map(|n| Arc::new(Semaphore::new(n.max(1) as usize)));
    let mut tasks: JoinSet<(usize, InstanceReport)> = JoinSet::new();
    let mut reports: Vec<Option<InstanceReport>> = Vec::new();

    for expanded in expansion.instances {
        let index = expanded.instance.index;
        reports.push(None);
        if expanded.pre_skipped {
            reports[index] = Some(InstanceReport {
                display_name: expanded.instance.display_name,
                status: JobStatus::Skipped,
                error: None,
                duration_ms: 0,
            });
            continue;
        }
        let executor = Arc::clone(&executor);
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = match &semaphore {
                Some(s) => Some(s.acquire().await),
                None => None,
            };
            let report = run_instance(&expanded.instance, executor.as_ref(), &ctx).await;
            (index, report)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Ok((index, report)) = joined {
            reports[index] = Some(report);
        }
    }
    reports.into_iter().flatten().collect()
}

/// Fail-fast execution: run cells one at a time and skip the remainder
/// after the first failure.
async fn run_sequential(
    instances: Vec<ExpandedInstance>,
    executor: Arc<dyn JobExecutor>,
    ctx: &RunContext,
) -> Vec<InstanceReport> {
    let mut reports = Vec::with_capacity(instances.len());
    let mut failed = false;
    for expanded in instances {
        if expanded.pre_skipped || failed {
            reports.push(InstanceReport {
                display_name: expanded.instance.display_name,
                status: JobStatus::Skipped,
                error: None,
                duration_ms: 0,
            });
            continue;
        }
        let report = run_instance(&expanded.instance, executor.as_ref(), ctx).await;
        failed = report.status == JobStatus::Failed;
        reports.push(report);
    }
    reports
}

async fn run_instance(
    instance: &JobInstance,
    executor: &dyn JobExecutor,
    ctx: &RunContext,
) -> InstanceReport {
    let started = Instant::now();
    info!(instance = %instance.display_name, "instance starting");
    match executor.execute(instance, ctx).await {
        Ok(()) => InstanceReport {
            display_name: instance.display_name.clone(),
            status: JobStatus::Succeeded,
            error: None,
            duration_ms: started.elapsed().as_millis() as u64,
        },
        Err(err) => {
            error!(instance = %instance.display_name, %err, "instance failed");
            InstanceReport {
                display_name: instance.display_name.clone(),
                status: JobStatus::Failed,
                error: Some(err.to_string()),
                duration_ms: started.elapsed().as_millis() as u64,
            }
        }
    }
}
