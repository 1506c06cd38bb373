//! Job dependency graph construction and validation.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use slipway_core::JobId;
use slipway_core::job::{JobDefinition, PipelineDefinition};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("pipeline has no jobs")]
    EmptyPipeline,
    #[error("duplicate job id: {0}")]
    DuplicateJob(JobId),
    #[error("job {job} needs unknown job {missing}")]
    UnknownDependency { job: JobId, missing: JobId },
    #[error("artifact {name} is produced by both {first} and {second}")]
    DuplicateArtifact {
        name: String,
        first: JobId,
        second: JobId,
    },
    #[error("dependency cycle involving job {0}")]
    CycleDetected(JobId),
}

#[derive(Debug, Clone)]
pub struct JobNode {
    pub id: JobId,
    pub definition: JobDefinition,
}

/// Validated DAG of a pipeline's jobs. Edges point from a job to the jobs
/// that need it.
#[derive(Debug)]
pub struct JobGraph {
    graph: DiGraph<JobNode, ()>,
    index: HashMap<JobId, NodeIndex>,
}

impl JobGraph {
    pub fn build(pipeline: &PipelineDefinition) -> Result<Self, GraphError> {
        if pipeline.jobs.is_empty() {
            return Err(GraphError::EmptyPipeline);
        }

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for job in &pipeline.jobs {
            if index.contains_key(&job.id) {
                return Err(GraphError::DuplicateJob(job.id.clone()));
            }
            let node = graph.add_node(JobNode {
                id: job.id.clone(),
                definition: job.clone(),
            });
            index.insert(job.id.clone(), node);
        }

        for job in &pipeline.jobs {
            let to = index[&job.id];
            for need in &job.needs {
                let from = index.get(need).ok_or_else(|| {
                    GraphError::UnknownDependency {
                        job: job.id.clone(),
                        missing: need.clone(),
                    }
                })?;
                graph.add_edge(*from, to, ());
            }
        }

        let mut producers: HashMap<&str, &JobId> = HashMap::new();
        for job in &pipeline.jobs {
            for name in &job.produces {
                if let Some(first) = producers.insert(name.as_str(), &job.id) {
                    return Err(GraphError::DuplicateArtifact {
                        name: name.clone(),
                        first: first.clone(),
                        second: job.id.clone(),
                    });
                }
            }
        }

        let built = Self { graph, index };
        // toposort doubles as cycle detection
        built.topological_order()?;
        Ok(built)
    }

    /// Jobs with no dependencies.
    pub fn roots(&self) -> Vec<&JobNode> {
        self.graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, petgraph::Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| &self.graph[n])
            .collect()
    }

    /// Every job in an order where predecessors come before dependents.
    pub fn topological_order(&self) -> Result<Vec<&JobNode>, GraphError> {
        let order = toposort(&self.graph, None)
            .map_err(|cycle| GraphError::CycleDetected(self.graph[cycle.node_id()].id.clone()))?;
        Ok(order.into_iter().map(|n| &self.graph[n]).collect())
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobNode> {
        self.graph.node_indices().map(|n| &self.graph[n])
    }

    pub fn node(&self, id: &JobId) -> Option<&JobNode> {
        self.index.get(id).map(|&n| &self.graph[n])
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}
