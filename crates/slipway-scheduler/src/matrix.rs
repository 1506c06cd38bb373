//! Matrix expansion: one declared job into many concrete instances.

use slipway_core::InstanceId;
use slipway_core::job::{JobDefinition, JobInstance, MatrixConfig};
use std::collections::HashMap;
use tracing::debug;

/// A concrete matrix cell, plus whether the run filter excluded it.
#[derive(Debug, Clone)]
pub struct ExpandedInstance {
    pub instance: JobInstance,
    /// Expanded but not executed; reported as skipped.
    pub pre_skipped: bool,
}

/// Result of expanding a matrixed job.
#[derive(Debug)]
pub struct MatrixExpansion {
    pub instances: Vec<ExpandedInstance>,
    pub fail_fast: bool,
    pub max_parallel: Option<u32>,
}

pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand a job's matrix into instances, or `None` for non-matrixed
    /// jobs. Cells are ordered by sorted dimension keys so expansion is
    /// deterministic across runs.
    pub fn expand(job: &JobDefinition) -> Option<MatrixExpansion> {
        let matrix = job.matrix.as_ref()?;
        let mut cells = cartesian(matrix);

        // Excludes apply to the product only; an explicit include always
        // survives.
        cells.retain(|cell| !matrix.exclude.iter().any(|ex| subset_of(ex, cell)));
        for extra in &matrix.include {
            if !cells.contains(extra) {
                cells.push(extra.clone());
            }
        }

        let instances = cells
            .into_iter()
            .enumerate()
            .map(|(index, cell)| {
                let pre_skipped = matrix
                    .run_only
                    .as_ref()
                    .is_some_and(|filter| !filter.allows(&cell));
                ExpandedInstance {
                    instance: JobInstance {
                        id: InstanceId::new(),
                        job: job.id.clone(),
                        index,
                        display_name: display_name(&job.id.to_string(), &cell),
                        cell,
                    },
                    pre_skipped,
                }
            })
            .collect::<Vec<_>>();

        debug!(job = %job.id, instances = instances.len(), "matrix expanded");
        Some(MatrixExpansion {
            instances,
            fail_fast: matrix.fail_fast,
            max_parallel: matrix.max_parallel,
        })
    }
}

fn cartesian(matrix: &MatrixConfig) -> Vec<HashMap<String, serde_json::Value>> {
    let mut keys: Vec<&String> = matrix.dimensions.keys().collect();
    keys.sort();

    let mut cells: Vec<HashMap<String, serde_json::Value>> = vec![HashMap::new()];
    for key in keys {
        let values = &matrix.dimensions[key];
        let mut next = Vec::with_capacity(cells.len() * values.len());
        for cell in &cells {
            for value in values {
                let mut cell = cell.clone();
                cell.insert(key.clone(), value.clone());
                next.push(cell);
            }
        }
        cells = next;
    }
    cells
}

/// Whether every key/value pair of `pattern` appears in `cell`.
fn subset_of(
    pattern: &HashMap<String, serde_json::Value>,
    cell: &HashMap<String, serde_json::Value>,
) -> bool {
    pattern.iter().all(|(k, v)| cell.get(k) == Some(v))
}

fn display_name(job: &str, cell: &HashMap<String, serde_json::Value>) -> String {
    if cell.is_empty() {
        return job.to_string();
    }
    let mut pairs: Vec<String> = cell
        .iter()
        .map(|(k, v)| match v.as_str() {
            Some(s) => format!("{k}={s}"),
            None => format!("{k}={v}"),
        })
        .collect();
    pairs.sort();
    format!("{} ({})", job, pairs.join(", "))
}
