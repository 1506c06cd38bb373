//! Join synchronization between dependent jobs.
//!
//! Every job's status lives on a shared [`StatusBoard`]. A job with `needs`
//! edges takes a [`JoinBarrier`] and waits until every predecessor is
//! terminal, learning at the same time whether any of them poisons its
//! dependents.

use slipway_core::JobId;
use slipway_core::job::JobStatus;
use std::collections::HashMap;
use tokio::sync::watch;

/// Status of one job as seen by its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatusEntry {
    pub status: JobStatus,
    /// Whether dependents must be skipped because of this job. Set for
    /// failures and for skips that propagate; never for condition skips.
    pub poisons: bool,
}

impl JobStatusEntry {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            poisons: false,
        }
    }

    pub fn running() -> Self {
        Self {
            status: JobStatus::Running,
            poisons: false,
        }
    }

    pub fn terminal(status: JobStatus, poisons: bool) -> Self {
        Self { status, poisons }
    }
}

pub type StatusMap = HashMap<JobId, JobStatusEntry>;

/// Shared, watchable map of every job's status for one run.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<StatusMap>,
}

impl StatusBoard {
    pub fn new(jobs: impl IntoIterator<Item = JobId>) -> Self {
        let map: StatusMap = jobs
            .into_iter()
            .map(|id| (id, JobStatusEntry::pending()))
            .collect();
        let (tx, _) = watch::channel(map);
        Self { tx }
    }

    pub fn subscribe(&self) -> JoinBarrier {
        JoinBarrier {
            rx: self.tx.subscribe(),
        }
    }

    pub fn set(&self, job: &JobId, entry: JobStatusEntry) {
        self.tx.send_modify(|map| {
            map.insert(job.clone(), entry);
        });
    }

    pub fn snapshot(&self) -> StatusMap {
        self.tx.borrow().clone()
    }
}

/// Outcome of waiting on a set of `needs` edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Every predecessor reached a satisfying terminal state.
    Satisfied,
    /// At least one predecessor failed or was itself poisoned.
    UpstreamFailed(Vec<JobId>),
    /// The run was torn down before the predecessors finished.
    Cancelled,
}

/// One dependent's view onto the status board.
#[derive(Debug)]
pub struct JoinBarrier {
    rx: watch::Receiver<StatusMap>,
}

impl JoinBarrier {
    /// Wait until every job in `needs` is terminal. Resolves early with
    /// `UpstreamFailed` as soon as any predecessor poisons its dependents;
    /// the remaining predecessors are not waited for.
    pub async fn wait_for(&mut self, needs: &[JobId]) -> JoinOutcome {
        if needs.is_empty() {
            return JoinOutcome::Satisfied;
        }
        loop {
            {
                let map = self.rx.borrow_and_update();
                let poisoned: Vec<JobId> = needs
                    .iter()
                    .filter(|id| {
                        map.get(id)
                            .is_some_and(|e| e.status.is_terminal() && e.poisons)
                    })
                    .cloned()
                    .collect();
                if !poisoned.is_empty() {
                    return JoinOutcome::UpstreamFailed(poisoned);
                }
                let all_terminal = needs.iter().all(|id| {
                    map.get(id).is_some_and(|e| e.status.is_terminal())
                });
                if all_terminal {
                    return JoinOutcome::Satisfied;
                }
            }
            if self.rx.changed().await.is_err() {
                return JoinOutcome::Cancelled;
            }
        }
    }
}
