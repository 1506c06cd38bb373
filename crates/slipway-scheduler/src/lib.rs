//! Job graph scheduling and orchestration for Slipway.

pub mod barrier;
pub mod dag;
pub mod matrix;
pub mod report;
pub mod scheduler;
pub mod triggers;

pub use barrier::{JoinBarrier, JoinOutcome, StatusBoard};
pub use report::{InstanceReport, JobReport, RunReport};
pub use scheduler::{JobExecutor, RunContext, Scheduler};
pub use triggers::TriggerClassifier;
