//! Step executors and adapters for Slipway pipelines.
//!
//! Executors implement [`slipway_scheduler::JobExecutor`] and are registered
//! with the scheduler under the `uses` keys the pipeline definition names.
//! Adapters implement the [`slipway_core::ports`] traits against real
//! infrastructure (the docker CLI, the GitHub API).

pub mod build;
pub mod docker;
pub mod github;
pub mod pipeline;
pub mod release;
pub mod shell;
pub mod testrun;
pub mod version;

pub use build::{ContainerBuild, ExecutableBuild};
pub use docker::DockerCli;
pub use github::GitHubReleases;
pub use pipeline::canonical_pipeline;
pub use release::ReleasePublisher;
pub use shell::ShellCommand;
pub use testrun::TestRun;
