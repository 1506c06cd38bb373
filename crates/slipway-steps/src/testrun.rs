//! Test scenario executor.
//!
//! One instance per matrix cell. Each instance fetches its subject from the
//! store, which blocks until the corresponding build job has published it:
//! the executable for its architecture, or the exported image for cells
//! with a `container` target.

use crate::shell::{ShellCommand, resolve_script};
use async_trait::async_trait;
use slipway_core::artifact::{Arch, executable_name, image_export_name};
use slipway_core::job::JobInstance;
use slipway_core::{Error, Result};
use slipway_scheduler::{JobExecutor, RunContext};
use std::time::Duration;
use tracing::info;

/// Default per-scenario wall clock limit.
const DEFAULT_TIMEOUT_SECS: u64 = 1800;

pub struct TestRun;

#[async_trait]
impl JobExecutor for TestRun {
    async fn execute(&self, instance: &JobInstance, ctx: &RunContext) -> Result<()> {
        let arch: Arch = instance
            .cell_str("arch")
            .ok_or_else(|| Error::Internal("test cell declares no arch".to_string()))?
            .parse()?;
        let scenario = instance
            .cell_str("scenario")
            .ok_or_else(|| Error::Internal("test cell declares no scenario".to_string()))?;
        let container = instance.cell_str("target") == Some("container");

        let (artifact_name, script_param, default_script) = if container {
            (
                image_export_name(&ctx.tool, arch),
                "container_test_script",
                "scripts/test_container.sh",
            )
        } else {
            (
                executable_name(&ctx.tool, arch),
                "test_script",
                "scripts/test.sh",
            )
        };
        let artifact = ctx.store.fetch(&artifact_name).await?;
        let subject = artifact
            .payload
            .file()
            .ok_or_else(|| Error::Internal("test subject is not a single file".to_string()))?;

        let script = resolve_script(
            &ctx.workspace,
            ctx.param(script_param).unwrap_or(default_script),
        )?;
        let timeout = ctx
            .param("timeout_seconds")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        info!(%arch, scenario, container, subject = %subject.display(), "running test scenario");
        ShellCommand::new(script.to_string_lossy())
            .arg(scenario)
            .arg(subject.to_string_lossy())
            .current_dir(&ctx.workspace)
            .timeout(Duration::from_secs(timeout))
            .run()
            .await
    }
}
