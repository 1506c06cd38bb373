//! Build executors: per-architecture executables and container images.

use crate::shell::{ShellCommand, resolve_script};
use async_trait::async_trait;
use slipway_core::artifact::{Arch, Artifact, ArtifactPayload, executable_name, image_export_name};
use slipway_core::job::JobInstance;
use slipway_core::ports::ContainerRegistry;
use slipway_core::release::{RUN_MODE_ENV, RunMode, arch_image_tag};
use slipway_core::{Error, Result};
use slipway_scheduler::{JobExecutor, RunContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Subdirectory of the workspace build outputs land in.
pub const OUTPUT_DIR: &str = "output";

/// Tag label used for images built outside a release-tag run.
const CI_LABEL: &str = "ci";

fn target_arch(instance: &JobInstance, ctx: &RunContext) -> Result<Arch> {
    instance
        .cell_str("arch")
        .or_else(|| ctx.param("arch"))
        .ok_or_else(|| Error::Internal("build job declares no arch".to_string()))?
        .parse()
}

fn image_label(ctx: &RunContext) -> String {
    ctx.trigger
        .tag_name()
        .unwrap_or(CI_LABEL)
        .to_string()
}

/// Builds the standalone executable for one architecture and publishes it
/// under its architecture-qualified name.
pub struct ExecutableBuild;

#[async_trait]
impl JobExecutor for ExecutableBuild {
    async fn execute(&self, instance: &JobInstance, ctx: &RunContext) -> Result<()> {
        let arch = target_arch(instance, ctx)?;
        let script = resolve_script(
            &ctx.workspace,
            ctx.param("build_script").unwrap_or("scripts/build.sh"),
        )?;

        let name = executable_name(&ctx.tool, arch);
        let out_dir = ctx.workspace.join(OUTPUT_DIR);
        tokio::fs::create_dir_all(&out_dir).await?;
        let exe: PathBuf = out_dir.join(&name);

        info!(%arch, out = %exe.display(), "building executable");
        ShellCommand::new(script.to_string_lossy())
            .arg(arch.as_str())
            .arg(exe.to_string_lossy())
            .current_dir(&ctx.workspace)
            .run()
            .await?;

        ctx.store.publish(Artifact::new(
            name,
            instance.job.clone(),
            ArtifactPayload::single(exe),
        ))
    }
}

/// Builds the container image for one architecture.
///
/// The executable for the architecture was already built by its own job;
/// the image build injects it instead of recompiling inside the container
/// (`--skip-exe-build` plus an `EXE_PATH` build arg).
///
/// The two architectures hand their image to the release stage differently:
/// x86_64 exports the image as a tar artifact, while aarch64 pushes its
/// architecture-qualified tag straight to the registry during the build and
/// is verified there afterwards.
pub struct ContainerBuild {
    registry: Arc<dyn ContainerRegistry>,
    repository: String,
}

impl ContainerBuild {
    pub fn new(registry: Arc<dyn ContainerRegistry>, repository: impl Into<String>) -> Self {
        Self {
            registry,
            repository: repository.into(),
        }
    }
}

#[async_trait]
impl JobExecutor for ContainerBuild {
    async fn execute(&self, instance: &JobInstance, ctx: &RunContext) -> Result<()> {
        let arch = target_arch(instance, ctx)?;
        let default_script = format!("scripts/build_{arch}_container.sh");
        let script = resolve_script(
            &ctx.workspace,
            ctx.param("image_script").unwrap_or(&default_script),
        )?;
        let tag = arch_image_tag(&self.repository, &image_label(ctx), arch);

        let exe = ctx.store.fetch(&executable_name(&ctx.tool, arch)).await?;
        let exe_path = exe.payload.file().ok_or_else(|| {
            Error::Internal("executable artifact is not a single file".to_string())
        })?;

        // --skip-exe-build must come first; the scripts dispatch on it.
        let mut command = ShellCommand::new(script.to_string_lossy())
            .arg("--skip-exe-build")
            .arg("--provenance=false")
            .arg("--build-arg")
            .arg(format!("EXE_PATH={}", exe_path.display()))
            .arg("-t")
            .arg(&tag)
            .env(RUN_MODE_ENV, RunMode::Container.as_str())
            .current_dir(&ctx.workspace);
        if arch == Arch::Aarch64 {
            command = command.arg("--push");
        }
        info!(%arch, %tag, exe = %exe_path.display(), "building image");
        command.run().await?;

        match arch {
            Arch::X86_64 => {
                let out_dir = ctx.workspace.join(OUTPUT_DIR);
                tokio::fs::create_dir_all(&out_dir).await?;
                let name = image_export_name(&ctx.tool, arch);
                let tar = out_dir.join(&name);
                self.registry.save(&tag, &tar).await?;
                ctx.store.publish(Artifact::new(
                    name,
                    instance.job.clone(),
                    ArtifactPayload::single(tar),
                ))
            }
            Arch::Aarch64 => {
                // Pushed during the build; nothing lands in the store, so a
                // lost push must fail here rather than at release time.
                if self.registry.image_exists(&tag).await? {
                    Ok(())
                } else {
                    Err(Error::MissingImage(tag))
                }
            }
        }
    }
}
