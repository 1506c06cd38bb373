//! The release fan-in: verify, assemble, publish.
//!
//! Runs once per release-tag run, after both architecture builds. Verifies
//! the tag against the tracked version, pulls every required artifact out of
//! the store, attaches the executables to a release record, and finally
//! publishes the multi-architecture manifests. The manifests come last so a
//! half-published release never has a resolvable version tag.

use crate::version::verify_release_tag;
use async_trait::async_trait;
use slipway_core::artifact::{Arch, executable_name, image_export_name};
use slipway_core::job::JobInstance;
use slipway_core::ports::{ContainerRegistry, ReleaseClient};
use slipway_core::release::{Release, arch_image_tag, image_tag};
use slipway_core::{Error, Result};
use slipway_scheduler::{JobExecutor, RunContext};
use std::sync::Arc;
use tracing::info;

/// Manifest label applied alongside the version tag.
const LATEST: &str = "latest";

pub struct ReleasePublisher {
    registry: Arc<dyn ContainerRegistry>,
    releases: Arc<dyn ReleaseClient>,
    repository: String,
}

impl ReleasePublisher {
    pub fn new(
        registry: Arc<dyn ContainerRegistry>,
        releases: Arc<dyn ReleaseClient>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            releases,
            repository: repository.into(),
        }
    }

    /// Publish a release for the given tag. Exposed separately from the
    /// executor wiring so it can be driven directly.
    pub async fn publish(&self, ctx: &RunContext) -> Result<Release> {
        let version = verify_release_tag(&ctx.trigger, &ctx.release_tag_prefix, &ctx.workspace)
            .await?;
        let tag = ctx
            .trigger
            .tag_name()
            .ok_or_else(|| Error::Internal("release without a tag".to_string()))?
            .to_string();
        info!(%tag, %version, "publishing release");

        // Both executables must exist before anything externally visible
        // happens. fetch blocks until the builds publish them.
        let exe_x86 = ctx
            .store
            .fetch(&executable_name(&ctx.tool, Arch::X86_64))
            .await?;
        let exe_arm = ctx
            .store
            .fetch(&executable_name(&ctx.tool, Arch::Aarch64))
            .await?;

        // The x86_64 image travels through the store as a tar; load and tag
        // it locally, but hold the push until the release record and its
        // assets exist. The aarch64 image was pushed during its build and
        // only needs to be verified.
        let x86_tag = arch_image_tag(&self.repository, &tag, Arch::X86_64);
        let arm_tag = arch_image_tag(&self.repository, &tag, Arch::Aarch64);

        let image_tar = ctx
            .store
            .fetch(&image_export_name(&ctx.tool, Arch::X86_64))
            .await?;
        let tar_path = image_tar
            .payload
            .file()
            .ok_or_else(|| Error::Internal("image artifact is not a single file".to_string()))?;
        let loaded = self.registry.load(tar_path).await?;
        self.registry.tag(&loaded, &x86_tag).await?;

        if !self.registry.image_exists(&arm_tag).await? {
            return Err(Error::MissingImage(arm_tag));
        }

        let release = self.releases.create_release(&tag).await?;
        let mut assets = Vec::new();
        for (name, artifact) in [
            (executable_name(&ctx.tool, Arch::X86_64), &exe_x86),
            (executable_name(&ctx.tool, Arch::Aarch64), &exe_arm),
            // The unsuffixed asset is the x86_64 build, kept for callers
            // that predate the dual-architecture names.
            (ctx.tool.clone(), &exe_x86),
        ] {
            let path = artifact.payload.file().ok_or_else(|| {
                Error::Internal("executable artifact is not a single file".to_string())
            })?;
            self.releases.upload_asset(&release, &name, path).await?;
            assets.push(name);
        }

        // Only now does anything reach the registry: the still-local x86_64
        // arch tag, then the manifests, version tag before latest, so the
        // moment `latest` moves the version it points at already resolves.
        self.registry.push(&x86_tag).await?;

        let arch_refs = vec![x86_tag, arm_tag];
        let mut container_tags = Vec::new();
        for label in [tag.as_str(), LATEST] {
            let target = image_tag(&self.repository, label);
            self.registry.create_manifest(&target, &arch_refs).await?;
            self.registry.push_manifest(&target).await?;
            container_tags.push(target);
        }

        info!(%tag, assets = assets.len(), "release published");
        Ok(Release {
            version,
            assets,
            container_tags,
        })
    }
}

#[async_trait]
impl JobExecutor for ReleasePublisher {
    async fn execute(&self, _instance: &JobInstance, ctx: &RunContext) -> Result<()> {
        self.publish(ctx).await.map(|_| ())
    }
}
