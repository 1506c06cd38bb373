//! Tracked-version lookup and release tag verification.

use slipway_core::release::Version;
use slipway_core::trigger::Trigger;
use slipway_core::{Error, Result};
use std::path::Path;

/// File in the workspace holding the tracked version.
pub const VERSION_FILE: &str = "version.txt";

/// Read the version tracked in the source tree.
pub async fn tracked_version(workspace: &Path) -> Result<Version> {
    let raw = tokio::fs::read_to_string(workspace.join(VERSION_FILE)).await?;
    Version::parse(&raw)
}

/// Check that the release tag names exactly the tracked version. A tag that
/// got ahead of (or behind) the source tree must never produce a release.
pub async fn verify_release_tag(
    trigger: &Trigger,
    tag_prefix: &str,
    workspace: &Path,
) -> Result<Version> {
    let tag = trigger
        .tag_name()
        .ok_or_else(|| Error::InvalidVersion("run was not started by a tag".to_string()))?;
    let tagged = trigger
        .version(tag_prefix)
        .ok_or_else(|| Error::InvalidVersion(tag.to_string()))?;
    let tracked = tracked_version(workspace).await?;
    if tagged == tracked {
        Ok(tracked)
    } else {
        Err(Error::VersionMismatch {
            tag: tag.to_string(),
            tracked: tracked.to_string(),
        })
    }
}
