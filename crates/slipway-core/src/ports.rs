//! Port traits (hexagonal architecture).
//!
//! These traits define the seams between the publishing logic and the
//! outside world: the release host and the container registry. Credentials
//! and endpoints are injected at adapter construction, never read from the
//! ambient environment inside steps.

use crate::Result;
use async_trait::async_trait;
use std::path::Path;

/// A created release record that assets can be attached to.
#[derive(Debug, Clone)]
pub struct ReleaseHandle {
    pub id: String,
    pub tag: String,
}

/// Release host (e.g. GitHub releases).
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    /// Create the release record for a tag.
    async fn create_release(&self, tag: &str) -> Result<ReleaseHandle>;

    /// Attach one file to the release under the given asset name.
    async fn upload_asset(&self, release: &ReleaseHandle, name: &str, path: &Path) -> Result<()>;
}

/// Container registry plus the local image daemon it is reached through.
#[async_trait]
pub trait ContainerRegistry: Send + Sync {
    /// Export a local image to a tar stream on disk.
    async fn save(&self, image: &str, dest: &Path) -> Result<()>;

    /// Load an image from a tar stream, returning the loaded image ref.
    async fn load(&self, tar: &Path) -> Result<String>;

    /// Apply an additional tag to a local image.
    async fn tag(&self, source: &str, target: &str) -> Result<()>;

    /// Push a tag to the remote registry.
    async fn push(&self, tag: &str) -> Result<()>;

    /// Whether a tag exists in the remote registry.
    async fn image_exists(&self, tag: &str) -> Result<bool>;

    /// Create a manifest list referencing the given per-architecture tags.
    ///
    /// Must fail outright (`Error::ManifestIncomplete`) when any referenced
    /// tag is absent from the registry; a partial manifest is never created.
    async fn create_manifest(&self, target: &str, refs: &[String]) -> Result<()>;

    /// Push a previously created manifest list.
    async fn push_manifest(&self, target: &str) -> Result<()>;
}
