//! Release host adapter for the GitHub releases API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use slipway_core::ports::{ReleaseClient, ReleaseHandle};
use slipway_core::{Error, Result};
use std::path::Path;
use tracing::info;

const DEFAULT_API: &str = "https://api.github.com";
const DEFAULT_UPLOADS: &str = "https://uploads.github.com";

#[derive(Debug, Serialize)]
struct CreateReleaseRequest<'a> {
    tag_name: &'a str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    id: u64,
}

/// Talks to the GitHub releases API. The token is injected at construction;
/// nothing here reads the ambient environment.
pub struct GitHubReleases {
    http: reqwest::Client,
    api_base: String,
    uploads_base: String,
    repo: String,
    token: String,
}

impl GitHubReleases {
    pub fn new(repo: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API.to_string(),
            uploads_base: DEFAULT_UPLOADS.to_string(),
            repo: repo.into(),
            token: token.into(),
        }
    }

    /// Point both endpoints at a single alternate host (e.g. a test server
    /// or GitHub Enterprise).
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api_base = base.clone();
        self.uploads_base = base;
        self
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.token)
            .header("User-Agent", "slipway")
            .header("Accept", "application/vnd.github+json")
    }
}

#[async_trait]
impl ReleaseClient for GitHubReleases {
    async fn create_release(&self, tag: &str) -> Result<ReleaseHandle> {
        let url = format!("{}/repos/{}/releases", self.api_base, self.repo);
        let body = CreateReleaseRequest {
            tag_name: tag,
            name: tag,
        };
        let response = self
            .authorized(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ReleaseApi(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::ReleaseApi(format!(
                "create release for {tag}: HTTP {}",
                response.status()
            )));
        }
        let created: ReleaseResponse = response
            .json()
            .await
            .map_err(|e| Error::ReleaseApi(e.to_string()))?;
        info!(tag, id = created.id, "release created");
        Ok(ReleaseHandle {
            id: created.id.to_string(),
            tag: tag.to_string(),
        })
    }

    async fn upload_asset(&self, release: &ReleaseHandle, name: &str, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let url = format!(
            "{}/repos/{}/releases/{}/assets?name={}",
            self.uploads_base, self.repo, release.id, name
        );
        let response = self
            .authorized(self.http.post(&url))
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::ReleaseApi(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::ReleaseApi(format!(
                "upload {name} to release {}: HTTP {}",
                release.id,
                response.status()
            )));
        }
        info!(name, release = %release.tag, "asset uploaded");
        Ok(())
    }
}
