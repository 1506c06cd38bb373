//! Container registry adapter backed by the docker CLI.

use crate::shell::ShellCommand;
use async_trait::async_trait;
use slipway_core::ports::ContainerRegistry;
use slipway_core::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Drives a local docker daemon (and through it, the remote registry).
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> ShellCommand {
        ShellCommand::new(&self.binary)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRegistry for DockerCli {
    async fn save(&self, image: &str, dest: &Path) -> Result<()> {
        self.command()
            .args(["save", "-o"])
            .arg(dest.to_string_lossy())
            .arg(image)
            .run()
            .await
    }

    async fn load(&self, tar: &Path) -> Result<String> {
        let out = self
            .command()
            .args(["load", "-i"])
            .arg(tar.to_string_lossy())
            .output()
            .await?;
        // `docker load` reports "Loaded image: <ref>" on its last line.
        out.lines()
            .rev()
            .find_map(|line| line.strip_prefix("Loaded image: "))
            .map(|r| r.trim().to_string())
            .ok_or_else(|| Error::Registry(format!("unparseable docker load output: {out}")))
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.command().args(["tag", source, target]).run().await
    }

    async fn push(&self, tag: &str) -> Result<()> {
        self.command().args(["push", tag]).run().await
    }

    async fn image_exists(&self, tag: &str) -> Result<bool> {
        match self
            .command()
            .args(["manifest", "inspect", tag])
            .run()
            .await
        {
            Ok(()) => Ok(true),
            Err(Error::StepFailed { exit_code, message }) => {
                debug!(tag, exit_code, "manifest inspect failed: {message}");
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    async fn create_manifest(&self, target: &str, refs: &[String]) -> Result<()> {
        let mut missing = Vec::new();
        for image in refs {
            if !self.image_exists(image).await? {
                missing.push(image.clone());
            }
        }
        if !missing.is_empty() {
            return Err(Error::ManifestIncomplete {
                target: target.to_string(),
                missing,
            });
        }
        self.command()
            .args(["manifest", "create", target])
            .args(refs.iter().cloned())
            .run()
            .await
    }

    async fn push_manifest(&self, target: &str) -> Result<()> {
        self.command()
            .args(["manifest", "push", target])
            .run()
            .await
    }
}
