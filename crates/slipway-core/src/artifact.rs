//! Artifacts and the naming conventions for dual-architecture outputs.

use crate::ids::JobId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Target architectures the pipeline builds for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::X86_64, Arch::Aarch64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" | "amd64" => Ok(Arch::X86_64),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            other => Err(crate::Error::UnsupportedArch(other.to_string())),
        }
    }
}

/// Architecture-qualified executable artifact name, e.g. `gprofiler_x86_64`.
pub fn executable_name(tool: &str, arch: Arch) -> String {
    format!("{tool}_{arch}")
}

/// Name of a container image exported as a tar stream, e.g.
/// `gprofiler_x86_64.img`.
pub fn image_export_name(tool: &str, arch: Arch) -> String {
    format!("{tool}_{arch}.img")
}

/// Artifacts are run-scoped: short retention is the norm.
pub const DEFAULT_RETENTION_DAYS: u32 = 3;

/// The payload of a published artifact. Delivered whole or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactPayload {
    pub files: Vec<PathBuf>,
}

impl ArtifactPayload {
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            files: vec![path.into()],
        }
    }

    /// The payload's one file, for single-file artifacts.
    pub fn file(&self) -> Option<&PathBuf> {
        match self.files.as_slice() {
            [one] => Some(one),
            _ => None,
        }
    }
}

/// A named output published by a job, keyed by name within the run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Artifact {
    pub name: String,
    pub producer: JobId,
    pub payload: ArtifactPayload,
    pub retention_days: u32,
    pub published_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, producer: JobId, payload: ArtifactPayload) -> Self {
        Self {
            name: name.into(),
            producer,
            payload,
            retention_days: DEFAULT_RETENTION_DAYS,
            published_at: Utc::now(),
        }
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.published_at + chrono::Duration::days(i64::from(self.retention_days))
    }
}
