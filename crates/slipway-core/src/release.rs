//! Release and container tag vocabulary.

use crate::artifact::Arch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A release version as tracked in the source tree, e.g. `1.2.3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Accepts dotted numeric versions only; anything else is rejected so a
    /// malformed tag can never masquerade as a release.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let trimmed = s.trim();
        let valid = !trimmed.is_empty()
            && trimmed.split('.').all(|part| {
                !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())
            });
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(crate::Error::InvalidVersion(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The terminal release record: created once, at the fan-in stage, only when
/// every required per-architecture build has succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Release {
    pub version: Version,
    pub assets: Vec<String>,
    pub container_tags: Vec<String>,
}

/// Registry tag for a single logical image, e.g. `granulate/gprofiler:v1.2.3`.
pub fn image_tag(repository: &str, label: &str) -> String {
    format!("{repository}:{label}")
}

/// Architecture-qualified registry tag, e.g.
/// `granulate/gprofiler:v1.2.3-aarch64`.
pub fn arch_image_tag(repository: &str, label: &str, arch: Arch) -> String {
    format!("{repository}:{label}-{arch}")
}

/// Env var telling the shipped artifact how it is being executed. The
/// pipeline never branches on it; the container build step must carry it into
/// the image so the artifact sees it at first run.
pub const RUN_MODE_ENV: &str = "GPROFILER_RUN_MODE";

/// How the shipped artifact is executed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Inside a container started directly by the user.
    Container,
    /// The standalone executable on bare metal or a VM.
    Standalone,
    /// Under an orchestrator's per-node agent (e.g. a DaemonSet pod).
    ClusterAgent,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Container => "container",
            RunMode::Standalone => "standalone",
            RunMode::ClusterAgent => "cluster-agent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_version_parse() {
        assert_eq!(Version::parse("1.2.3").unwrap().as_str(), "1.2.3");
        assert_eq!(Version::parse(" 1.2.3\n").unwrap().as_str(), "1.2.3");
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1..2").is_err());
        assert!(Version::parse("v1.2.3").is_err());
    }

    #[test]
    fn test_tags() {
        assert_eq!(
            image_tag("granulate/gprofiler", "latest"),
            "granulate/gprofiler:latest"
        );
        assert_eq!(
            arch_image_tag("granulate/gprofiler", "v1.2.3", Arch::X86_64),
            "granulate/gprofiler:v1.2.3-x86_64"
        );
    }
}
