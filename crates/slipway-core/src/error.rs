//! Error types for Slipway.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Trigger classification
    #[error("Unknown trigger event kind: {0}")]
    UnknownTriggerEvent(String),

    // Pipeline / graph errors
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("No executor registered for '{0}'")]
    ExecutorNotFound(String),

    // Step errors
    #[error("Step failed with exit code {exit_code}: {message}")]
    StepFailed { exit_code: i32, message: String },

    #[error("Step timed out after {seconds}s")]
    StepTimeout { seconds: u64 },

    // Artifact store errors
    #[error("Artifact {name} is unavailable: producing job {producer} did not publish it")]
    ArtifactUnavailable { name: String, producer: String },

    #[error("Artifact {name} is produced by {existing}; job {attempted} may not overwrite it")]
    ForeignOverwrite {
        name: String,
        existing: String,
        attempted: String,
    },

    #[error("Run aborted")]
    RunAborted,

    // Release errors
    #[error("Release tag {tag} does not match tracked version {tracked}")]
    VersionMismatch { tag: String, tracked: String },

    #[error("Invalid version string: {0}")]
    InvalidVersion(String),

    #[error("Unsupported target architecture: {0}")]
    UnsupportedArch(String),

    #[error("Image not found in registry: {0}")]
    MissingImage(String),

    #[error("Manifest {target} is missing referenced images: {missing:?}")]
    ManifestIncomplete {
        target: String,
        missing: Vec<String>,
    },

    #[error("Release API error: {0}")]
    ReleaseApi(String),

    #[error("Registry error: {0}")]
    Registry(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
