//! The artifact store: a content-addressed-by-name map with blocking fetch.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use slipway_core::artifact::Artifact;
use slipway_core::{Error, JobId, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Store construction parameters, injected by the composition root.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Applied to artifacts published without an explicit retention window.
    pub default_retention_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_retention_days: slipway_core::artifact::DEFAULT_RETENTION_DAYS,
        }
    }
}

struct StoredArtifact {
    artifact: Artifact,
    fingerprint: String,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<String, StoredArtifact>,
    /// First producer seen for each name; only it may overwrite the entry.
    producers: HashMap<String, JobId>,
    /// Names whose producing job reached a terminal state without publishing.
    unavailable: HashMap<String, JobId>,
    aborted: bool,
}

struct StoreInner {
    state: Mutex<StoreState>,
    /// Bumped on every state change to wake blocked fetchers.
    version: watch::Sender<u64>,
    config: StoreConfig,
}

/// Cheaply clonable handle to the run's artifact namespace.
#[derive(Clone)]
pub struct ArtifactStore {
    inner: Arc<StoreInner>,
}

impl ArtifactStore {
    pub fn new(config: StoreConfig) -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::default()),
                version,
                config,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.inner.version.send_modify(|v| *v += 1);
    }

    /// Publish a named artifact. Last-writer-wins within the producing job;
    /// a different job republishing an existing name is an error (the graph
    /// guarantees one producer per name, this enforces it).
    pub fn publish(&self, mut artifact: Artifact) -> Result<()> {
        if artifact.retention_days == 0 {
            artifact.retention_days = self.inner.config.default_retention_days;
        }
        let fingerprint = fingerprint(&artifact);
        {
            let mut state = self.state();
            if let Some(existing) = state.producers.get(&artifact.name)
                && existing != &artifact.producer
            {
                return Err(Error::ForeignOverwrite {
                    name: artifact.name.clone(),
                    existing: existing.to_string(),
                    attempted: artifact.producer.to_string(),
                });
            }
            state
                .producers
                .insert(artifact.name.clone(), artifact.producer.clone());
            let replaced = state
                .entries
                .insert(
                    artifact.name.clone(),
                    StoredArtifact {
                        artifact: artifact.clone(),
                        fingerprint: fingerprint.clone(),
                    },
                )
                .is_some();
            if replaced {
                debug!(name = %artifact.name, "artifact overwritten by its producer");
            }
        }
        info!(
            name = %artifact.name,
            producer = %artifact.producer,
            %fingerprint,
            "artifact published"
        );
        self.bump();
        Ok(())
    }

    /// Fetch a named artifact, waiting until it exists. Resolves with an
    /// error when the producing job terminated without publishing or the run
    /// was aborted; never returns a partial payload.
    pub async fn fetch(&self, name: &str) -> Result<Artifact> {
        let mut rx = self.inner.version.subscribe();
        loop {
            {
                let state = self.state();
                if let Some(stored) = state.entries.get(name) {
                    return Ok(stored.artifact.clone());
                }
                if state.aborted {
                    return Err(Error::RunAborted);
                }
                if let Some(producer) = state.unavailable.get(name) {
                    return Err(Error::ArtifactUnavailable {
                        name: name.to_string(),
                        producer: producer.to_string(),
                    });
                }
            }
            debug!(name, "waiting for artifact");
            if rx.changed().await.is_err() {
                return Err(Error::RunAborted);
            }
        }
    }

    /// Non-blocking lookup, for reporting.
    pub fn get(&self, name: &str) -> Option<Artifact> {
        self.state().entries.get(name).map(|s| s.artifact.clone())
    }

    /// Record that the producing job of a name terminated without
    /// publishing it, turning blocked and future fetches into hard errors.
    /// A name that was already published is left untouched.
    pub fn mark_unavailable(&self, name: &str, producer: &JobId) {
        {
            let mut state = self.state();
            if state.entries.contains_key(name) {
                return;
            }
            state
                .unavailable
                .insert(name.to_string(), producer.clone());
        }
        warn!(name, %producer, "artifact will not be published");
        self.bump();
    }

    /// Abort the run: every blocked fetch resolves with `RunAborted`.
    pub fn abort(&self) {
        self.state().aborted = true;
        self.bump();
    }

    /// Housekeeping: drop entries past their retention window. Has no
    /// bearing on in-run correctness.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let removed = {
            let mut state = self.state();
            let before = state.entries.len();
            state.entries.retain(|_, s| s.artifact.expires_at() > now);
            before - state.entries.len()
        };
        if removed > 0 {
            debug!(removed, "expired artifacts swept");
            self.bump();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("entries", &self.len())
            .finish()
    }
}

/// Short fingerprint of the payload path set, for log correlation.
fn fingerprint(artifact: &Artifact) -> String {
    let mut hasher = Sha256::new();
    for path in &artifact.payload.files {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_core::artifact::ArtifactPayload;
    use std::time::Duration;

    fn art(name: &str, producer: &str, path: &str) -> Artifact {
        Artifact::new(
            name,
            JobId::new(producer),
            ArtifactPayload::single(path),
        )
    }

    #[tokio::test]
    async fn test_publish_then_fetch() {
        let store = ArtifactStore::new(StoreConfig::default());
        store.publish(art("gprofiler_x86_64", "build", "/out/gprofiler")).unwrap();

        let fetched = store.fetch("gprofiler_x86_64").await.unwrap();
        assert_eq!(fetched.payload.file().unwrap().to_str(), Some("/out/gprofiler"));
    }

    #[tokio::test]
    async fn test_second_publish_wins() {
        let store = ArtifactStore::new(StoreConfig::default());
        store.publish(art("exe", "build", "/out/first")).unwrap();
        store.publish(art("exe", "build", "/out/second")).unwrap();

        let fetched = store.fetch("exe").await.unwrap();
        assert_eq!(fetched.payload.files, vec![std::path::PathBuf::from("/out/second")]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_overwrite_rejected() {
        let store = ArtifactStore::new(StoreConfig::default());
        store.publish(art("exe", "build-a", "/a")).unwrap();

        let err = store.publish(art("exe", "build-b", "/b")).unwrap_err();
        assert!(matches!(err, Error::ForeignOverwrite { .. }));
    }

    #[tokio::test]
    async fn test_fetch_blocks_until_published() {
        let store = ArtifactStore::new(StoreConfig::default());

        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch("exe").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        store.publish(art("exe", "build", "/out/exe")).unwrap();
        let fetched = reader.await.unwrap().unwrap();
        assert_eq!(fetched.name, "exe");
    }

    #[tokio::test]
    async fn test_fetch_from_failed_producer_is_hard_error() {
        let store = ArtifactStore::new(StoreConfig::default());
        store.mark_unavailable("exe", &JobId::new("build"));

        let err = store.fetch("exe").await.unwrap_err();
        assert!(matches!(err, Error::ArtifactUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_mark_unavailable_does_not_clobber_published() {
        let store = ArtifactStore::new(StoreConfig::default());
        store.publish(art("exe", "build", "/out/exe")).unwrap();
        store.mark_unavailable("exe", &JobId::new("build"));

        assert!(store.fetch("exe").await.is_ok());
    }

    #[tokio::test]
    async fn test_abort_releases_blocked_fetchers() {
        let store = ArtifactStore::new(StoreConfig::default());
        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch("never").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.abort();
        let err = reader.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::RunAborted));
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let store = ArtifactStore::new(StoreConfig::default());
        store.publish(art("old", "build", "/old")).unwrap();
        store.publish(art("new", "build2", "/new")).unwrap();

        let future = Utc::now() + chrono::Duration::days(10);
        assert_eq!(store.sweep_expired(future), 2);
        assert!(store.is_empty());
    }
}
