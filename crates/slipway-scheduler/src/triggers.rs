//! Trigger classification and per-job condition evaluation.

use slipway_core::trigger::{RunCondition, Trigger, TriggerKind};
use slipway_core::{Error, Result};
use tracing::info;

/// Classifies the event that started a run and evaluates job conditions
/// against it. Pure: the verdict for a condition never changes within a run.
#[derive(Debug, Clone)]
pub struct TriggerClassifier {
    release_tag_prefix: String,
}

impl TriggerClassifier {
    pub fn new(release_tag_prefix: impl Into<String>) -> Self {
        Self {
            release_tag_prefix: release_tag_prefix.into(),
        }
    }

    /// Classify a raw forge event into a [`Trigger`].
    ///
    /// An unrecognized event kind aborts the whole run before any job
    /// starts; nothing partially executes.
    pub fn classify(&self, event_kind: &str, git_ref: &str) -> Result<Trigger> {
        let kind = match event_kind {
            "pull_request" => TriggerKind::PullRequest,
            "tag" | "tag_push" => TriggerKind::TagPush,
            "push" => {
                if git_ref.starts_with("refs/tags/") {
                    TriggerKind::TagPush
                } else {
                    TriggerKind::Push
                }
            }
            other => return Err(Error::UnknownTriggerEvent(other.to_string())),
        };
        let trigger = Trigger::new(kind, git_ref);
        info!(?kind, git_ref, "trigger classified");
        Ok(trigger)
    }

    /// Whether a job with the given condition runs for this trigger.
    pub fn eligible(&self, condition: RunCondition, trigger: &Trigger) -> bool {
        condition.eligible(trigger, &self.release_tag_prefix)
    }
}
