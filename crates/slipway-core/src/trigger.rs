//! Trigger classification types.
//!
//! A run is started by exactly one trigger. The trigger is computed once,
//! never changes for the lifetime of the run, and decides which jobs are
//! eligible through each job's [`RunCondition`].

use crate::release::Version;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The kind of event that started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    PullRequest,
    Push,
    TagPush,
}

/// The classified event that started a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Trigger {
    pub kind: TriggerKind,
    /// The git ref as delivered by the forge, e.g. `refs/tags/v1.2.3`
    /// or `refs/heads/main`.
    pub git_ref: String,
}

impl Trigger {
    pub fn new(kind: TriggerKind, git_ref: impl Into<String>) -> Self {
        Self {
            kind,
            git_ref: git_ref.into(),
        }
    }

    /// Tag name for tag-push triggers, with any `refs/tags/` prefix removed.
    pub fn tag_name(&self) -> Option<&str> {
        match self.kind {
            TriggerKind::TagPush => {
                Some(self.git_ref.strip_prefix("refs/tags/").unwrap_or(&self.git_ref))
            }
            _ => None,
        }
    }

    /// True when this run was started by a tag matching the release prefix.
    pub fn is_release_tag(&self, tag_prefix: &str) -> bool {
        self.tag_name()
            .is_some_and(|tag| tag.starts_with(tag_prefix))
    }

    /// Version derived from the tag name (`v1.2.3` -> `1.2.3`).
    pub fn version(&self, tag_prefix: &str) -> Option<Version> {
        let tag = self.tag_name()?;
        let raw = tag.strip_prefix(tag_prefix)?;
        Version::parse(raw).ok()
    }
}

/// Declarative per-job run condition, evaluated once against the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunCondition {
    /// Run for every trigger.
    #[default]
    Always,
    /// Run only when the trigger is a release-tag push.
    TagOnly,
    /// Run only when the trigger is not a release-tag push.
    NonTag,
}

impl RunCondition {
    pub fn eligible(&self, trigger: &Trigger, tag_prefix: &str) -> bool {
        match self {
            RunCondition::Always => true,
            RunCondition::TagOnly => trigger.is_release_tag(tag_prefix),
            RunCondition::NonTag => !trigger.is_release_tag(tag_prefix),
        }
    }
}
