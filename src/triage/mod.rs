//! Deciding whether a request needs attention, and which single action to take.

pub mod classifier;
pub mod prompts;
pub mod selector;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::PipelineRef;

pub use classifier::AttentionClassifier;
pub use selector::{DirectiveBuilder, RemediationDirective, RemediationKind, choose_action};

/// Outcome of the best-effort "new human review since the bot acted" check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ReviewCheck {
    NewFeedback,
    NoNewFeedback,
    /// Provider has no addressable discussions
    Unsupported,
    /// A lookup failed; the reason is kept for reporting
    Unknown(String),
}

/// Per-candidate classification result.
#[derive(Debug, Clone, Serialize)]
pub struct AttentionSignal {
    pub has_conflicts: bool,
    pub review: ReviewCheck,
    pub pipeline_failed: bool,
    pub target_branch: String,
    /// `None` when the provider cannot attribute authors
    pub author: Option<String>,
    pub last_bot_action: DateTime<Utc>,
    /// Head pipeline, as reported by the details lookup
    pub pipeline: Option<PipelineRef>,
}

impl AttentionSignal {
    /// Collapses the tri-state review check; anything but confirmed new
    /// feedback counts as none.
    pub fn has_new_human_review(&self) -> bool {
        self.review == ReviewCheck::NewFeedback
    }

    pub fn needs_attention(&self) -> bool {
        self.has_conflicts || self.has_new_human_review() || self.pipeline_failed
    }

    #[cfg(test)]
    pub(crate) fn quiet(target_branch: &str) -> Self {
        Self {
            has_conflicts: false,
            review: ReviewCheck::NoNewFeedback,
            pipeline_failed: false,
            target_branch: target_branch.to_string(),
            author: None,
            last_bot_action: DateTime::<Utc>::MIN_UTC,
            pipeline: None,
        }
    }
}
