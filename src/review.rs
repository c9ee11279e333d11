//! Review-only flow: the agent writes a review into the working copy, which is
//! posted back to the request as a discussion note. Nothing is committed.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::errors::{ProviderError, WorkflowError};
use crate::models::Candidate;
use crate::provider::ForgeProvider;
use crate::triage::prompts::{REVIEW_ARTIFACT, review_only_prompt};
use crate::workflow::{Finalize, OutcomeStatus, WorkflowEngine, WorkflowOutcome, WorkflowPlan, WorkflowState};

/// Posts the agent's review artifact as a note carrying the attribution
/// marker, so the next scan counts it as bot activity.
pub struct ReviewPublisher {
    provider: Arc<dyn ForgeProvider>,
    marker: String,
}

impl ReviewPublisher {
    pub fn new(provider: Arc<dyn ForgeProvider>, marker: impl Into<String>) -> Self {
        Self {
            provider,
            marker: marker.into(),
        }
    }

    pub fn note_body(&self, review: &str) -> String {
        format!("{}\n\n---\n{}.", review.trim_end(), self.marker)
    }
}

#[async_trait]
impl Finalize for ReviewPublisher {
    async fn finalize(&self, plan: &WorkflowPlan, working_copy: &Path) -> Result<String, WorkflowError> {
        let discussions = self
            .provider
            .review_discussions()
            .ok_or(ProviderError::Unsupported("review discussions"))?;

        let artifact = working_copy.join(REVIEW_ARTIFACT);
        let review = tokio::fs::read_to_string(&artifact)
            .await
            .map_err(|e| WorkflowError::Finalize(format!("could not read {}: {}", REVIEW_ARTIFACT, e)))?;
        if review.trim().is_empty() {
            return Err(WorkflowError::Finalize(format!("{} is empty", REVIEW_ARTIFACT)));
        }

        let candidate = &plan.candidate;
        discussions
            .post_note(candidate.project_id, candidate.id, &self.note_body(&review))
            .await?;
        info!(request = candidate.id, chars = review.len(), "posted review note");
        Ok(format!("posted review note on request #{}", candidate.id))
    }
}

/// Run the review flow for one request. Fails up front, before any clone,
/// when the provider cannot post notes.
pub async fn review_request(
    engine: &WorkflowEngine,
    publisher: &ReviewPublisher,
    server: &str,
    candidate: &Candidate,
    target_branch: &str,
    hide_history: bool,
) -> WorkflowOutcome {
    if publisher.provider.review_discussions().is_none() {
        let err = WorkflowError::Provider(ProviderError::Unsupported("review discussions"));
        return WorkflowOutcome::from_error(candidate.id, &err, WorkflowState::Init);
    }
    let plan = WorkflowPlan::read_only(
        server,
        candidate,
        target_branch,
        review_only_prompt(candidate, target_branch),
        hide_history,
    );
    let outcome = engine.run(&plan, Some(publisher)).await;
    if outcome.status == OutcomeStatus::Succeeded {
        info!(request = candidate.id, "review published");
    }
    outcome
}
