use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{AttentionSignal, ReviewCheck};
use crate::errors::ProviderError;
use crate::models::{Candidate, CommitInfo, Note};
use crate::provider::ForgeProvider;

/// Computes the three attention signals for a candidate.
pub struct AttentionClassifier {
    provider: Arc<dyn ForgeProvider>,
    bot_username: String,
    marker: String,
    default_target_branch: String,
}

impl AttentionClassifier {
    pub fn new(
        provider: Arc<dyn ForgeProvider>,
        bot_username: impl Into<String>,
        marker: impl Into<String>,
        default_target_branch: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            bot_username: bot_username.into(),
            marker: marker.into(),
            default_target_branch: default_target_branch.into(),
        }
    }

    /// Classify one candidate. Only the details lookup can fail the call;
    /// review detection degrades to `ReviewCheck::Unknown`.
    pub async fn classify(&self, candidate: &Candidate) -> Result<AttentionSignal, ProviderError> {
        let details = self
            .provider
            .request_details(candidate.project_id, candidate.id)
            .await?;

        let target_branch = resolve_target_branch(
            details.target_branch.as_deref(),
            candidate.target_branch.as_deref(),
            &self.default_target_branch,
        );

        let author = if self.provider.supports_author_attribution() {
            details.author.clone()
        } else {
            None
        };

        let (review, last_bot_action) = self.check_review(candidate).await;
        debug!(
            candidate = candidate.id,
            conflicts = details.has_conflicts,
            pipeline_failed = details.pipeline_failed(),
            review = ?review,
            "classified"
        );

        Ok(AttentionSignal {
            has_conflicts: details.has_conflicts,
            review,
            pipeline_failed: details.pipeline_failed(),
            target_branch,
            author,
            last_bot_action,
            pipeline: details.pipeline,
        })
    }

    async fn check_review(&self, candidate: &Candidate) -> (ReviewCheck, DateTime<Utc>) {
        let Some(discussions) = self.provider.review_discussions() else {
            return (ReviewCheck::Unsupported, DateTime::<Utc>::MIN_UTC);
        };

        let commits = match discussions.list_commits(candidate.project_id, candidate.id).await {
            Ok(commits) => commits,
            Err(e) => {
                warn!(candidate = candidate.id, error = %e, "could not list commits; assuming no new review");
                return (ReviewCheck::Unknown(e.to_string()), DateTime::<Utc>::MIN_UTC);
            }
        };
        let notes: Vec<Note> = match discussions.list_discussions(candidate.project_id, candidate.id).await {
            Ok(threads) => threads.into_iter().flat_map(|d| d.notes).collect(),
            Err(e) => {
                warn!(candidate = candidate.id, error = %e, "could not list discussions; assuming no new review");
                let last = last_bot_action_time(&commits, &[], &self.marker);
                return (ReviewCheck::Unknown(e.to_string()), last);
            }
        };

        let last_bot = last_bot_action_time(&commits, &notes, &self.marker);
        let latest_human = latest_human_note_time(&notes, &self.bot_username);
        let review = if latest_human > last_bot {
            ReviewCheck::NewFeedback
        } else {
            ReviewCheck::NoNewFeedback
        };
        (review, last_bot)
    }
}

/// First non-empty of the detailed and listed target branch, else the default.
pub fn resolve_target_branch(details: Option<&str>, listed: Option<&str>, default: &str) -> String {
    details
        .filter(|b| !b.is_empty())
        .or(listed.filter(|b| !b.is_empty()))
        .unwrap_or(default)
        .to_string()
}

/// Latest commit or note carrying the attribution marker, or the minimum
/// timestamp when there is none.
pub fn last_bot_action_time(commits: &[CommitInfo], notes: &[Note], marker: &str) -> DateTime<Utc> {
    let from_commits = commits
        .iter()
        .filter(|c| c.message.contains(marker))
        .map(|c| c.created_at);
    let from_notes = notes
        .iter()
        .filter(|n| n.body.contains(marker))
        .map(|n| n.created_at);
    from_commits
        .chain(from_notes)
        .max()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Latest non-system note not written by the bot, or the minimum timestamp.
pub fn latest_human_note_time(notes: &[Note], bot_username: &str) -> DateTime<Utc> {
    notes
        .iter()
        .filter(|n| !n.system && !n.author.eq_ignore_ascii_case(bot_username))
        .map(|n| n.created_at)
        .max()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
