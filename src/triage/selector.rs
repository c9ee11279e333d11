use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::AttentionSignal;
use super::prompts::{self, FailedJobLog};
use crate::errors::WorkflowError;
use crate::models::{Candidate, Note, PipelineStatus};
use crate::provider::ForgeProvider;
use crate::util::tail_chars;

/// The single action taken for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationKind {
    ResolveConflict,
    AddressReview,
    FixPipeline,
}

impl RemediationKind {
    pub fn verb(&self) -> &'static str {
        match self {
            RemediationKind::ResolveConflict => "Resolve merge conflicts",
            RemediationKind::AddressReview => "Address review feedback",
            RemediationKind::FixPipeline => "Fix failed pipeline",
        }
    }

    pub fn requires_conflict_merge(&self) -> bool {
        matches!(self, RemediationKind::ResolveConflict)
    }
}

impl std::fmt::Display for RemediationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RemediationKind::ResolveConflict => "resolve-conflict",
            RemediationKind::AddressReview => "address-review",
            RemediationKind::FixPipeline => "fix-pipeline",
        };
        f.write_str(name)
    }
}

/// Priority: conflicts, then new human review, then a failed pipeline.
/// `None` when nothing needs attention.
pub fn choose_action(signal: &AttentionSignal) -> Option<RemediationKind> {
    if signal.has_conflicts {
        Some(RemediationKind::ResolveConflict)
    } else if signal.has_new_human_review() {
        Some(RemediationKind::AddressReview)
    } else if signal.pipeline_failed {
        Some(RemediationKind::FixPipeline)
    } else {
        None
    }
}

/// `<verb> for request #<id>\n\n<marker>.`; the marker is what later scans
/// use to recognise bot commits.
pub fn commit_message(kind: RemediationKind, request: u64, marker: &str) -> String {
    format!("{} for request #{}\n\n{}.", kind.verb(), request, marker)
}

#[derive(Debug, Clone, Serialize)]
pub struct RemediationDirective {
    pub kind: RemediationKind,
    pub prompt: String,
    pub commit_message: String,
}

/// Turns a chosen action into a directive, fetching the material its prompt needs.
pub struct DirectiveBuilder {
    provider: Arc<dyn ForgeProvider>,
    marker: String,
    max_log_chars: usize,
}

impl DirectiveBuilder {
    pub fn new(provider: Arc<dyn ForgeProvider>, marker: impl Into<String>, max_log_chars: usize) -> Self {
        Self {
            provider,
            marker: marker.into(),
            max_log_chars,
        }
    }

    /// Choose and build. `Ok(None)` when no signal is set.
    pub async fn select(
        &self,
        candidate: &Candidate,
        signal: &AttentionSignal,
    ) -> Result<Option<RemediationDirective>, WorkflowError> {
        match choose_action(signal) {
            Some(kind) => Ok(Some(self.build(candidate, signal, kind).await?)),
            None => Ok(None),
        }
    }

    pub async fn build(
        &self,
        candidate: &Candidate,
        signal: &AttentionSignal,
        kind: RemediationKind,
    ) -> Result<RemediationDirective, WorkflowError> {
        let target = signal.target_branch.as_str();
        let message = commit_message(kind, candidate.id, &self.marker);
        let prompt = match kind {
            RemediationKind::ResolveConflict => prompts::conflict_prompt(candidate, target, &message),
            RemediationKind::AddressReview => {
                let notes = self.discussion_notes(candidate).await;
                prompts::review_prompt(candidate, target, &notes, signal.last_bot_action, &message)
            }
            RemediationKind::FixPipeline => {
                let pipeline = signal
                    .pipeline
                    .as_ref()
                    .ok_or(WorkflowError::MissingPipelineData { request: candidate.id })?;
                let pipeline_id = pipeline
                    .valid_id()
                    .ok_or(WorkflowError::MissingPipelineData { request: candidate.id })?;
                let failed = self.failed_job_logs(candidate, pipeline_id).await;
                prompts::pipeline_prompt(
                    candidate,
                    target,
                    pipeline.web_url.as_deref(),
                    &failed,
                    &message,
                )
            }
        };
        Ok(RemediationDirective {
            kind,
            prompt,
            commit_message: message,
        })
    }

    async fn discussion_notes(&self, candidate: &Candidate) -> Vec<Note> {
        let Some(discussions) = self.provider.review_discussions() else {
            return Vec::new();
        };
        match discussions.list_discussions(candidate.project_id, candidate.id).await {
            Ok(threads) => threads.into_iter().flat_map(|d| d.notes).collect(),
            Err(e) => {
                warn!(candidate = candidate.id, error = %e, "could not fetch discussion transcript");
                Vec::new()
            }
        }
    }

    /// Logs of every failed job, looked up in the project hosting the source branch.
    async fn failed_job_logs(&self, candidate: &Candidate, pipeline: u64) -> Vec<FailedJobLog> {
        let project = candidate.source_project();
        let jobs = match self.provider.pipeline_jobs(project, pipeline).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(candidate = candidate.id, project, pipeline, error = %e, "could not list pipeline jobs");
                return Vec::new();
            }
        };

        let mut logs = Vec::new();
        for job in jobs.into_iter().filter(|j| j.status == PipelineStatus::Failed) {
            let log = match self.provider.job_log(project, job.id).await {
                Ok(text) => tail_chars(&text, self.max_log_chars),
                Err(e) => {
                    warn!(candidate = candidate.id, job = job.id, error = %e, "could not fetch job log");
                    format!("(log unavailable: {})", e)
                }
            };
            logs.push(FailedJobLog { job, log });
        }
        logs
    }
}
