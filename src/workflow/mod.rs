//! Per-candidate remediation: prepare a working copy, run the agent, then
//! commit and push (or redirect through a fork).
//!
//! The engine is a chain of stage transitions. Each stage consumes the
//! previous stage's value and returns the next one, so any transition can be
//! exercised on its own.

pub mod changes;
pub mod conflict;
pub mod engine;
pub mod fork;
pub mod push;

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

use crate::agent::AgentOutcome;
use crate::errors::WorkflowError;
use crate::models::{Candidate, CreatedRequest};
use crate::triage::{AttentionSignal, RemediationDirective, RemediationKind};

pub use engine::{EngineSettings, WorkflowEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Init,
    RepositoryResolved,
    WorkspacePrepared,
    ConflictTriggered,
    AgentInvoked,
    ChangesEvaluated,
    NoOp,
    Committed,
    Finalized,
    Failed,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Init => "init",
            WorkflowState::RepositoryResolved => "repository_resolved",
            WorkflowState::WorkspacePrepared => "workspace_prepared",
            WorkflowState::ConflictTriggered => "conflict_triggered",
            WorkflowState::AgentInvoked => "agent_invoked",
            WorkflowState::ChangesEvaluated => "changes_evaluated",
            WorkflowState::NoOp => "no_op",
            WorkflowState::Committed => "committed",
            WorkflowState::Finalized => "finalized",
            WorkflowState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowPlan {
    pub server: String,
    pub candidate: Candidate,
    pub target_branch: String,
    /// Unique per candidate; names the working copy directory
    pub label: String,
    pub kind: Option<RemediationKind>,
    pub prompt: String,
    pub commit_message: String,
    pub author: Option<String>,
    pub hide_history: bool,
    pub trigger_conflicts: bool,
    /// Read-only flows: hand the working copy to a `Finalize` callback instead
    /// of committing and pushing
    pub skip_commit: bool,
}

impl WorkflowPlan {
    pub fn for_directive(
        server: &str,
        candidate: &Candidate,
        signal: &AttentionSignal,
        directive: RemediationDirective,
        hide_history: bool,
    ) -> Self {
        Self {
            server: server.to_string(),
            candidate: candidate.clone(),
            target_branch: signal.target_branch.clone(),
            label: candidate.workspace_label(),
            kind: Some(directive.kind),
            trigger_conflicts: directive.kind.requires_conflict_merge(),
            prompt: directive.prompt,
            commit_message: directive.commit_message,
            author: signal.author.clone(),
            hide_history,
            skip_commit: false,
        }
    }

    /// A run that never commits; `finalize` receives the working copy.
    pub fn read_only(
        server: &str,
        candidate: &Candidate,
        target_branch: &str,
        prompt: String,
        hide_history: bool,
    ) -> Self {
        Self {
            server: server.to_string(),
            candidate: candidate.clone(),
            target_branch: target_branch.to_string(),
            label: format!("{}-review", candidate.workspace_label()),
            kind: None,
            prompt,
            commit_message: String::new(),
            author: None,
            hide_history,
            trigger_conflicts: false,
            skip_commit: true,
        }
    }

    pub fn source_branch(&self) -> &str {
        &self.candidate.source_branch
    }
}

/// Caller-supplied last step for `skip_commit` runs.
#[async_trait]
pub trait Finalize: Send + Sync {
    /// Returns a one-line summary for the outcome.
    async fn finalize(&self, plan: &WorkflowPlan, working_copy: &Path) -> Result<String, WorkflowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Skipped,
    Failed,
}

/// Explicit per-candidate result, aggregated by the batch runner.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub candidate_id: u64,
    pub status: OutcomeStatus,
    pub reason: String,
    pub last_state: WorkflowState,
    /// Last state reached before a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_after: Option<WorkflowState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RemediationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<CreatedRequest>,
}

impl WorkflowOutcome {
    pub fn new(candidate_id: u64, status: OutcomeStatus, reason: impl Into<String>, last_state: WorkflowState) -> Self {
        Self {
            candidate_id,
            status,
            reason: reason.into(),
            last_state,
            failed_after: None,
            kind: None,
            agent: None,
            pushed_branch: None,
            replacement: None,
        }
    }

    /// Failure or skip derived from an error raised after reaching `reached`.
    pub fn from_error(candidate_id: u64, error: &WorkflowError, reached: WorkflowState) -> Self {
        let status = if error.is_skip() {
            OutcomeStatus::Skipped
        } else {
            OutcomeStatus::Failed
        };
        let mut outcome = Self::new(candidate_id, status, error.to_string(), WorkflowState::Failed);
        outcome.failed_after = Some(reached);
        outcome
    }

    pub fn with_kind(mut self, kind: Option<RemediationKind>) -> Self {
        self.kind = kind;
        self
    }
}
