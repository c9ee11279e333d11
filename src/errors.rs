//! Typed error hierarchy for medic.
//!
//! Three top-level enums cover the three failure surfaces:
//! - `ProviderError`: forge REST adapter failures
//! - `WorkspaceError`: git working-copy failures
//! - `WorkflowError`: per-candidate remediation failures

use std::time::Duration;

use thiserror::Error;

/// Errors from a forge provider adapter (GitLab, GitHub).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Provider does not support {0}")]
    Unsupported(&'static str),

    #[error("Invalid provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::Status { status: 404, .. })
    }
}

/// Errors from the git workspace collaborator.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to spawn git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {command} exited with {code:?}: {stderr}")]
    Git {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Repository inspection failed: {0}")]
    Inspect(#[from] git2::Error),

    #[error("Filesystem error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace root {0} is locked by another medic process")]
    Locked(std::path::PathBuf),
}

/// Per-candidate failures. Each variant aborts only the candidate that raised it.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Request !{request} has no source branch")]
    MissingSourceBranch { request: u64 },

    #[error("Project {project} has no clone URL")]
    MissingCloneUrl { project: u64 },

    #[error("Pipeline failure selected for request !{request} but pipeline data is missing or invalid")]
    MissingPipelineData { request: u64 },

    #[error("Merge of {target} failed but no conflicted files were found")]
    ConflictAnomaly { target: String },

    #[error("Commit on {branch} failed: {message}")]
    CommitFailed { branch: String, message: String },

    #[error("Push of {branch} failed: {message}")]
    PushFailed { branch: String, message: String },

    #[error("Fork {repo} did not appear within {waited:?}")]
    ForkTimeout { repo: String, waited: Duration },

    #[error("Agent could not be started: {0}")]
    Agent(String),

    #[error("Finalize step failed: {0}")]
    Finalize(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl WorkflowError {
    /// Missing-data failures are reported as skips rather than failures.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            WorkflowError::MissingPipelineData { .. } | WorkflowError::MissingSourceBranch { .. }
        )
    }
}
