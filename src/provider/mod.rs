//! Forge provider adapters.
//!
//! `ForgeProvider` is the capability interface the triage and workflow layers
//! call. Operations only some forges can serve live behind separate traits and
//! are reached through accessors that return `None` when unsupported, so callers
//! branch on capability instead of on the provider's name.

pub mod github;
pub mod gitlab;
mod http;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{ProviderKind, ServerConfig};
use crate::errors::ProviderError;
use crate::models::{
    Candidate, CommitInfo, CreatedRequest, Discussion, NewRequest, PipelineJob, RepositoryInfo,
    RequestDetails,
};

pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;

#[async_trait]
pub trait ForgeProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Open requests assigned to `user`.
    async fn list_open_requests(&self, user: &str) -> Result<Vec<Candidate>, ProviderError>;

    /// A single request as a candidate.
    async fn get_request(&self, project: u64, request: u64) -> Result<Candidate, ProviderError>;

    /// Conflict flag, head pipeline, target branch and author.
    async fn request_details(&self, project: u64, request: u64) -> Result<RequestDetails, ProviderError>;

    async fn repository(&self, project: u64) -> Result<RepositoryInfo, ProviderError>;

    async fn pipeline_jobs(&self, project: u64, pipeline: u64) -> Result<Vec<PipelineJob>, ProviderError>;

    async fn job_log(&self, project: u64, job: u64) -> Result<String, ProviderError>;

    async fn create_request(&self, request: &NewRequest) -> Result<CreatedRequest, ProviderError>;

    /// `owner/name` if it exists.
    async fn find_fork(&self, owner: &str, name: &str) -> Result<Option<RepositoryInfo>, ProviderError>;

    async fn fork_exists(&self, owner: &str, name: &str) -> Result<bool, ProviderError> {
        Ok(self.find_fork(owner, name).await?.is_some())
    }

    /// Ask the forge to fork `project` into the authenticated account.
    async fn fork_repository(&self, project: u64) -> Result<(), ProviderError>;

    /// Credentialed push URL for `repo`. Never log the result.
    fn push_url(&self, repo: &RepositoryInfo) -> Result<String, ProviderError>;

    /// Whether request authors are reported reliably enough to route pushes on.
    fn supports_author_attribution(&self) -> bool {
        false
    }

    fn review_discussions(&self) -> Option<&dyn ReviewDiscussions> {
        None
    }

    fn assignee_management(&self) -> Option<&dyn AssigneeManagement> {
        None
    }
}

/// Commits and discussion threads addressable per request.
#[async_trait]
pub trait ReviewDiscussions: Send + Sync {
    async fn list_commits(&self, project: u64, request: u64) -> Result<Vec<CommitInfo>, ProviderError>;

    async fn list_discussions(&self, project: u64, request: u64) -> Result<Vec<Discussion>, ProviderError>;

    async fn post_note(&self, project: u64, request: u64, body: &str) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait AssigneeManagement: Send + Sync {
    async fn assign(&self, project: u64, request: u64, username: &str) -> Result<(), ProviderError>;

    async fn unassign(&self, project: u64, request: u64, username: &str) -> Result<(), ProviderError>;
}

/// Build the adapter for one configured server.
pub fn build_provider(server: &ServerConfig) -> Result<Arc<dyn ForgeProvider>, ProviderError> {
    let token = server.resolve_token().ok_or_else(|| {
        ProviderError::Config(format!("server '{}' has no API token", server.name))
    })?;
    let api_base = server.api_base();
    Ok(match server.provider {
        ProviderKind::Gitlab => Arc::new(GitLabProvider::new(&api_base, &token)?),
        ProviderKind::Github => Arc::new(GitHubProvider::new(&api_base, &token)?),
    })
}
