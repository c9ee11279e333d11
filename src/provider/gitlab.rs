//! GitLab REST v4 adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::http::ApiClient;
use super::{AssigneeManagement, ForgeProvider, ReviewDiscussions};
use crate::config::ProviderKind;
use crate::errors::ProviderError;
use crate::models::{
    Candidate, CommitInfo, CreatedRequest, Discussion, NewRequest, Note, PipelineJob, PipelineRef,
    PipelineStatus, RepositoryInfo, RequestDetails,
};
use crate::util::authenticated_url;

#[derive(Debug, Deserialize)]
struct GlUser {
    id: u64,
    username: String,
}

#[derive(Debug, Deserialize)]
struct GlMergeRequest {
    iid: u64,
    title: String,
    project_id: u64,
    #[serde(default)]
    source_project_id: Option<u64>,
    #[serde(default)]
    source_branch: Option<String>,
    #[serde(default)]
    target_branch: Option<String>,
}

impl From<GlMergeRequest> for Candidate {
    fn from(mr: GlMergeRequest) -> Self {
        Candidate {
            id: mr.iid,
            title: mr.title,
            project_id: mr.project_id,
            source_project_id: mr.source_project_id,
            source_branch: mr.source_branch.unwrap_or_default(),
            target_branch: mr.target_branch,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GlPipeline {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlMergeRequestDetail {
    #[serde(default)]
    has_conflicts: bool,
    #[serde(default)]
    head_pipeline: Option<GlPipeline>,
    #[serde(default)]
    target_branch: Option<String>,
    #[serde(default)]
    author: Option<GlUser>,
    #[serde(default)]
    web_url: Option<String>,
    #[serde(default)]
    assignees: Vec<GlUser>,
}

#[derive(Debug, Deserialize)]
struct GlNamespace {
    full_path: String,
}

#[derive(Debug, Deserialize)]
struct GlProject {
    id: u64,
    path: String,
    namespace: GlNamespace,
    #[serde(default)]
    http_url_to_repo: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
}

impl From<GlProject> for RepositoryInfo {
    fn from(p: GlProject) -> Self {
        RepositoryInfo {
            id: p.id,
            name: p.path,
            owner: p.namespace.full_path,
            clone_url: p.http_url_to_repo,
            default_branch: p.default_branch,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GlJob {
    id: u64,
    name: String,
    #[serde(default)]
    stage: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct GlCommit {
    message: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GlNote {
    body: String,
    author: GlUser,
    created_at: DateTime<Utc>,
    #[serde(default)]
    system: bool,
}

#[derive(Debug, Deserialize)]
struct GlDiscussion {
    #[serde(default)]
    notes: Vec<GlNote>,
}

#[derive(Debug, Deserialize)]
struct GlCreated {
    iid: u64,
    project_id: u64,
    #[serde(default)]
    web_url: Option<String>,
}

pub struct GitLabProvider {
    api: ApiClient,
    token: String,
}

impl GitLabProvider {
    pub fn new(api_base: &str, token: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ApiClient::new(api_base, "PRIVATE-TOKEN", token.to_string())?,
            token: token.to_string(),
        })
    }

    fn mr_path(project: u64, request: u64) -> String {
        format!("/projects/{}/merge_requests/{}", project, request)
    }

    async fn user_id(&self, username: &str) -> Result<u64, ProviderError> {
        let users: Vec<GlUser> = self
            .api
            .get_json("/users", &[("username", username.to_string())])
            .await?;
        users
            .into_iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .map(|u| u.id)
            .ok_or_else(|| ProviderError::Decode {
                endpoint: "/users".into(),
                message: format!("no user named '{}'", username),
            })
    }

    async fn assignee_ids(&self, project: u64, request: u64) -> Result<Vec<u64>, ProviderError> {
        let detail: GlMergeRequestDetail = self.api.get_json(&Self::mr_path(project, request), &[]).await?;
        Ok(detail.assignees.into_iter().map(|u| u.id).collect())
    }

    async fn set_assignees(&self, project: u64, request: u64, ids: Vec<u64>) -> Result<(), ProviderError> {
        self.api
            .put(&Self::mr_path(project, request), &json!({ "assignee_ids": ids }))
            .await
    }
}

#[async_trait]
impl ForgeProvider for GitLabProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gitlab
    }

    async fn list_open_requests(&self, user: &str) -> Result<Vec<Candidate>, ProviderError> {
        let mrs: Vec<GlMergeRequest> = self
            .api
            .get_paginated(
                "/merge_requests",
                &[
                    ("state", "opened".to_string()),
                    ("scope", "all".to_string()),
                    ("assignee_username", user.to_string()),
                ],
            )
            .await?;
        Ok(mrs.into_iter().map(Candidate::from).collect())
    }

    async fn get_request(&self, project: u64, request: u64) -> Result<Candidate, ProviderError> {
        let mr: GlMergeRequest = self.api.get_json(&Self::mr_path(project, request), &[]).await?;
        Ok(mr.into())
    }

    async fn request_details(&self, project: u64, request: u64) -> Result<RequestDetails, ProviderError> {
        let detail: GlMergeRequestDetail = self.api.get_json(&Self::mr_path(project, request), &[]).await?;
        Ok(RequestDetails {
            has_conflicts: detail.has_conflicts,
            pipeline: detail.head_pipeline.map(|p| PipelineRef {
                id: p.id,
                status: PipelineStatus::from_api(&p.status),
                web_url: p.web_url,
            }),
            target_branch: detail.target_branch,
            author: detail.author.map(|a| a.username),
            web_url: detail.web_url,
        })
    }

    async fn repository(&self, project: u64) -> Result<RepositoryInfo, ProviderError> {
        let p: GlProject = self.api.get_json(&format!("/projects/{}", project), &[]).await?;
        Ok(p.into())
    }

    async fn pipeline_jobs(&self, project: u64, pipeline: u64) -> Result<Vec<PipelineJob>, ProviderError> {
        let jobs: Vec<GlJob> = self
            .api
            .get_paginated(&format!("/projects/{}/pipelines/{}/jobs", project, pipeline), &[])
            .await?;
        Ok(jobs
            .into_iter()
            .map(|j| PipelineJob {
                id: j.id,
                name: j.name,
                stage: j.stage,
                status: PipelineStatus::from_api(&j.status),
            })
            .collect())
    }

    async fn job_log(&self, project: u64, job: u64) -> Result<String, ProviderError> {
        self.api
            .get_text(&format!("/projects/{}/jobs/{}/trace", project, job))
            .await
    }

    async fn create_request(&self, request: &NewRequest) -> Result<CreatedRequest, ProviderError> {
        let body = json!({
            "source_branch": request.source_branch,
            "target_branch": request.target_branch,
            "title": request.title,
            "description": request.body,
            "target_project_id": request.target_project,
            "remove_source_branch": true,
        });
        let created: GlCreated = self
            .api
            .post_json(&format!("/projects/{}/merge_requests", request.source_project), &body)
            .await?;
        Ok(CreatedRequest {
            id: created.iid,
            project_id: created.project_id,
            web_url: created.web_url,
        })
    }

    async fn find_fork(&self, owner: &str, name: &str) -> Result<Option<RepositoryInfo>, ProviderError> {
        let full = format!("{}/{}", owner, name);
        let path = format!("/projects/{}", urlencoding::encode(&full));
        let project: Option<GlProject> = self.api.get_optional_json(&path).await?;
        Ok(project.map(RepositoryInfo::from))
    }

    async fn fork_repository(&self, project: u64) -> Result<(), ProviderError> {
        match self
            .api
            .post(&format!("/projects/{}/fork", project), &json!({}))
            .await
        {
            // Already forked
            Err(ProviderError::Status { status: 409, .. }) => Ok(()),
            other => other,
        }
    }

    fn push_url(&self, repo: &RepositoryInfo) -> Result<String, ProviderError> {
        let clone = repo
            .clone_url
            .as_deref()
            .ok_or_else(|| ProviderError::Config(format!("{} has no clone URL", repo.full_name())))?;
        authenticated_url(clone, "oauth2", &self.token)
    }

    fn supports_author_attribution(&self) -> bool {
        true
    }

    fn review_discussions(&self) -> Option<&dyn ReviewDiscussions> {
        Some(self)
    }

    fn assignee_management(&self) -> Option<&dyn AssigneeManagement> {
        Some(self)
    }
}

#[async_trait]
impl ReviewDiscussions for GitLabProvider {
    async fn list_commits(&self, project: u64, request: u64) -> Result<Vec<CommitInfo>, ProviderError> {
        let commits: Vec<GlCommit> = self
            .api
            .get_paginated(&format!("{}/commits", Self::mr_path(project, request)), &[])
            .await?;
        Ok(commits
            .into_iter()
            .map(|c| CommitInfo {
                message: c.message,
                created_at: c.created_at,
            })
            .collect())
    }

    async fn list_discussions(&self, project: u64, request: u64) -> Result<Vec<Discussion>, ProviderError> {
        let discussions: Vec<GlDiscussion> = self
            .api
            .get_paginated(&format!("{}/discussions", Self::mr_path(project, request)), &[])
            .await?;
        Ok(discussions
            .into_iter()
            .map(|d| Discussion {
                notes: d
                    .notes
                    .into_iter()
                    .map(|n| Note {
                        body: n.body,
                        author: n.author.username,
                        created_at: n.created_at,
                        system: n.system,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn post_note(&self, project: u64, request: u64, body: &str) -> Result<(), ProviderError> {
        self.api
            .post(
                &format!("{}/notes", Self::mr_path(project, request)),
                &json!({ "body": body }),
            )
            .await
    }
}

#[async_trait]
impl AssigneeManagement for GitLabProvider {
    async fn assign(&self, project: u64, request: u64, username: &str) -> Result<(), ProviderError> {
        let user = self.user_id(username).await?;
        let mut ids = self.assignee_ids(project, request).await?;
        if ids.contains(&user) {
            return Ok(());
        }
        ids.push(user);
        self.set_assignees(project, request, ids).await
    }

    async fn unassign(&self, project: u64, request: u64, username: &str) -> Result<(), ProviderError> {
        let user = self.user_id(username).await?;
        let ids = self.assignee_ids(project, request).await?;
        if !ids.contains(&user) {
            return Ok(());
        }
        let remaining = ids.into_iter().filter(|id| *id != user).collect();
        self.set_assignees(project, request, remaining).await
    }
}
