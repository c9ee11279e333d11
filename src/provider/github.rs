//! GitHub REST v3 adapter.
//!
//! Repositories are addressed by numeric id (`/repositories/:id`) so the rest
//! of the crate can treat projects uniformly. GitHub Actions runs stand in for
//! pipelines. Review discussions and assignee management are not offered:
//! review comments are spread over three APIs with different timestamps and
//! authorship semantics.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::ForgeProvider;
use super::http::ApiClient;
use crate::config::ProviderKind;
use crate::errors::ProviderError;
use crate::models::{
    Candidate, CreatedRequest, NewRequest, PipelineJob, PipelineRef, PipelineStatus, RepositoryInfo,
    RequestDetails,
};
use crate::util::authenticated_url;

const SEARCH_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhRepo {
    id: u64,
    name: String,
    owner: GhUser,
    #[serde(default)]
    clone_url: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
}

impl From<GhRepo> for RepositoryInfo {
    fn from(r: GhRepo) -> Self {
        RepositoryInfo {
            id: r.id,
            name: r.name,
            owner: r.owner.login,
            clone_url: r.clone_url,
            default_branch: r.default_branch,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhRef {
    #[serde(rename = "ref")]
    name: String,
    #[serde(default)]
    sha: String,
    /// Null when the head fork was deleted
    #[serde(default)]
    repo: Option<GhRepoId>,
}

#[derive(Debug, Deserialize)]
struct GhRepoId {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GhPull {
    number: u64,
    title: String,
    head: GhRef,
    base: GhRef,
    #[serde(default)]
    user: Option<GhUser>,
    #[serde(default)]
    mergeable_state: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

impl GhPull {
    fn into_candidate(self, fallback_project: u64) -> Candidate {
        let project_id = self.base.repo.as_ref().map(|r| r.id).unwrap_or(fallback_project);
        Candidate {
            id: self.number,
            title: self.title,
            project_id,
            source_project_id: self.head.repo.map(|r| r.id),
            source_branch: self.head.name,
            target_branch: Some(self.base.name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhSearchItem {
    number: u64,
    repository_url: String,
}

#[derive(Debug, Deserialize)]
struct GhSearch {
    #[serde(default)]
    items: Vec<GhSearchItem>,
}

#[derive(Debug, Deserialize)]
struct GhRun {
    id: u64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhRuns {
    #[serde(default)]
    workflow_runs: Vec<GhRun>,
}

#[derive(Debug, Deserialize)]
struct GhJob {
    id: u64,
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    workflow_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhJobs {
    #[serde(default)]
    jobs: Vec<GhJob>,
}

#[derive(Debug, Deserialize)]
struct GhCreated {
    number: u64,
    #[serde(default)]
    html_url: Option<String>,
}

/// Actions reports `status` until completion, then `conclusion`.
fn run_status(status: Option<&str>, conclusion: Option<&str>) -> PipelineStatus {
    match (status, conclusion) {
        (Some("completed"), Some(conclusion)) => PipelineStatus::from_api(conclusion),
        (Some(status), _) => PipelineStatus::from_api(status),
        (None, Some(conclusion)) => PipelineStatus::from_api(conclusion),
        (None, None) => PipelineStatus::Unknown,
    }
}

/// `owner/name` from an API repository URL such as
/// `https://api.github.com/repos/owner/name`.
fn repo_slug(repository_url: &str) -> Option<&str> {
    let idx = repository_url.find("/repos/")?;
    let slug = &repository_url[idx + "/repos/".len()..];
    (slug.split('/').count() == 2).then_some(slug)
}

pub struct GitHubProvider {
    api: ApiClient,
    token: String,
}

impl GitHubProvider {
    pub fn new(api_base: &str, token: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ApiClient::new(api_base, "Authorization", format!("Bearer {}", token))?,
            token: token.to_string(),
        })
    }

    async fn pull(&self, project: u64, number: u64) -> Result<GhPull, ProviderError> {
        self.api
            .get_json(&format!("/repositories/{}/pulls/{}", project, number), &[])
            .await
    }

    async fn latest_run(&self, project: u64, sha: &str) -> Result<Option<GhRun>, ProviderError> {
        let runs: GhRuns = self
            .api
            .get_json(
                &format!("/repositories/{}/actions/runs", project),
                &[("head_sha", sha.to_string()), ("per_page", "1".to_string())],
            )
            .await?;
        Ok(runs.workflow_runs.into_iter().next())
    }
}

#[async_trait]
impl ForgeProvider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Github
    }

    async fn list_open_requests(&self, user: &str) -> Result<Vec<Candidate>, ProviderError> {
        let query = format!("is:pr is:open assignee:{}", user);
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let result: GhSearch = self
                .api
                .get_json(
                    "/search/issues",
                    &[
                        ("q", query.clone()),
                        ("per_page", SEARCH_PAGE_SIZE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let count = result.items.len();
            items.extend(result.items);
            if count < SEARCH_PAGE_SIZE {
                break;
            }
            page += 1;
        }

        // One unreadable pull request must not hide the others
        let mut candidates = Vec::with_capacity(items.len());
        for item in items {
            let Some(slug) = repo_slug(&item.repository_url) else {
                warn!(url = %item.repository_url, "search result has no repository slug; skipping");
                continue;
            };
            let pull: GhPull = match self
                .api
                .get_json(&format!("/repos/{}/pulls/{}", slug, item.number), &[])
                .await
            {
                Ok(pull) => pull,
                Err(e) => {
                    warn!(
                        repo = slug,
                        number = item.number,
                        error = %e,
                        "could not load pull request; skipping"
                    );
                    continue;
                }
            };
            let Some(project) = pull.base.repo.as_ref().map(|r| r.id) else {
                warn!(
                    repo = slug,
                    number = item.number,
                    "pull request has no base repository; skipping"
                );
                continue;
            };
            candidates.push(pull.into_candidate(project));
        }
        Ok(candidates)
    }

    async fn get_request(&self, project: u64, request: u64) -> Result<Candidate, ProviderError> {
        Ok(self.pull(project, request).await?.into_candidate(project))
    }

    async fn request_details(&self, project: u64, request: u64) -> Result<RequestDetails, ProviderError> {
        let pull = self.pull(project, request).await?;
        // Runs, jobs and logs all live in the repository hosting the head branch
        let source = pull.head.repo.as_ref().map(|r| r.id).unwrap_or(project);
        let pipeline = if pull.head.sha.is_empty() {
            None
        } else {
            self.latest_run(source, &pull.head.sha).await?.map(|run| PipelineRef {
                id: Some(run.id),
                status: run_status(run.status.as_deref(), run.conclusion.as_deref()),
                web_url: run.html_url,
            })
        };
        Ok(RequestDetails {
            has_conflicts: pull.mergeable_state.as_deref() == Some("dirty"),
            pipeline,
            target_branch: Some(pull.base.name),
            author: pull.user.map(|u| u.login),
            web_url: pull.html_url,
        })
    }

    async fn repository(&self, project: u64) -> Result<RepositoryInfo, ProviderError> {
        let repo: GhRepo = self.api.get_json(&format!("/repositories/{}", project), &[]).await?;
        Ok(repo.into())
    }

    async fn pipeline_jobs(&self, project: u64, pipeline: u64) -> Result<Vec<PipelineJob>, ProviderError> {
        let jobs: GhJobs = self
            .api
            .get_json(
                &format!("/repositories/{}/actions/runs/{}/jobs", project, pipeline),
                &[("per_page", "100".to_string())],
            )
            .await?;
        Ok(jobs
            .jobs
            .into_iter()
            .map(|j| PipelineJob {
                id: j.id,
                name: j.name,
                stage: j.workflow_name.unwrap_or_default(),
                status: run_status(j.status.as_deref(), j.conclusion.as_deref()),
            })
            .collect())
    }

    async fn job_log(&self, project: u64, job: u64) -> Result<String, ProviderError> {
        self.api
            .get_text(&format!("/repositories/{}/actions/jobs/{}/logs", project, job))
            .await
    }

    async fn create_request(&self, request: &NewRequest) -> Result<CreatedRequest, ProviderError> {
        let body = json!({
            "title": request.title,
            "body": request.body,
            "head": format!("{}:{}", request.source_owner, request.source_branch),
            "base": request.target_branch,
        });
        let created: GhCreated = self
            .api
            .post_json(&format!("/repositories/{}/pulls", request.target_project), &body)
            .await?;
        Ok(CreatedRequest {
            id: created.number,
            project_id: request.target_project,
            web_url: created.html_url,
        })
    }

    async fn find_fork(&self, owner: &str, name: &str) -> Result<Option<RepositoryInfo>, ProviderError> {
        let repo: Option<GhRepo> = self
            .api
            .get_optional_json(&format!("/repos/{}/{}", owner, name))
            .await?;
        Ok(repo.map(RepositoryInfo::from))
    }

    async fn fork_repository(&self, project: u64) -> Result<(), ProviderError> {
        self.api
            .post(&format!("/repositories/{}/forks", project), &json!({}))
            .await
    }

    fn push_url(&self, repo: &RepositoryInfo) -> Result<String, ProviderError> {
        let clone = repo
            .clone_url
            .as_deref()
            .ok_or_else(|| ProviderError::Config(format!("{} has no clone URL", repo.full_name())))?;
        authenticated_url(clone, "x-access-token", &self.token)
    }

    fn supports_author_attribution(&self) -> bool {
        true
    }
}
