use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use super::WorkflowPlan;
use super::fork::ForkCoordinator;
use crate::errors::WorkflowError;
use crate::models::{CreatedRequest, NewRequest, RepositoryInfo};
use crate::provider::ForgeProvider;
use crate::workspace::Workspace;

/// Where the finished branch goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum PushRoute {
    /// Force-push the request's own source branch
    Direct { branch: String },
    /// Push to the bot's fork and open a replacement request
    ForkRedirect { branch: String },
}

impl PushRoute {
    pub fn branch(&self) -> &str {
        match self {
            PushRoute::Direct { branch } | PushRoute::ForkRedirect { branch } => branch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushReport {
    pub route: PushRoute,
    pub replacement: Option<CreatedRequest>,
}

/// Branch name used in the bot's fork for a redirected request.
pub fn fork_branch_name(request: u64) -> String {
    format!("fix-request-{}", request)
}

/// True when the forge can attribute authors and the author is someone other
/// than the bot. An unknown author is treated as the bot's own request.
pub fn is_others_request(supports_attribution: bool, author: Option<&str>, bot_username: &str) -> bool {
    supports_attribution && author.is_some_and(|a| !a.eq_ignore_ascii_case(bot_username))
}

pub struct PushRouter<'a> {
    provider: &'a dyn ForgeProvider,
    workspace: &'a dyn Workspace,
    forks: ForkCoordinator<'a>,
    bot_username: &'a str,
    marker: &'a str,
}

impl<'a> PushRouter<'a> {
    pub fn new(
        provider: &'a dyn ForgeProvider,
        workspace: &'a dyn Workspace,
        forks: ForkCoordinator<'a>,
        bot_username: &'a str,
        marker: &'a str,
    ) -> Self {
        Self {
            provider,
            workspace,
            forks,
            bot_username,
            marker,
        }
    }

    pub fn route(&self, plan: &WorkflowPlan) -> PushRoute {
        if is_others_request(
            self.provider.supports_author_attribution(),
            plan.author.as_deref(),
            self.bot_username,
        ) {
            PushRoute::ForkRedirect {
                branch: fork_branch_name(plan.candidate.id),
            }
        } else {
            PushRoute::Direct {
                branch: plan.source_branch().to_string(),
            }
        }
    }

    /// Force-push the working copy along the chosen route. `source_repo` is the
    /// repository the working copy was cloned from.
    pub async fn finalize(
        &self,
        plan: &WorkflowPlan,
        source_repo: &RepositoryInfo,
        path: &Path,
    ) -> Result<PushReport, WorkflowError> {
        match self.route(plan) {
            PushRoute::Direct { branch } => {
                let url = self.provider.push_url(source_repo)?;
                self.force_push(path, &branch, &url).await?;
                info!(branch = %branch, "pushed directly");
                Ok(PushReport {
                    route: PushRoute::Direct { branch },
                    replacement: None,
                })
            }
            PushRoute::ForkRedirect { branch } => self.redirect_through_fork(plan, path, branch).await,
        }
    }

    async fn redirect_through_fork(
        &self,
        plan: &WorkflowPlan,
        path: &Path,
        branch: String,
    ) -> Result<PushReport, WorkflowError> {
        let candidate = &plan.candidate;
        let upstream = self.provider.repository(candidate.project_id).await?;
        let fork = self.forks.ensure_fork(&upstream).await?;

        let url = self.provider.push_url(&fork)?;
        self.force_push(path, &branch, &url).await?;
        info!(fork = %fork.full_name(), branch = %branch, "pushed to fork");

        let created = self
            .provider
            .create_request(&NewRequest {
                source_project: fork.id,
                source_owner: fork.owner.clone(),
                source_branch: branch.clone(),
                target_project: candidate.project_id,
                target_branch: plan.target_branch.clone(),
                title: format!("Fixes for request #{}: {}", candidate.id, candidate.title),
                body: replacement_body(plan, self.marker),
            })
            .await?;
        info!(replacement = created.id, "opened replacement request");

        if let Some(assignees) = self.provider.assignee_management() {
            if let Err(e) = assignees
                .unassign(candidate.project_id, candidate.id, self.bot_username)
                .await
            {
                warn!(error = %e, "could not unassign bot from original request");
            }
            if let Err(e) = assignees
                .assign(created.project_id, created.id, self.bot_username)
                .await
            {
                warn!(error = %e, "could not assign bot to replacement request");
            }
        }

        Ok(PushReport {
            route: PushRoute::ForkRedirect { branch },
            replacement: Some(created),
        })
    }

    async fn force_push(&self, path: &Path, branch: &str, url: &str) -> Result<(), WorkflowError> {
        self.workspace
            .push(path, branch, url, true)
            .await
            .map_err(|e| WorkflowError::PushFailed {
                branch: branch.to_string(),
                message: e.to_string(),
            })
    }
}

fn replacement_body(plan: &WorkflowPlan, marker: &str) -> String {
    let action = plan
        .kind
        .map(|k| k.verb().to_lowercase())
        .unwrap_or_else(|| "apply fixes".to_string());
    format!(
        "This request replaces #{id} (\"{title}\").\n\n\
         The bot cannot push to the original source branch `{branch}`, so the changes made to \
         {action} were pushed from its fork instead. Merge this request in place of #{id}, or \
         cherry-pick the commits onto `{branch}`.\n\n{marker}.",
        id = plan.candidate.id,
        title = plan.candidate.title,
        branch = plan.source_branch(),
        action = action,
        marker = marker,
    )
}
