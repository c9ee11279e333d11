use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::changes::{ChangeDecision, detect_changes};
use super::conflict::trigger_conflicts;
use super::fork::ForkCoordinator;
use super::push::{PushReport, PushRouter};
use super::{Finalize, OutcomeStatus, WorkflowOutcome, WorkflowPlan, WorkflowState};
use crate::agent::{Agent, AgentOutcome};
use crate::config::MedicToml;
use crate::errors::WorkflowError;
use crate::models::RepositoryInfo;
use crate::provider::ForgeProvider;
use crate::workspace::{ResetMode, Workspace, workspace_path};

/// Everything the engine needs from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub workspace_root: PathBuf,
    pub reset_mode: ResetMode,
    pub bot_username: String,
    pub committer_name: String,
    pub committer_email: String,
    pub marker: String,
    pub fork_poll_interval: Duration,
    pub fork_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &MedicToml) -> Self {
        Self {
            workspace_root: config.workspace_root(),
            reset_mode: config.workspace.reset,
            bot_username: config.bot.username.clone(),
            committer_name: config.bot.committer_name().to_string(),
            committer_email: config.bot.email.clone(),
            marker: config.bot.attribution_marker.clone(),
            fork_poll_interval: config.fork.poll_interval(),
            fork_timeout: config.fork.timeout(),
        }
    }
}

// Stage values. Each transition consumes the previous one.

struct Resolved {
    repo: RepositoryInfo,
}

struct Prepared {
    repo: RepositoryInfo,
    path: PathBuf,
}

struct Invoked {
    prepared: Prepared,
    agent: AgentOutcome,
}

struct Evaluated {
    invoked: Invoked,
    decision: ChangeDecision,
}

enum Completion {
    NoOp,
    Finalized {
        summary: String,
        push: Option<PushReport>,
    },
}

/// What is known about a run so far; survives an early return with an error.
struct Progress {
    reached: WorkflowState,
    agent: Option<AgentOutcome>,
}

pub struct WorkflowEngine {
    provider: Arc<dyn ForgeProvider>,
    workspace: Arc<dyn Workspace>,
    agent: Arc<dyn Agent>,
    settings: EngineSettings,
}

impl WorkflowEngine {
    pub fn new(
        provider: Arc<dyn ForgeProvider>,
        workspace: Arc<dyn Workspace>,
        agent: Arc<dyn Agent>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            provider,
            workspace,
            agent,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one candidate to a terminal state. Never returns an error: every
    /// failure becomes a `Failed` or `Skipped` outcome.
    pub async fn run(&self, plan: &WorkflowPlan, finalize: Option<&dyn Finalize>) -> WorkflowOutcome {
        let span = info_span!("workflow", server = %plan.server, request = plan.candidate.id);
        async move {
            let mut progress = Progress {
                reached: WorkflowState::Init,
                agent: None,
            };
            let result = self.drive(plan, finalize, &mut progress).await;
            let outcome = self.conclude(plan, result, progress);
            info!(
                status = ?outcome.status,
                state = %outcome.last_state,
                reason = %outcome.reason,
                "workflow finished"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        plan: &WorkflowPlan,
        finalize: Option<&dyn Finalize>,
        progress: &mut Progress,
    ) -> Result<Completion, WorkflowError> {
        let resolved = self.resolve(plan).await?;
        progress.reached = WorkflowState::RepositoryResolved;

        let prepared = self.prepare(plan, resolved).await?;
        progress.reached = WorkflowState::WorkspacePrepared;

        if plan.trigger_conflicts {
            trigger_conflicts(
                self.workspace.as_ref(),
                &prepared.path,
                &plan.target_branch,
                &plan.commit_message,
            )
            .await?;
            progress.reached = WorkflowState::ConflictTriggered;
        }

        let invoked = self.invoke(plan, prepared).await?;
        progress.agent = Some(invoked.agent);
        progress.reached = WorkflowState::AgentInvoked;

        if plan.skip_commit {
            progress.reached = WorkflowState::ChangesEvaluated;
            let finalize = finalize.ok_or_else(|| {
                WorkflowError::Finalize("read-only run has no finalize step".to_string())
            })?;
            let summary = finalize.finalize(plan, &invoked.prepared.path).await?;
            return Ok(Completion::Finalized { summary, push: None });
        }

        let evaluated = self.evaluate(plan, invoked).await?;
        progress.reached = WorkflowState::ChangesEvaluated;

        let Prepared { repo, path } = match evaluated.decision {
            ChangeDecision::NoChanges => return Ok(Completion::NoOp),
            ChangeDecision::Pending { .. } => {
                let prepared = self.commit(plan, evaluated.invoked).await?;
                progress.reached = WorkflowState::Committed;
                prepared
            }
            ChangeDecision::AheadOnly { commits } => {
                info!(commits, "agent committed its own work; nothing to commit");
                self.mark_head(plan, &evaluated.invoked.prepared.path).await?;
                evaluated.invoked.prepared
            }
        };

        let report = self.router().finalize(plan, &repo, &path).await?;
        let summary = match &report.replacement {
            Some(created) => format!("pushed {} and opened request #{}", report.route.branch(), created.id),
            None => format!("pushed {}", report.route.branch()),
        };
        Ok(Completion::Finalized {
            summary,
            push: Some(report),
        })
    }

    /// Repository hosting the source branch; for fork requests this is the
    /// source project, not the one receiving the request.
    async fn resolve(&self, plan: &WorkflowPlan) -> Result<Resolved, WorkflowError> {
        let candidate = &plan.candidate;
        if candidate.source_branch.trim().is_empty() {
            return Err(WorkflowError::MissingSourceBranch { request: candidate.id });
        }
        let project = candidate.source_project();
        let repo = self.provider.repository(project).await?;
        if repo.clone_url.as_deref().is_none_or(str::is_empty) {
            return Err(WorkflowError::MissingCloneUrl { project });
        }
        Ok(Resolved { repo })
    }

    async fn prepare(&self, plan: &WorkflowPlan, resolved: Resolved) -> Result<Prepared, WorkflowError> {
        let repo = resolved.repo;
        let path = workspace_path(
            &self.settings.workspace_root,
            &plan.server,
            repo.id,
            &repo.name,
            &plan.label,
        );
        let remote = self.provider.push_url(&repo)?;
        self.workspace
            .reset_repository(&path, plan.source_branch(), &remote, self.settings.reset_mode)
            .await?;
        self.workspace
            .set_identity(&path, &self.settings.committer_name, &self.settings.committer_email)
            .await?;
        Ok(Prepared { repo, path })
    }

    async fn invoke(&self, plan: &WorkflowPlan, prepared: Prepared) -> Result<Invoked, WorkflowError> {
        let agent = self
            .agent
            .invoke(&prepared.path, &plan.prompt, plan.hide_history)
            .await?;
        if !agent.is_success() {
            warn!(agent = %agent, "agent did not succeed; checking for usable changes anyway");
        }
        Ok(Invoked { prepared, agent })
    }

    async fn evaluate(&self, plan: &WorkflowPlan, invoked: Invoked) -> Result<Evaluated, WorkflowError> {
        let decision = detect_changes(
            self.workspace.as_ref(),
            &invoked.prepared.path,
            plan.source_branch(),
        )
        .await?;
        Ok(Evaluated { invoked, decision })
    }

    async fn commit(&self, plan: &WorkflowPlan, invoked: Invoked) -> Result<Prepared, WorkflowError> {
        let prepared = invoked.prepared;
        let branch = plan.source_branch();
        if plan.trigger_conflicts {
            let unresolved = self.workspace.conflicted_files(&prepared.path).await?;
            if !unresolved.is_empty() {
                return Err(WorkflowError::CommitFailed {
                    branch: branch.to_string(),
                    message: format!("unresolved conflicts remain in {}", unresolved.join(", ")),
                });
            }
        }
        self.workspace
            .commit(&prepared.path, &plan.commit_message, branch)
            .await
            .map_err(|e| WorkflowError::CommitFailed {
                branch: branch.to_string(),
                message: e.to_string(),
            })?;
        Ok(prepared)
    }

    /// Later scans only recognise bot work by the marker, so an agent commit
    /// without it gets the plan's message appended before the push.
    async fn mark_head(&self, plan: &WorkflowPlan, path: &Path) -> Result<(), WorkflowError> {
        let head = self.workspace.head_message(path).await?;
        if head.contains(&self.settings.marker) {
            return Ok(());
        }
        debug!("agent commit lacks the attribution marker; amending its message");
        let message = format!("{}\n\n{}", head.trim_end(), plan.commit_message);
        self.workspace
            .amend_message(path, &message)
            .await
            .map_err(|e| WorkflowError::CommitFailed {
                branch: plan.source_branch().to_string(),
                message: e.to_string(),
            })
    }

    fn router(&self) -> PushRouter<'_> {
        let forks = ForkCoordinator::new(
            self.provider.as_ref(),
            &self.settings.bot_username,
            self.settings.fork_poll_interval,
            self.settings.fork_timeout,
        );
        PushRouter::new(
            self.provider.as_ref(),
            self.workspace.as_ref(),
            forks,
            &self.settings.bot_username,
            &self.settings.marker,
        )
    }

    /// Success combines the agent's result with whether usable changes came out.
    fn conclude(
        &self,
        plan: &WorkflowPlan,
        result: Result<Completion, WorkflowError>,
        progress: Progress,
    ) -> WorkflowOutcome {
        let id = plan.candidate.id;
        let agent_ok = progress.agent.is_none_or(|a| a.is_success());
        let mut outcome = match result {
            Ok(Completion::NoOp) if agent_ok => WorkflowOutcome::new(
                id,
                OutcomeStatus::Skipped,
                "agent made no changes and nothing is ahead of the remote",
                WorkflowState::NoOp,
            ),
            Ok(Completion::NoOp) => WorkflowOutcome::new(
                id,
                OutcomeStatus::Failed,
                format!(
                    "agent {} and left no changes",
                    progress.agent.map(|a| a.to_string()).unwrap_or_default()
                ),
                WorkflowState::NoOp,
            ),
            Ok(Completion::Finalized { summary, push }) => {
                let reason = if agent_ok {
                    summary
                } else {
                    format!(
                        "{} (agent {})",
                        summary,
                        progress.agent.map(|a| a.to_string()).unwrap_or_default()
                    )
                };
                let mut outcome =
                    WorkflowOutcome::new(id, OutcomeStatus::Succeeded, reason, WorkflowState::Finalized);
                if let Some(report) = push {
                    outcome.pushed_branch = Some(report.route.branch().to_string());
                    outcome.replacement = report.replacement;
                }
                outcome
            }
            Err(e) => {
                if e.is_skip() {
                    warn!(candidate = id, error = %e, "candidate skipped");
                } else {
                    error!(candidate = id, state = %progress.reached, error = %e, "candidate failed");
                }
                WorkflowOutcome::from_error(id, &e, progress.reached)
            }
        };
        outcome.agent = progress.agent;
        outcome.with_kind(plan.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{
        FakeProvider, RecordingFinalize, RemoteFixture, ScriptedAgent, candidate, commit_file, git,
        repo_info,
    };
    use crate::models::Candidate;
    use crate::triage::{AttentionSignal, RemediationDirective, RemediationKind};
    use crate::workspace::GitWorkspace;
    use tempfile::{TempDir, tempdir};

    const MARKER: &str = "Automated change by medic";

    fn settings(root: &Path) -> EngineSettings {
        EngineSettings {
            workspace_root: root.to_path_buf(),
            reset_mode: ResetMode::Reuse,
            bot_username: "medic-bot".into(),
            committer_name: "Medic Bot".into(),
            committer_email: "medic@test".into(),
            marker: MARKER.into(),
            fork_poll_interval: Duration::from_millis(5),
            fork_timeout: Duration::from_secs(5),
        }
    }

    fn engine(provider: Arc<FakeProvider>, agent: Arc<ScriptedAgent>, root: &TempDir) -> WorkflowEngine {
        WorkflowEngine::new(provider, Arc::new(GitWorkspace::new()), agent, settings(root.path()))
    }

    fn plan(candidate: &Candidate, kind: RemediationKind, author: Option<&str>) -> WorkflowPlan {
        let mut signal = AttentionSignal::quiet("main");
        signal.author = author.map(String::from);
        let directive = RemediationDirective {
            kind,
            prompt: format!("please {kind}"),
            commit_message: crate::triage::selector::commit_message(kind, candidate.id, MARKER),
        };
        WorkflowPlan::for_directive("gitlab", candidate, &signal, directive, false)
    }

    fn provider_for(fixture: &RemoteFixture) -> FakeProvider {
        FakeProvider::new().with_repo(repo_info(10, "team", "widgets", &fixture.url()))
    }

    #[tokio::test]
    async fn scenario_a_conflicts_resolved_and_pushed() {
        let fixture = RemoteFixture::new();
        fixture.commit_on("main", "a.cs", "main a\n", "main a");
        fixture.commit_on("main", "b.cs", "main b\n", "main b");
        fixture.commit_on("feature", "a.cs", "feature a\n", "feature a");
        fixture.commit_on("feature", "b.cs", "feature b\n", "feature b");
        let provider = Arc::new(provider_for(&fixture));
        let agent = Arc::new(ScriptedAgent::new(AgentOutcome::Succeeded, |dir| {
            assert!(std::fs::read_to_string(dir.join("a.cs")).unwrap().contains("<<<<<<<"));
            std::fs::write(dir.join("a.cs"), "merged a\n").unwrap();
            std::fs::write(dir.join("b.cs"), "merged b\n").unwrap();
            git(dir, &["add", "-A"]);
            git(dir, &["commit", "--no-edit"]);
        }));
        let root = tempdir().unwrap();

        let plan = plan(&candidate(7), RemediationKind::ResolveConflict, None);
        let outcome = engine(provider, agent.clone(), &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Succeeded, "{}", outcome.reason);
        assert_eq!(outcome.last_state, WorkflowState::Finalized);
        assert_eq!(outcome.pushed_branch.as_deref(), Some("feature"));
        assert_eq!(agent.prompts().len(), 1);
        let remote_head = fixture.branch_head("feature").unwrap();
        let path = workspace_path(root.path(), "gitlab", 10, "widgets", "request-7");
        assert_eq!(git(&path, &["rev-parse", "HEAD"]).trim(), remote_head);
    }

    #[tokio::test]
    async fn scenario_c_third_party_request_is_redirected_through_fork() {
        let upstream = RemoteFixture::new();
        let fork = RemoteFixture::new();
        let provider = Arc::new(
            provider_for(&upstream).with_fork(repo_info(55, "medic-bot", "widgets", &fork.url()), 1),
        );
        let agent = Arc::new(ScriptedAgent::new(AgentOutcome::Succeeded, |dir| {
            std::fs::write(dir.join("fix.txt"), "fixed\n").unwrap();
        }));
        let root = tempdir().unwrap();
        let before = upstream.branch_head("feature");

        let plan = plan(&candidate(7), RemediationKind::FixPipeline, Some("alice"));
        let outcome = engine(provider.clone(), agent, &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Succeeded, "{}", outcome.reason);
        assert_eq!(outcome.pushed_branch.as_deref(), Some("fix-request-7"));
        assert!(fork.branch_head("fix-request-7").is_some());
        assert_eq!(upstream.branch_head("feature"), before);
        assert_eq!(
            fork.log_subjects("fix-request-7")[0],
            "Fix failed pipeline for request #7"
        );

        let calls = provider.calls();
        assert_eq!(calls.forks_requested, vec![10]);
        assert_eq!(calls.created.len(), 1);
        let created = &calls.created[0];
        assert_eq!(created.source_project, 55);
        assert_eq!(created.target_project, 10);
        assert_eq!(created.target_branch, "main");
        assert_eq!(created.source_branch, "fix-request-7");
        assert!(created.title.contains("#7"));
        assert_eq!(calls.unassigned, vec![(10, 7, "medic-bot".to_string())]);
        let replacement = outcome.replacement.unwrap();
        assert_eq!(calls.assigned, vec![(10, replacement.id, "medic-bot".to_string())]);
    }

    #[tokio::test]
    async fn scenario_d_failed_agent_with_commits_still_pushes() {
        let fixture = RemoteFixture::new();
        let provider = Arc::new(provider_for(&fixture));
        let agent = Arc::new(ScriptedAgent::new(AgentOutcome::TimedOut, |dir| {
            commit_file(dir, "one.txt", "1", "agent step one");
            commit_file(dir, "two.txt", "2", "agent step two");
        }));
        let root = tempdir().unwrap();

        let plan = plan(&candidate(7), RemediationKind::FixPipeline, None);
        let outcome = engine(provider, agent, &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Succeeded, "{}", outcome.reason);
        assert_eq!(outcome.last_state, WorkflowState::Finalized);
        assert_eq!(outcome.agent, Some(AgentOutcome::TimedOut));
        assert!(outcome.reason.contains("timed out"));
        let subjects = fixture.log_subjects("feature");
        assert_eq!(subjects[0], "agent step two");
        assert_eq!(subjects[1], "agent step one");
    }

    #[tokio::test]
    async fn agent_commits_are_pushed_with_marker() {
        let fixture = RemoteFixture::new();
        let provider = Arc::new(provider_for(&fixture));
        let agent = Arc::new(ScriptedAgent::new(AgentOutcome::Succeeded, |dir| {
            commit_file(dir, "feature.txt", "reviewed\n", "Address reviewer comments");
        }));
        let root = tempdir().unwrap();

        let plan = plan(&candidate(7), RemediationKind::AddressReview, None);
        let outcome = engine(provider, agent, &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Succeeded, "{}", outcome.reason);
        let path = workspace_path(root.path(), "gitlab", 10, "widgets", "request-7");
        let head = git(&path, &["rev-parse", "HEAD"]);
        assert_eq!(fixture.branch_head("feature").as_deref(), Some(head.trim()));
        assert_eq!(fixture.log_subjects("feature")[0], "Address reviewer comments");
        let body = git(&path, &["log", "-1", "--format=%B"]);
        assert!(body.contains(MARKER), "pushed message: {body}");

        // The pushed head now counts as bot activity for the next scan
        let pushed = vec![crate::models::CommitInfo {
            message: body,
            created_at: crate::fakes::ts("2026-01-02T00:00:00Z"),
        }];
        let last_bot = crate::triage::classifier::last_bot_action_time(&pushed, &[], MARKER);
        assert!(last_bot > crate::fakes::ts("2026-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn marked_agent_commit_is_left_alone() {
        let fixture = RemoteFixture::new();
        let provider = Arc::new(provider_for(&fixture));
        let agent = Arc::new(ScriptedAgent::new(AgentOutcome::Succeeded, |dir| {
            commit_file(
                dir,
                "feature.txt",
                "reviewed\n",
                "Address review feedback for request #7\n\nAutomated change by medic.",
            );
        }));
        let root = tempdir().unwrap();

        let plan = plan(&candidate(7), RemediationKind::AddressReview, None);
        let outcome = engine(provider, agent, &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Succeeded, "{}", outcome.reason);
        let path = workspace_path(root.path(), "gitlab", 10, "widgets", "request-7");
        let body = git(&path, &["log", "-1", "--format=%B"]);
        assert_eq!(body.matches(MARKER).count(), 1);
    }

    #[tokio::test]
    async fn idle_agent_is_a_no_op_without_commit_or_push() {
        let fixture = RemoteFixture::new();
        let provider = Arc::new(provider_for(&fixture));
        let agent = Arc::new(ScriptedAgent::noop(AgentOutcome::Succeeded));
        let root = tempdir().unwrap();
        let before = fixture.branch_head("feature");

        let plan = plan(&candidate(7), RemediationKind::AddressReview, None);
        let outcome = engine(provider.clone(), agent, &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.last_state, WorkflowState::NoOp);
        assert!(outcome.pushed_branch.is_none());
        assert_eq!(fixture.branch_head("feature"), before);
        let path = workspace_path(root.path(), "gitlab", 10, "widgets", "request-7");
        assert_eq!(git(&path, &["rev-parse", "HEAD"]).trim(), before.unwrap());
        assert!(provider.calls().created.is_empty());
    }

    #[tokio::test]
    async fn failed_agent_without_changes_fails_candidate() {
        let fixture = RemoteFixture::new();
        let provider = Arc::new(provider_for(&fixture));
        let agent = Arc::new(ScriptedAgent::noop(AgentOutcome::Failed { exit_code: Some(1) }));
        let root = tempdir().unwrap();

        let plan = plan(&candidate(7), RemediationKind::FixPipeline, None);
        let outcome = engine(provider, agent, &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.last_state, WorkflowState::NoOp);
    }

    #[tokio::test]
    async fn pending_edits_are_committed_with_marker() {
        let fixture = RemoteFixture::new();
        let provider = Arc::new(provider_for(&fixture));
        let agent = Arc::new(ScriptedAgent::new(AgentOutcome::Succeeded, |dir| {
            std::fs::write(dir.join("feature.txt"), "reviewed\n").unwrap();
        }));
        let root = tempdir().unwrap();

        let plan = plan(&candidate(7), RemediationKind::AddressReview, None);
        let outcome = engine(provider, agent, &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Succeeded, "{}", outcome.reason);
        let body = git(
            &workspace_path(root.path(), "gitlab", 10, "widgets", "request-7"),
            &["log", "-1", "--format=%B"],
        );
        assert!(body.starts_with("Address review feedback for request #7"));
        assert!(body.contains(MARKER));
        let author = git(
            &workspace_path(root.path(), "gitlab", 10, "widgets", "request-7"),
            &["log", "-1", "--format=%an <%ae>"],
        );
        assert_eq!(author.trim(), "Medic Bot <medic@test>");
    }

    #[tokio::test]
    async fn unresolved_conflicts_are_not_committed() {
        let fixture = RemoteFixture::new();
        fixture.commit_on("main", "a.cs", "main a\n", "main a");
        fixture.commit_on("feature", "a.cs", "feature a\n", "feature a");
        let provider = Arc::new(provider_for(&fixture));
        let agent = Arc::new(ScriptedAgent::noop(AgentOutcome::Succeeded));
        let root = tempdir().unwrap();
        let before = fixture.branch_head("feature");

        let plan = plan(&candidate(7), RemediationKind::ResolveConflict, None);
        let outcome = engine(provider, agent, &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.failed_after, Some(WorkflowState::ChangesEvaluated));
        assert!(outcome.reason.contains("unresolved conflicts"));
        assert_eq!(fixture.branch_head("feature"), before);
    }

    #[tokio::test]
    async fn fork_sourced_request_clones_source_project() {
        let fixture = RemoteFixture::new();
        let provider = Arc::new(FakeProvider::new().with_repo(repo_info(42, "contributor", "widgets", &fixture.url())));
        let agent = Arc::new(ScriptedAgent::noop(AgentOutcome::Succeeded));
        let root = tempdir().unwrap();
        let mut request = candidate(7);
        request.source_project_id = Some(42);

        let plan = plan(&request, RemediationKind::FixPipeline, None);
        let outcome = engine(provider.clone(), agent, &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Skipped, "{}", outcome.reason);
        assert_eq!(provider.calls().repositories, vec![42]);
        assert!(workspace_path(root.path(), "gitlab", 42, "widgets", "request-7").exists());
    }

    #[tokio::test]
    async fn missing_source_branch_is_skipped_before_cloning() {
        let provider = Arc::new(FakeProvider::new());
        let agent = Arc::new(ScriptedAgent::noop(AgentOutcome::Succeeded));
        let root = tempdir().unwrap();
        let mut request = candidate(7);
        request.source_branch = String::new();

        let plan = plan(&request, RemediationKind::FixPipeline, None);
        let outcome = engine(provider.clone(), agent.clone(), &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.failed_after, Some(WorkflowState::Init));
        assert!(provider.calls().repositories.is_empty());
        assert!(agent.prompts().is_empty());
    }

    #[tokio::test]
    async fn missing_clone_url_fails() {
        let mut repo = repo_info(10, "team", "widgets", "");
        repo.clone_url = None;
        let provider = Arc::new(FakeProvider::new().with_repo(repo));
        let agent = Arc::new(ScriptedAgent::noop(AgentOutcome::Succeeded));
        let root = tempdir().unwrap();

        let plan = plan(&candidate(7), RemediationKind::FixPipeline, None);
        let outcome = engine(provider, agent, &root).run(&plan, None).await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.reason.contains("no clone URL"));
    }

    #[tokio::test]
    async fn read_only_run_hands_off_to_finalize() {
        let fixture = RemoteFixture::new();
        let provider = Arc::new(provider_for(&fixture));
        let agent = Arc::new(ScriptedAgent::new(AgentOutcome::Succeeded, |dir| {
            std::fs::create_dir_all(dir.join(".medic")).unwrap();
            std::fs::write(dir.join(".medic/review.md"), "looks fine").unwrap();
        }));
        let finalize = RecordingFinalize::default();
        let root = tempdir().unwrap();
        let before = fixture.branch_head("feature");

        let plan = WorkflowPlan::read_only("gitlab", &candidate(7), "main", "review".into(), false);
        let outcome = engine(provider, agent, &root).run(&plan, Some(&finalize)).await;

        assert_eq!(outcome.status, OutcomeStatus::Succeeded, "{}", outcome.reason);
        assert_eq!(outcome.last_state, WorkflowState::Finalized);
        assert_eq!(finalize.artifacts(), vec!["looks fine".to_string()]);
        assert_eq!(fixture.branch_head("feature"), before);
    }

    #[tokio::test]
    async fn read_only_run_without_finalize_fails() {
        let fixture = RemoteFixture::new();
        let provider = Arc::new(provider_for(&fixture));
        let agent = Arc::new(ScriptedAgent::noop(AgentOutcome::Succeeded));
        let root = tempdir().unwrap();

        let plan = WorkflowPlan::read_only("gitlab", &candidate(7), "main", "review".into(), false);
        let outcome = engine(provider, agent, &root).run(&plan, None).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
    }
}
