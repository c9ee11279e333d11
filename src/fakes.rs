//! Test doubles shared by the unit tests: a scriptable forge, a scripted
//! agent, and bare git remotes on disk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tempfile::TempDir;

use crate::agent::{Agent, AgentOutcome};
use crate::config::ProviderKind;
use crate::errors::{ProviderError, WorkflowError};
use crate::models::{
    Candidate, CommitInfo, CreatedRequest, Discussion, NewRequest, Note, PipelineJob, RepositoryInfo,
    RequestDetails,
};
use crate::provider::{AssigneeManagement, ForgeProvider, ReviewDiscussions};
use crate::triage::prompts::REVIEW_ARTIFACT;
use crate::workflow::{Finalize, WorkflowPlan};

pub fn candidate(id: u64) -> Candidate {
    Candidate {
        id,
        title: format!("Request {id}"),
        project_id: 10,
        source_project_id: None,
        source_branch: "feature".into(),
        target_branch: None,
    }
}

pub fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

pub fn repo_info(id: u64, owner: &str, name: &str, clone_url: &str) -> RepositoryInfo {
    RepositoryInfo {
        id,
        name: name.into(),
        owner: owner.into(),
        clone_url: Some(clone_url.into()),
        default_branch: Some("main".into()),
    }
}

/// Run git synchronously, asserting success; returns stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Fixture",
            "-c",
            "user.email=fixture@test",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Write `name` in a working copy and commit it.
pub fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
    std::fs::write(dir.join(name), content).unwrap();
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-m", message]);
}

/// A bare repository with `main` (README.md) and `feature` (adds
/// feature.txt), plus a seed clone used to add commits later.
pub struct RemoteFixture {
    _dir: TempDir,
    bare: PathBuf,
    seed: PathBuf,
}

impl RemoteFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("remote.git");
        let seed = dir.path().join("seed");
        git(dir.path(), &["init", "--bare", bare.to_str().unwrap()]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        git(dir.path(), &["init", seed.to_str().unwrap()]);
        git(&seed, &["checkout", "-B", "main"]);
        git(&seed, &["remote", "add", "origin", bare.to_str().unwrap()]);
        commit_file(&seed, "README.md", "# widgets\n", "initial");
        git(&seed, &["push", "origin", "main"]);
        git(&seed, &["checkout", "-B", "feature"]);
        commit_file(&seed, "feature.txt", "feature work\n", "add feature");
        git(&seed, &["push", "origin", "feature"]);

        Self { _dir: dir, bare, seed }
    }

    pub fn url(&self) -> String {
        self.bare.to_string_lossy().into_owned()
    }

    pub fn commit_on(&self, branch: &str, file: &str, content: &str, message: &str) {
        git(&self.seed, &["fetch", "origin"]);
        git(&self.seed, &["checkout", "-B", branch, &format!("origin/{branch}")]);
        commit_file(&self.seed, file, content, message);
        git(&self.seed, &["push", "origin", branch]);
    }

    pub fn branch_head(&self, branch: &str) -> Option<String> {
        let output = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .current_dir(&self.bare)
            .output()
            .unwrap();
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Commit subjects on `branch`, newest first.
    pub fn log_subjects(&self, branch: &str) -> Vec<String> {
        git(&self.bare, &["log", "--format=%s", branch])
            .lines()
            .map(String::from)
            .collect()
    }
}

/// Every provider call a test may want to assert on.
#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub details: Vec<(u64, u64)>,
    pub repositories: Vec<u64>,
    pub job_projects: Vec<u64>,
    pub fork_lookups: usize,
    pub forks_requested: Vec<u64>,
    pub created: Vec<NewRequest>,
    pub assigned: Vec<(u64, u64, String)>,
    pub unassigned: Vec<(u64, u64, String)>,
    pub notes_posted: Vec<(u64, u64, String)>,
}

#[derive(Default)]
struct FakeState {
    calls: Calls,
    hidden_fork_lookups: usize,
}

/// In-memory forge. Every capability is on unless switched off.
pub struct FakeProvider {
    details: RequestDetails,
    per_request: HashMap<u64, RequestDetails>,
    commits: Vec<CommitInfo>,
    notes: Vec<Note>,
    discussions: bool,
    discussions_fail: bool,
    attribution: bool,
    assignees: bool,
    jobs: HashMap<u64, Vec<PipelineJob>>,
    logs: HashMap<u64, String>,
    repos: HashMap<u64, RepositoryInfo>,
    fork: Option<RepositoryInfo>,
    candidates: Vec<Candidate>,
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            details: RequestDetails::default(),
            per_request: HashMap::new(),
            commits: Vec::new(),
            notes: Vec::new(),
            discussions: true,
            discussions_fail: false,
            attribution: true,
            assignees: true,
            jobs: HashMap::new(),
            logs: HashMap::new(),
            repos: HashMap::new(),
            fork: None,
            candidates: Vec::new(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_details(mut self, details: RequestDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_request_details(mut self, request: u64, details: RequestDetails) -> Self {
        self.per_request.insert(request, details);
        self
    }

    pub fn with_commits(mut self, commits: Vec<CommitInfo>) -> Self {
        self.commits = commits;
        self
    }

    pub fn with_notes(mut self, notes: Vec<Note>) -> Self {
        self.notes = notes;
        self
    }

    pub fn failing_discussions(mut self) -> Self {
        self.discussions_fail = true;
        self
    }

    pub fn without_discussions(mut self) -> Self {
        self.discussions = false;
        self
    }

    pub fn without_attribution(mut self) -> Self {
        self.attribution = false;
        self
    }

    pub fn without_assignees(mut self) -> Self {
        self.assignees = false;
        self
    }

    pub fn with_jobs(mut self, project: u64, jobs: Vec<PipelineJob>) -> Self {
        self.jobs.insert(project, jobs);
        self
    }

    pub fn with_job_log(mut self, job: u64, log: &str) -> Self {
        self.logs.insert(job, log.to_string());
        self
    }

    pub fn with_repo(mut self, repo: RepositoryInfo) -> Self {
        self.repos.insert(repo.id, repo);
        self
    }

    /// The bot's fork; the first `hidden_lookups` lookups do not see it.
    pub fn with_fork(mut self, fork: RepositoryInfo, hidden_lookups: usize) -> Self {
        self.fork = Some(fork);
        self.state.get_mut().unwrap().hidden_fork_lookups = hidden_lookups;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, f: impl FnOnce(&mut Calls)) {
        f(&mut self.state.lock().unwrap().calls);
    }

    fn not_found(endpoint: String) -> ProviderError {
        ProviderError::Status {
            endpoint,
            status: 404,
            body: "not found".into(),
        }
    }
}

#[async_trait]
impl ForgeProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gitlab
    }

    async fn list_open_requests(&self, _user: &str) -> Result<Vec<Candidate>, ProviderError> {
        Ok(self.candidates.clone())
    }

    async fn get_request(&self, project: u64, request: u64) -> Result<Candidate, ProviderError> {
        self.candidates
            .iter()
            .find(|c| c.project_id == project && c.id == request)
            .cloned()
            .ok_or_else(|| Self::not_found(format!("/projects/{project}/requests/{request}")))
    }

    async fn request_details(&self, project: u64, request: u64) -> Result<RequestDetails, ProviderError> {
        self.record(|c| c.details.push((project, request)));
        Ok(self
            .per_request
            .get(&request)
            .cloned()
            .unwrap_or_else(|| self.details.clone()))
    }

    async fn repository(&self, project: u64) -> Result<RepositoryInfo, ProviderError> {
        self.record(|c| c.repositories.push(project));
        self.repos
            .get(&project)
            .cloned()
            .ok_or_else(|| Self::not_found(format!("/projects/{project}")))
    }

    async fn pipeline_jobs(&self, project: u64, _pipeline: u64) -> Result<Vec<PipelineJob>, ProviderError> {
        self.record(|c| c.job_projects.push(project));
        Ok(self.jobs.get(&project).cloned().unwrap_or_default())
    }

    async fn job_log(&self, _project: u64, job: u64) -> Result<String, ProviderError> {
        Ok(self.logs.get(&job).cloned().unwrap_or_default())
    }

    async fn create_request(&self, request: &NewRequest) -> Result<CreatedRequest, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.created.push(request.clone());
        let id = 100 + state.calls.created.len() as u64;
        Ok(CreatedRequest {
            id,
            project_id: request.target_project,
            web_url: Some(format!("https://forge.test/requests/{id}")),
        })
    }

    async fn find_fork(&self, owner: &str, name: &str) -> Result<Option<RepositoryInfo>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.fork_lookups += 1;
        let Some(fork) = self.fork.as_ref().filter(|f| f.owner == owner && f.name == name) else {
            return Ok(None);
        };
        if state.hidden_fork_lookups > 0 {
            state.hidden_fork_lookups -= 1;
            return Ok(None);
        }
        Ok(Some(fork.clone()))
    }

    async fn fork_repository(&self, project: u64) -> Result<(), ProviderError> {
        self.record(|c| c.forks_requested.push(project));
        Ok(())
    }

    fn push_url(&self, repo: &RepositoryInfo) -> Result<String, ProviderError> {
        repo.clone_url
            .clone()
            .ok_or_else(|| ProviderError::Config(format!("{} has no clone URL", repo.full_name())))
    }

    fn supports_author_attribution(&self) -> bool {
        self.attribution
    }

    fn review_discussions(&self) -> Option<&dyn ReviewDiscussions> {
        self.discussions.then_some(self as &dyn ReviewDiscussions)
    }

    fn assignee_management(&self) -> Option<&dyn AssigneeManagement> {
        self.assignees.then_some(self as &dyn AssigneeManagement)
    }
}

#[async_trait]
impl ReviewDiscussions for FakeProvider {
    async fn list_commits(&self, _project: u64, _request: u64) -> Result<Vec<CommitInfo>, ProviderError> {
        Ok(self.commits.clone())
    }

    async fn list_discussions(&self, project: u64, request: u64) -> Result<Vec<Discussion>, ProviderError> {
        if self.discussions_fail {
            return Err(ProviderError::Status {
                endpoint: format!("/projects/{project}/requests/{request}/discussions"),
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(vec![Discussion {
            notes: self.notes.clone(),
        }])
    }

    async fn post_note(&self, project: u64, request: u64, body: &str) -> Result<(), ProviderError> {
        self.record(|c| c.notes_posted.push((project, request, body.to_string())));
        Ok(())
    }
}

#[async_trait]
impl AssigneeManagement for FakeProvider {
    async fn assign(&self, project: u64, request: u64, username: &str) -> Result<(), ProviderError> {
        self.record(|c| c.assigned.push((project, request, username.to_string())));
        Ok(())
    }

    async fn unassign(&self, project: u64, request: u64, username: &str) -> Result<(), ProviderError> {
        self.record(|c| c.unassigned.push((project, request, username.to_string())));
        Ok(())
    }
}

type AgentAction = Box<dyn Fn(&Path) + Send + Sync>;

/// Agent that runs a closure against the working copy and reports a fixed outcome.
pub struct ScriptedAgent {
    outcome: AgentOutcome,
    action: AgentAction,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new(outcome: AgentOutcome, action: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        Self {
            outcome,
            action: Box::new(action),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn noop(outcome: AgentOutcome) -> Self {
        Self::new(outcome, |_| {})
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn invoke(
        &self,
        working_dir: &Path,
        prompt: &str,
        _hide_history: bool,
    ) -> Result<AgentOutcome, WorkflowError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.action)(working_dir);
        Ok(self.outcome)
    }
}

/// Finalize step that keeps the review artifact instead of posting it.
#[derive(Default)]
pub struct RecordingFinalize {
    artifacts: Mutex<Vec<String>>,
}

impl RecordingFinalize {
    pub fn artifacts(&self) -> Vec<String> {
        self.artifacts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Finalize for RecordingFinalize {
    async fn finalize(&self, _plan: &WorkflowPlan, working_copy: &Path) -> Result<String, WorkflowError> {
        let text = std::fs::read_to_string(working_copy.join(REVIEW_ARTIFACT))
            .map_err(|e| WorkflowError::Finalize(e.to_string()))?;
        self.artifacts.lock().unwrap().push(text);
        Ok("review recorded".into())
    }
}
