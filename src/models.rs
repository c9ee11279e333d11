use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One open merge/pull request, as listed by a provider. Built fresh every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Request number inside its project (GitLab iid, GitHub PR number)
    pub id: u64,
    pub title: String,
    /// Project that owns (receives) the request
    pub project_id: u64,
    /// Project hosting the source branch; differs from `project_id` for fork requests
    pub source_project_id: Option<u64>,
    pub source_branch: String,
    /// Target branch as reported by the listing, if any
    pub target_branch: Option<String>,
}

impl Candidate {
    /// The project that actually hosts the source branch. Pipelines, jobs,
    /// logs and the clone all come from here.
    pub fn source_project(&self) -> u64 {
        match self.source_project_id {
            Some(id) if id > 0 && id != self.project_id => id,
            _ => self.project_id,
        }
    }

    pub fn is_from_fork(&self) -> bool {
        self.source_project() != self.project_id
    }

    /// Stable per-candidate workspace label.
    pub fn workspace_label(&self) -> String {
        format!("request-{}", self.id)
    }
}

/// CI pipeline status, normalised across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Unknown,
}

impl PipelineStatus {
    pub fn from_api(s: &str) -> Self {
        match s {
            "created" | "waiting_for_resource" | "preparing" | "pending" | "scheduled"
            | "queued" | "waiting" | "requested" => Self::Pending,
            "running" | "in_progress" => Self::Running,
            "success" => Self::Success,
            "failed" | "failure" | "timed_out" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            "skipped" | "manual" => Self::Skipped,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }
}

/// Pipeline attached to a request's head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRef {
    pub id: Option<u64>,
    pub status: PipelineStatus,
    pub web_url: Option<String>,
}

impl PipelineRef {
    /// Identifier usable for job lookups; zero or absent ids are invalid.
    pub fn valid_id(&self) -> Option<u64> {
        self.id.filter(|id| *id > 0)
    }
}

/// Result of the single "request details" lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetails {
    pub has_conflicts: bool,
    pub pipeline: Option<PipelineRef>,
    pub target_branch: Option<String>,
    pub author: Option<String>,
    pub web_url: Option<String>,
}

impl RequestDetails {
    pub fn pipeline_failed(&self) -> bool {
        self.pipeline
            .as_ref()
            .is_some_and(|p| p.status == PipelineStatus::Failed)
    }
}

/// Repository metadata for cloning and pushing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub id: u64,
    pub name: String,
    /// Namespace / owner login
    pub owner: String,
    pub clone_url: Option<String>,
    pub default_branch: Option<String>,
}

impl RepositoryInfo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub id: u64,
    pub name: String,
    pub stage: String,
    pub status: PipelineStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub system: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discussion {
    pub notes: Vec<Note>,
}

/// A replacement request opened from the bot's fork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    /// Project the head branch lives in (the fork)
    pub source_project: u64,
    /// Owner login of the source project, for providers that address heads as `owner:branch`
    pub source_owner: String,
    pub source_branch: String,
    /// Project that receives the request
    pub target_project: u64,
    pub target_branch: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRequest {
    pub id: u64,
    pub project_id: u64,
    pub web_url: Option<String>,
}
