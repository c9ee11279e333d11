//! Working-copy collaborator: clone/reset, identity, inspection, commit, push.

pub mod git;
pub mod lock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::WorkspaceError;

pub use git::GitWorkspace;
pub use lock::WorkspaceLock;

/// How an existing working copy is brought back to the remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    /// Fetch and hard-reset an existing clone; clone when absent
    #[default]
    Reuse,
    /// Delete and clone fresh every time
    Reclone,
}

#[async_trait]
pub trait Workspace: Send + Sync {
    /// Leave `path` as a clean checkout of `branch` from `remote_url`.
    async fn reset_repository(
        &self,
        path: &Path,
        branch: &str,
        remote_url: &str,
        mode: ResetMode,
    ) -> Result<(), WorkspaceError>;

    async fn set_identity(&self, path: &Path, name: &str, email: &str) -> Result<(), WorkspaceError>;

    /// Uncommitted changes, untracked files included.
    async fn has_pending_changes(&self, path: &Path) -> Result<bool, WorkspaceError>;

    /// Paths with unmerged index entries.
    async fn conflicted_files(&self, path: &Path) -> Result<Vec<String>, WorkspaceError>;

    /// Stage everything and commit on `branch`.
    async fn commit(&self, path: &Path, message: &str, branch: &str) -> Result<(), WorkspaceError>;

    /// Full message of the `HEAD` commit.
    async fn head_message(&self, path: &Path) -> Result<String, WorkspaceError>;

    /// Rewrite the message of the unpushed `HEAD` commit, keeping its tree.
    async fn amend_message(&self, path: &Path, message: &str) -> Result<(), WorkspaceError>;

    /// Push `HEAD` to `branch` at `url`.
    async fn push(&self, path: &Path, branch: &str, url: &str, force: bool) -> Result<(), WorkspaceError>;
}

/// Directory holding every working copy for one server; a batch locks it.
pub fn server_root(root: &Path, server: &str) -> PathBuf {
    root.join(sanitize_component(server))
}

/// Deterministic working-copy location for one request.
pub fn workspace_path(
    root: &Path,
    server: &str,
    project_id: u64,
    repo_name: &str,
    label: &str,
) -> PathBuf {
    server_root(root, server)
        .join(project_id.to_string())
        .join(sanitize_component(repo_name))
        .join(sanitize_component(label))
}

fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        s => s.to_string(),
    }
}
