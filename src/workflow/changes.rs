use std::path::Path;
use tracing::debug;

use crate::errors::WorkflowError;
use crate::workspace::Workspace;
use crate::workspace::git::run_git;

/// Whether the working copy holds anything worth finalizing after the agent ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDecision {
    /// Nothing changed and nothing is ahead of the remote branch
    NoChanges,
    /// Uncommitted edits; commit before pushing
    Pending { ahead: u32 },
    /// The agent committed by itself; push what is there
    AheadOnly { commits: u32 },
}

impl ChangeDecision {
    pub fn has_changes(&self) -> bool {
        !matches!(self, ChangeDecision::NoChanges)
    }
}

/// Commits on `HEAD` not reachable from `origin/<branch>`. Any failure or
/// unparsable output counts as zero.
pub async fn ahead_of_origin(path: &Path, branch: &str) -> u32 {
    let exclude = format!("^origin/{}", branch);
    match run_git(path, &["rev-list", "--count", "HEAD", &exclude]).await {
        Ok(output) if output.success() => output.stdout.trim().parse().unwrap_or(0),
        Ok(output) => {
            debug!(branch, code = ?output.code, "ahead check failed; treating as not ahead");
            0
        }
        Err(e) => {
            debug!(branch, error = %e, "ahead check could not run; treating as not ahead");
            0
        }
    }
}

pub async fn detect_changes(
    workspace: &dyn Workspace,
    path: &Path,
    branch: &str,
) -> Result<ChangeDecision, WorkflowError> {
    let pending = workspace.has_pending_changes(path).await?;
    let ahead = ahead_of_origin(path, branch).await;
    debug!(pending, ahead, "evaluated working copy");
    Ok(match (pending, ahead) {
        (true, ahead) => ChangeDecision::Pending { ahead },
        (false, 0) => ChangeDecision::NoChanges,
        (false, commits) => ChangeDecision::AheadOnly { commits },
    })
}
