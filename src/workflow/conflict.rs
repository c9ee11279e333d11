use std::path::Path;
use tracing::{error, info};

use crate::errors::WorkflowError;
use crate::workspace::Workspace;
use crate::workspace::git::{git_checked, run_git};

/// What merging the target branch left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReport {
    /// Merge stopped with these unmerged paths
    Conflicted(Vec<String>),
    /// Merge went through; the merge commit is itself a change worth pushing
    MergedCleanly,
}

/// Merge `origin/<target>` into the checked-out branch so the agent sees
/// conflict markers. The merge is recorded under `message`, so a clean merge
/// and a resolved one both carry the attribution marker. A failed merge with
/// nothing unmerged is an anomaly and fails the candidate.
pub async fn trigger_conflicts(
    workspace: &dyn Workspace,
    path: &Path,
    target_branch: &str,
    message: &str,
) -> Result<ConflictReport, WorkflowError> {
    git_checked(path, &["fetch", "origin", target_branch]).await?;
    git_checked(path, &["config", "pull.rebase", "false"]).await?;

    let tracking = format!("origin/{}", target_branch);
    let merge = run_git(path, &["merge", &tracking, "--no-edit", "-m", message]).await?;
    if merge.success() {
        info!(target = target_branch, "target merged without conflicts; continuing");
        return Ok(ConflictReport::MergedCleanly);
    }

    let files = workspace.conflicted_files(path).await?;
    if files.is_empty() {
        error!(
            critical = true,
            target = target_branch,
            code = ?merge.code,
            "merge failed but left no conflicted files; agent would have nothing to resolve"
        );
        return Err(WorkflowError::ConflictAnomaly {
            target: target_branch.to_string(),
        });
    }

    info!(target = target_branch, files = ?files, "merge produced conflicts");
    Ok(ConflictReport::Conflicted(files))
}
