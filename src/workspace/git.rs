//! `git` CLI driven through `tokio::process`, with `git2` for read-only inspection.

use async_trait::async_trait;
use git2::{Repository, Status, StatusOptions};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{ResetMode, Workspace};
use crate::errors::WorkspaceError;
use crate::util::redact_secrets;

/// Captured result of one git invocation. A non-zero exit is data here,
/// not an error.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `git <args>` in `dir` and capture its output.
pub async fn run_git(dir: &Path, args: &[&str]) -> Result<GitOutput, WorkspaceError> {
    let command = describe(args);
    debug!(dir = %dir.display(), command = %command, "running git");

    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| WorkspaceError::Spawn { command, source })?;

    Ok(GitOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `git <args>` and fail on a non-zero exit. Returns stdout.
pub async fn git_checked(dir: &Path, args: &[&str]) -> Result<String, WorkspaceError> {
    let output = run_git(dir, args).await?;
    if !output.success() {
        return Err(WorkspaceError::Git {
            command: describe(args),
            code: output.code,
            stderr: redact_secrets(output.stderr.trim()),
        });
    }
    Ok(output.stdout)
}

fn describe(args: &[&str]) -> String {
    redact_secrets(&args.join(" "))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Default)]
pub struct GitWorkspace;

impl GitWorkspace {
    pub fn new() -> Self {
        Self
    }

    async fn clone_fresh(&self, path: &Path, branch: &str, remote_url: &str) -> Result<(), WorkspaceError> {
        if path.exists() {
            tokio::fs::remove_dir_all(path).await.map_err(io_error(path))?;
        }
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;

        let target = path.to_string_lossy();
        git_checked(parent, &["clone", "--branch", branch, remote_url, target.as_ref()]).await?;
        Ok(())
    }

    async fn reuse(&self, path: &Path, branch: &str, remote_url: &str) -> Result<(), WorkspaceError> {
        // A previous run may have died mid-merge
        let _ = run_git(path, &["merge", "--abort"]).await;
        git_checked(path, &["reset", "--hard"]).await?;
        git_checked(path, &["clean", "-fdx"]).await?;
        git_checked(path, &["remote", "set-url", "origin", remote_url]).await?;
        git_checked(path, &["fetch", "origin", branch]).await?;
        let tracking = format!("origin/{}", branch);
        git_checked(path, &["checkout", "-B", branch, &tracking]).await?;
        git_checked(path, &["reset", "--hard", &tracking]).await?;
        Ok(())
    }
}

#[async_trait]
impl Workspace for GitWorkspace {
    async fn reset_repository(
        &self,
        path: &Path,
        branch: &str,
        remote_url: &str,
        mode: ResetMode,
    ) -> Result<(), WorkspaceError> {
        let has_clone = path.join(".git").is_dir();
        match mode {
            ResetMode::Reuse if has_clone => {
                debug!(path = %path.display(), branch, "reusing working copy");
                self.reuse(path, branch, remote_url).await
            }
            _ => {
                debug!(path = %path.display(), branch, "cloning working copy");
                self.clone_fresh(path, branch, remote_url).await
            }
        }
    }

    async fn set_identity(&self, path: &Path, name: &str, email: &str) -> Result<(), WorkspaceError> {
        git_checked(path, &["config", "user.name", name]).await?;
        git_checked(path, &["config", "user.email", email]).await?;
        Ok(())
    }

    async fn has_pending_changes(&self, path: &Path) -> Result<bool, WorkspaceError> {
        let repo = Repository::open(path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(statuses
            .iter()
            .any(|entry| !entry.status().is_empty() && !entry.status().contains(Status::IGNORED)))
    }

    async fn conflicted_files(&self, path: &Path) -> Result<Vec<String>, WorkspaceError> {
        let repo = Repository::open(path)?;
        let index = repo.index()?;
        let mut files = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
                files.push(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    async fn commit(&self, path: &Path, message: &str, branch: &str) -> Result<(), WorkspaceError> {
        let current = git_checked(path, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if current.trim() != branch {
            git_checked(path, &["checkout", "-B", branch]).await?;
        }
        git_checked(path, &["add", "-A"]).await?;
        git_checked(path, &["commit", "-m", message]).await?;
        Ok(())
    }

    async fn head_message(&self, path: &Path) -> Result<String, WorkspaceError> {
        git_checked(path, &["log", "-1", "--format=%B"]).await
    }

    async fn amend_message(&self, path: &Path, message: &str) -> Result<(), WorkspaceError> {
        git_checked(path, &["commit", "--amend", "--allow-empty", "-m", message]).await?;
        Ok(())
    }

    async fn push(&self, path: &Path, branch: &str, url: &str, force: bool) -> Result<(), WorkspaceError> {
        let refspec = format!("HEAD:refs/heads/{}", branch);
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.push(url);
        args.push(&refspec);
        git_checked(path, &args).await?;
        Ok(())
    }
}
