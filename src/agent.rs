//! The external code-modification agent.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::MedicToml;
use crate::errors::WorkflowError;
use crate::util::{redact_secrets, tail_chars};

const HIDDEN_GIT_SUFFIX: &str = ".medic-hidden-git";

/// How one agent invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AgentOutcome {
    Succeeded,
    Failed { exit_code: Option<i32> },
    TimedOut,
}

impl AgentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AgentOutcome::Succeeded)
    }
}

impl std::fmt::Display for AgentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentOutcome::Succeeded => write!(f, "succeeded"),
            AgentOutcome::Failed { exit_code: Some(code) } => write!(f, "failed (exit {})", code),
            AgentOutcome::Failed { exit_code: None } => write!(f, "failed (killed)"),
            AgentOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Runs a natural-language directive against a working copy.
///
/// `Err` is reserved for not being able to run the agent at all; a run that
/// ends badly is reported through [`AgentOutcome`].
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(
        &self,
        working_dir: &Path,
        prompt: &str,
        hide_history: bool,
    ) -> Result<AgentOutcome, WorkflowError>;
}

/// Agent backed by the `claude` CLI in print mode.
#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    command: String,
    extra_args: Vec<String>,
    skip_permissions: bool,
    timeout: Duration,
}

impl ClaudeAgent {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            extra_args: Vec::new(),
            skip_permissions: true,
            timeout,
        }
    }

    pub fn from_config(config: &MedicToml) -> Self {
        Self {
            command: config.agent_command(),
            extra_args: config.agent.extra_args.clone(),
            skip_permissions: config.skip_permissions(),
            timeout: Duration::from_secs(config.agent.timeout_secs),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_skip_permissions(mut self, skip: bool) -> Self {
        self.skip_permissions = skip;
        self
    }

    async fn run(&self, working_dir: &Path, prompt: &str) -> Result<AgentOutcome, WorkflowError> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--print");
        if self.skip_permissions {
            cmd.arg("--dangerously-skip-permissions");
        }
        cmd.args(&self.extra_args)
            .env_remove("CLAUDECODE")
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| WorkflowError::Agent(format!("failed to start '{}': {}", self.command, e)))?;

        // Feeding the prompt runs alongside the wait, so an agent that never
        // drains stdin still hits the timeout instead of blocking the write.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin
                && let Err(e) = stdin.write_all(prompt.as_bytes()).await
            {
                warn!(error = %e, "agent closed stdin before reading the full prompt");
            }
        };
        let exchange = async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "agent timed out and was killed");
                Ok(AgentOutcome::TimedOut)
            }
            Ok(Err(e)) => Err(WorkflowError::Agent(format!("failed waiting for agent: {}", e))),
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                debug!(output = %redact_secrets(&tail_chars(&stdout, 2000)), "agent output");
                if output.status.success() {
                    Ok(AgentOutcome::Succeeded)
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(
                        exit_code = ?output.status.code(),
                        stderr = %redact_secrets(&tail_chars(stderr.trim(), 2000)),
                        "agent exited unsuccessfully"
                    );
                    Ok(AgentOutcome::Failed {
                        exit_code: output.status.code(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl Agent for ClaudeAgent {
    async fn invoke(
        &self,
        working_dir: &Path,
        prompt: &str,
        hide_history: bool,
    ) -> Result<AgentOutcome, WorkflowError> {
        info!(dir = %working_dir.display(), hide_history, "invoking agent");
        let guard = if hide_history {
            Some(HiddenHistory::hide(working_dir)?)
        } else {
            None
        };

        let result = self.run(working_dir, prompt).await;

        if let Some(guard) = guard {
            guard.restore()?;
        }
        result
    }
}

/// Moves `.git` out of the working copy; puts it back on `restore` or drop.
struct HiddenHistory {
    original: PathBuf,
    hidden: PathBuf,
    restored: bool,
}

impl HiddenHistory {
    fn hide(working_dir: &Path) -> Result<Self, WorkflowError> {
        let original = working_dir.join(".git");
        let name = working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        let hidden = working_dir.with_file_name(format!("{}{}", name, HIDDEN_GIT_SUFFIX));
        std::fs::rename(&original, &hidden)
            .map_err(|e| WorkflowError::Agent(format!("failed to hide .git: {}", e)))?;
        Ok(Self {
            original,
            hidden,
            restored: false,
        })
    }

    fn restore(mut self) -> Result<(), WorkflowError> {
        self.restored = true;
        std::fs::rename(&self.hidden, &self.original)
            .map_err(|e| WorkflowError::Agent(format!("failed to restore .git: {}", e)))
    }
}

impl Drop for HiddenHistory {
    fn drop(&mut self) {
        if !self.restored && std::fs::rename(&self.hidden, &self.original).is_err() {
            warn!(path = %self.hidden.display(), "could not restore hidden .git directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{TempDir, tempdir};

    fn script(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("fake-agent.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn working_copy() -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("repo").join(".git")).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_prompt_is_written_to_stdin() {
        let bin = tempdir().unwrap();
        let agent = ClaudeAgent::new(script(&bin, "cat > prompt.txt"), Duration::from_secs(10));
        let work = working_copy();
        let repo = work.path().join("repo");

        let outcome = agent.invoke(&repo, "fix the build", false).await.unwrap();
        assert_eq!(outcome, AgentOutcome::Succeeded);
        assert_eq!(fs::read_to_string(repo.join("prompt.txt")).unwrap(), "fix the build");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failed_outcome() {
        let bin = tempdir().unwrap();
        let agent = ClaudeAgent::new(script(&bin, "exit 3"), Duration::from_secs(10));
        let work = working_copy();

        let outcome = agent.invoke(&work.path().join("repo"), "x", false).await.unwrap();
        assert_eq!(outcome, AgentOutcome::Failed { exit_code: Some(3) });
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_timeout_kills_agent() {
        let bin = tempdir().unwrap();
        let agent = ClaudeAgent::new(script(&bin, "sleep 30"), Duration::from_millis(200));
        let work = working_copy();

        let outcome = agent.invoke(&work.path().join("repo"), "x", false).await.unwrap();
        assert_eq!(outcome, AgentOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_timeout_covers_prompt_the_agent_never_reads() {
        let bin = tempdir().unwrap();
        let agent = ClaudeAgent::new(script(&bin, "sleep 30"), Duration::from_millis(200));
        let work = working_copy();
        // Far larger than any pipe buffer
        let prompt = "x".repeat(1 << 20);

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            agent.invoke(&work.path().join("repo"), &prompt, false),
        )
        .await
        .expect("invocation must end at the agent timeout")
        .unwrap();
        assert_eq!(outcome, AgentOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_large_prompt_reaches_agent_intact() {
        let bin = tempdir().unwrap();
        let agent = ClaudeAgent::new(script(&bin, "wc -c > size.txt"), Duration::from_secs(10));
        let work = working_copy();
        let repo = work.path().join("repo");
        let prompt = "y".repeat(1 << 20);

        let outcome = agent.invoke(&repo, &prompt, false).await.unwrap();
        assert_eq!(outcome, AgentOutcome::Succeeded);
        let size = fs::read_to_string(repo.join("size.txt")).unwrap();
        assert_eq!(size.trim(), (1 << 20).to_string());
    }

    #[tokio::test]
    async fn test_hidden_history_is_invisible_then_restored() {
        let bin = tempdir().unwrap();
        let agent = ClaudeAgent::new(
            script(&bin, "cat > /dev/null\nif [ -e .git ]; then exit 9; fi"),
            Duration::from_secs(10),
        );
        let work = working_copy();
        let repo = work.path().join("repo");

        let outcome = agent.invoke(&repo, "x", true).await.unwrap();
        assert_eq!(outcome, AgentOutcome::Succeeded);
        assert!(repo.join(".git").is_dir());
    }

    #[tokio::test]
    async fn test_history_restored_after_failure() {
        let bin = tempdir().unwrap();
        let agent = ClaudeAgent::new(script(&bin, "exit 1"), Duration::from_secs(10));
        let work = working_copy();
        let repo = work.path().join("repo");

        agent.invoke(&repo, "x", true).await.unwrap();
        assert!(repo.join(".git").is_dir());
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let agent = ClaudeAgent::new("/nonexistent/medic-agent", Duration::from_secs(1));
        let work = working_copy();
        let err = agent.invoke(&work.path().join("repo"), "x", false).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Agent(_)));
        assert!(work.path().join("repo").join(".git").is_dir());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(AgentOutcome::TimedOut.to_string(), "timed out");
        assert_eq!(
            AgentOutcome::Failed { exit_code: Some(2) }.to_string(),
            "failed (exit 2)"
        );
    }
}
