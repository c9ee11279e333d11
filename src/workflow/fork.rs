use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::WorkflowError;
use crate::models::RepositoryInfo;
use crate::provider::ForgeProvider;

/// Makes sure the bot owns a fork of a repository, waiting a bounded time
/// for the forge to finish creating it.
pub struct ForkCoordinator<'a> {
    provider: &'a dyn ForgeProvider,
    bot_username: &'a str,
    poll_interval: Duration,
    timeout: Duration,
}

impl<'a> ForkCoordinator<'a> {
    pub fn new(
        provider: &'a dyn ForgeProvider,
        bot_username: &'a str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            bot_username,
            poll_interval,
            timeout,
        }
    }

    pub async fn ensure_fork(&self, upstream: &RepositoryInfo) -> Result<RepositoryInfo, WorkflowError> {
        if let Some(fork) = self.provider.find_fork(self.bot_username, &upstream.name).await? {
            debug!(fork = %fork.full_name(), "fork already exists");
            return Ok(fork);
        }

        info!(upstream = %upstream.full_name(), "requesting fork");
        self.provider.fork_repository(upstream.id).await?;

        let started = Instant::now();
        loop {
            tokio::time::sleep(self.poll_interval).await;
            match self.provider.find_fork(self.bot_username, &upstream.name).await {
                Ok(Some(fork)) => {
                    info!(fork = %fork.full_name(), waited_ms = started.elapsed().as_millis() as u64, "fork is ready");
                    return Ok(fork);
                }
                Ok(None) => debug!("fork not visible yet"),
                Err(e) => warn!(error = %e, "fork lookup failed while polling"),
            }
            if started.elapsed() >= self.timeout {
                return Err(WorkflowError::ForkTimeout {
                    repo: format!("{}/{}", self.bot_username, upstream.name),
                    waited: started.elapsed(),
                });
            }
        }
    }
}
