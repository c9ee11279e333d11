//! One scan of one server: list, classify, filter, select, remediate.
//!
//! Candidates run strictly one after another. Every candidate ends in a
//! `WorkflowOutcome`, so a failure in one never stops the rest.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::agent::Agent;
use crate::config::{MedicToml, ServerConfig};
use crate::errors::WorkflowError;
use crate::models::Candidate;
use crate::provider::ForgeProvider;
use crate::triage::{AttentionClassifier, DirectiveBuilder};
use crate::workflow::{
    EngineSettings, OutcomeStatus, WorkflowEngine, WorkflowOutcome, WorkflowPlan, WorkflowState,
};
use crate::workspace::{GitWorkspace, WorkspaceLock, server_root};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub default_target_branch: String,
    pub hide_history: bool,
    pub max_log_chars: usize,
    /// Classify and select only; no workspace is touched
    pub dry_run: bool,
}

impl BatchOptions {
    pub fn from_config(config: &MedicToml, server: &ServerConfig, dry_run: bool) -> Self {
        Self {
            default_target_branch: server.default_target_branch.clone(),
            hide_history: config.agent.hide_history,
            max_log_chars: config.agent.max_log_chars,
            dry_run,
        }
    }
}

/// Aggregated result of one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub server: String,
    /// Open requests returned by the listing
    pub candidates: usize,
    /// Requests that needed no attention
    pub filtered: usize,
    /// Candidates that finished successfully
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<WorkflowOutcome>,
}

impl BatchReport {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: WorkflowOutcome) {
        match outcome.status {
            OutcomeStatus::Succeeded => self.processed += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

pub struct BatchRunner {
    server: String,
    provider: Arc<dyn ForgeProvider>,
    classifier: AttentionClassifier,
    directives: DirectiveBuilder,
    engine: WorkflowEngine,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(
        server: impl Into<String>,
        provider: Arc<dyn ForgeProvider>,
        engine: WorkflowEngine,
        options: BatchOptions,
    ) -> Self {
        let settings = engine.settings();
        let classifier = AttentionClassifier::new(
            provider.clone(),
            settings.bot_username.clone(),
            settings.marker.clone(),
            options.default_target_branch.clone(),
        );
        let directives = DirectiveBuilder::new(provider.clone(), settings.marker.clone(), options.max_log_chars);
        Self {
            server: server.into(),
            provider,
            classifier,
            directives,
            engine,
            options,
        }
    }

    /// Runner wired with the git workspace and settings from `config`.
    pub fn from_config(
        config: &MedicToml,
        server: &ServerConfig,
        provider: Arc<dyn ForgeProvider>,
        agent: Arc<dyn Agent>,
        dry_run: bool,
    ) -> Self {
        let engine = WorkflowEngine::new(
            provider.clone(),
            Arc::new(GitWorkspace::new()),
            agent,
            EngineSettings::from_config(config),
        );
        Self::new(
            server.name.clone(),
            provider,
            engine,
            BatchOptions::from_config(config, server, dry_run),
        )
    }

    /// Only a failed listing or a held workspace lock fails the whole batch.
    pub async fn run(&self) -> Result<BatchReport, WorkflowError> {
        let span = info_span!("batch", server = %self.server, dry_run = self.options.dry_run);
        async move {
            let bot = &self.engine.settings().bot_username;
            let candidates = self.provider.list_open_requests(bot).await?;
            info!(count = candidates.len(), "listed open requests");

            let _lock = if self.options.dry_run {
                None
            } else {
                let root = server_root(&self.engine.settings().workspace_root, &self.server);
                Some(WorkspaceLock::acquire(&root)?)
            };

            let mut report = BatchReport::new(&self.server);
            report.candidates = candidates.len();
            for candidate in &candidates {
                match self.process(candidate).await {
                    Some(outcome) => report.record(outcome),
                    None => report.filtered += 1,
                }
            }
            info!(
                processed = report.processed,
                skipped = report.skipped,
                failed = report.failed,
                filtered = report.filtered,
                "batch finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// `None` when the candidate needs no attention.
    async fn process(&self, candidate: &Candidate) -> Option<WorkflowOutcome> {
        let signal = match self.classifier.classify(candidate).await {
            Ok(signal) => signal,
            Err(e) => {
                warn!(candidate = candidate.id, error = %e, "classification failed");
                return Some(WorkflowOutcome::from_error(
                    candidate.id,
                    &WorkflowError::Provider(e),
                    WorkflowState::Init,
                ));
            }
        };
        if !signal.needs_attention() {
            debug!(candidate = candidate.id, "no attention needed");
            return None;
        }

        let directive = match self.directives.select(candidate, &signal).await {
            Ok(Some(directive)) => directive,
            Ok(None) => return None,
            Err(e) => {
                warn!(candidate = candidate.id, error = %e, "could not build directive");
                return Some(WorkflowOutcome::from_error(candidate.id, &e, WorkflowState::Init));
            }
        };

        if self.options.dry_run {
            info!(candidate = candidate.id, action = %directive.kind, "dry run; not remediating");
            return Some(
                WorkflowOutcome::new(
                    candidate.id,
                    OutcomeStatus::Skipped,
                    format!("dry run: would {}", directive.kind.verb().to_lowercase()),
                    WorkflowState::Init,
                )
                .with_kind(Some(directive.kind)),
            );
        }

        let plan = WorkflowPlan::for_directive(
            &self.server,
            candidate,
            &signal,
            directive,
            self.options.hide_history,
        );
        Some(self.engine.run(&plan, None).await)
    }
}
