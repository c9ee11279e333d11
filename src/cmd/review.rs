//! Review-only flow for one request: `medic review`.

use anyhow::{Context, Result};
use std::sync::Arc;

use medic::agent::ClaudeAgent;
use medic::config::MedicToml;
use medic::provider::build_provider;
use medic::review::{ReviewPublisher, review_request};
use medic::triage::classifier::resolve_target_branch;
use medic::workflow::{EngineSettings, OutcomeStatus, WorkflowEngine};
use medic::workspace::{GitWorkspace, WorkspaceLock, server_root};

use super::find_server;
use super::scan::print_outcome;

/// Returns `true` when the review was posted.
pub async fn cmd_review(config: &MedicToml, server: &str, project: u64, request: u64) -> Result<bool> {
    let server = find_server(config, server)?;
    let provider = build_provider(server)?;
    let candidate = provider
        .get_request(project, request)
        .await
        .with_context(|| format!("Failed to load request {} in project {}", request, project))?;
    let details = provider
        .request_details(project, request)
        .await
        .context("Failed to load request details")?;
    let target_branch = resolve_target_branch(
        details.target_branch.as_deref(),
        candidate.target_branch.as_deref(),
        &server.default_target_branch,
    );

    let settings = EngineSettings::from_config(config);
    let _lock = WorkspaceLock::acquire(&server_root(&settings.workspace_root, &server.name))?;
    let engine = WorkflowEngine::new(
        provider.clone(),
        Arc::new(GitWorkspace::new()),
        Arc::new(ClaudeAgent::from_config(config)),
        settings,
    );
    let publisher = ReviewPublisher::new(provider, config.bot.attribution_marker.clone());

    let outcome = review_request(
        &engine,
        &publisher,
        &server.name,
        &candidate,
        &target_branch,
        config.agent.hide_history,
    )
    .await;

    println!();
    print_outcome(&outcome);
    println!();
    Ok(outcome.status == OutcomeStatus::Succeeded)
}
