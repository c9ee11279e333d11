//! Batch remediation across servers: `medic scan`.

use anyhow::{Context, Result, bail};
use futures::future::join_all;
use std::sync::Arc;

use medic::agent::{Agent, ClaudeAgent};
use medic::batch::{BatchReport, BatchRunner};
use medic::config::{MedicToml, ServerConfig};
use medic::provider::build_provider;
use medic::workflow::{OutcomeStatus, WorkflowOutcome};

use super::find_server;

/// Returns `false` when any server or candidate failed.
pub async fn cmd_scan(config: &MedicToml, only: Option<&str>, dry_run: bool, json: bool) -> Result<bool> {
    let servers: Vec<&ServerConfig> = match only {
        Some(name) => vec![find_server(config, name)?],
        None => config.servers.iter().collect(),
    };
    if servers.is_empty() {
        bail!("No servers configured. Run 'medic config init' and add a [[servers]] entry.");
    }

    let agent: Arc<dyn Agent> = Arc::new(ClaudeAgent::from_config(config));
    // Servers never share workspace paths, so they run side by side
    let runs = servers.into_iter().map(|server| {
        let agent = agent.clone();
        async move { (server.name.clone(), scan_server(config, server, agent, dry_run).await) }
    });
    let results = join_all(runs).await;

    let mut clean = true;
    let mut reports = Vec::new();
    let mut errors = Vec::new();
    for (server, result) in results {
        match result {
            Ok(report) => {
                clean &= !report.has_failures();
                reports.push(report);
            }
            Err(e) => {
                clean = false;
                errors.push((server, format!("{:#}", e)));
            }
        }
    }

    if json {
        let errors: Vec<_> = errors
            .iter()
            .map(|(server, error)| serde_json::json!({ "server": server, "error": error }))
            .collect();
        let body = serde_json::json!({ "reports": reports, "errors": errors });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        for report in &reports {
            print_report(report, dry_run);
        }
        for (server, error) in &errors {
            println!();
            println!("{} {}: {}", console::style("Error:").red().bold(), server, error);
        }
        println!();
    }

    Ok(clean)
}

async fn scan_server(
    config: &MedicToml,
    server: &ServerConfig,
    agent: Arc<dyn Agent>,
    dry_run: bool,
) -> Result<BatchReport> {
    let provider =
        build_provider(server).with_context(|| format!("Failed to set up server '{}'", server.name))?;
    BatchRunner::from_config(config, server, provider, agent, dry_run)
        .run()
        .await
        .with_context(|| format!("Scan of server '{}' failed", server.name))
}

fn print_report(report: &BatchReport, dry_run: bool) {
    println!();
    let title = if dry_run {
        format!("{} (dry run)", report.server)
    } else {
        report.server.clone()
    };
    println!("{}", console::style(title).bold().cyan());
    println!(
        "  {} open, {} needing no attention, {} processed, {} skipped, {} failed",
        report.candidates, report.filtered, report.processed, report.skipped, report.failed
    );
    for outcome in &report.outcomes {
        print_outcome(outcome);
    }
}

pub(crate) fn print_outcome(outcome: &WorkflowOutcome) {
    let mark = match outcome.status {
        OutcomeStatus::Succeeded => console::style("✓").green(),
        OutcomeStatus::Skipped => console::style("-").yellow(),
        OutcomeStatus::Failed => console::style("✗").red(),
    };
    let action = outcome.kind.map(|k| k.to_string()).unwrap_or_else(|| "review".into());
    println!(
        "  {} #{:<6} {:<17} {}",
        mark, outcome.candidate_id, action, outcome.reason
    );
    if let Some(replacement) = &outcome.replacement {
        println!(
            "           replacement request #{} {}",
            replacement.id,
            console::style(replacement.web_url.as_deref().unwrap_or("")).dim()
        );
    }
}
