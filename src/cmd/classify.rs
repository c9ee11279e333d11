//! Single-request triage view: `medic classify`.

use anyhow::{Context, Result};

use medic::config::MedicToml;
use medic::provider::build_provider;
use medic::triage::{AttentionClassifier, choose_action};

use super::find_server;

pub async fn cmd_classify(config: &MedicToml, server: &str, project: u64, request: u64) -> Result<()> {
    let server = find_server(config, server)?;
    let provider = build_provider(server)?;
    let candidate = provider
        .get_request(project, request)
        .await
        .with_context(|| format!("Failed to load request {} in project {}", request, project))?;

    let classifier = AttentionClassifier::new(
        provider.clone(),
        config.bot.username.clone(),
        config.bot.attribution_marker.clone(),
        server.default_target_branch.clone(),
    );
    let signal = classifier
        .classify(&candidate)
        .await
        .context("Failed to classify request")?;
    let action = choose_action(&signal);

    let body = serde_json::json!({
        "candidate": candidate,
        "signal": signal,
        "needs_attention": signal.needs_attention(),
        "action": action,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
