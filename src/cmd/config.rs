//! Configuration view and validation commands: `medic config`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use medic::config::{CONFIG_FILE_NAME, CONFIG_TEMPLATE, MedicToml};

use super::super::ConfigCommands;

pub fn cmd_config(explicit: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => show(explicit),
        Some(ConfigCommands::Validate) => validate(explicit),
        Some(ConfigCommands::Init { path }) => init(path.as_deref().or(explicit)),
    }
}

fn show(explicit: Option<&Path>) -> Result<()> {
    println!();
    println!("Medic Configuration");
    println!("===================");
    println!();

    let toml = match MedicToml::locate(explicit) {
        Some(path) => {
            println!("Config file: {}", path.display());
            MedicToml::load(&path)?
        }
        None => {
            println!("No {} found; showing defaults.", CONFIG_FILE_NAME);
            println!("Run 'medic config init' to create one.");
            MedicToml::default()
        }
    };
    println!();

    println!("[bot]");
    println!("  username = \"{}\"", toml.bot.username);
    println!("  committer = \"{} <{}>\"", toml.bot.committer_name(), toml.bot.email);
    println!("  attribution_marker = \"{}\"", toml.bot.attribution_marker);
    println!();

    println!("[agent]");
    println!("  command = \"{}\"", toml.agent_command());
    println!("  skip_permissions = {}", toml.skip_permissions());
    println!("  timeout_secs = {}", toml.agent.timeout_secs);
    println!("  hide_history = {}", toml.agent.hide_history);
    println!("  max_log_chars = {}", toml.agent.max_log_chars);
    println!();

    println!("[workspace]");
    println!("  root = \"{}\"", toml.workspace_root().display());
    println!("  reset = {:?}", toml.workspace.reset);
    println!();

    println!("[fork]");
    println!("  poll_interval_secs = {}", toml.fork.poll_interval_secs);
    println!("  timeout_secs = {}", toml.fork.timeout_secs);
    println!();

    if toml.servers.is_empty() {
        println!("No servers configured.");
    }
    for server in &toml.servers {
        println!("[[servers]] {}", server.name);
        println!("  provider = \"{}\"", server.provider);
        println!("  api = \"{}\"", server.api_base());
        println!("  default_target_branch = \"{}\"", server.default_target_branch);
        let token = if server.resolve_token().is_some() {
            console::style("set").green()
        } else {
            console::style("missing").red()
        };
        println!("  token = {}", token);
    }
    println!();
    Ok(())
}

fn validate(explicit: Option<&Path>) -> Result<()> {
    println!();
    println!("Validating configuration...");
    println!();

    let toml = match MedicToml::locate(explicit) {
        Some(path) => MedicToml::load(&path)?,
        None => {
            println!("No {} found. Checking defaults.", CONFIG_FILE_NAME);
            MedicToml::default()
        }
    };

    let warnings = toml.validate();
    if warnings.is_empty() {
        println!("Configuration is valid.");
    } else {
        println!("Configuration warnings:");
        for warning in warnings {
            println!("  - {}", warning);
        }
    }
    println!();
    Ok(())
}

fn init(path: Option<&Path>) -> Result<()> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    if path.exists() {
        println!("{} already exists at {}", CONFIG_FILE_NAME, path.display());
        println!("Delete it first if you want to recreate it.");
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created {}", path.display());
    println!();
    println!("You can now customize:");
    println!("  - [bot] username, email, attribution_marker");
    println!("  - [agent] command, timeout_secs");
    println!("  - [[servers]] one entry per GitLab or GitHub instance");
    println!();
    Ok(())
}
