//! Configuration for medic, read from `medic.toml`.
//!
//! # Configuration File Format
//!
//! ```toml
//! [bot]
//! username = "medic-bot"
//! email = "medic-bot@example.com"
//! attribution_marker = "Automated change by medic"
//!
//! [agent]
//! command = "claude"
//! timeout_secs = 1800
//!
//! [workspace]
//! root = "/var/lib/medic/workspaces"
//! reset = "reuse"
//!
//! [fork]
//! poll_interval_secs = 5
//! timeout_secs = 600
//!
//! [logging]
//! level = "info"
//! json = false
//!
//! [[servers]]
//! name = "gitlab"
//! provider = "gitlab"
//! base_url = "https://gitlab.example.com"
//! token_env = "MEDIC_GITLAB_TOKEN"
//! default_target_branch = "main"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::workspace::ResetMode;

pub const CONFIG_FILE_NAME: &str = "medic.toml";
pub const CONFIG_ENV_VAR: &str = "MEDIC_CONFIG";
pub const DEFAULT_TOKEN_ENV: &str = "MEDIC_TOKEN";

/// Which forge API a server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gitlab,
    Github,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gitlab => write!(f, "gitlab"),
            ProviderKind::Github => write!(f, "github"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gitlab" => Ok(ProviderKind::Gitlab),
            "github" => Ok(ProviderKind::Github),
            _ => anyhow::bail!("Invalid provider '{}'. Valid values: gitlab, github", s),
        }
    }
}

/// Identity the bot acts under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSection {
    /// Forge username of the bot account
    #[serde(default = "default_bot_username")]
    pub username: String,
    /// Committer name (defaults to the username)
    #[serde(default)]
    pub display_name: Option<String>,
    /// Committer email
    #[serde(default = "default_bot_email")]
    pub email: String,
    /// Literal substring stamped into every bot commit message
    #[serde(default = "default_attribution_marker")]
    pub attribution_marker: String,
}

fn default_bot_username() -> String {
    "medic-bot".to_string()
}

fn default_bot_email() -> String {
    "medic-bot@localhost".to_string()
}

fn default_attribution_marker() -> String {
    "Automated change by medic".to_string()
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            username: default_bot_username(),
            display_name: None,
            email: default_bot_email(),
            attribution_marker: default_attribution_marker(),
        }
    }
}

impl BotSection {
    pub fn committer_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Code-modification agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Agent CLI command (default: "claude")
    #[serde(default)]
    pub command: Option<String>,
    /// Extra arguments appended to the agent invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Whether to pass --dangerously-skip-permissions
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
    /// Wall-clock limit for one invocation
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
    /// Hide `.git` from the agent
    #[serde(default)]
    pub hide_history: bool,
    /// Tail of each failed job log embedded into pipeline prompts
    #[serde(default = "default_max_log_chars")]
    pub max_log_chars: usize,
}

fn default_skip_permissions() -> bool {
    true
}

fn default_agent_timeout_secs() -> u64 {
    1800
}

fn default_max_log_chars() -> usize {
    20_000
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            command: None,
            extra_args: Vec::new(),
            skip_permissions: default_skip_permissions(),
            timeout_secs: default_agent_timeout_secs(),
            hide_history: false,
            max_log_chars: default_max_log_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSection {
    /// Root under which per-request working copies are created
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub reset: ResetMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkSection {
    #[serde(default = "default_fork_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_fork_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_fork_poll_interval_secs() -> u64 {
    5
}

fn default_fork_timeout_secs() -> u64 {
    600
}

impl Default for ForkSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_fork_poll_interval_secs(),
            timeout_secs: default_fork_timeout_secs(),
        }
    }
}

impl ForkSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Directory for a daily-rolling log file, in addition to stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

/// One forge server to scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub provider: ProviderKind,
    /// Web URL of the forge, e.g. https://gitlab.example.com
    pub base_url: String,
    /// REST API root; derived from `base_url` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment variable holding the API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default = "default_target_branch")]
    pub default_target_branch: String,
}

fn default_target_branch() -> String {
    "main".to_string()
}

impl ServerConfig {
    /// Resolve the API token: inline value first, then the configured env var.
    pub fn resolve_token(&self) -> Option<String> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            return Some(token.clone());
        }
        let var = self.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
        std::env::var(var).ok().filter(|t| !t.is_empty())
    }

    pub fn api_base(&self) -> String {
        if let Some(api) = &self.api_url {
            return api.trim_end_matches('/').to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        match self.provider {
            ProviderKind::Gitlab => format!("{}/api/v4", base),
            ProviderKind::Github if base == "https://github.com" => {
                "https://api.github.com".to_string()
            }
            ProviderKind::Github => format!("{}/api/v3", base),
        }
    }
}

/// The complete medic.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MedicToml {
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub fork: ForkSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

impl MedicToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse medic.toml")
    }

    /// Load from the located config file, or defaults when none exists.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match Self::locate(explicit) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Find the config file: explicit path, `MEDIC_CONFIG`, `./medic.toml`,
    /// then `<config dir>/medic/medic.toml`.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
            && !path.is_empty()
        {
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("medic").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize medic.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Agent command, with fallback to the CLAUDE_CMD environment variable.
    pub fn agent_command(&self) -> String {
        self.agent
            .command
            .clone()
            .or_else(|| std::env::var("CLAUDE_CMD").ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Get skip_permissions, with fallback to environment variable.
    pub fn skip_permissions(&self) -> bool {
        if let Ok(env_val) = std::env::var("SKIP_PERMISSIONS") {
            return env_val != "false";
        }
        self.agent.skip_permissions
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace.root.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("medic")
                .join("workspaces")
        })
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.bot.username.trim().is_empty() {
            warnings.push("bot.username is empty".to_string());
        }
        if self.bot.attribution_marker.trim().is_empty() {
            warnings.push(
                "bot.attribution_marker is empty: bot commits cannot be told apart from human ones"
                    .to_string(),
            );
        }
        if self.agent.timeout_secs == 0 {
            warnings.push("agent.timeout_secs is 0: every agent run will time out".to_string());
        }
        if self.fork.timeout_secs == 0 {
            warnings.push("fork.timeout_secs is 0".to_string());
        }
        if self.fork.poll_interval_secs >= self.fork.timeout_secs {
            warnings.push(format!(
                "fork.poll_interval_secs ({}) should be smaller than fork.timeout_secs ({})",
                self.fork.poll_interval_secs, self.fork.timeout_secs
            ));
        }

        if self.servers.is_empty() {
            warnings.push("No [[servers]] configured".to_string());
        }
        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.name.as_str()) {
                warnings.push(format!("Duplicate server name '{}'", server.name));
            }
            if server.resolve_token().is_none() {
                warnings.push(format!(
                    "Server '{}' has no token (set `token` or the {} env var)",
                    server.name,
                    server.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV)
                ));
            }
            if !server.base_url.starts_with("http://") && !server.base_url.starts_with("https://") {
                warnings.push(format!(
                    "Server '{}' base_url '{}' is not an http(s) URL",
                    server.name, server.base_url
                ));
            }
        }

        warnings
    }
}

/// Starter file written by `medic config init`.
pub const CONFIG_TEMPLATE: &str = r#"[bot]
username = "medic-bot"
email = "medic-bot@example.com"
attribution_marker = "Automated change by medic"

[agent]
command = "claude"
timeout_secs = 1800
hide_history = false

[workspace]
reset = "reuse"

[fork]
poll_interval_secs = 5
timeout_secs = 600

[logging]
level = "info"
json = false

[[servers]]
name = "gitlab"
provider = "gitlab"
base_url = "https://gitlab.example.com"
token_env = "MEDIC_GITLAB_TOKEN"
default_target_branch = "main"
"#;
