//! Configuration management for Steward
//!
//! Configuration is loaded from `~/.steward/config.json` (or an explicit path)
//! with environment variable overrides. The core never mutates configuration
//! after construction.

mod types;

pub use types::*;

use crate::error::{Result, StewardError};
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the Steward configuration directory path (~/.steward)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".steward")
    }

    /// Returns the path to the config file (~/.steward/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// A `.env` file in the working directory is read first, so its values
    /// participate in the overrides. A missing config file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_json(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string without environment overrides.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| StewardError::Config(format!("Invalid config: {}", e)))
    }

    /// Reject values the agent loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.model.trim().is_empty() {
            return Err(StewardError::Config("agent.model must not be empty".into()));
        }
        if self.agent.max_tool_iterations == 0 {
            return Err(StewardError::Config(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }
        if self.providers.retry.base_delay_ms > self.providers.retry.max_delay_ms {
            return Err(StewardError::Config(
                "providers.retry.base_delay_ms exceeds max_delay_ms".into(),
            ));
        }
        for server in &self.mcp.servers {
            if server.name.is_empty() || server.url.is_empty() {
                return Err(StewardError::Config(
                    "mcp servers need both a name and a url".into(),
                ));
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: STEWARD_SECTION_SUBSECTION_KEY
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STEWARD_AGENT_WORKSPACE") {
            self.agent.workspace = val;
        }
        if let Ok(val) = std::env::var("STEWARD_AGENT_MODEL") {
            self.agent.model = val;
        }
        if let Ok(val) = std::env::var("STEWARD_AGENT_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                self.agent.max_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("STEWARD_AGENT_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                self.agent.temperature = v;
            }
        }
        if let Ok(val) = std::env::var("STEWARD_AGENT_MAX_TOOL_ITERATIONS") {
            if let Ok(v) = val.parse() {
                self.agent.max_tool_iterations = v;
            }
        }

        self.apply_provider_env_overrides();

        if let Ok(val) = std::env::var("STEWARD_DELEGATE_MAX_DEPTH") {
            if let Ok(v) = val.parse() {
                self.delegate.max_depth = v;
            }
        }
        if let Ok(val) = std::env::var("STEWARD_LOGGING_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Apply provider-specific environment variable overrides
    fn apply_provider_env_overrides(&mut self) {
        for (prefix, slot) in [
            ("STEWARD_PROVIDERS_ANTHROPIC", &mut self.providers.anthropic),
            ("STEWARD_PROVIDERS_OPENAI", &mut self.providers.openai),
        ] {
            if let Ok(val) = std::env::var(format!("{}_API_KEY", prefix)) {
                slot.get_or_insert_with(ProviderConfig::default).api_key = Some(val);
            }
            if let Ok(val) = std::env::var(format!("{}_API_BASE", prefix)) {
                slot.get_or_insert_with(ProviderConfig::default).api_base = Some(val);
            }
            if let Ok(val) = std::env::var(format!("{}_MODEL", prefix)) {
                slot.get_or_insert_with(ProviderConfig::default).model = Some(val);
            }
        }

        if let Ok(val) = std::env::var("STEWARD_PROVIDERS_RETRY_MAX_RETRIES") {
            if let Ok(v) = val.parse() {
                self.providers.retry.max_retries = v;
            }
        }
        if let Ok(val) = std::env::var("STEWARD_PROVIDERS_RETRY_ENABLED") {
            self.providers.retry.enabled = val == "true" || val == "1";
        }
    }
}

impl AgentDefaults {
    /// Workspace directory with a leading `~/` expanded to the home directory.
    pub fn workspace_path(&self) -> PathBuf {
        match self.workspace.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest),
            None => PathBuf::from(&self.workspace),
        }
    }
}
