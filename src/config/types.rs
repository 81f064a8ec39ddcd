//! Configuration types for Steward
//!
//! All sections use `#[serde(default)]` so a partial JSON file only needs to
//! mention the values it overrides.

use serde::{Deserialize, Serialize};

/// Default model used when neither config nor provider supplies one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
/// Default upper bound on provider/tool rounds within one turn.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 20;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent defaults (model, sampling, iteration bound, workspace)
    pub agent: AgentDefaults,
    /// Vendor credentials and capabilities, plus retry policy
    pub providers: ProvidersConfig,
    /// Agent-as-tool delegation
    pub delegate: DelegateConfig,
    /// Remote MCP tool servers
    pub mcp: McpConfig,
    /// History summarization
    pub compaction: CompactionConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent
// ============================================================================

/// Default settings for every agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Directory file and shell tools are confined to
    pub workspace: String,
    /// Model identifier sent to the provider
    pub model: String,
    /// Maximum tokens per provider call
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum provider/tool rounds per turn
    pub max_tool_iterations: usize,
    /// Optional system prompt prepended to every request
    pub system_prompt: Option<String>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: Config::dir().join("workspace").to_string_lossy().to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            system_prompt: None,
        }
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Per-vendor provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Anthropic Messages API
    pub anthropic: Option<ProviderConfig>,
    /// OpenAI Chat Completions API (or any compatible endpoint)
    pub openai: Option<ProviderConfig>,
    /// Retry policy applied to whichever provider is built
    pub retry: RetryConfig,
}

/// Credentials and capabilities for one vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key
    pub api_key: Option<String>,
    /// Base URL override (e.g. a proxy or compatible gateway)
    pub api_base: Option<String>,
    /// Model identifier; falls back to `agent.model`
    pub model: Option<String>,
    /// Context window in tokens
    pub context_window: usize,
    /// Whether the model accepts a tool catalog
    pub supports_tools: bool,
    /// Whether the endpoint can stream server-sent events
    pub supports_streaming: bool,
    /// USD per million input tokens
    pub input_cost_per_mtok: f64,
    /// USD per million output tokens
    pub output_cost_per_mtok: f64,
    /// Seconds without a stream chunk before the call is treated as timed out
    pub idle_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            model: None,
            context_window: 200_000,
            supports_tools: true,
            supports_streaming: true,
            input_cost_per_mtok: 0.0,
            output_cost_per_mtok: 0.0,
            idle_timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    /// Create a config holding only an API key.
    pub fn with_api_key(api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Default::default()
        }
    }
}

/// Retry policy for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Whether the provider is wrapped in the retry layer
    pub enabled: bool,
    /// Maximum retries after the first attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

// ============================================================================
// Delegation
// ============================================================================

/// Agent-as-tool delegation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegateConfig {
    /// Whether the `delegate` tool is registered
    pub enabled: bool,
    /// Maximum nesting depth of delegated agents
    pub max_depth: u32,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: 2,
        }
    }
}

// ============================================================================
// MCP
// ============================================================================

/// Remote MCP tool servers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub servers: Vec<McpServerConfig>,
}

/// A single MCP server reachable over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server name, used as the tool name prefix
    pub name: String,
    /// JSON-RPC endpoint
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

fn default_mcp_timeout() -> u64 {
    30
}

// ============================================================================
// Compaction
// ============================================================================

/// History summarization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Number of most recent messages preserved verbatim
    pub keep_recent: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self { keep_recent: 8 }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Component,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Optional file to append log lines to
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}
