//! Provider registry and construction helpers.
//!
//! Maps configuration onto a ready-to-use provider: the vendor client, wrapped
//! in [`RetryProvider`] when retries are enabled.

use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::config::{Config, ProviderConfig, RetryConfig};
use crate::error::{Result, StewardError};

use super::{ClaudeProvider, LLMProvider, OpenAIProvider, RetryProvider};

/// Supported vendor wire protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Anthropic,
    /// OpenAI Chat Completions and compatible endpoints
    OpenAI,
}

impl Vendor {
    /// Config key / provider id.
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Anthropic => "anthropic",
            Vendor::OpenAI => "openai",
        }
    }

    /// Guess the vendor from a model name.
    pub fn for_model(model: &str) -> Option<Self> {
        let lower = model.to_lowercase();
        if lower.contains("claude") {
            Some(Vendor::Anthropic)
        } else if lower.starts_with("gpt") || lower.starts_with("o1") || lower.starts_with("o3") {
            Some(Vendor::OpenAI)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = StewardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Vendor::Anthropic),
            "openai" => Ok(Vendor::OpenAI),
            other => Err(StewardError::Config(format!("Unknown provider '{}'", other))),
        }
    }
}

/// Build a provider for `vendor` from its configuration.
///
/// Fails when the API key is missing.
pub fn build_provider(
    vendor: Vendor,
    config: &ProviderConfig,
    retry: &RetryConfig,
    default_model: &str,
) -> Result<Arc<dyn LLMProvider>> {
    let base: Arc<dyn LLMProvider> = match vendor {
        Vendor::Anthropic => Arc::new(ClaudeProvider::from_config(config, default_model)?),
        Vendor::OpenAI => Arc::new(OpenAIProvider::from_config(config, default_model)?),
    };

    info!(
        provider = vendor.as_str(),
        model = base.default_model(),
        retries = retry.enabled,
        "Provider configured"
    );

    if retry.enabled {
        Ok(Arc::new(RetryProvider::new(base).with_config(retry)))
    } else {
        Ok(base)
    }
}

/// Pick the provider for the configured agent model.
///
/// Prefers the vendor the model name points to; otherwise the first vendor
/// with an API key, Anthropic first.
pub fn resolve_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let configured = |vendor: Vendor| -> Option<&ProviderConfig> {
        let entry = match vendor {
            Vendor::Anthropic => config.providers.anthropic.as_ref(),
            Vendor::OpenAI => config.providers.openai.as_ref(),
        };
        entry.filter(|p| p.api_key.as_deref().is_some_and(|k| !k.is_empty()))
    };

    let preferred = Vendor::for_model(&config.agent.model);
    let order = [preferred, Some(Vendor::Anthropic), Some(Vendor::OpenAI)];
    for vendor in order.into_iter().flatten() {
        if let Some(provider_config) = configured(vendor) {
            return build_provider(
                vendor,
                provider_config,
                &config.providers.retry,
                &config.agent.model,
            );
        }
    }

    Err(StewardError::Config(
        "No provider configured; set ANTHROPIC_API_KEY or OPENAI_API_KEY".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_parse() {
        assert_eq!("anthropic".parse::<Vendor>().unwrap(), Vendor::Anthropic);
        assert_eq!("OpenAI".parse::<Vendor>().unwrap(), Vendor::OpenAI);
        assert!("gemini".parse::<Vendor>().is_err());
        assert_eq!(Vendor::OpenAI.to_string(), "openai");
    }

    #[test]
    fn test_vendor_for_model() {
        assert_eq!(
            Vendor::for_model("claude-sonnet-4-5-20250929"),
            Some(Vendor::Anthropic)
        );
        assert_eq!(Vendor::for_model("gpt-4o"), Some(Vendor::OpenAI));
        assert_eq!(Vendor::for_model("llama3"), None);
    }

    #[test]
    fn test_build_provider_requires_key() {
        let err = build_provider(
            Vendor::Anthropic,
            &ProviderConfig::default(),
            &RetryConfig::default(),
            "claude",
        )
        .err()
        .unwrap();
        assert!(matches!(err, StewardError::Config(_)));
    }

    #[test]
    fn test_build_provider_wraps_retry() {
        let config = ProviderConfig::with_api_key("sk-test");
        let provider =
            build_provider(Vendor::OpenAI, &config, &RetryConfig::default(), "gpt-4o").unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), "gpt-4o");
    }

    #[test]
    fn test_resolve_provider_prefers_model_vendor() {
        let mut config = Config::default();
        config.agent.model = "gpt-4o".into();
        config.providers.anthropic = Some(ProviderConfig::with_api_key("a"));
        config.providers.openai = Some(ProviderConfig::with_api_key("o"));
        assert_eq!(resolve_provider(&config).unwrap().name(), "openai");

        config.providers.openai = None;
        assert_eq!(resolve_provider(&config).unwrap().name(), "anthropic");

        config.providers.anthropic = None;
        assert!(resolve_provider(&config).is_err());
    }
}
