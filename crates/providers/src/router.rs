//! Provider router: turns model identifiers and configuration into an
//! adapter plus invocation options.
//!
//! Identifiers are either `"<provider>:<model>"` (e.g.
//! `"openrouter:anthropic/claude-sonnet-4"`) or a bare model name, which
//! goes to the configured default provider.

use std::sync::Arc;
use std::time::Duration;

use bareagent_config::AppConfig;
use bareagent_core::error::ProviderError;
use bareagent_core::provider::{InvokeOptions, ProviderAdapter};
use tracing::debug;

use crate::anthropic::AnthropicAdapter;
use crate::openai::OpenAiAdapter;

/// Providers the router knows how to build.
pub const KNOWN_PROVIDERS: &[&str] = &["anthropic", "openai", "openrouter", "ollama"];

/// A parsed model identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    /// Parse `"<provider>:<model>"`, falling back to `default_provider`
    /// when the prefix is absent or not a known provider.
    pub fn parse(id: &str, default_provider: &str) -> Self {
        if let Some((prefix, model)) = id.split_once(':') {
            if KNOWN_PROVIDERS.contains(&prefix) && !model.is_empty() {
                return Self {
                    provider: prefix.to_string(),
                    model: model.to_string(),
                };
            }
        }
        Self {
            provider: default_provider.to_string(),
            model: id.to_string(),
        }
    }
}

/// Build the adapter for `provider` from configuration.
pub fn build_adapter(
    provider: &str,
    config: &AppConfig,
) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let api_key = config.api_key_for(provider);
    let api_url = config.api_url_for(provider);

    let adapter: Arc<dyn ProviderAdapter> = match provider {
        "anthropic" => {
            let mut adapter = AnthropicAdapter::new(require_key(provider, api_key)?);
            if let Some(url) = api_url {
                adapter = adapter.with_base_url(url);
            }
            Arc::new(adapter)
        }
        "openai" | "openrouter" => {
            let key = require_key(provider, api_key)?;
            let url = api_url.unwrap_or_else(|| default_base_url(provider));
            Arc::new(OpenAiAdapter::new(provider, url, key))
        }
        "ollama" => Arc::new(OpenAiAdapter::ollama(api_url)),
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "Unknown provider '{other}' (expected one of: {})",
                KNOWN_PROVIDERS.join(", ")
            )));
        }
    };

    debug!(provider, "Provider adapter built");
    Ok(adapter)
}

/// Resolve a model identifier into an adapter and options, carrying the
/// configured fallbacks, limits, and system prompt.
pub fn resolve(
    id: &str,
    config: &AppConfig,
) -> Result<(Arc<dyn ProviderAdapter>, InvokeOptions), ProviderError> {
    let primary = ModelRef::parse(id, &config.default_provider);

    let mut fallbacks = Vec::with_capacity(config.fallback_models.len());
    for fallback in &config.fallback_models {
        let fallback = ModelRef::parse(fallback, &primary.provider);
        if fallback.provider != primary.provider {
            return Err(ProviderError::NotConfigured(format!(
                "Fallback model '{}' uses provider '{}', but fallbacks must stay within '{}'",
                fallback.model, fallback.provider, primary.provider
            )));
        }
        fallbacks.push(fallback.model);
    }

    let adapter = build_adapter(&primary.provider, config)?;
    let mut options = InvokeOptions::new(primary.model)
        .with_fallbacks(fallbacks)
        .with_max_tokens(config.default_max_tokens)
        .with_temperature(config.default_temperature)
        .with_timeout(Duration::from_secs(config.agent.request_timeout_secs));
    if let Some(prompt) = &config.agent.system_prompt {
        options = options.with_system_prompt(prompt);
    }
    Ok((adapter, options))
}

/// Resolve the configured default model.
pub fn from_config(
    config: &AppConfig,
) -> Result<(Arc<dyn ProviderAdapter>, InvokeOptions), ProviderError> {
    resolve(&config.default_model, config)
}

fn require_key<'a>(provider: &str, key: Option<&'a str>) -> Result<&'a str, ProviderError> {
    key.filter(|k| !k.is_empty()).ok_or_else(|| {
        ProviderError::NotConfigured(format!(
            "No API key for '{provider}'. Set {} or add it to config.toml",
            key_env_var(provider)
        ))
    })
}

fn key_env_var(provider: &str) -> String {
    format!("{}_API_KEY", provider.to_uppercase())
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider: &str) -> &'static str {
    match provider {
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        _ => "https://api.openai.com/v1",
    }
}
