//! Application configuration loaded from `config.toml`.
//!
//! Every section is optional; omitted fields take the defaults baked into
//! the types, so an empty file is a valid configuration. The OpenRouter API
//! key is never stored in the file; it comes from the environment.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use paperforge_core::nodes::NodeModels;
use paperforge_core::resilience::RetryPolicy;

/// Environment variable holding the OpenRouter API key.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing API key: set the {API_KEY_ENV} environment variable")]
    MissingApiKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub openrouter: OpenRouterConfig,
    pub retry: RetryPolicy,
    pub models: NodeModels,
    pub pricing: PricingConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    pub base_url: String,
    /// Sent as the `HTTP-Referer` header, which OpenRouter uses for app
    /// attribution.
    pub referer: String,
    /// Sent as the `X-Title` header.
    pub title: String,
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            referer: "https://paperforge.dev".to_string(),
            title: "Paperforge".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Per-model price overrides, USD per million tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub overrides: HashMap<String, PriceOverride>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceOverride {
    pub input: f64,
    pub output: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Directory for the JSONL checkpoint and agent-action logs.
    pub dir: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            dir: "audit".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Read the API key from the environment.
    pub fn api_key() -> Result<secrecy::SecretString, ConfigError> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Ok(key.into()),
            _ => Err(ConfigError::MissingApiKey),
        }
    }
}
