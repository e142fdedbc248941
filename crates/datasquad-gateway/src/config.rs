//! Gateway configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

pub const ENV_GATEWAY_URL: &str = "DATASQUAD_GATEWAY_URL";
pub const ENV_MODEL: &str = "DATASQUAD_MODEL";
pub const ENV_API_KEY: &str = "DATASQUAD_API_KEY";

/// OpenAI-compatible chat-completions gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Full chat-completions URL
    pub endpoint: String,
    /// Model name sent with every request
    pub model: String,
    /// Bearer token, passed through as-is
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Most recent context turns forwarded per call
    pub history_limit: usize,
    /// Transport timeout
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create config for a specific endpoint and model
    pub fn new(endpoint: &str, model: &str) -> Self {
        GatewayConfig {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: None,
            max_output_tokens: 1200,
            temperature: 0.0,
            history_limit: 5,
            timeout: Duration::from_secs(60),
        }
    }

    /// Create config from `DATASQUAD_GATEWAY_URL`, `DATASQUAD_MODEL` and
    /// `DATASQUAD_API_KEY`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(ENV_GATEWAY_URL).ok_or(GatewayError::MissingEnv(ENV_GATEWAY_URL))?;
        let model = lookup(ENV_MODEL).ok_or(GatewayError::MissingEnv(ENV_MODEL))?;
        let mut config = Self::new(&endpoint, &model);
        config.api_key = lookup(ENV_API_KEY).filter(|k| !k.is_empty());
        config.validate()?;
        Ok(config)
    }

    /// Set bearer token
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(GatewayError::InvalidConfig(format!(
                "endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }
        if self.model.trim().is_empty() {
            return Err(GatewayError::InvalidConfig("model must not be empty".to_string()));
        }
        if self.max_output_tokens == 0 {
            return Err(GatewayError::InvalidConfig(
                "max_output_tokens must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
