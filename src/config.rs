//! Process-level configuration
//!
//! Model selection, credentials and run limits. Loaded from the environment or
//! from a TOML file; nothing here is consulted by policies or observers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_openai::{config::OpenAIConfig, Client};
use serde::{Deserialize, Serialize};

use crate::error::{AgentsError, Result};
use crate::runner::RunConfig;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default model for agents without an override
    pub model: String,

    /// API key; falls back to `OPENAI_API_KEY` inside async-openai when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    pub max_turns: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whole-run deadline in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_base: None,
            max_turns: 10,
            temperature: None,
            max_tokens: None,
            timeout_secs: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(model) = lookup("OPENAI_MODEL") {
            config.model = model;
        }
        config.api_key = lookup("OPENAI_API_KEY");
        config.api_base = lookup("OPENAI_BASE_URL");

        if let Some(turns) = lookup("AGENTS_MAX_TURNS") {
            config.max_turns = turns
                .parse()
                .map_err(|_| AgentsError::config(format!("AGENTS_MAX_TURNS is not a number: {}", turns)))?;
        }

        if let Some(timeout) = lookup("AGENTS_TIMEOUT") {
            let secs = timeout
                .parse::<u64>()
                .map_err(|_| AgentsError::config(format!("AGENTS_TIMEOUT is not a number: {}", timeout)))?;
            config.timeout_secs = Some(secs);
        }

        if let Some(temp) = lookup("OPENAI_TEMPERATURE") {
            let t = temp
                .parse::<f32>()
                .map_err(|_| AgentsError::config(format!("OPENAI_TEMPERATURE is not a number: {}", temp)))?;
            config.temperature = Some(t);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(AgentsError::config("model must not be empty"));
        }
        if self.max_turns == 0 {
            return Err(AgentsError::config("max_turns must be at least 1"));
        }
        if self.timeout_secs == Some(0) {
            return Err(AgentsError::config("timeout must be at least 1 second"));
        }
        Ok(())
    }

    /// OpenAI client for this configuration.
    pub fn openai_client(&self) -> Arc<Client<OpenAIConfig>> {
        let mut cfg = OpenAIConfig::new();
        if let Some(key) = &self.api_key {
            cfg = cfg.with_api_key(key);
        }
        if let Some(base) = &self.api_base {
            cfg = cfg.with_api_base(base);
        }
        Arc::new(Client::with_config(cfg))
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            model: self.model.clone(),
            max_turns: self.max_turns,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Configuration builder
#[derive(Default)]
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = Some(base.into());
        self
    }

    pub fn max_turns(mut self, turns: usize) -> Self {
        self.config.max_turns = turns;
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.config.max_tokens = Some(tokens);
        self
    }

    /// Whole-run deadline, rounded up to whole seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.config.timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> Result<AppConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
