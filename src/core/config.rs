//! Engine configuration: `lifescore.toml` in the store root plus env overrides.
//!
//! A missing file is not an error; every field has a default.

use crate::core::error::EngineError;
use crate::core::store::Store;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;

pub const API_KEY_ENV_VAR: &str = "LIFESCORE_LLM_API_KEY";
const BASE_URL_ENV_VAR: &str = "LIFESCORE_LLM_BASE_URL";
const MODEL_ENV_VAR: &str = "LIFESCORE_LLM_MODEL";
const TIMEOUT_ENV_VAR: &str = "LIFESCORE_LLM_TIMEOUT_SECS";

const DEFAULT_STARTING_LIFESCORE: i64 = 50;
const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 8;
const DEFAULT_MAX_TOKENS: u16 = 160;
const DEFAULT_TEMPERATURE: f32 = 0.4;
const DEFAULT_WINDOW_SECS: u64 = 60;
const DEFAULT_MAX_REQUESTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChoice {
    #[default]
    Local,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderChoice,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u16,
    pub temperature: f32,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderChoice::Local,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            api_key: None,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub starting_lifescore: i64,
    pub provider: ProviderConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_lifescore: DEFAULT_STARTING_LIFESCORE,
            provider: ProviderConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0..=100).contains(&self.starting_lifescore) {
            return Err(EngineError::ValidationError(format!(
                "starting_lifescore must be within 0..=100, got {}",
                self.starting_lifescore
            )));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(EngineError::ValidationError(
                "rate_limit.window_secs must be positive".to_string(),
            ));
        }
        if self.provider.temperature < 0.0 {
            return Err(EngineError::ValidationError(
                "provider.temperature must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay environment variables (API key is env-only).
    pub fn apply_env(&mut self) {
        self.provider.api_key = env::var(API_KEY_ENV_VAR)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if let Ok(v) = env::var(BASE_URL_ENV_VAR) {
            if !v.trim().is_empty() {
                self.provider.base_url = v.trim().to_string();
            }
        }
        if let Ok(v) = env::var(MODEL_ENV_VAR) {
            if !v.trim().is_empty() {
                self.provider.model = v.trim().to_string();
            }
        }
        if let Some(secs) = env::var(TIMEOUT_ENV_VAR)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
        {
            self.provider.timeout_secs = secs;
        }
    }
}

pub fn parse_config(content: &str) -> Result<EngineConfig, EngineError> {
    let config: EngineConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load `<root>/lifescore.toml` (defaults if absent) and apply env overrides.
pub fn load_config(store: &Store) -> Result<EngineConfig, EngineError> {
    let path = store.config_path();
    let mut config = if path.exists() {
        let content = fs::read_to_string(&path).map_err(EngineError::IoError)?;
        parse_config(&content)?
    } else {
        EngineConfig::default()
    };
    config.apply_env();
    Ok(config)
}
