use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
}

/// Model-service settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub primary_model: String,
    pub fallback_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Raises the log level to DEBUG, which includes raw model payloads.
    pub debug: bool,
    /// Per-attempt limit; a timed-out attempt escalates like a failed one.
    pub request_timeout_secs: u64,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            primary_model: "gpt-5".into(),
            fallback_model: "gpt-4.1".into(),
            temperature: 0.1,
            max_tokens: 900,
            debug: false,
            request_timeout_secs: 60,
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
        }
    }
}

impl AiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Support/resistance detection tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub lookback: usize,
    pub swing_window: usize,
    pub count: usize,
    pub swing_weight: f64,
    pub top_candidates: usize,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            lookback: 180,
            swing_window: 3,
            count: 3,
            swing_weight: 3.0,
            top_candidates: 10,
        }
    }
}

/// Fact-pack and result shaping.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FactsConfig {
    pub news_limit: usize,
    /// Longest signal/news/risk-note list kept in a validated result.
    pub list_cap: usize,
}

impl Default for FactsConfig {
    fn default() -> Self {
        Self {
            news_limit: 3,
            list_cap: 8,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ai: AiConfig,
    pub levels: LevelConfig,
    pub facts: FactsConfig,
}

impl AppConfig {
    /// Applies `AI_*` overrides. `lookup` is `std::env::var` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AI_MODEL_PRIMARY") {
            self.ai.primary_model = v;
        }
        if let Some(v) = lookup("AI_MODEL_FALLBACK") {
            self.ai.fallback_model = v;
        }
        if let Some(v) = lookup("AI_TEMPERATURE") {
            self.ai.temperature = parse("AI_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("AI_MAX_TOKENS") {
            self.ai.max_tokens = parse("AI_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("AI_TIMEOUT_SECS") {
            self.ai.request_timeout_secs = parse("AI_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("AI_DEBUG") {
            self.ai.debug = v.trim() == "1";
        }
        if let Some(v) = lookup("OPENAI_BASE_URL") {
            self.ai.base_url = v;
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Reads the JSON config file, then applies environment overrides.
/// A missing file means defaults. Values from a `.env` file count as
/// environment once the binary has loaded it.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)?,
        Err(e) if e.kind() == ErrorKind::NotFound => AppConfig::default(),
        Err(e) => return Err(e.into()),
    };
    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}
