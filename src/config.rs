use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_season")]
    pub default_season: i32,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            workers: default_workers(),
            default_season: default_season(),
            timeout_secs: default_source_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:9000".to_string()
}
fn default_workers() -> usize {
    4
}
fn default_season() -> i32 {
    2024
}
fn default_source_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_plan_max_tokens")]
    pub plan_max_tokens: u32,
    #[serde(default = "default_response_max_tokens")]
    pub response_max_tokens: u32,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            plan_max_tokens: default_plan_max_tokens(),
            response_max_tokens: default_response_max_tokens(),
            timeout_secs: default_ai_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_plan_max_tokens() -> u32 {
    1000
}
fn default_response_max_tokens() -> u32 {
    2000
}
fn default_ai_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl AiConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate source
    if config.source.workers == 0 {
        anyhow::bail!("source.workers must be > 0");
    }
    if config.source.timeout_secs == 0 {
        anyhow::bail!("source.timeout_secs must be > 0");
    }
    if config.source.base_url.is_empty() {
        anyhow::bail!("source.base_url must not be empty");
    }

    // Validate ai
    if config.ai.is_enabled() && config.ai.model.is_none() {
        anyhow::bail!(
            "ai.model must be specified when provider is '{}'",
            config.ai.provider
        );
    }

    match config.ai.provider.as_str() {
        "disabled" | "openai" | "anthropic" => {}
        other => anyhow::bail!(
            "Unknown AI provider: '{}'. Must be disabled, openai, or anthropic.",
            other
        ),
    }

    // Validate cache
    if config.cache.sweep_interval_secs == 0 {
        anyhow::bail!("cache.sweep_interval_secs must be > 0");
    }

    Ok(config)
}
