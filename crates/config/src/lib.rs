//! Configuration loading, validation, and management for Wayfarer.
//!
//! Loads configuration from `~/.wayfarer/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use wayfarer_core::environment::CaptureOptions;
use wayfarer_core::run::AgentSettings;

/// The root configuration structure.
///
/// Maps directly to `~/.wayfarer/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response; provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tasks file read by `wayfarer run` when no `--task` is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_file: Option<PathBuf>,

    /// Where run logs are written
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Environment capture settings
    #[serde(default)]
    pub observation: ObservationConfig,

    /// HTTP environment settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Memory record storage
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Placeholder name → real value, never shown to the model
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sensitive_data: HashMap<String, String>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_log_dir() -> PathBuf {
    AppConfig::config_dir().join("logs")
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sensitive_names: Vec<&String> = self.sensitive_data.keys().collect();
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("tasks_file", &self.tasks_file)
            .field("log_dir", &self.log_dir)
            .field("agent", &self.agent)
            .field("observation", &self.observation)
            .field("browser", &self.browser)
            .field("memory", &self.memory)
            .field("providers", &self.providers)
            .field("sensitive_data", &sensitive_names)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// The `[agent]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_true")]
    pub use_vision: bool,

    #[serde(default = "default_true")]
    pub enable_memory: bool,

    #[serde(default = "default_max_actions_per_step")]
    pub max_actions_per_step: usize,

    #[serde(default = "default_memory_interval")]
    pub memory_interval: u32,

    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    #[serde(default = "default_budget_headroom")]
    pub budget_headroom: usize,

    #[serde(default = "default_decision_attempts")]
    pub decision_attempts: u32,

    #[serde(default = "default_decision_backoff_ms")]
    pub decision_backoff_ms: u64,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
}

fn default_max_steps() -> u32 {
    100
}
fn default_max_failures() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    10
}
fn default_max_actions_per_step() -> usize {
    10
}
fn default_memory_interval() -> u32 {
    10
}
fn default_token_budget() -> usize {
    128_000
}
fn default_budget_headroom() -> usize {
    8_000
}
fn default_decision_attempts() -> u32 {
    3
}
fn default_decision_backoff_ms() -> u64 {
    500
}
fn default_model_timeout_secs() -> u64 {
    120
}
fn default_action_timeout_secs() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_failures: default_max_failures(),
            retry_delay_secs: default_retry_delay_secs(),
            use_vision: true,
            enable_memory: true,
            max_actions_per_step: default_max_actions_per_step(),
            memory_interval: default_memory_interval(),
            token_budget: default_token_budget(),
            budget_headroom: default_budget_headroom(),
            decision_attempts: default_decision_attempts(),
            decision_backoff_ms: default_decision_backoff_ms(),
            model_timeout_secs: default_model_timeout_secs(),
            action_timeout_secs: default_action_timeout_secs(),
        }
    }
}

/// The `[observation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// Margin outside the viewport to include; `-1` means everything
    #[serde(default = "default_viewport_expansion")]
    pub viewport_expansion: i64,

    #[serde(default = "default_true")]
    pub include_dynamic_attributes: bool,

    #[serde(default = "default_true")]
    pub cache_structural_hashes: bool,

    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
}

fn default_viewport_expansion() -> i64 {
    500
}
fn default_settle_timeout_ms() -> u64 {
    5_000
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            viewport_expansion: default_viewport_expansion(),
            include_dynamic_attributes: true,
            cache_structural_hashes: true,
            settle_timeout_ms: default_settle_timeout_ms(),
        }
    }
}

/// The `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Domains every task may navigate to; empty means unrestricted
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Page opened before the first task
    #[serde(default = "default_start_url")]
    pub start_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Elements per viewport page
    #[serde(default = "default_viewport_elements")]
    pub viewport_elements: usize,
}

fn default_user_agent() -> String {
    concat!("wayfarer/", env!("CARGO_PKG_VERSION")).into()
}
fn default_start_url() -> String {
    "about:blank".into()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_viewport_elements() -> usize {
    50
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            allowed_domains: Vec::new(),
            start_url: default_start_url(),
            request_timeout_secs: default_request_timeout_secs(),
            viewport_elements: default_viewport_elements(),
        }
    }
}

/// The `[memory]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// `in_memory` or `file`
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Directory for the file backend. Each run writes its own
    /// `<run log name>.memory.jsonl` there; the log directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_memory_backend() -> String {
    "in_memory".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from `path`, or the default path
    /// (~/.wayfarer/config.toml), then apply environment overrides:
    /// - `WAYFARER_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY` or `OPENAI_API_KEY`, by selected provider
    /// - `WAYFARER_PROVIDER`, `WAYFARER_MODEL`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::config_path();
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Provider first: it decides which vendor key applies.
        if let Some(provider) = lookup("WAYFARER_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("WAYFARER_MODEL") {
            self.default_model = model;
        }

        if let Some(key) = lookup("WAYFARER_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = match self.default_provider.as_str() {
                "anthropic" => lookup("ANTHROPIC_API_KEY"),
                _ => lookup("OPENAI_API_KEY"),
            };
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".wayfarer")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let agent = &self.agent;
        if agent.max_steps == 0 {
            return Err(ConfigError::ValidationError("agent.max_steps must be > 0".into()));
        }
        if agent.max_failures == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_failures must be > 0".into(),
            ));
        }
        if agent.max_actions_per_step == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_actions_per_step must be > 0".into(),
            ));
        }
        if agent.memory_interval == 0 {
            return Err(ConfigError::ValidationError(
                "agent.memory_interval must be > 0".into(),
            ));
        }
        if agent.decision_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "agent.decision_attempts must be > 0".into(),
            ));
        }
        if agent.token_budget < 1_000 {
            return Err(ConfigError::ValidationError(
                "agent.token_budget must be at least 1000".into(),
            ));
        }
        if self.observation.viewport_expansion < -1 {
            return Err(ConfigError::ValidationError(
                "observation.viewport_expansion must be -1 or a non-negative margin".into(),
            ));
        }
        if !matches!(self.memory.backend.as_str(), "in_memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be 'in_memory' or 'file', got '{}'",
                self.memory.backend
            )));
        }
        if self.browser.viewport_elements == 0 {
            return Err(ConfigError::ValidationError(
                "browser.viewport_elements must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// The API key for `provider`: its own section first, then the global key.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }

    /// Hosted providers need a key before any task runs.
    pub fn check_credentials(&self) -> Result<(), ConfigError> {
        let provider = self.default_provider.as_str();
        if matches!(provider, "anthropic" | "openai") && self.api_key_for(provider).is_none() {
            let var = if provider == "anthropic" {
                "ANTHROPIC_API_KEY"
            } else {
                "OPENAI_API_KEY"
            };
            return Err(ConfigError::MissingCredentials(format!(
                "provider '{provider}' needs an API key: set {var} or WAYFARER_API_KEY, or api_key in the config file"
            )));
        }
        Ok(())
    }

    /// The model for the default provider, honoring a per-provider override.
    pub fn model(&self) -> String {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| self.default_model.clone())
    }

    /// Project the configuration onto the agent loop's settings.
    pub fn agent_settings(&self) -> AgentSettings {
        let agent = &self.agent;
        AgentSettings {
            model: self.model(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            max_steps: agent.max_steps,
            max_failures: agent.max_failures,
            retry_delay_secs: agent.retry_delay_secs,
            use_vision: agent.use_vision,
            enable_memory: agent.enable_memory,
            max_actions_per_step: agent.max_actions_per_step,
            memory_interval: agent.memory_interval,
            token_budget: agent.token_budget,
            budget_headroom: agent.budget_headroom,
            decision_attempts: agent.decision_attempts,
            decision_backoff_ms: agent.decision_backoff_ms,
            model_timeout_secs: agent.model_timeout_secs,
            action_timeout_secs: agent.action_timeout_secs,
            settle_timeout_ms: self.observation.settle_timeout_ms,
            capture: CaptureOptions {
                use_visual_reference: agent.use_vision,
                viewport_expansion: self.observation.viewport_expansion,
                include_dynamic_attributes: self.observation.include_dynamic_attributes,
                cache_structural_hashes: self.observation.cache_structural_hashes,
            },
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            tasks_file: None,
            log_dir: default_log_dir(),
            agent: AgentConfig::default(),
            observation: ObservationConfig::default(),
            browser: BrowserConfig::default(),
            memory: MemoryConfig::default(),
            providers: HashMap::new(),
            sensitive_data: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}
