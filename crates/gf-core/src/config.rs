use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::phase_map::PhaseAgentMap;
use crate::types::{AgentRole, PhaseType};

/// Environment variable overriding `llm.base_url`.
pub const ENV_LLM_URL: &str = "GHOSTFLOW_LLM_URL";
/// Environment variable overriding `persistence.remote_url`.
pub const ENV_PERSIST_URL: &str = "GHOSTFLOW_PERSIST_URL";

/// Top-level configuration loaded from `~/.ghostflow/config.toml`.
///
/// No credentials live here. Provider keys are read from the environment
/// at request time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Per-phase role overrides, e.g. `review = "qa"`.
    #[serde(default)]
    pub phase_agents: BTreeMap<String, String>,
}

impl Config {
    /// Load config from `~/.ghostflow/config.toml`, falling back to
    /// defaults when the file does not exist. Environment overrides are
    /// applied after parsing.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            let text =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            Config::default()
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let mut cfg: Config =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.llm.validate()?;
        self.persistence.validate()?;
        self.phase_agent_map()?;
        Ok(())
    }

    /// Build the resolver table: defaults plus `[phase_agents]` overrides.
    pub fn phase_agent_map(&self) -> Result<PhaseAgentMap, ConfigError> {
        let mut overrides = Vec::with_capacity(self.phase_agents.len());
        for (phase, role) in &self.phase_agents {
            let phase: PhaseType = phase
                .parse()
                .map_err(|e: String| ConfigError::Validation(format!("phase_agents: {e}")))?;
            let role: AgentRole = role
                .parse()
                .map_err(|e: String| ConfigError::Validation(format!("phase_agents: {e}")))?;
            overrides.push((phase, role));
        }
        PhaseAgentMap::with_overrides(overrides)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_LLM_URL) {
            if !url.trim().is_empty() {
                self.llm.base_url = url;
            }
        }
        if let Ok(url) = std::env::var(ENV_PERSIST_URL) {
            if !url.trim().is_empty() {
                self.persistence.remote_url = Some(url);
            }
        }
    }

    /// `~/.ghostflow`, the root for config and local state.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ghostflow")
    }

    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("no agent role is mapped to phase '{0}'")]
    UnmappedPhase(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Human,
        }
    }
}

impl GeneralConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "general.log_level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
    #[serde(default = "default_ollama_endpoint")]
    pub ollama_endpoint: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            request_timeout_secs: default_request_timeout(),
            health_timeout_secs: default_health_timeout(),
            ollama_endpoint: default_ollama_endpoint(),
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.base_url must not be empty".to_string(),
            ));
        }
        if self.health_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "llm.health_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_llm_base_url() -> String {
    "http://localhost:3001/api/llm".into()
}
fn default_request_timeout() -> u64 {
    300
}
fn default_health_timeout() -> u64 {
    5
}
fn default_ollama_endpoint() -> String {
    "http://localhost:11434".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_kv_path")]
    pub kv_path: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            database_path: default_database_path(),
            kv_path: default_kv_path(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "persistence.debounce_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `database_path` with a leading `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.database_path)
    }

    /// `kv_path` with a leading `~` expanded.
    pub fn kv_path(&self) -> PathBuf {
        expand_home(&self.kv_path)
    }
}

fn default_database_path() -> String {
    "~/.ghostflow/state.db".into()
}
fn default_kv_path() -> String {
    "~/.ghostflow/state.json".into()
}
fn default_debounce_ms() -> u64 {
    750
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub auto_advance: bool,
    #[serde(default)]
    pub enforce_phase_timeouts: bool,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            auto_advance: false,
            enforce_phase_timeouts: false,
            default_model: default_model(),
            temperature: None,
            max_tokens: None,
        }
    }
}

fn default_model() -> String {
    crate::settings::DEFAULT_MODEL.into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
