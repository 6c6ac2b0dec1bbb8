use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Config directory not found")]
    DirectoryNotFound,

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub llm: LLMConfig,
    pub policy: PolicyConfig,
    pub executor: ExecutorConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: String,
    pub model: String,
    pub api_url: String,
    pub api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PolicyConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ExecutorConfig {
    pub timeout_seconds: u64,
    pub max_output_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        LLMConfig {
            provider: "anthropic".to_string(),
            model: "claude-3-haiku-20240307".to_string(),
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            api_key: None,
            timeout_seconds: 30,
            max_tokens: 1024,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            path: PathBuf::from("critic_rules.txt"),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            timeout_seconds: 30,
            max_output_bytes: 64 * 1024,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            enabled: true,
            log_path: None,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME")
            .map_err(|_| ConfigError::DirectoryNotFound)?;
        Ok(PathBuf::from(home).join(".config").join("kubetalk"))
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, falling back to defaults
    /// when no file exists
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default_config());
        }

        Self::load_from(&path)
    }

    /// Load configuration from an explicit file, which must exist
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&contents)?;

        config.validate()?;

        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            llm: LLMConfig::default(),
            policy: PolicyConfig::default(),
            executor: ExecutorConfig::default(),
            audit: AuditConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.provider != "anthropic" {
            return Err(ConfigError::InvalidValue(format!(
                "Unsupported LLM provider: {}. Only 'anthropic' is supported",
                self.llm.provider
            )));
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue("llm.model must not be empty".to_string()));
        }

        if self.llm.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "llm.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(ConfigError::InvalidValue(
                "llm.max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.executor.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "executor.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.executor.max_output_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "executor.max_output_bytes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get API key from environment variable or config
    pub fn get_api_key(&self) -> Option<String> {
        // First try environment variable
        if let Ok(key) = std::env::var(&self.llm.api_key_env)
            && !key.is_empty()
        {
            return Some(key);
        }

        // Fall back to config file if present
        self.llm.api_key.clone()
    }

    /// Resolve the audit log path: explicit setting or ~/.config/kubetalk/history.log
    pub fn audit_log_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.audit.log_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("history.log")),
        }
    }
}
