//! Configuration management
//!
//! Settings are resolved with the following precedence:
//! 1. Environment variables
//! 2. ao-gateway.toml configuration file
//! 3. Default values
//!
//! Inside the config file, `${VAR_NAME}` expands to the value of the
//! corresponding environment variable.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;

/// Main configuration for ao-gateway
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Task queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Sub-agent orchestrator configuration
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API key for HTTP API authentication
    pub key: Option<String>,

    /// Port for HTTP API server
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Allowed CORS origins (e.g., ["http://localhost:3000"])
    /// If empty, all origins are allowed
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: None,
            port: default_api_port(),
            allowed_origins: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Retries allowed per task before a failure becomes permanent
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for retry backoff in milliseconds
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,

    /// Upper bound on retry backoff in milliseconds
    #[serde(default = "default_retry_backoff_cap_ms")]
    pub retry_backoff_cap_ms: u64,

    /// Default number of tasks returned by a poll
    #[serde(default = "default_poll_limit")]
    pub default_poll_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            retry_backoff_cap_ms: default_retry_backoff_cap_ms(),
            default_poll_limit: default_poll_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of sub-agent tasks running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Timeout applied to sub-agent tasks that do not set one
    #[serde(default = "default_task_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Whether dependency outputs are injected into dependent task contexts
    #[serde(default = "default_feedback_enabled")]
    pub feedback_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_timeout_secs: default_task_timeout_secs(),
            feedback_enabled: default_feedback_enabled(),
        }
    }
}

fn default_api_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "data/ao-gateway.db".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_base_ms() -> u64 {
    1000
}

fn default_retry_backoff_cap_ms() -> u64 {
    60_000
}

fn default_poll_limit() -> usize {
    10
}

fn default_max_concurrency() -> usize {
    8
}

fn default_task_timeout_secs() -> u64 {
    120
}

fn default_feedback_enabled() -> bool {
    true
}

impl Config {
    /// Expand `${VAR_NAME}` references to environment variable values.
    ///
    /// Unknown variables expand to the empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // consume '{'

                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '}' {
                        chars.next(); // consume '}'
                        break;
                    }
                    var_name.push(chars.next().unwrap());
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file.
    ///
    /// `${VAR_NAME}` references in the file are expanded before parsing,
    /// and environment variables override the parsed values.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let expanded_content = Self::expand_env_vars(&toml_content);

        let config: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        let mut cfg = Self::from_toml_config(config);
        cfg.apply_env_overrides();

        Ok(cfg)
    }

    /// Load configuration from the default locations.
    ///
    /// Tries `./ao-gateway.toml` first, then falls back to environment
    /// variables only.
    pub fn load() -> crate::Result<Self> {
        if Path::new("ao-gateway.toml").exists() {
            return Self::from_toml_file("ao-gateway.toml");
        }

        Ok(Self::from_env())
    }

    /// Build a Config from the parsed TOML structure.
    fn from_toml_config(toml: TomlConfig) -> Self {
        let api = toml.api.unwrap_or_default();
        let api_config = ApiConfig {
            key: api.key,
            port: api.port.unwrap_or_else(default_api_port),
            allowed_origins: api.allowed_origins,
        };

        let storage = toml.storage.unwrap_or_default();
        let storage_config = StorageConfig {
            db_path: storage.db_path.unwrap_or_else(default_db_path),
        };

        let queue = toml.queue.unwrap_or_default();
        let queue_config = QueueConfig {
            max_retries: queue.max_retries.unwrap_or_else(default_max_retries),
            retry_backoff_base_ms: queue
                .retry_backoff_base_ms
                .unwrap_or_else(default_retry_backoff_base_ms),
            retry_backoff_cap_ms: queue
                .retry_backoff_cap_ms
                .unwrap_or_else(default_retry_backoff_cap_ms),
            default_poll_limit: queue.default_poll_limit.unwrap_or_else(default_poll_limit),
        };

        let orchestrator = toml.orchestrator.unwrap_or_default();
        let orchestrator_config = OrchestratorConfig {
            max_concurrency: orchestrator
                .max_concurrency
                .unwrap_or_else(default_max_concurrency),
            default_timeout_secs: orchestrator
                .default_timeout_secs
                .unwrap_or_else(default_task_timeout_secs),
            feedback_enabled: orchestrator
                .feedback_enabled
                .unwrap_or_else(default_feedback_enabled),
        };

        Config {
            api: api_config,
            storage: storage_config,
            queue: queue_config,
            orchestrator: orchestrator_config,
        }
    }

    /// Override settings from environment variables.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("API_KEY") {
            self.api.key = Some(key);
        }
        if let Ok(port) = std::env::var("API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }
        if let Ok(origins) = std::env::var("API_ALLOWED_ORIGINS") {
            self.api.allowed_origins =
                Some(origins.split(',').map(|s| s.trim().to_string()).collect());
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            self.storage.db_path = path;
        }

        if let Ok(n) = std::env::var("QUEUE_MAX_RETRIES") {
            if let Ok(n) = n.parse() {
                self.queue.max_retries = n;
            }
        }
        if let Ok(ms) = std::env::var("QUEUE_RETRY_BACKOFF_BASE_MS") {
            if let Ok(ms) = ms.parse() {
                self.queue.retry_backoff_base_ms = ms;
            }
        }
        if let Ok(ms) = std::env::var("QUEUE_RETRY_BACKOFF_CAP_MS") {
            if let Ok(ms) = ms.parse() {
                self.queue.retry_backoff_cap_ms = ms;
            }
        }
        if let Ok(n) = std::env::var("QUEUE_POLL_LIMIT") {
            if let Ok(n) = n.parse() {
                self.queue.default_poll_limit = n;
            }
        }

        if let Ok(n) = std::env::var("ORCH_MAX_CONCURRENCY") {
            if let Ok(n) = n.parse() {
                self.orchestrator.max_concurrency = n;
            }
        }
        if let Ok(secs) = std::env::var("ORCH_DEFAULT_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.orchestrator.default_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("ORCH_FEEDBACK_ENABLED") {
            self.orchestrator.feedback_enabled = v.to_lowercase() != "false";
        }
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        cfg
    }
}

// ============================================================================
// TOML structures (file parsing only)
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    api: Option<TomlApiConfig>,
    storage: Option<TomlStorageConfig>,
    queue: Option<TomlQueueConfig>,
    orchestrator: Option<TomlOrchestratorConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlApiConfig {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlStorageConfig {
    #[serde(default)]
    db_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlQueueConfig {
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    retry_backoff_base_ms: Option<u64>,
    #[serde(default)]
    retry_backoff_cap_ms: Option<u64>,
    #[serde(default)]
    default_poll_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlOrchestratorConfig {
    #[serde(default)]
    max_concurrency: Option<usize>,
    #[serde(default)]
    default_timeout_secs: Option<u64>,
    #[serde(default)]
    feedback_enabled: Option<bool>,
}
