use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::lifecycle::code::DEFAULT_CODE_LENGTH;

/// HTTP listener settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Requests running longer than this are answered with 408
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Cap on request bodies
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Origins allowed to call the API from a browser. Empty disables CORS,
    /// `*` mirrors any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    1 << 20
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Secret lifecycle settings
#[derive(Debug, Deserialize, Clone)]
pub struct SecretsConfig {
    /// How long a reserved, still-empty code lives
    #[serde(default = "default_placeholder_ttl_secs")]
    pub placeholder_ttl_secs: u64,
    /// How long a populated secret lives, counted from attachment
    #[serde(default = "default_message_ttl_secs")]
    pub message_ttl_secs: u64,
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    /// Collision retries before giving up on a reservation
    #[serde(default = "default_max_reserve_attempts")]
    pub max_reserve_attempts: u32,
}

fn default_placeholder_ttl_secs() -> u64 {
    30 * 60
}

fn default_message_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_code_length() -> usize {
    DEFAULT_CODE_LENGTH
}

fn default_max_reserve_attempts() -> u32 {
    20
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            placeholder_ttl_secs: default_placeholder_ttl_secs(),
            message_ttl_secs: default_message_ttl_secs(),
            code_length: default_code_length(),
            max_reserve_attempts: default_max_reserve_attempts(),
        }
    }
}

impl SecretsConfig {
    pub fn placeholder_ttl(&self) -> Duration {
        Duration::from_secs(self.placeholder_ttl_secs)
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_secs)
    }
}

/// Which key-value backend holds the records
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    /// Single-process only; for local development
    Memory,
}

/// Redis connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// `redis://[:password@]host:port/db`, or `rediss://` for TLS
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound on any single store call
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_command_timeout_ms() -> u64 {
    2000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

/// Store settings
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub redis: RedisConfig,
    /// Sweep interval for the memory backend
    #[serde(default = "default_memory_sweep_secs")]
    pub memory_sweep_secs: u64,
}

fn default_memory_sweep_secs() -> u64 {
    60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis: RedisConfig::default(),
            memory_sweep_secs: default_memory_sweep_secs(),
        }
    }
}

/// Admission control. `rps = 0` turns it off.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub rps: u32,
    /// Bucket capacity; 0 means "same as rps"
    #[serde(default)]
    pub burst: u32,
}

impl RateLimitConfig {
    pub fn effective_burst(&self) -> u32 {
        if self.burst == 0 {
            self.rps
        } else {
            self.burst
        }
    }
}

/// Logging settings
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "burnbox=info,tower_http=info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default config file
            .add_source(File::with_name("config/default").required(false))
            // Override with local config if present
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (prefix: BURNBOX_)
            // e.g., BURNBOX_RATE_LIMIT__RPS, BURNBOX_STORE__REDIS__URL
            .add_source(Self::environment())
            .build()?;

        config.try_deserialize()
    }

    fn environment() -> Environment {
        Environment::with_prefix("BURNBOX")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("server.allowed_origins")
    }
}
