//! Configuration management for Inkwell.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `INKWELL__`-prefixed environment variables (`INKWELL__REDIS__URL`, ...).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::http::HeaderName;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{InkwellError, Result};

const ENV_PREFIX: &str = "INKWELL";

/// Main configuration for the Inkwell service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InkwellConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Backing store configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Prefix prepended to every rate limit key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound on a single store round trip, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RedisConfig {
    /// Store round trip timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_key_prefix() -> String {
    "inkwell:ratelimit:".to_string()
}

fn default_timeout_ms() -> u64 {
    250
}

/// Rate limiting configuration for the authenticated write routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Request headers whose values form the rate limit key, in order
    #[serde(default = "default_headers")]
    pub headers: Vec<String>,

    /// Maximum requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Window length in seconds
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            headers: default_headers(),
            max_requests: default_max_requests(),
            expiration_secs: default_expiration_secs(),
        }
    }
}

impl RateLimitingConfig {
    /// Window length.
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }
}

fn default_headers() -> Vec<String> {
    vec!["Authorization".to_string()]
}

fn default_max_requests() -> u64 {
    30
}

fn default_expiration_secs() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl InkwellConfig {
    /// Load configuration from defaults, an optional YAML file and the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load configuration from a YAML string layered over the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&InkwellConfig::default())?)
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Self::finish(config)
    }

    /// Like [`InkwellConfig::load`], reading environment overrides from `env`
    /// instead of the process environment when given.
    pub(crate) fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&InkwellConfig::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(InkwellError::Config(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("rate_limiting.headers")
            .source(env);

        Self::finish(builder.add_source(environment).build()?)
    }

    fn finish(config: Config) -> Result<Self> {
        let config: InkwellConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the rate limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;
        if rl.headers.is_empty() {
            return Err(InkwellError::Config(
                "rate_limiting.headers must name at least one header".to_string(),
            ));
        }
        if let Some(blank) = rl.headers.iter().find(|h| h.trim().is_empty()) {
            return Err(InkwellError::Config(format!(
                "rate_limiting.headers contains a blank header name: {blank:?}"
            )));
        }
        if let Some(invalid) = rl
            .headers
            .iter()
            .find(|h| HeaderName::from_bytes(h.as_bytes()).is_err())
        {
            return Err(InkwellError::Config(format!(
                "rate_limiting.headers contains an invalid header name: {invalid:?}"
            )));
        }
        if rl.max_requests == 0 {
            return Err(InkwellError::Config(
                "rate_limiting.max_requests must be at least 1".to_string(),
            ));
        }
        if rl.expiration_secs == 0 {
            return Err(InkwellError::Config(
                "rate_limiting.expiration_secs must be at least 1".to_string(),
            ));
        }
        if self.redis.timeout_ms == 0 {
            return Err(InkwellError::Config(
                "redis.timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
