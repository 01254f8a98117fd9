//! Broker configuration.
//!
//! Every setting has a default, so the broker runs without a file. Values are
//! layered: defaults, then an optional TOML file, then `LINEMQ_*` environment
//! variables, then whatever the command line sets explicitly.

use serde::Deserialize;
use std::time::Duration;
use std::{env, fs, path::Path};
use thiserror::Error;

use crate::core::delivery_mode::FanoutPolicy;
use crate::core::queue::StoreLimits;
use crate::util::backoff::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_connections: usize,
    pub max_line_bytes: usize,
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".to_string(),
            max_connections: 9,
            max_line_bytes: 1024,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub max_queues: usize,
    pub max_capacity: usize,
    pub max_subscribers: usize,
    pub fanout_policy: FanoutPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let limits = StoreLimits::default();
        Self {
            max_queues: limits.max_queues,
            max_capacity: limits.max_capacity,
            max_subscribers: limits.max_subscribers,
            fanout_policy: limits.fanout_policy,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_attempts,
            retry_delay_ms: policy.delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub queues: QueueConfig,
    pub transport: TransportConfig,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let raw: String = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&raw)?;
    Ok(config)
}

impl Config {
    /// Loads an optional file (falling back to `LINEMQ_CONFIG`), applies
    /// environment overrides and validates the result.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let env_path = env::var("LINEMQ_CONFIG").ok();
        let mut config = match path.map(str::to_string).or(env_path) {
            Some(p) => load_config(p)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `LINEMQ_*` overrides looked up through `get`.
    pub fn apply_overrides<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("LINEMQ_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = get("LINEMQ_MAX_CONNECTIONS") {
            self.server.max_connections = parse_var("LINEMQ_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = get("LINEMQ_MAX_LINE_BYTES") {
            self.server.max_line_bytes = parse_var("LINEMQ_MAX_LINE_BYTES", &v)?;
        }
        if let Some(v) = get("LINEMQ_POLL_INTERVAL_MS") {
            self.server.poll_interval_ms = parse_var("LINEMQ_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("LINEMQ_MAX_QUEUES") {
            self.queues.max_queues = parse_var("LINEMQ_MAX_QUEUES", &v)?;
        }
        if let Some(v) = get("LINEMQ_MAX_CAPACITY") {
            self.queues.max_capacity = parse_var("LINEMQ_MAX_CAPACITY", &v)?;
        }
        if let Some(v) = get("LINEMQ_MAX_SUBSCRIBERS") {
            self.queues.max_subscribers = parse_var("LINEMQ_MAX_SUBSCRIBERS", &v)?;
        }
        if let Some(v) = get("LINEMQ_FANOUT_POLICY") {
            self.queues.fanout_policy = parse_var("LINEMQ_FANOUT_POLICY", &v)?;
        }
        if let Some(v) = get("LINEMQ_MAX_RETRIES") {
            self.transport.max_retries = parse_var("LINEMQ_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("LINEMQ_RETRY_DELAY_MS") {
            self.transport.retry_delay_ms = parse_var("LINEMQ_RETRY_DELAY_MS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.server.max_connections, "server.max_connections"),
            (self.server.max_line_bytes, "server.max_line_bytes"),
            (self.server.poll_interval_ms as usize, "server.poll_interval_ms"),
            (self.queues.max_queues, "queues.max_queues"),
            (self.queues.max_capacity, "queues.max_capacity"),
            (self.queues.max_subscribers, "queues.max_subscribers"),
            (self.transport.max_retries as usize, "transport.max_retries"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_queues: self.queues.max_queues,
            max_capacity: self.queues.max_capacity,
            max_subscribers: self.queues.max_subscribers,
            fanout_policy: self.queues.fanout_policy,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.transport.max_retries,
            Duration::from_millis(self.transport.retry_delay_ms),
        )
    }

    /// Upper bound on how long the event loop sleeps between sweeps.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.server.poll_interval_ms)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Parse(format!("{name}: {e}")))
}
