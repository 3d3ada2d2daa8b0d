//! Main application configuration
//!
//! This module defines the primary configuration structures for the lobby
//! service, including environment variable and TOML file loading and
//! validation.

use crate::config::chat::ChatSettings;
use crate::config::lobby::LobbySettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub lobby: LobbySettings,
    pub chat: ChatSettings,
    pub metrics: MetricsSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Health and metrics endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Serve /health and /metrics at all
    pub enabled: bool,
    /// Bind address of the health server
    pub host: String,
    /// Port of the health server
    pub port: u16,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "ready-room".to_string(),
            log_level: "info".to_string(),
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

fn env_parse<T: FromStr>(name: &str, target: &mut T) -> Result<()> {
    if let Ok(value) = env::var(name) {
        *target = value
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", name, value))?;
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        env_parse(
            "SHUTDOWN_TIMEOUT_SECONDS",
            &mut self.service.shutdown_timeout_seconds,
        )?;

        // Lobby settings
        env_parse(
            "READY_UP_TIMEOUT_SECONDS",
            &mut self.lobby.ready_up_timeout_seconds,
        )?;
        env_parse("SCROLLBACK_CAPACITY", &mut self.lobby.scrollback_capacity)?;

        // Chat settings
        env_parse("CHAT_LOGS_ENABLED", &mut self.chat.logs_enabled)?;
        if let Ok(dir) = env::var("CHAT_LOGS_DIR") {
            self.chat.logs_dir = dir;
        }
        if let Ok(dir) = env::var("GLOBAL_LOG_DIR") {
            self.chat.global_log_dir = dir;
        }
        env_parse("CHAT_LOG_QUEUE_CAPACITY", &mut self.chat.log_queue_capacity)?;

        // Metrics settings
        env_parse("METRICS_ENABLED", &mut self.metrics.enabled)?;
        if let Ok(host) = env::var("METRICS_HOST") {
            self.metrics.host = host;
        }
        env_parse("METRICS_PORT", &mut self.metrics.port)?;

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get the ready-up window as Duration
    pub fn ready_up_timeout(&self) -> Duration {
        self.lobby.ready_up_timeout()
    }

    /// Address the health server binds to
    pub fn metrics_addr(&self) -> String {
        format!("{}:{}", self.metrics.host, self.metrics.port)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.lobby.ready_up_timeout_seconds == 0 {
        return Err(anyhow!("Ready-up timeout must be greater than 0"));
    }

    // Validate chat settings
    if config.lobby.scrollback_capacity == 0 {
        return Err(anyhow!("Scrollback capacity must be greater than 0"));
    }
    if config.chat.log_queue_capacity == 0 {
        return Err(anyhow!("Chat log queue capacity must be greater than 0"));
    }
    if config.chat.logs_enabled && config.chat.logs_dir.is_empty() {
        return Err(anyhow!("Chat logs directory cannot be empty"));
    }

    // Validate ports
    if config.metrics.enabled && config.metrics.port == 0 {
        return Err(anyhow!("Metrics port cannot be 0"));
    }

    Ok(())
}
