//! Configuration management for the lobby service
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and default values.

pub mod app;
pub mod chat;
pub mod lobby;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, MetricsSettings, ServiceSettings};
pub use chat::ChatSettings;
pub use lobby::LobbySettings;
