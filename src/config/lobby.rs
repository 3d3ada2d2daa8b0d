//! Lobby lifecycle configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lobby lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbySettings {
    /// Seconds players get to ready up once a lobby fills
    pub ready_up_timeout_seconds: u64,
    /// Chat messages kept per room for new viewers
    pub scrollback_capacity: usize,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            ready_up_timeout_seconds: 30,
            scrollback_capacity: 20,
        }
    }
}

impl LobbySettings {
    /// Get the ready-up window as Duration
    pub fn ready_up_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_up_timeout_seconds)
    }
}
