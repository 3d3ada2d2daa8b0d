//! Chat logging configuration

use serde::{Deserialize, Serialize};

/// Chat logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Write chat to log files at all
    pub logs_enabled: bool,
    /// Root directory of the per-day lobby room logs
    pub logs_dir: String,
    /// Directory of the rotating global log
    pub global_log_dir: String,
    /// Lines buffered per room before senders wait
    pub log_queue_capacity: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            logs_enabled: true,
            logs_dir: "chatlogs".to_string(),
            global_log_dir: ".".to_string(),
            log_queue_capacity: 18,
        }
    }
}
