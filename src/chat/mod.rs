//! Chat subsystem: scrollback, durable logs and message sending
//!
//! This module keeps the last messages of each room for new viewers, writes
//! every message to per-room and global log files, and sends chat to the
//! room's public channel.

pub mod global;
pub mod logger;
pub mod scrollback;
pub mod service;

pub use global::GlobalChatLog;
pub use logger::{format_line, ChatLogConfig, ChatLogger};
pub use scrollback::{ChatScrollback, CHAT_HISTORY_CLEAR, CHAT_RECEIVE};
pub use service::ChatService;
