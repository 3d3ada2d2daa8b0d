//! Ready Room - lobby lifecycle and room chat for a game lobby platform
//!
//! This crate provides the lobby state machine with its cancellable ready-up
//! timeout, room-scoped broadcast fan-out, chat scrollback and durable,
//! rotating chat logs.

pub mod broadcast;
pub mod chat;
pub mod config;
pub mod error;
pub mod lobby;
pub mod metrics;
pub mod player;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ErrorKind, LobbyError, LobbyResult, Result};
pub use types::*;

// Re-export key components
pub use broadcast::{Connection, RoomBroadcaster};
pub use chat::{ChatLogger, ChatScrollback, ChatService};
pub use lobby::{LobbyManager, LobbyRegistry, LobbyState, LobbyStore};
pub use player::PlayerDirectory;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
