//! Lobby lifecycle for the lobby service
//!
//! This module handles lobby creation, slot assignment, the ready-up window
//! and closing. A lobby moves Waiting -> ReadyingUp -> InProgress -> Ended,
//! falling back from ReadyingUp to Waiting when the ready-up breaks or times
//! out.

pub mod instance;
pub mod manager;
pub mod registry;
pub mod store;
pub mod timeout;

// Re-export commonly used types
pub use instance::{JoinOutcome, Lobby, LobbyState, RemoveOutcome};
pub use manager::{LobbyManager, LobbyManagerStats};
pub use registry::LobbyRegistry;
pub use store::{InMemoryLobbyStore, LobbyStore};
pub use timeout::{ReadyTimeout, TimerOutcome, TimerState};
