//! Error types for the lobby service
//!
//! Lobby and chat operations return the typed [`LobbyError`]; configuration
//! loading and service wiring use anyhow like the rest of the binary code.

use crate::types::{LobbyId, PlayerId};

/// Result type alias for service wiring and configuration
pub type Result<T> = anyhow::Result<T>;

/// Result type for lobby, broadcast and chat operations
pub type LobbyResult<T> = std::result::Result<T, LobbyError>;

/// Coarse classification of a [`LobbyError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation is not legal in the lobby's current state
    InvalidTransition,
    /// Slot occupied or player already placed
    SlotConflict,
    /// Player, lobby or membership absent
    NotFound,
    /// Requester lacks authority for the action
    Unauthorized,
    /// Storage or filesystem failure
    ResourceUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("Cannot join a closed lobby: {lobby_id}")]
    LobbyClosed { lobby_id: LobbyId },

    #[error("Lobby already closed: {lobby_id}")]
    AlreadyClosed { lobby_id: LobbyId },

    #[error("Lobby hasn't been filled up yet: {lobby_id}")]
    NotReadyingUp { lobby_id: LobbyId },

    #[error("Lobby is in progress: {lobby_id}")]
    LobbyInProgress { lobby_id: LobbyId },

    #[error("Slot {slot} in lobby {lobby_id} is already taken")]
    SlotTaken { lobby_id: LobbyId, slot: String },

    #[error("Player {player_id} is already in lobby {lobby_id}")]
    AlreadyInLobby {
        player_id: PlayerId,
        lobby_id: LobbyId,
    },

    #[error("Player {player_id} is already spectating lobby {lobby_id}")]
    AlreadySpectating {
        player_id: PlayerId,
        lobby_id: LobbyId,
    },

    #[error("Player {player_id} is banned from lobby {lobby_id}")]
    PlayerBanned {
        player_id: PlayerId,
        lobby_id: LobbyId,
    },

    #[error("Invalid slot: {reason}")]
    InvalidSlot { reason: String },

    #[error("Lobby not found: {lobby_id}")]
    LobbyNotFound { lobby_id: LobbyId },

    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: PlayerId },

    #[error("Player {player_id} is not in lobby {lobby_id}")]
    PlayerNotInLobby {
        player_id: PlayerId,
        lobby_id: LobbyId,
    },

    #[error("Player {player_id} is not spectating lobby {lobby_id}")]
    NotSpectating {
        player_id: PlayerId,
        lobby_id: LobbyId,
    },

    #[error("Not authorized: {reason}")]
    NotAuthorized { reason: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LobbyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LobbyError::LobbyClosed { .. }
            | LobbyError::AlreadyClosed { .. }
            | LobbyError::NotReadyingUp { .. }
            | LobbyError::LobbyInProgress { .. } => ErrorKind::InvalidTransition,
            LobbyError::SlotTaken { .. }
            | LobbyError::AlreadyInLobby { .. }
            | LobbyError::AlreadySpectating { .. }
            | LobbyError::PlayerBanned { .. }
            | LobbyError::InvalidSlot { .. } => ErrorKind::SlotConflict,
            LobbyError::LobbyNotFound { .. }
            | LobbyError::PlayerNotFound { .. }
            | LobbyError::PlayerNotInLobby { .. }
            | LobbyError::NotSpectating { .. } => ErrorKind::NotFound,
            LobbyError::NotAuthorized { .. } => ErrorKind::Unauthorized,
            LobbyError::Storage { .. } | LobbyError::Io(_) => ErrorKind::ResourceUnavailable,
        }
    }

    /// Numeric code handed to clients alongside the message
    pub fn code(&self) -> i32 {
        match self.kind() {
            ErrorKind::InvalidTransition => 4,
            ErrorKind::SlotConflict => 2,
            ErrorKind::NotFound => 5,
            ErrorKind::Unauthorized => 1,
            ErrorKind::ResourceUnavailable => -1,
        }
    }
}
