//! Player identity resolution
//!
//! Login and account storage live outside this crate; lobby and chat code
//! only resolve steam ids into [`Player`] records through [`PlayerDirectory`].

use crate::error::{LobbyError, LobbyResult};
use crate::types::{Player, PlayerId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Resolves players by steam id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlayerDirectory: Send + Sync {
    /// Look up a player, failing with `PlayerNotFound` when unknown
    async fn player_by_steam_id(&self, steam_id: &PlayerId) -> LobbyResult<Player>;
}

/// In-memory directory for tests and the simulator
#[derive(Debug, Default)]
pub struct InMemoryPlayerDirectory {
    players: RwLock<HashMap<PlayerId, Player>>,
}

impl InMemoryPlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a player record
    pub fn insert(&self, player: Player) {
        if let Ok(mut players) = self.players.write() {
            players.insert(player.steam_id.clone(), player);
        }
    }

    pub fn len(&self) -> usize {
        self.players.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PlayerDirectory for InMemoryPlayerDirectory {
    async fn player_by_steam_id(&self, steam_id: &PlayerId) -> LobbyResult<Player> {
        let players = self.players.read().map_err(|_| LobbyError::Storage {
            message: "Failed to acquire player directory lock".to_string(),
        })?;
        players
            .get(steam_id)
            .cloned()
            .ok_or_else(|| LobbyError::PlayerNotFound {
                player_id: steam_id.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup() {
        let directory = InMemoryPlayerDirectory::new();
        directory.insert(Player::new("76561198000000001", "scout"));

        let found = directory
            .player_by_steam_id(&"76561198000000001".to_string())
            .await
            .unwrap();
        assert_eq!(found.name, "scout");

        let missing = directory
            .player_by_steam_id(&"76561198000000009".to_string())
            .await;
        assert!(matches!(missing, Err(LobbyError::PlayerNotFound { .. })));
    }
}
