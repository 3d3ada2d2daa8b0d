//! Lobby persistence
//!
//! The store holds authoritative lobby records. Mutations are serialized per
//! lobby by the registry, so implementations only need to make individual
//! reads and writes atomic.

use crate::error::{LobbyError, LobbyResult};
use crate::lobby::instance::{Lobby, LobbyState};
use crate::types::LobbyId;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Storage backend for lobbies
#[async_trait]
pub trait LobbyStore: Send + Sync {
    /// Reserve a fresh lobby id
    async fn next_id(&self) -> LobbyResult<LobbyId>;

    /// Insert or overwrite a lobby record
    async fn save(&self, lobby: &Lobby) -> LobbyResult<()>;

    async fn find_by_id(&self, id: LobbyId) -> LobbyResult<Option<Lobby>>;

    /// Lobbies shown on the lobby list, ordered by id
    async fn find_waiting(&self) -> LobbyResult<Vec<Lobby>>;
}

/// Lobby store kept in process memory
#[derive(Debug)]
pub struct InMemoryLobbyStore {
    lobbies: RwLock<BTreeMap<LobbyId, Lobby>>,
    next_id: AtomicU64,
}

impl InMemoryLobbyStore {
    pub fn new() -> Self {
        Self {
            lobbies: RwLock::new(BTreeMap::new()),
            // Id 0 is the global chat room
            next_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lobbies.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryLobbyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LobbyStore for InMemoryLobbyStore {
    async fn next_id(&self) -> LobbyResult<LobbyId> {
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn save(&self, lobby: &Lobby) -> LobbyResult<()> {
        let mut lobbies = self.lobbies.write().map_err(|_| LobbyError::Storage {
            message: "Failed to acquire lobby store write lock".to_string(),
        })?;
        lobbies.insert(lobby.id(), lobby.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: LobbyId) -> LobbyResult<Option<Lobby>> {
        let lobbies = self.lobbies.read().map_err(|_| LobbyError::Storage {
            message: "Failed to acquire lobby store read lock".to_string(),
        })?;
        Ok(lobbies.get(&id).cloned())
    }

    async fn find_waiting(&self) -> LobbyResult<Vec<Lobby>> {
        let lobbies = self.lobbies.read().map_err(|_| LobbyError::Storage {
            message: "Failed to acquire lobby store read lock".to_string(),
        })?;
        Ok(lobbies
            .values()
            .filter(|l| l.state() == LobbyState::Waiting)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LobbyType;

    #[tokio::test]
    async fn test_ids_skip_global_room() {
        let store = InMemoryLobbyStore::new();
        assert_eq!(store.next_id().await.unwrap(), 1);
        assert_eq!(store.next_id().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let store = InMemoryLobbyStore::new();
        let mut closed = Lobby::new(1, LobbyType::Sixes, "cp_gullywash", "ugc", "a");
        closed.close().unwrap();
        store.save(&closed).await.unwrap();
        store
            .save(&Lobby::new(2, LobbyType::Fours, "koth_product", "ozf", "b"))
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        let found = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(found.state(), LobbyState::Ended);
        assert!(store.find_by_id(3).await.unwrap().is_none());

        let waiting = store.find_waiting().await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id(), 2);
    }
}
