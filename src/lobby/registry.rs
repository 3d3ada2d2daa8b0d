//! Shared lobby registry
//!
//! Ties together the lobby store, one async mutex per lobby, the live
//! ready-up timers and the index of which lobby each player sits in. Every
//! read-modify-write of a lobby happens while holding that lobby's mutex, so
//! operations on one lobby are linearizable while different lobbies proceed
//! independently.

use crate::error::{LobbyError, LobbyResult};
use crate::lobby::instance::Lobby;
use crate::lobby::store::LobbyStore;
use crate::lobby::timeout::ReadyTimeout;
use crate::types::{LobbyId, PlayerId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Guard proving exclusive access to one lobby
pub type LobbyGuard = OwnedMutexGuard<()>;

pub struct LobbyRegistry {
    store: Arc<dyn LobbyStore>,
    locks: Mutex<HashMap<LobbyId, Arc<AsyncMutex<()>>>>,
    timers: Mutex<HashMap<LobbyId, Arc<ReadyTimeout>>>,
    seats: Mutex<HashMap<PlayerId, LobbyId>>,
}

fn poisoned(what: &str) -> LobbyError {
    LobbyError::Storage {
        message: format!("Failed to acquire {} lock", what),
    }
}

impl LobbyRegistry {
    pub fn new(store: Arc<dyn LobbyStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            seats: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn LobbyStore> {
        &self.store
    }

    /// Take exclusive access to a lobby, waiting for any operation in flight
    pub async fn lock(&self, id: LobbyId) -> LobbyResult<LobbyGuard> {
        let mutex = {
            let mut locks = self.locks.lock().map_err(|_| poisoned("lobby lock table"))?;
            locks
                .entry(id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        Ok(mutex.lock_owned().await)
    }

    /// Drop a closed lobby's mutex from the table
    ///
    /// Only safe once the lobby is saved as Ended: late callers then get a
    /// fresh mutex but every operation rejects an ended lobby.
    pub fn forget(&self, id: LobbyId) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(&id);
        }
    }

    /// Load a lobby, failing with `LobbyNotFound` when it does not exist
    pub async fn find(&self, id: LobbyId) -> LobbyResult<Lobby> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(LobbyError::LobbyNotFound { lobby_id: id })
    }

    pub async fn save(&self, lobby: &Lobby) -> LobbyResult<()> {
        self.store.save(lobby).await
    }

    pub async fn waiting(&self) -> LobbyResult<Vec<Lobby>> {
        self.store.find_waiting().await
    }

    pub async fn next_id(&self) -> LobbyResult<LobbyId> {
        self.store.next_id().await
    }

    /// Lobby a player currently holds a slot in
    pub fn seat_of(&self, player: &PlayerId) -> Option<LobbyId> {
        self.seats.lock().ok()?.get(player).copied()
    }

    /// Record that `player` sits in `lobby`
    ///
    /// Fails with `AlreadyInLobby` when the player sits in a different lobby.
    pub fn claim_seat(&self, player: &PlayerId, lobby: LobbyId) -> LobbyResult<()> {
        let mut seats = self.seats.lock().map_err(|_| poisoned("seat index"))?;
        match seats.get(player) {
            Some(current) if *current != lobby => Err(LobbyError::AlreadyInLobby {
                player_id: player.clone(),
                lobby_id: *current,
            }),
            _ => {
                seats.insert(player.clone(), lobby);
                Ok(())
            }
        }
    }

    /// Forget a player's seat, if it is in `lobby`
    pub fn release_seat(&self, player: &PlayerId, lobby: LobbyId) {
        if let Ok(mut seats) = self.seats.lock() {
            if seats.get(player) == Some(&lobby) {
                seats.remove(player);
            }
        }
    }

    /// Start a new ready-up timer for a lobby, cancelling any previous one
    pub fn arm(&self, id: LobbyId, duration: Duration) -> LobbyResult<Arc<ReadyTimeout>> {
        let timer = Arc::new(ReadyTimeout::new(duration));
        let previous = {
            let mut timers = self.timers.lock().map_err(|_| poisoned("timer table"))?;
            timers.insert(id, timer.clone())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        debug!("Armed ready-up timer for lobby {} ({:?})", id, duration);
        Ok(timer)
    }

    /// Cancel a lobby's live timer; a no-op when none exists
    pub fn cancel_timer(&self, id: LobbyId) -> bool {
        let timer = match self.timers.lock() {
            Ok(mut timers) => timers.remove(&id),
            Err(_) => None,
        };
        match timer {
            Some(timer) => {
                let cancelled = timer.cancel();
                if cancelled {
                    debug!("Cancelled ready-up timer for lobby {}", id);
                }
                cancelled
            }
            None => false,
        }
    }

    /// Remove a fired timer from the table, unless it was already replaced
    pub fn clear_timer(&self, id: LobbyId, timer: &Arc<ReadyTimeout>) {
        if let Ok(mut timers) = self.timers.lock() {
            if timers.get(&id).is_some_and(|t| Arc::ptr_eq(t, timer)) {
                timers.remove(&id);
            }
        }
    }

    /// Live timer of a lobby, if one is registered
    pub fn timer(&self, id: LobbyId) -> Option<Arc<ReadyTimeout>> {
        self.timers.lock().ok()?.get(&id).cloned()
    }

    /// Whether a lobby has an armed timer
    pub fn has_timer(&self, id: LobbyId) -> bool {
        self.timers
            .lock()
            .ok()
            .and_then(|timers| timers.get(&id).map(|t| t.is_armed()))
            .unwrap_or(false)
    }
}
