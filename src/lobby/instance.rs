//! Lobby instance implementation and lifecycle management
//!
//! This module contains the core lobby logic for slot assignment, ready-up
//! and state transitions. It is purely synchronous: timers, broadcasts and
//! persistence are driven by the lobby manager around these transitions.

use crate::error::{LobbyError, LobbyResult};
use crate::types::{
    LobbyConnectInfo, LobbyId, LobbySummary, LobbyType, PlayerId, Slot, SlotView,
};
use crate::utils::current_timestamp;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default ready-up window once a lobby fills
pub const DEFAULT_READY_UP_SECONDS: i64 = 30;

/// Possible states of a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LobbyState {
    /// Lobby is accepting players into free slots
    Waiting,
    /// Every slot is filled and players have a limited time to ready up
    ReadyingUp,
    /// Everyone readied; the game is running
    InProgress,
    /// Lobby was closed (terminal state)
    Ended,
}

/// What an accepted join changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Previous slot when the player switched slots within this lobby
    pub moved_from: Option<Slot>,
    /// Whether this join filled the lobby and started the ready-up
    pub ready_up_started: bool,
}

/// What a removal changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Slot the player vacated
    pub slot: Slot,
    /// Whether an in-progress ready-up was rolled back to Waiting
    pub rolled_back: bool,
}

/// A lobby and its slot occupancy
#[derive(Debug, Clone)]
pub struct Lobby {
    id: LobbyId,
    lobby_type: LobbyType,
    state: LobbyState,
    map_name: String,
    league: String,
    created_by: PlayerId,
    slots: BTreeMap<Slot, PlayerId>,
    spectators: BTreeSet<PlayerId>,
    ready: BTreeSet<PlayerId>,
    banned: BTreeSet<PlayerId>,
    ready_up_timeout: Duration,
    ready_up_deadline: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Lobby {
    /// Create a waiting lobby with the default ready-up window
    pub fn new(
        id: LobbyId,
        lobby_type: LobbyType,
        map_name: impl Into<String>,
        league: impl Into<String>,
        created_by: impl Into<PlayerId>,
    ) -> Self {
        Self {
            id,
            lobby_type,
            state: LobbyState::Waiting,
            map_name: map_name.into(),
            league: league.into(),
            created_by: created_by.into(),
            slots: BTreeMap::new(),
            spectators: BTreeSet::new(),
            ready: BTreeSet::new(),
            banned: BTreeSet::new(),
            ready_up_timeout: Duration::seconds(DEFAULT_READY_UP_SECONDS),
            ready_up_deadline: None,
            created_at: current_timestamp(),
        }
    }

    /// Override the ready-up window
    pub fn with_ready_up_timeout(mut self, timeout: Duration) -> Self {
        self.ready_up_timeout = timeout;
        self
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn lobby_type(&self) -> LobbyType {
        self.lobby_type
    }

    pub fn state(&self) -> LobbyState {
        self.state
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn league(&self) -> &str {
        &self.league
    }

    pub fn created_by(&self) -> &PlayerId {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ready_up_timeout(&self) -> Duration {
        self.ready_up_timeout
    }

    pub fn ready_up_deadline(&self) -> Option<DateTime<Utc>> {
        self.ready_up_deadline
    }

    /// Slot currently held by a player
    pub fn slot_of(&self, player: &PlayerId) -> Option<Slot> {
        self.slots
            .iter()
            .find_map(|(slot, occupant)| (occupant == player).then_some(*slot))
    }

    pub fn occupant(&self, slot: Slot) -> Option<&PlayerId> {
        self.slots.get(&slot)
    }

    pub fn has_player(&self, player: &PlayerId) -> bool {
        self.slot_of(player).is_some()
    }

    pub fn is_spectating(&self, player: &PlayerId) -> bool {
        self.spectators.contains(player)
    }

    pub fn is_ready(&self, player: &PlayerId) -> bool {
        self.ready.contains(player)
    }

    pub fn is_banned(&self, player: &PlayerId) -> bool {
        self.banned.contains(player)
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.lobby_type.slot_count()
    }

    pub fn is_everyone_ready(&self) -> bool {
        !self.slots.is_empty() && self.slots.values().all(|p| self.ready.contains(p))
    }

    /// Players occupying slots, in slot order
    pub fn players(&self) -> Vec<PlayerId> {
        self.slots.values().cloned().collect()
    }

    pub fn spectators(&self) -> Vec<PlayerId> {
        self.spectators.iter().cloned().collect()
    }

    pub fn ready_players(&self) -> Vec<PlayerId> {
        self.ready.iter().cloned().collect()
    }

    /// Return to Waiting, forgetting every ready confirmation
    fn roll_back_ready_up(&mut self) {
        self.state = LobbyState::Waiting;
        self.ready.clear();
        self.ready_up_deadline = None;
    }

    /// Put a player into a slot
    ///
    /// Filling the last slot of a waiting lobby starts the ready-up.
    pub fn add_player(&mut self, player: &PlayerId, slot: Slot) -> LobbyResult<JoinOutcome> {
        if self.state == LobbyState::Ended {
            return Err(LobbyError::LobbyClosed { lobby_id: self.id });
        }
        if self.banned.contains(player) {
            return Err(LobbyError::PlayerBanned {
                player_id: player.clone(),
                lobby_id: self.id,
            });
        }
        if slot.class_index >= self.lobby_type.classes().len() {
            return Err(LobbyError::InvalidSlot {
                reason: format!("slot {:?} does not exist in {} lobbies", slot, self.lobby_type),
            });
        }

        match self.slots.get(&slot) {
            Some(occupant) if occupant == player => {
                return Ok(JoinOutcome {
                    moved_from: None,
                    ready_up_started: false,
                });
            }
            Some(_) => {
                return Err(LobbyError::SlotTaken {
                    lobby_id: self.id,
                    slot: format!("{} {}", slot.team, self.lobby_type.class_name(slot)),
                });
            }
            None => {}
        }

        let moved_from = self.slot_of(player);
        if let Some(previous) = moved_from {
            self.slots.remove(&previous);
        }
        self.spectators.remove(player);
        self.slots.insert(slot, player.clone());

        let ready_up_started = self.state == LobbyState::Waiting && self.is_full();
        if ready_up_started {
            self.state = LobbyState::ReadyingUp;
            self.ready.clear();
            self.ready_up_deadline = Some(current_timestamp() + self.ready_up_timeout);
        }

        Ok(JoinOutcome {
            moved_from,
            ready_up_started,
        })
    }

    /// Vacate a player's slot
    ///
    /// Leaving during ready-up breaks the full lobby, so the ready-up is
    /// rolled back.
    pub fn remove_player(&mut self, player: &PlayerId) -> LobbyResult<RemoveOutcome> {
        let slot = self
            .slot_of(player)
            .ok_or_else(|| LobbyError::PlayerNotInLobby {
                player_id: player.clone(),
                lobby_id: self.id,
            })?;

        self.slots.remove(&slot);
        self.ready.remove(player);

        let rolled_back = self.state == LobbyState::ReadyingUp;
        if rolled_back {
            self.roll_back_ready_up();
        }

        Ok(RemoveOutcome { slot, rolled_back })
    }

    pub fn add_spectator(&mut self, player: &PlayerId) -> LobbyResult<()> {
        if self.state == LobbyState::Ended {
            return Err(LobbyError::LobbyClosed { lobby_id: self.id });
        }
        if self.has_player(player) {
            return Err(LobbyError::AlreadyInLobby {
                player_id: player.clone(),
                lobby_id: self.id,
            });
        }
        if !self.spectators.insert(player.clone()) {
            return Err(LobbyError::AlreadySpectating {
                player_id: player.clone(),
                lobby_id: self.id,
            });
        }
        Ok(())
    }

    pub fn remove_spectator(&mut self, player: &PlayerId) -> LobbyResult<()> {
        if !self.spectators.remove(player) {
            return Err(LobbyError::NotSpectating {
                player_id: player.clone(),
                lobby_id: self.id,
            });
        }
        Ok(())
    }

    /// Confirm a player as ready
    ///
    /// Returns true when this was the last confirmation and the lobby moved
    /// to InProgress.
    pub fn ready_player(&mut self, player: &PlayerId) -> LobbyResult<bool> {
        if self.state != LobbyState::ReadyingUp {
            return Err(LobbyError::NotReadyingUp { lobby_id: self.id });
        }
        if !self.has_player(player) {
            return Err(LobbyError::PlayerNotInLobby {
                player_id: player.clone(),
                lobby_id: self.id,
            });
        }

        self.ready.insert(player.clone());

        if self.is_everyone_ready() {
            self.state = LobbyState::InProgress;
            self.ready_up_deadline = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// Withdraw a player's ready confirmation
    pub fn unready_player(&mut self, player: &PlayerId) -> LobbyResult<()> {
        if self.state != LobbyState::ReadyingUp {
            return Err(LobbyError::NotReadyingUp { lobby_id: self.id });
        }
        if !self.has_player(player) {
            return Err(LobbyError::PlayerNotInLobby {
                player_id: player.clone(),
                lobby_id: self.id,
            });
        }
        self.ready.remove(player);
        Ok(())
    }

    /// Apply an expired ready-up: everyone is un-readied and removed
    ///
    /// Returns the removed players; a lobby that is no longer readying up is
    /// left untouched.
    pub fn expire_ready_up(&mut self) -> Vec<PlayerId> {
        if self.state != LobbyState::ReadyingUp {
            return Vec::new();
        }
        let removed = self.players();
        self.slots.clear();
        self.roll_back_ready_up();
        removed
    }

    /// Bar a player from rejoining
    pub fn ban(&mut self, player: &PlayerId) {
        self.banned.insert(player.clone());
    }

    /// End the lobby, returning the players released from their slots
    pub fn close(&mut self) -> LobbyResult<Vec<PlayerId>> {
        if self.state == LobbyState::Ended {
            return Err(LobbyError::AlreadyClosed { lobby_id: self.id });
        }
        self.state = LobbyState::Ended;
        self.ready.clear();
        self.ready_up_deadline = None;
        self.spectators.clear();
        let released = self.players();
        self.slots.clear();
        Ok(released)
    }

    /// Client-facing view of the lobby
    pub fn summary(&self) -> LobbySummary {
        let slots = self
            .lobby_type
            .slots()
            .map(|slot| {
                let occupant = self.slots.get(&slot).cloned();
                let ready = occupant.as_ref().is_some_and(|p| self.ready.contains(p));
                SlotView {
                    team: slot.team,
                    class: self.lobby_type.class_name(slot).to_string(),
                    steamid: occupant,
                    ready,
                }
            })
            .collect();

        LobbySummary {
            id: self.id,
            lobby_type: self.lobby_type,
            state: self.state,
            map_name: self.map_name.clone(),
            league: self.league.clone(),
            created_by: self.created_by.clone(),
            slots,
            spectators: self.spectators.len(),
            ready_up_deadline: self.ready_up_deadline.map(|d| d.timestamp()),
        }
    }

    /// Payload handed to players when the game starts
    pub fn connect_info(&self) -> LobbyConnectInfo {
        LobbyConnectInfo {
            id: self.id,
            lobby_type: self.lobby_type,
            map_name: self.map_name.clone(),
            league: self.league.clone(),
            players: self.players(),
        }
    }
}
