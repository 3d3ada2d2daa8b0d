//! Lobby manager orchestrating lobby operations and their side effects
//!
//! This module provides the LobbyManager that serializes every operation on a
//! lobby behind the registry's per-lobby lock, applies the transition on the
//! [`Lobby`] state machine, persists it, and then fans out room broadcasts,
//! scrollback replays and ready-up timers.

use crate::broadcast::{Connection, RoomBroadcaster};
use crate::chat::{ChatLogger, ChatScrollback};
use crate::error::{LobbyError, LobbyResult};
use crate::lobby::instance::{Lobby, LobbyState, DEFAULT_READY_UP_SECONDS};
use crate::lobby::registry::LobbyRegistry;
use crate::lobby::timeout::{ReadyTimeout, TimerOutcome};
use crate::metrics::MetricsCollector;
use crate::player::PlayerDirectory;
use crate::types::{
    LobbyId, LobbySummary, LobbyType, Player, PlayerId, RoomName, GLOBAL_ROOM,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lobby summary, sent to the public room and the joining player
pub const LOBBY_DATA: &str = "lobbyData";
/// Waiting lobbies, sent to the lobby-list room
pub const LOBBY_LIST_DATA: &str = "lobbyListData";
/// Start of the ready-up, sent to the private room
pub const LOBBY_READY_UP: &str = "lobbyReadyUp";
/// Game start connect payload, sent to the private room
pub const LOBBY_START: &str = "lobbyStart";
/// Lobby closure, sent to the public room
pub const LOBBY_CLOSED: &str = "lobbyClosed";
/// Direct notice to a single player
pub const SEND_NOTIFICATION: &str = "sendNotification";

/// Payload of `lobbyListData`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyListData {
    pub lobbies: Vec<LobbySummary>,
}

/// Payload of `lobbyReadyUp`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyUpNotice {
    pub timeout: u64,
}

/// Payload of `lobbyClosed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyClosedNotice {
    pub id: LobbyId,
    pub manual: bool,
}

/// Payload of `sendNotification`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification: String,
}

/// Statistics about lobby manager operations
#[derive(Debug, Clone, Default)]
pub struct LobbyManagerStats {
    /// Total number of lobbies created
    pub lobbies_created: u64,
    /// Total number of lobbies closed
    pub lobbies_closed: u64,
    /// Number of times a lobby filled and started a ready-up
    pub ready_ups_started: u64,
    /// Ready-ups that expired before everyone confirmed
    pub ready_up_timeouts: u64,
    /// Total number of games started
    pub games_started: u64,
    /// Current number of lobbies that are not closed
    pub active_lobbies: usize,
}

fn encode<T: Serialize>(value: &T) -> LobbyResult<String> {
    serde_json::to_string(value).map_err(|e| {
        error!("Failed to encode payload: {}", e);
        LobbyError::Storage {
            message: format!("failed to encode payload: {}", e),
        }
    })
}

/// The main lobby manager
#[derive(Clone)]
pub struct LobbyManager {
    /// Lobby records, locks, timers and seats
    registry: Arc<LobbyRegistry>,
    /// Room fan-out to connected clients
    broadcaster: Arc<RoomBroadcaster>,
    /// Chat history replayed to new room members
    scrollback: Arc<ChatScrollback>,
    /// Chat log writers, stopped when a lobby closes
    chat_logger: Arc<ChatLogger>,
    /// Identity lookups
    players: Arc<dyn PlayerDirectory>,
    /// Manager statistics
    stats: Arc<RwLock<LobbyManagerStats>>,
    /// Metrics collector for recording lifecycle events
    metrics_collector: Arc<MetricsCollector>,
    /// Length of the ready-up window
    ready_up_timeout: Duration,
}

impl LobbyManager {
    /// Create a new lobby manager with the default ready-up window
    pub fn new(
        registry: Arc<LobbyRegistry>,
        broadcaster: Arc<RoomBroadcaster>,
        scrollback: Arc<ChatScrollback>,
        chat_logger: Arc<ChatLogger>,
        players: Arc<dyn PlayerDirectory>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            scrollback,
            chat_logger,
            players,
            stats: Arc::new(RwLock::new(LobbyManagerStats::default())),
            metrics_collector,
            ready_up_timeout: Duration::from_secs(DEFAULT_READY_UP_SECONDS as u64),
        }
    }

    /// Override the ready-up window
    pub fn with_ready_up_timeout(mut self, timeout: Duration) -> Self {
        self.ready_up_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<LobbyRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<RoomBroadcaster> {
        &self.broadcaster
    }

    pub fn ready_up_timeout(&self) -> Duration {
        self.ready_up_timeout
    }

    /// Get current manager statistics
    pub fn get_stats(&self) -> LobbyResult<LobbyManagerStats> {
        self.stats
            .read()
            .map(|s| s.clone())
            .map_err(|_| LobbyError::Storage {
                message: "Failed to acquire stats lock".to_string(),
            })
    }

    fn update_stats(&self, update: impl FnOnce(&mut LobbyManagerStats)) {
        match self.stats.write() {
            Ok(mut stats) => update(&mut stats),
            Err(_) => warn!("Failed to acquire stats lock, skipping update"),
        }
    }

    /// Current snapshot of a lobby
    pub async fn get_lobby(&self, lobby_id: LobbyId) -> LobbyResult<Lobby> {
        self.registry.find(lobby_id).await
    }

    /// Register a client connection and seed it with the lobby list
    ///
    /// The connection joins the lobby-list room and receives its chat history
    /// and the current waiting lobbies.
    pub async fn connect(
        &self,
        player: Option<&PlayerId>,
        conn: Arc<dyn Connection>,
    ) -> LobbyResult<()> {
        self.broadcaster.connect(player, conn.clone());
        self.broadcaster
            .subscribe(&RoomName::public(GLOBAL_ROOM), conn.id());
        self.scrollback.replay(GLOBAL_ROOM, conn.as_ref());
        self.request_lobby_list(conn.as_ref()).await
    }

    /// Create a new waiting lobby owned by `creator`
    pub async fn create_lobby(
        &self,
        creator: &PlayerId,
        lobby_type: LobbyType,
        map_name: &str,
        league: &str,
    ) -> LobbyResult<LobbySummary> {
        let player = self.players.player_by_steam_id(creator).await?;
        info!(
            "Creating new {} lobby on {} ({}) for {}",
            lobby_type, map_name, league, player.name
        );

        let lobby_id = self.registry.next_id().await?;
        let timeout = chrono::Duration::from_std(self.ready_up_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_READY_UP_SECONDS));
        let lobby = Lobby::new(lobby_id, lobby_type, map_name, league, creator.clone())
            .with_ready_up_timeout(timeout);
        self.registry.save(&lobby).await?;

        self.update_stats(|stats| {
            stats.lobbies_created += 1;
            stats.active_lobbies += 1;
        });
        self.metrics_collector.record_lobby_created(lobby_type);

        info!("Created new {} lobby with ID {}", lobby_type, lobby_id);
        self.broadcast_lobby_list().await;
        Ok(lobby.summary())
    }

    /// Put a player into the `(team, class)` slot of a lobby
    ///
    /// Joining another slot of the lobby the player already sits in moves
    /// them. Filling the last slot starts the ready-up.
    pub async fn join(
        &self,
        steam_id: &PlayerId,
        lobby_id: LobbyId,
        team: &str,
        class: &str,
    ) -> LobbyResult<LobbySummary> {
        let player = self.players.player_by_steam_id(steam_id).await?;
        let _guard = self.registry.lock(lobby_id).await?;
        let mut lobby = self.registry.find(lobby_id).await?;

        let slot = lobby.lobby_type().slot(team, class)?;
        let already_seated = lobby.has_player(steam_id);

        self.registry.claim_seat(steam_id, lobby_id)?;
        let outcome = match lobby.add_player(steam_id, slot) {
            Ok(outcome) => outcome,
            Err(e) => {
                if !already_seated {
                    self.registry.release_seat(steam_id, lobby_id);
                }
                debug!(
                    "Player {} could not join lobby {} as {} {}: {}",
                    steam_id, lobby_id, team, class, e
                );
                return Err(e);
            }
        };
        self.registry.save(&lobby).await?;

        info!(
            "Player '{}' ({}) joined lobby {} as {} {} - size: {}/{}, state: {:?}",
            player.name,
            steam_id,
            lobby_id,
            team,
            class,
            lobby.players().len(),
            lobby.lobby_type().slot_count(),
            lobby.state()
        );

        if !already_seated {
            self.metrics_collector.record_player_joined();
            self.broadcaster
                .subscribe_user(&RoomName::public(lobby_id), steam_id);
            self.broadcaster
                .subscribe_user(&RoomName::private(lobby_id), steam_id);
            if let Some(conn) = self.broadcaster.connection_of(steam_id) {
                self.scrollback.replay(lobby_id, conn.as_ref());
            }
        }

        let summary = lobby.summary();
        let payload = encode(&summary)?;
        self.broadcaster.send_to_user(steam_id, LOBBY_DATA, &payload);
        self.broadcaster
            .send_to_room(&RoomName::public(lobby_id), LOBBY_DATA, &payload);

        if outcome.ready_up_started {
            self.start_ready_up(&lobby)?;
        }

        self.broadcast_lobby_list().await;
        Ok(summary)
    }

    /// Watch a lobby as a logged-in spectator
    ///
    /// A player already sitting in the lobby just gets the lobby data again.
    pub async fn spectate(&self, steam_id: &PlayerId, lobby_id: LobbyId) -> LobbyResult<LobbySummary> {
        self.players.player_by_steam_id(steam_id).await?;
        let _guard = self.registry.lock(lobby_id).await?;
        let mut lobby = self.registry.find(lobby_id).await?;

        if lobby.has_player(steam_id) {
            debug!("Player {} is playing in lobby {}, resending data", steam_id, lobby_id);
        } else {
            lobby.add_spectator(steam_id)?;
            self.registry.save(&lobby).await?;
            self.broadcaster
                .subscribe_user(&RoomName::public(lobby_id), steam_id);
            if let Some(conn) = self.broadcaster.connection_of(steam_id) {
                self.scrollback.replay(lobby_id, conn.as_ref());
            }
            info!("Player {} is spectating lobby {}", steam_id, lobby_id);
        }

        let summary = lobby.summary();
        self.broadcaster
            .send_to_user(steam_id, LOBBY_DATA, &encode(&summary)?);
        Ok(summary)
    }

    /// Watch a lobby from a connection without a logged-in player
    ///
    /// The connection is subscribed to the public room only; the lobby's
    /// spectator set is not touched.
    pub async fn spectate_anonymous(
        &self,
        conn: &dyn Connection,
        lobby_id: LobbyId,
    ) -> LobbyResult<LobbySummary> {
        let lobby = self.registry.find(lobby_id).await?;
        if lobby.state() == LobbyState::Ended {
            return Err(LobbyError::LobbyClosed { lobby_id });
        }

        self.broadcaster
            .subscribe(&RoomName::public(lobby_id), conn.id());
        self.scrollback.replay(lobby_id, conn);

        let summary = lobby.summary();
        if let Err(e) = conn.emit(LOBBY_DATA, &encode(&summary)?) {
            warn!("Failed to send lobby data to connection {}: {}", conn.id(), e);
        }
        debug!("Connection {} is spectating lobby {}", conn.id(), lobby_id);
        Ok(summary)
    }

    /// Stop spectating a lobby
    pub async fn stop_spectating(&self, steam_id: &PlayerId, lobby_id: LobbyId) -> LobbyResult<()> {
        let _guard = self.registry.lock(lobby_id).await?;
        let mut lobby = self.registry.find(lobby_id).await?;
        lobby.remove_spectator(steam_id)?;
        self.registry.save(&lobby).await?;
        self.broadcaster
            .unsubscribe_user(&RoomName::public(lobby_id), steam_id);
        info!("Player {} stopped spectating lobby {}", steam_id, lobby_id);
        Ok(())
    }

    /// Leave a lobby's slot
    pub async fn leave(&self, steam_id: &PlayerId, lobby_id: LobbyId) -> LobbyResult<()> {
        self.kick(steam_id, lobby_id, None, false).await
    }

    /// Remove `target` from a lobby, optionally banning them
    ///
    /// A missing target, or the requester themselves, means leaving. Only the
    /// creator or an admin may remove someone else, and only admins may ban.
    pub async fn kick(
        &self,
        requester: &PlayerId,
        lobby_id: LobbyId,
        target: Option<&PlayerId>,
        ban: bool,
    ) -> LobbyResult<()> {
        let requester_player = self.players.player_by_steam_id(requester).await?;
        let target = target.unwrap_or(requester);
        let self_kick = target == requester;

        if self_kick && ban {
            return Err(LobbyError::NotAuthorized {
                reason: "Player can't ban himself".to_string(),
            });
        }
        if ban && !requester_player.is_admin() {
            return Err(LobbyError::NotAuthorized {
                reason: "Only admins can ban players".to_string(),
            });
        }

        let _guard = self.registry.lock(lobby_id).await?;
        let mut lobby = self.registry.find(lobby_id).await?;

        if !self_kick && !Self::may_administer(&requester_player, &lobby) {
            return Err(LobbyError::NotAuthorized {
                reason: "Not authorized to remove players".to_string(),
            });
        }
        match lobby.state() {
            LobbyState::InProgress => return Err(LobbyError::LobbyInProgress { lobby_id }),
            LobbyState::Ended => return Err(LobbyError::LobbyClosed { lobby_id }),
            _ => {}
        }

        let outcome = lobby.remove_player(target)?;
        if ban {
            lobby.ban(target);
        }
        self.registry.save(&lobby).await?;

        self.registry.release_seat(target, lobby_id);
        if outcome.rolled_back {
            self.registry.cancel_timer(lobby_id);
            info!("Lobby {} ready-up rolled back, state: {:?}", lobby_id, lobby.state());
        }
        self.metrics_collector.record_player_removed();

        self.broadcaster
            .unsubscribe_user(&RoomName::public(lobby_id), target);
        self.broadcaster
            .unsubscribe_user(&RoomName::private(lobby_id), target);

        if self_kick {
            info!("Player {} left lobby {}", target, lobby_id);
        } else {
            info!(
                "Player {} removed from lobby {} by {} (ban: {})",
                target, lobby_id, requester, ban
            );
            let notice = Notification {
                notification: format!("You have been removed from Lobby #{}", lobby_id),
            };
            self.broadcaster
                .send_to_user(target, SEND_NOTIFICATION, &encode(&notice)?);
        }

        self.broadcaster.send_to_room(
            &RoomName::public(lobby_id),
            LOBBY_DATA,
            &encode(&lobby.summary())?,
        );
        self.broadcast_lobby_list().await;
        Ok(())
    }

    /// Confirm a player as ready
    ///
    /// Returns true when this was the last confirmation and the game started.
    pub async fn ready(&self, steam_id: &PlayerId, lobby_id: LobbyId) -> LobbyResult<bool> {
        let _guard = self.registry.lock(lobby_id).await?;
        let mut lobby = self.registry.find(lobby_id).await?;

        let started = lobby.ready_player(steam_id)?;
        if started {
            // The expiry task can only fire under this lock, so the cancel wins.
            self.registry.cancel_timer(lobby_id);
        }
        self.registry.save(&lobby).await?;

        info!(
            "Player {} is ready in lobby {} - ready: {}/{}",
            steam_id,
            lobby_id,
            lobby.ready_players().len(),
            lobby.players().len()
        );

        if started {
            self.update_stats(|stats| stats.games_started += 1);
            self.metrics_collector.record_game_started();
            self.broadcaster.send_to_room(
                &RoomName::private(lobby_id),
                LOBBY_START,
                &encode(&lobby.connect_info())?,
            );
            info!("Lobby {} is starting", lobby_id);
        }

        self.broadcaster.send_to_room(
            &RoomName::public(lobby_id),
            LOBBY_DATA,
            &encode(&lobby.summary())?,
        );
        Ok(started)
    }

    /// Withdraw from the ready-up
    ///
    /// Declining the ready-up also gives up the slot, which rolls the lobby
    /// back to Waiting and cancels its timer.
    pub async fn unready(&self, steam_id: &PlayerId, lobby_id: LobbyId) -> LobbyResult<()> {
        let _guard = self.registry.lock(lobby_id).await?;
        let mut lobby = self.registry.find(lobby_id).await?;

        lobby.unready_player(steam_id)?;
        lobby.remove_player(steam_id)?;
        self.registry.cancel_timer(lobby_id);
        self.registry.save(&lobby).await?;
        self.registry.release_seat(steam_id, lobby_id);
        self.metrics_collector.record_player_removed();

        self.broadcaster
            .unsubscribe_user(&RoomName::public(lobby_id), steam_id);
        self.broadcaster
            .unsubscribe_user(&RoomName::private(lobby_id), steam_id);

        info!(
            "Player {} declined the ready-up of lobby {}, state: {:?}",
            steam_id,
            lobby_id,
            lobby.state()
        );

        self.broadcaster.send_to_room(
            &RoomName::public(lobby_id),
            LOBBY_DATA,
            &encode(&lobby.summary())?,
        );
        self.broadcast_lobby_list().await;
        Ok(())
    }

    /// Close a lobby on a player's request
    ///
    /// Only the creator or an admin may close a lobby.
    pub async fn close(&self, requester: &PlayerId, lobby_id: LobbyId) -> LobbyResult<()> {
        let player = self.players.player_by_steam_id(requester).await?;
        let guard = self.registry.lock(lobby_id).await?;
        let lobby = self.registry.find(lobby_id).await?;

        if !Self::may_administer(&player, &lobby) {
            return Err(LobbyError::NotAuthorized {
                reason: "Player not authorized to close lobby".to_string(),
            });
        }
        self.close_locked(lobby, guard, true).await
    }

    /// Close a lobby without a requesting player, e.g. when its game ends
    pub async fn end(&self, lobby_id: LobbyId) -> LobbyResult<()> {
        let guard = self.registry.lock(lobby_id).await?;
        let lobby = self.registry.find(lobby_id).await?;
        self.close_locked(lobby, guard, false).await
    }

    async fn close_locked(
        &self,
        mut lobby: Lobby,
        guard: crate::lobby::registry::LobbyGuard,
        manual: bool,
    ) -> LobbyResult<()> {
        let lobby_id = lobby.id();
        let released = lobby.close()?;
        self.registry.cancel_timer(lobby_id);
        self.registry.save(&lobby).await?;

        for player in &released {
            self.registry.release_seat(player, lobby_id);
        }

        self.broadcaster.send_to_room(
            &RoomName::public(lobby_id),
            LOBBY_CLOSED,
            &encode(&LobbyClosedNotice {
                id: lobby_id,
                manual,
            })?,
        );
        let unsubscribed = self.broadcaster.close_room(&RoomName::public(lobby_id))
            + self.broadcaster.close_room(&RoomName::private(lobby_id));
        debug!("Lobby {} rooms closed, {} subscriptions dropped", lobby_id, unsubscribed);

        drop(guard);
        self.registry.forget(lobby_id);
        self.chat_logger.stop_logger(lobby_id).await;

        self.update_stats(|stats| {
            stats.lobbies_closed += 1;
            stats.active_lobbies = stats.active_lobbies.saturating_sub(1);
        });
        self.metrics_collector.record_lobby_closed(manual);

        info!(
            "Closed lobby {} (manual: {}), released {} players",
            lobby_id,
            manual,
            released.len()
        );
        self.broadcast_lobby_list().await;
        Ok(())
    }

    fn may_administer(player: &Player, lobby: &Lobby) -> bool {
        player.is_admin() || lobby.created_by() == &player.steam_id
    }

    fn start_ready_up(&self, lobby: &Lobby) -> LobbyResult<()> {
        let lobby_id = lobby.id();
        let timer = self.registry.arm(lobby_id, self.ready_up_timeout)?;

        self.update_stats(|stats| stats.ready_ups_started += 1);
        self.metrics_collector.record_ready_up_started();

        let manager = self.clone();
        tokio::spawn(async move {
            if timer.wait().await != TimerOutcome::Elapsed {
                return;
            }
            if let Err(e) = manager.expire_ready_up(lobby_id, &timer).await {
                error!("Ready-up expiry for lobby {} failed: {}", lobby_id, e);
            }
        });

        let notice = ReadyUpNotice {
            timeout: self.ready_up_timeout.as_secs(),
        };
        self.broadcaster.send_to_room(
            &RoomName::private(lobby_id),
            LOBBY_READY_UP,
            &encode(&notice)?,
        );
        info!(
            "Lobby {} is full, ready-up started ({}s)",
            lobby_id, notice.timeout
        );
        Ok(())
    }

    /// Expire a lobby's ready-up immediately instead of waiting for its timer
    ///
    /// Returns false when the lobby has no live timer or the timer lost to a
    /// cancellation.
    pub async fn expire_now(&self, lobby_id: LobbyId) -> LobbyResult<bool> {
        match self.registry.timer(lobby_id) {
            Some(timer) => self.expire_ready_up(lobby_id, &timer).await,
            None => Ok(false),
        }
    }

    async fn expire_ready_up(&self, lobby_id: LobbyId, timer: &Arc<ReadyTimeout>) -> LobbyResult<bool> {
        let _guard = self.registry.lock(lobby_id).await?;
        if !timer.try_fire() {
            debug!("Ready-up timer for lobby {} was cancelled", lobby_id);
            return Ok(false);
        }
        self.registry.clear_timer(lobby_id, timer);

        let mut lobby = self.registry.find(lobby_id).await?;
        let removed = lobby.expire_ready_up();
        if lobby.state() != LobbyState::Waiting {
            warn!(
                "Ready-up timer fired for lobby {} in state {:?}",
                lobby_id,
                lobby.state()
            );
            return Ok(false);
        }
        self.registry.save(&lobby).await?;

        self.update_stats(|stats| stats.ready_up_timeouts += 1);
        self.metrics_collector.record_ready_up_timeout();

        let notice = encode(&Notification {
            notification: format!("You have been removed from Lobby #{}", lobby_id),
        })?;
        for player in &removed {
            self.registry.release_seat(player, lobby_id);
            self.metrics_collector.record_player_removed();
            self.broadcaster
                .unsubscribe_user(&RoomName::public(lobby_id), player);
            self.broadcaster
                .unsubscribe_user(&RoomName::private(lobby_id), player);
            self.broadcaster
                .send_to_user(player, SEND_NOTIFICATION, &notice);
        }

        info!(
            "Ready-up of lobby {} timed out, removed {} players",
            lobby_id,
            removed.len()
        );

        self.broadcaster.send_to_room(
            &RoomName::public(lobby_id),
            LOBBY_DATA,
            &encode(&lobby.summary())?,
        );
        self.broadcast_lobby_list().await;
        Ok(true)
    }

    async fn lobby_list_payload(&self) -> LobbyResult<String> {
        let lobbies = self
            .registry
            .waiting()
            .await?
            .iter()
            .map(Lobby::summary)
            .collect();
        encode(&LobbyListData { lobbies })
    }

    /// Send the waiting lobbies to a single connection
    pub async fn request_lobby_list(&self, conn: &dyn Connection) -> LobbyResult<()> {
        let payload = self.lobby_list_payload().await?;
        conn.emit(LOBBY_LIST_DATA, &payload)
    }

    /// Send the waiting lobbies to the lobby-list room
    pub async fn broadcast_lobby_list(&self) {
        match self.lobby_list_payload().await {
            Ok(payload) => {
                self.broadcaster.send_to_room(
                    &RoomName::public(GLOBAL_ROOM),
                    LOBBY_LIST_DATA,
                    &payload,
                );
            }
            Err(e) => error!("Failed to build lobby list: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{ChannelConnection, OutboundEvent};
    use crate::chat::ChatLogConfig;
    use crate::lobby::store::InMemoryLobbyStore;
    use crate::player::InMemoryPlayerDirectory;
    use crate::utils::SystemClock;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        manager: LobbyManager,
        directory: Arc<InMemoryPlayerDirectory>,
    }

    fn create_test_manager() -> Harness {
        let metrics = Arc::new(MetricsCollector::default());
        let directory = Arc::new(InMemoryPlayerDirectory::new());
        let logger = ChatLogger::new(
            ChatLogConfig {
                enabled: false,
                ..ChatLogConfig::default()
            },
            Arc::new(SystemClock),
            metrics.clone(),
        );
        let manager = LobbyManager::new(
            Arc::new(LobbyRegistry::new(Arc::new(InMemoryLobbyStore::new()))),
            Arc::new(RoomBroadcaster::new(metrics.clone())),
            Arc::new(ChatScrollback::default()),
            Arc::new(logger),
            directory.clone(),
            metrics,
        );
        Harness { manager, directory }
    }

    impl Harness {
        async fn player(&self, steam_id: &str, admin: bool) -> UnboundedReceiver<OutboundEvent> {
            let player = if admin {
                Player::admin(steam_id, steam_id)
            } else {
                Player::new(steam_id, steam_id)
            };
            self.directory.insert(player);
            let (conn, rx) = ChannelConnection::new();
            self.manager
                .connect(Some(&steam_id.to_string()), Arc::new(conn))
                .await
                .unwrap();
            rx
        }
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundEvent>) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn id(s: &str) -> PlayerId {
        s.to_string()
    }

    #[tokio::test]
    async fn test_create_lobby() {
        let h = create_test_manager();
        let _rx = h.player("creator", false).await;

        let summary = h
            .manager
            .create_lobby(&id("creator"), LobbyType::Sixes, "cp_process", "etf2l")
            .await
            .unwrap();
        assert_eq!(summary.state, LobbyState::Waiting);
        assert_eq!(summary.slots.len(), 12);
        assert_eq!(h.manager.get_stats().unwrap().lobbies_created, 1);
    }

    #[tokio::test]
    async fn test_unknown_creator_is_rejected() {
        let h = create_test_manager();
        let err = h
            .manager
            .create_lobby(&id("nobody"), LobbyType::Debug, "cp_badlands", "etf2l")
            .await
            .unwrap_err();
        assert!(matches!(err, LobbyError::PlayerNotFound { .. }));
    }

    #[tokio::test]
    async fn test_player_cannot_sit_in_two_lobbies() {
        let h = create_test_manager();
        let _rx = h.player("a", false).await;
        let first = h
            .manager
            .create_lobby(&id("a"), LobbyType::Sixes, "cp_process", "etf2l")
            .await
            .unwrap();
        let second = h
            .manager
            .create_lobby(&id("a"), LobbyType::Sixes, "cp_snakewater", "etf2l")
            .await
            .unwrap();

        h.manager.join(&id("a"), first.id, "red", "medic").await.unwrap();
        let err = h
            .manager
            .join(&id("a"), second.id, "red", "medic")
            .await
            .unwrap_err();
        assert!(matches!(err, LobbyError::AlreadyInLobby { .. }));

        h.manager.leave(&id("a"), first.id).await.unwrap();
        h.manager.join(&id("a"), second.id, "red", "medic").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_join_keeps_seat_free() {
        let h = create_test_manager();
        let _a = h.player("a", false).await;
        let _b = h.player("b", false).await;
        let lobby = h
            .manager
            .create_lobby(&id("a"), LobbyType::Sixes, "cp_process", "etf2l")
            .await
            .unwrap();

        h.manager.join(&id("a"), lobby.id, "red", "medic").await.unwrap();
        let err = h
            .manager
            .join(&id("b"), lobby.id, "red", "medic")
            .await
            .unwrap_err();
        assert!(matches!(err, LobbyError::SlotTaken { .. }));
        assert_eq!(h.manager.registry().seat_of(&id("b")), None);
    }

    #[tokio::test]
    async fn test_kick_requires_authority() {
        let h = create_test_manager();
        let _creator = h.player("creator", false).await;
        let _a = h.player("a", false).await;
        let mut b = h.player("b", false).await;
        let lobby = h
            .manager
            .create_lobby(&id("creator"), LobbyType::Sixes, "cp_process", "etf2l")
            .await
            .unwrap();
        h.manager.join(&id("b"), lobby.id, "blu", "medic").await.unwrap();

        let err = h
            .manager
            .kick(&id("a"), lobby.id, Some(&id("b")), false)
            .await
            .unwrap_err();
        assert!(matches!(err, LobbyError::NotAuthorized { .. }));

        let err = h
            .manager
            .kick(&id("creator"), lobby.id, Some(&id("b")), true)
            .await
            .unwrap_err();
        assert!(matches!(err, LobbyError::NotAuthorized { .. }));

        drain(&mut b);
        h.manager
            .kick(&id("creator"), lobby.id, Some(&id("b")), false)
            .await
            .unwrap();
        let events = drain(&mut b);
        let notice = events
            .iter()
            .find(|e| e.event == SEND_NOTIFICATION)
            .unwrap();
        assert!(notice
            .payload
            .contains(&format!("You have been removed from Lobby #{}", lobby.id)));
    }

    #[tokio::test]
    async fn test_ban_blocks_rejoin() {
        let h = create_test_manager();
        let _admin = h.player("admin", true).await;
        let _b = h.player("b", false).await;
        let lobby = h
            .manager
            .create_lobby(&id("admin"), LobbyType::Sixes, "cp_process", "etf2l")
            .await
            .unwrap();
        h.manager.join(&id("b"), lobby.id, "blu", "medic").await.unwrap();

        let err = h
            .manager
            .kick(&id("admin"), lobby.id, None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, LobbyError::NotAuthorized { .. }));

        h.manager
            .kick(&id("admin"), lobby.id, Some(&id("b")), true)
            .await
            .unwrap();
        let err = h
            .manager
            .join(&id("b"), lobby.id, "blu", "medic")
            .await
            .unwrap_err();
        assert!(matches!(err, LobbyError::PlayerBanned { .. }));
    }

    #[tokio::test]
    async fn test_close_by_creator() {
        let h = create_test_manager();
        let _creator = h.player("creator", false).await;
        let _other = h.player("other", false).await;
        let lobby = h
            .manager
            .create_lobby(&id("creator"), LobbyType::Debug, "cp_badlands", "etf2l")
            .await
            .unwrap();
        h.manager.join(&id("creator"), lobby.id, "red", "scout").await.unwrap();

        let err = h.manager.close(&id("other"), lobby.id).await.unwrap_err();
        assert!(matches!(err, LobbyError::NotAuthorized { .. }));

        h.manager.close(&id("creator"), lobby.id).await.unwrap();
        assert_eq!(
            h.manager.get_lobby(lobby.id).await.unwrap().state(),
            LobbyState::Ended
        );
        assert_eq!(h.manager.registry().seat_of(&id("creator")), None);

        let err = h.manager.close(&id("creator"), lobby.id).await.unwrap_err();
        assert!(matches!(err, LobbyError::AlreadyClosed { .. }));
        assert_eq!(h.manager.get_stats().unwrap().active_lobbies, 0);
    }
}
