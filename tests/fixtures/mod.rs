//! Test fixtures for integration testing
//!
//! Builds a complete lobby system around in-memory collaborators and gives
//! each simulated player a recording connection.

#![allow(dead_code)]

use ready_room::broadcast::{ChannelConnection, Connection, OutboundEvent, RoomBroadcaster};
use ready_room::chat::{ChatLogConfig, ChatLogger, ChatScrollback, ChatService};
use ready_room::lobby::{InMemoryLobbyStore, LobbyManager, LobbyRegistry};
use ready_room::metrics::MetricsCollector;
use ready_room::player::InMemoryPlayerDirectory;
use ready_room::types::{LobbyId, LobbySummary, LobbyType, Player, PlayerId};
use ready_room::utils::{Clock, ManualClock, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

/// A connected player that records every event pushed to it
pub struct TestClient {
    pub steam_id: PlayerId,
    pub conn: Arc<ChannelConnection>,
    rx: UnboundedReceiver<OutboundEvent>,
}

impl TestClient {
    /// Take every event received so far
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Take every event received so far and keep the ones named `event`
    pub fn take(&mut self, event: &str) -> Vec<OutboundEvent> {
        self.drain()
            .into_iter()
            .filter(|e| e.event == event)
            .collect()
    }

    /// Take every event received so far and return their names in order
    pub fn names(&mut self) -> Vec<String> {
        self.drain().into_iter().map(|e| e.event).collect()
    }
}

/// Complete lobby system wired the same way the service wires it
pub struct TestSystem {
    pub manager: LobbyManager,
    pub chat: ChatService,
    pub logger: Arc<ChatLogger>,
    pub broadcaster: Arc<RoomBroadcaster>,
    pub scrollback: Arc<ChatScrollback>,
    pub directory: Arc<InMemoryPlayerDirectory>,
    pub metrics: Arc<MetricsCollector>,
    pub clock: ManualClock,
    logs: Option<TempDir>,
    next_player: u64,
}

impl TestSystem {
    /// System without chat logging
    pub fn new() -> Self {
        Self::build(None, ManualClock::at(2016, 3, 5, 12, 0))
    }

    /// System logging chat into a fresh temporary directory on a manual clock
    pub fn with_logs(clock: ManualClock) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        Self::build(Some(dir), clock)
    }

    fn build(logs: Option<TempDir>, clock: ManualClock) -> Self {
        let metrics = Arc::new(MetricsCollector::new().expect("Failed to create metrics"));
        let directory = Arc::new(InMemoryPlayerDirectory::new());
        let broadcaster = Arc::new(RoomBroadcaster::new(metrics.clone()));
        let scrollback = Arc::new(ChatScrollback::new(20));

        let log_config = match &logs {
            Some(dir) => ChatLogConfig {
                enabled: true,
                logs_dir: dir.path().join("chatlogs"),
                global_dir: dir.path().to_path_buf(),
                queue_capacity: 18,
            },
            None => ChatLogConfig {
                enabled: false,
                ..ChatLogConfig::default()
            },
        };
        let log_clock: Arc<dyn Clock> = if logs.is_some() {
            Arc::new(clock.clone())
        } else {
            Arc::new(SystemClock)
        };
        let logger = Arc::new(ChatLogger::new(log_config, log_clock, metrics.clone()));

        let registry = Arc::new(LobbyRegistry::new(Arc::new(InMemoryLobbyStore::new())));
        let manager = LobbyManager::new(
            registry.clone(),
            broadcaster.clone(),
            scrollback.clone(),
            logger.clone(),
            directory.clone(),
            metrics.clone(),
        );
        let chat = ChatService::new(
            broadcaster.clone(),
            scrollback.clone(),
            logger.clone(),
            registry,
            directory.clone(),
            metrics.clone(),
        );

        Self {
            manager,
            chat,
            logger,
            broadcaster,
            scrollback,
            directory,
            metrics,
            clock,
            logs,
            next_player: 1,
        }
    }

    /// Use a different ready-up window for every lobby created afterwards
    pub fn with_ready_up_timeout(mut self, timeout: Duration) -> Self {
        self.manager = self.manager.with_ready_up_timeout(timeout);
        self
    }

    /// Root of the temporary log directory
    pub fn logs_root(&self) -> Option<&Path> {
        self.logs.as_ref().map(|d| d.path())
    }

    /// Register and connect a new player
    pub async fn client(&mut self, name: &str) -> TestClient {
        let steam_id = self.next_steam_id();
        self.add_client(Player::new(steam_id, name)).await
    }

    /// Register and connect a new admin
    pub async fn admin(&mut self, name: &str) -> TestClient {
        let steam_id = self.next_steam_id();
        self.add_client(Player::admin(steam_id, name)).await
    }

    fn next_steam_id(&mut self) -> PlayerId {
        let id = format!("765611980{:08}", self.next_player);
        self.next_player += 1;
        id
    }

    async fn add_client(&mut self, player: Player) -> TestClient {
        let steam_id = player.steam_id.clone();
        self.directory.insert(player);

        let (conn, rx) = ChannelConnection::new();
        let conn = Arc::new(conn);
        self.manager
            .connect(Some(&steam_id), conn.clone() as Arc<dyn Connection>)
            .await
            .expect("Failed to connect client");

        TestClient { steam_id, conn, rx }
    }

    /// Create a lobby owned by `creator`
    pub async fn lobby(&self, creator: &TestClient, lobby_type: LobbyType) -> LobbySummary {
        self.manager
            .create_lobby(&creator.steam_id, lobby_type, "cp_badlands", "etf2l")
            .await
            .expect("Failed to create lobby")
    }

    /// Seat each client in the next free slot, in slot order
    pub async fn fill(&self, lobby: &LobbySummary, clients: &[&TestClient]) {
        for (slot, client) in lobby.slots.iter().zip(clients) {
            self.manager
                .join(&client.steam_id, lobby.id, &slot.team.to_string(), &slot.class)
                .await
                .expect("Failed to join lobby");
        }
    }

    /// Room log path for a lobby on the clock's current day
    pub fn room_log(&self, lobby_id: LobbyId) -> PathBuf {
        self.logger.room_log_path(lobby_id)
    }
}

/// Read a log file into its lines, empty when missing
pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
