//! Chat sending for lobby rooms and the global lobby-list room

use crate::broadcast::{Connection, RoomBroadcaster};
use crate::chat::logger::ChatLogger;
use crate::chat::scrollback::{ChatScrollback, CHAT_RECEIVE};
use crate::error::{LobbyError, LobbyResult};
use crate::lobby::registry::LobbyRegistry;
use crate::lobby::LobbyState;
use crate::metrics::MetricsCollector;
use crate::player::PlayerDirectory;
use crate::types::{ChatMessage, PlayerId, RoomId, RoomName, GLOBAL_ROOM};
use crate::utils::current_timestamp;
use std::sync::Arc;
use tracing::{debug, error};

/// Validates, fans out, logs and retains chat messages
pub struct ChatService {
    broadcaster: Arc<RoomBroadcaster>,
    scrollback: Arc<ChatScrollback>,
    logger: Arc<ChatLogger>,
    registry: Arc<LobbyRegistry>,
    players: Arc<dyn PlayerDirectory>,
    metrics: Arc<MetricsCollector>,
}

impl ChatService {
    pub fn new(
        broadcaster: Arc<RoomBroadcaster>,
        scrollback: Arc<ChatScrollback>,
        logger: Arc<ChatLogger>,
        registry: Arc<LobbyRegistry>,
        players: Arc<dyn PlayerDirectory>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            broadcaster,
            scrollback,
            logger,
            registry,
            players,
            metrics,
        }
    }

    /// Send a chat message from `steam_id` to `room`
    ///
    /// Room 0 is the lobby-list chat and open to every player. Any other room
    /// requires the sender to be playing in or spectating that lobby, and is
    /// refused once the lobby has closed. Durable logging failures never fail
    /// the send.
    pub async fn send(
        &self,
        steam_id: &PlayerId,
        room: RoomId,
        message: &str,
    ) -> LobbyResult<ChatMessage> {
        let player = self.players.player_by_steam_id(steam_id).await?;

        // Held until the message is logged so a concurrent close cannot stop
        // the room's logger between the membership check and the write.
        let _guard = if room != GLOBAL_ROOM {
            self.registry.find(room).await?;
            let guard = self.registry.lock(room).await?;
            let lobby = self.registry.find(room).await?;
            if lobby.state() == LobbyState::Ended {
                return Err(LobbyError::LobbyClosed { lobby_id: room });
            }
            if !lobby.has_player(steam_id) && !lobby.is_spectating(steam_id) {
                return Err(LobbyError::PlayerNotInLobby {
                    player_id: steam_id.clone(),
                    lobby_id: room,
                });
            }
            Some(guard)
        } else {
            None
        };

        debug!("received chat message: {} {}", message, player.name);

        let chat = ChatMessage::new(&player, room, message, current_timestamp());
        let payload = serde_json::to_string(&chat).map_err(|e| {
            error!("Failed to encode chat message: {}", e);
            LobbyError::Storage {
                message: format!("failed to encode chat message: {}", e),
            }
        })?;

        self.broadcaster
            .send_to_room(&RoomName::public(room), CHAT_RECEIVE, &payload);
        self.logger.log_chat(room, &player.name, message).await;
        self.scrollback.append(room, payload);
        self.metrics.record_chat_message(room == GLOBAL_ROOM);

        Ok(chat)
    }

    /// Seed a connection's chat view with the room's recent history
    pub fn replay(&self, room: RoomId, conn: &dyn Connection) {
        self.scrollback.replay(room, conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelConnection;
    use crate::chat::logger::ChatLogConfig;
    use crate::chat::scrollback::CHAT_HISTORY_CLEAR;
    use crate::lobby::store::InMemoryLobbyStore;
    use crate::lobby::Lobby;
    use crate::player::MockPlayerDirectory;
    use crate::types::{LobbyType, Player};
    use crate::utils::SystemClock;
    use mockall::predicate::eq;

    struct Harness {
        service: ChatService,
        broadcaster: Arc<RoomBroadcaster>,
        registry: Arc<LobbyRegistry>,
    }

    fn harness(players: MockPlayerDirectory) -> Harness {
        let metrics = Arc::new(MetricsCollector::default());
        let broadcaster = Arc::new(RoomBroadcaster::new(metrics.clone()));
        let registry = Arc::new(LobbyRegistry::new(Arc::new(InMemoryLobbyStore::new())));
        let logger = Arc::new(ChatLogger::new(
            ChatLogConfig {
                enabled: false,
                ..ChatLogConfig::default()
            },
            Arc::new(SystemClock),
            metrics.clone(),
        ));
        let service = ChatService::new(
            broadcaster.clone(),
            Arc::new(ChatScrollback::new(20)),
            logger,
            registry.clone(),
            Arc::new(players),
            metrics,
        );
        Harness {
            service,
            broadcaster,
            registry,
        }
    }

    fn sol() -> PlayerId {
        "76561198000000001".to_string()
    }

    #[tokio::test]
    async fn test_send_decorates_with_player() {
        let mut players = MockPlayerDirectory::new();
        players
            .expect_player_by_steam_id()
            .with(eq(sol()))
            .times(1)
            .returning(|id| Ok(Player::new(id.clone(), "sol")));
        let h = harness(players);

        let (conn, mut rx) = ChannelConnection::new();
        h.broadcaster.connect(Some(&sol()), Arc::new(conn));
        h.broadcaster
            .subscribe_user(&RoomName::public(GLOBAL_ROOM), &sol());

        let sent = h.service.send(&sol(), GLOBAL_ROOM, "gg").await.unwrap();
        assert_eq!(sent.player.name, "sol");
        assert_eq!(sent.room, GLOBAL_ROOM);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, CHAT_RECEIVE);
        let received: ChatMessage = serde_json::from_str(&event.payload).unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn test_unknown_player_is_rejected() {
        let mut players = MockPlayerDirectory::new();
        players
            .expect_player_by_steam_id()
            .returning(|id| Err(LobbyError::PlayerNotFound { player_id: id.clone() }));
        let h = harness(players);

        let result = h.service.send(&sol(), GLOBAL_ROOM, "hello?").await;
        assert!(matches!(result, Err(LobbyError::PlayerNotFound { .. })));
    }

    #[tokio::test]
    async fn test_lobby_room_requires_membership() {
        let mut players = MockPlayerDirectory::new();
        players
            .expect_player_by_steam_id()
            .returning(|id| Ok(Player::new(id.clone(), "sol")));
        let h = harness(players);

        let lobby = Lobby::new(7, LobbyType::Ultiduo, "koth_ultiduo", "ugc", "someone");
        h.registry.save(&lobby).await.unwrap();

        let result = h.service.send(&sol(), 7, "let me talk").await;
        assert!(matches!(result, Err(LobbyError::PlayerNotInLobby { .. })));

        let result = h.service.send(&sol(), 8, "anyone?").await;
        assert!(matches!(result, Err(LobbyError::LobbyNotFound { .. })));
    }

    #[tokio::test]
    async fn test_closed_lobby_refuses_chat() {
        let mut players = MockPlayerDirectory::new();
        players
            .expect_player_by_steam_id()
            .returning(|id| Ok(Player::new(id.clone(), "sol")));
        let h = harness(players);

        let mut lobby = Lobby::new(9, LobbyType::Debug, "cp_badlands", "etf2l", sol());
        let scout = LobbyType::Debug.slot("red", "scout").unwrap();
        lobby.add_player(&sol(), scout).unwrap();
        h.registry.save(&lobby).await.unwrap();
        h.service.send(&sol(), 9, "glhf").await.unwrap();

        lobby.close().unwrap();
        h.registry.save(&lobby).await.unwrap();
        let result = h.service.send(&sol(), 9, "still here?").await;
        assert!(matches!(result, Err(LobbyError::LobbyClosed { lobby_id: 9 })));
    }

    #[tokio::test]
    async fn test_replay_after_sends() {
        let mut players = MockPlayerDirectory::new();
        players
            .expect_player_by_steam_id()
            .returning(|id| Ok(Player::new(id.clone(), "sol")));
        let h = harness(players);

        for i in 0..3 {
            h.service
                .send(&sol(), GLOBAL_ROOM, &format!("msg {}", i))
                .await
                .unwrap();
        }

        let (conn, mut rx) = ChannelConnection::new();
        h.service.replay(GLOBAL_ROOM, &conn);
        assert_eq!(rx.try_recv().unwrap().event, CHAT_HISTORY_CLEAR);
        for _ in 0..3 {
            assert_eq!(rx.try_recv().unwrap().event, CHAT_RECEIVE);
        }
        assert!(rx.try_recv().is_err());
    }
}
