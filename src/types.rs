//! Common types used throughout the lobby service

use crate::error::{LobbyError, LobbyResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Steam id of a player
pub type PlayerId = String;

/// Unique identifier for lobbies
pub type LobbyId = u64;

/// Identifier of a chat room; lobby rooms share the lobby's id, 0 is the lobby list
pub type RoomId = u64;

/// Opaque identifier of a client connection
pub type ConnectionId = u64;

/// Room id of the global lobby-list chat
pub const GLOBAL_ROOM: RoomId = 0;

/// Game mode of a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyType {
    Debug,
    #[serde(rename = "6s")]
    Sixes,
    Highlander,
    #[serde(rename = "4v4")]
    Fours,
    Ultiduo,
    Bball,
}

impl LobbyType {
    /// Classes available to each team, in slot order
    pub fn classes(&self) -> &'static [&'static str] {
        match self {
            LobbyType::Debug => &["scout"],
            LobbyType::Sixes => &["scout1", "scout2", "roamer", "pocket", "demoman", "medic"],
            LobbyType::Highlander => &[
                "scout", "soldier", "pyro", "demoman", "heavy", "engineer", "medic", "sniper",
                "spy",
            ],
            LobbyType::Fours => &["scout", "soldier", "demoman", "medic"],
            LobbyType::Ultiduo => &["soldier", "medic"],
            LobbyType::Bball => &["soldier1", "soldier2"],
        }
    }

    /// Total number of player slots across both teams
    pub fn slot_count(&self) -> usize {
        self.classes().len() * Team::ALL.len()
    }

    /// Every slot of this lobby type
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        Team::ALL.into_iter().flat_map(move |team| {
            (0..self.classes().len()).map(move |class_index| Slot { team, class_index })
        })
    }

    /// Resolve a requested `(team, class)` pair into a slot
    pub fn slot(&self, team: &str, class: &str) -> LobbyResult<Slot> {
        let team = team.parse::<Team>()?;
        let class_index = self
            .classes()
            .iter()
            .position(|c| *c == class)
            .ok_or_else(|| LobbyError::InvalidSlot {
                reason: format!("class '{}' does not exist in {} lobbies", class, self),
            })?;
        Ok(Slot { team, class_index })
    }

    /// Name of a slot's class
    pub fn class_name(&self, slot: Slot) -> &'static str {
        self.classes().get(slot.class_index).copied().unwrap_or("unknown")
    }
}

impl std::fmt::Display for LobbyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LobbyType::Debug => write!(f, "debug"),
            LobbyType::Sixes => write!(f, "6s"),
            LobbyType::Highlander => write!(f, "highlander"),
            LobbyType::Fours => write!(f, "4v4"),
            LobbyType::Ultiduo => write!(f, "ultiduo"),
            LobbyType::Bball => write!(f, "bball"),
        }
    }
}

impl std::str::FromStr for LobbyType {
    type Err = LobbyError;

    fn from_str(s: &str) -> LobbyResult<Self> {
        match s {
            "debug" => Ok(LobbyType::Debug),
            "6s" => Ok(LobbyType::Sixes),
            "highlander" => Ok(LobbyType::Highlander),
            "4v4" => Ok(LobbyType::Fours),
            "ultiduo" => Ok(LobbyType::Ultiduo),
            "bball" => Ok(LobbyType::Bball),
            other => Err(LobbyError::InvalidSlot {
                reason: format!("unknown lobby type '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blu,
}

impl Team {
    pub const ALL: [Team; 2] = [Team::Red, Team::Blu];
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Team::Red => write!(f, "red"),
            Team::Blu => write!(f, "blu"),
        }
    }
}

impl std::str::FromStr for Team {
    type Err = LobbyError;

    fn from_str(s: &str) -> LobbyResult<Self> {
        match s {
            "red" => Ok(Team::Red),
            "blu" => Ok(Team::Blu),
            other => Err(LobbyError::InvalidSlot {
                reason: format!("unknown team '{}'", other),
            }),
        }
    }
}

/// A (team, class) position in a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub team: Team,
    pub class_index: usize,
}

/// Authority level of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Player,
    Admin,
}

/// Player record as resolved by the identity collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub steam_id: PlayerId,
    pub name: String,
    pub role: PlayerRole,
}

impl Player {
    pub fn new(steam_id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            steam_id: steam_id.into(),
            name: name.into(),
            role: PlayerRole::Player,
        }
    }

    pub fn admin(steam_id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            role: PlayerRole::Admin,
            ..Self::new(steam_id, name)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == PlayerRole::Admin
    }
}

/// Broadcast room names derived from a lobby or chat room id
pub struct RoomName;

impl RoomName {
    pub fn public(id: RoomId) -> String {
        format!("lobby:{}_public", id)
    }

    pub fn private(id: LobbyId) -> String {
        format!("lobby:{}_private", id)
    }
}

/// Per-slot entry of a lobby summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotView {
    pub team: Team,
    pub class: String,
    pub steamid: Option<PlayerId>,
    pub ready: bool,
}

/// Client-facing view of a lobby, sent as `lobbyData` and inside `lobbyListData`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub id: LobbyId,
    #[serde(rename = "type")]
    pub lobby_type: LobbyType,
    pub state: crate::lobby::LobbyState,
    pub map_name: String,
    pub league: String,
    pub created_by: PlayerId,
    pub slots: Vec<SlotView>,
    pub spectators: usize,
    pub ready_up_deadline: Option<i64>,
}

/// Payload sent to the private room once every player is ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyConnectInfo {
    pub id: LobbyId,
    #[serde(rename = "type")]
    pub lobby_type: LobbyType,
    pub map_name: String,
    pub league: String,
    pub players: Vec<PlayerId>,
}

/// Player decoration carried by chat payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSender {
    pub steamid: PlayerId,
    pub name: String,
}

/// Chat payload broadcast as `chatReceive`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub timestamp: i64,
    pub message: String,
    pub room: RoomId,
    pub player: ChatSender,
}

impl ChatMessage {
    pub fn new(player: &Player, room: RoomId, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at.timestamp(),
            message: message.into(),
            room,
            player: ChatSender {
                steamid: player.steam_id.clone(),
                name: player.name.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_lookup() {
        let slot = LobbyType::Sixes.slot("blu", "medic").unwrap();
        assert_eq!(slot.team, Team::Blu);
        assert_eq!(LobbyType::Sixes.class_name(slot), "medic");

        assert!(LobbyType::Sixes.slot("green", "medic").is_err());
        assert!(LobbyType::Ultiduo.slot("red", "spy").is_err());
    }

    #[test]
    fn test_slot_counts() {
        assert_eq!(LobbyType::Debug.slot_count(), 2);
        assert_eq!(LobbyType::Sixes.slot_count(), 12);
        assert_eq!(LobbyType::Highlander.slot_count(), 18);
        assert_eq!(LobbyType::Highlander.slots().count(), 18);
    }

    #[test]
    fn test_lobby_type_round_trips_through_names() {
        for name in ["debug", "6s", "highlander", "4v4", "ultiduo", "bball"] {
            let parsed: LobbyType = name.parse().unwrap();
            assert_eq!(parsed.to_string(), name);
        }
    }

    #[test]
    fn test_lobby_type_json_uses_display_names() {
        for lobby_type in [
            LobbyType::Debug,
            LobbyType::Sixes,
            LobbyType::Highlander,
            LobbyType::Fours,
            LobbyType::Ultiduo,
            LobbyType::Bball,
        ] {
            let json = serde_json::to_string(&lobby_type).unwrap();
            assert_eq!(json, format!("\"{}\"", lobby_type));
            assert_eq!(serde_json::from_str::<LobbyType>(&json).unwrap(), lobby_type);
        }
    }

    #[test]
    fn test_room_names() {
        assert_eq!(RoomName::public(12), "lobby:12_public");
        assert_eq!(RoomName::private(12), "lobby:12_private");
    }
}
