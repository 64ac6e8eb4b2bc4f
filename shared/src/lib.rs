//! Wire protocol between the real-time server and game clients.
//!
//! Every frame is a JSON envelope `{ "type", "user_id"?, "data", "target"? }`.
//! Inbound frames decode into the closed [`ClientCommand`] union by their
//! `type` discriminator; outbound frames are [`ServerEvent`] values.

pub mod clock;

pub use clock::{GameClock, Rollover, Season};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type PlayerId = Uuid;
pub type MapId = Uuid;
pub type ObjectId = Uuid;
pub type NpcId = Uuid;

/// Largest inbound frame the server accepts, in bytes
pub const MAX_MESSAGE_SIZE: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    All,
    User,
    Friends,
}

/// Raw frame as it travels on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            user_id: None,
            data,
            target: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePayload {
    pub pos_x: i32,
    pub pos_y: i32,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractPayload {
    pub target_x: i32,
    pub target_y: i32,
}

/// Everything a client can ask of the real-time layer
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Ping,
    Move(MovePayload),
    Interact(InteractPayload),
    Chat(Value),
    QuestUpdate(Value),
    /// Recognised as an envelope but not by type; logged and ignored
    Unknown(String),
}

impl ClientCommand {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let command = match envelope.kind.as_str() {
            "ping" => ClientCommand::Ping,
            "player_move" => ClientCommand::Move(payload("player_move", envelope.data)?),
            "player_interact" => {
                ClientCommand::Interact(payload("player_interact", envelope.data)?)
            }
            "chat" => ClientCommand::Chat(envelope.data),
            "quest_update" => ClientCommand::QuestUpdate(envelope.data),
            _ => ClientCommand::Unknown(envelope.kind),
        };
        Ok(command)
    }

    pub fn kind(&self) -> &str {
        match self {
            ClientCommand::Ping => "ping",
            ClientCommand::Move(_) => "player_move",
            ClientCommand::Interact(_) => "player_interact",
            ClientCommand::Chat(_) => "chat",
            ClientCommand::QuestUpdate(_) => "quest_update",
            ClientCommand::Unknown(kind) => kind,
        }
    }

    pub fn into_envelope(self) -> Result<Envelope, ProtocolError> {
        let kind = self.kind().to_string();
        let data = match self {
            ClientCommand::Ping | ClientCommand::Unknown(_) => Value::Null,
            ClientCommand::Move(p) => serde_json::to_value(p)?,
            ClientCommand::Interact(p) => serde_json::to_value(p)?,
            ClientCommand::Chat(v) | ClientCommand::QuestUpdate(v) => v,
        };
        Ok(Envelope::new(kind, data))
    }

    pub fn encode(self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&self.into_envelope()?)?)
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    data: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::Payload { kind, source })
}

/// Mutable part of a world object, broadcast with every object update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_looted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_stage: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InteractionOutcome {
    TreeChopped { items_gained: Vec<String> },
    TreeDamaged { remaining_hp: u32 },
    RockMined { items_gained: Vec<String> },
    RockDamaged { remaining_hp: u32 },
    ChestOpened { items_gained: Vec<String>, coins_earned: u32 },
    ChestEmpty { message: String },
    ServerAccessed { message: String, options: Vec<String> },
}

/// Outbound frames, serialized as `{ "type": ..., "data": {...} }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Pong {
        timestamp: u64,
    },
    MovementError {
        error: String,
    },
    InteractionResult {
        success: bool,
        #[serde(default)]
        result: Option<InteractionOutcome>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PlayerPositionUpdate {
        user_id: PlayerId,
        map_id: MapId,
        pos_x: i32,
        pos_y: i32,
        direction: Direction,
    },
    WorldObjectUpdate {
        object_id: ObjectId,
        pos_x: i32,
        pos_y: i32,
        state: ObjectState,
    },
    NpcPositionUpdate {
        npc_id: NpcId,
        map_id: MapId,
        pos_x: i32,
        pos_y: i32,
        direction: Direction,
    },
    TimeUpdate {
        game_year: u32,
        game_season: Season,
        game_day: u8,
        game_hour: u8,
        game_minute: u8,
    },
    SeasonChange {
        new_season: Season,
        game_year: u32,
    },
    UserStatus {
        user_id: PlayerId,
        is_online: bool,
    },
}

impl ServerEvent {
    pub fn time_update(clock: &GameClock) -> Self {
        ServerEvent::TimeUpdate {
            game_year: clock.year,
            game_season: clock.season,
            game_day: clock.day,
            game_hour: clock.hour,
            game_minute: clock.minute,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Pong { .. } => "pong",
            ServerEvent::MovementError { .. } => "movement_error",
            ServerEvent::InteractionResult { .. } => "interaction_result",
            ServerEvent::PlayerPositionUpdate { .. } => "player_position_update",
            ServerEvent::WorldObjectUpdate { .. } => "world_object_update",
            ServerEvent::NpcPositionUpdate { .. } => "npc_position_update",
            ServerEvent::TimeUpdate { .. } => "time_update",
            ServerEvent::SeasonChange { .. } => "season_change",
            ServerEvent::UserStatus { .. } => "user_status",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_ping() {
        let command = ClientCommand::decode(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(command, ClientCommand::Ping);

        // Clients commonly send an empty object as data
        let command = ClientCommand::decode(r#"{"type":"ping","data":{}}"#).unwrap();
        assert_eq!(command, ClientCommand::Ping);
    }

    #[test]
    fn test_decode_player_move() {
        let text = r#"{"type":"player_move","data":{"pos_x":4,"pos_y":7,"direction":"left"}}"#;
        match ClientCommand::decode(text).unwrap() {
            ClientCommand::Move(p) => {
                assert_eq!(p.pos_x, 4);
                assert_eq!(p.pos_y, 7);
                assert_eq!(p.direction, Direction::Left);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_decode_player_interact() {
        let text = r#"{"type":"player_interact","data":{"target_x":6,"target_y":6}}"#;
        assert_eq!(
            ClientCommand::decode(text).unwrap(),
            ClientCommand::Interact(InteractPayload {
                target_x: 6,
                target_y: 6
            })
        );
    }

    #[test]
    fn test_decode_logged_only_types() {
        let chat = ClientCommand::decode(r#"{"type":"chat","data":{"text":"hi"}}"#).unwrap();
        assert_eq!(chat, ClientCommand::Chat(json!({"text": "hi"})));

        let quest = ClientCommand::decode(r#"{"type":"quest_update","data":null}"#).unwrap();
        assert_eq!(quest, ClientCommand::QuestUpdate(Value::Null));
    }

    #[test]
    fn test_decode_unknown_type() {
        let command = ClientCommand::decode(r#"{"type":"dance","data":{}}"#).unwrap();
        assert_eq!(command, ClientCommand::Unknown("dance".to_string()));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            ClientCommand::decode("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ClientCommand::decode(r#"{"data":{}}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ClientCommand::decode(r#"{"type":"player_move","data":{"pos_x":"left"}}"#),
            Err(ProtocolError::Payload {
                kind: "player_move",
                ..
            })
        ));
    }

    #[test]
    fn test_decode_with_target_and_user() {
        let text = r#"{"type":"chat","user_id":"6f1c3f4e-8d7a-4c21-9b0e-2f9d3f0c1a11","data":"yo","target":"friends"}"#;
        let envelope: Envelope = serde_json::from_str(text).unwrap();
        assert_eq!(envelope.target, Some(Target::Friends));
        assert!(envelope.user_id.is_some());
    }

    #[test]
    fn test_encode_move_command() {
        let text = ClientCommand::Move(MovePayload {
            pos_x: 1,
            pos_y: 2,
            direction: Direction::Up,
        })
        .encode()
        .unwrap();

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"type": "player_move", "data": {"pos_x": 1, "pos_y": 2, "direction": "up"}})
        );
    }

    #[test]
    fn test_time_update_shape() {
        let event = ServerEvent::time_update(&GameClock::default());
        let value: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "time_update",
                "data": {
                    "game_year": 1,
                    "game_season": "spring",
                    "game_day": 1,
                    "game_hour": 6,
                    "game_minute": 0
                }
            })
        );
    }

    #[test]
    fn test_interaction_result_shape() {
        let failed = ServerEvent::InteractionResult {
            success: false,
            result: None,
            error: Some("target too far away".to_string()),
        };
        let value: Value = serde_json::from_str(&failed.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "interaction_result");
        assert_eq!(value["data"]["success"], false);
        assert_eq!(value["data"]["result"], Value::Null);
        assert_eq!(value["data"]["error"], "target too far away");

        let chopped = ServerEvent::InteractionResult {
            success: true,
            result: Some(InteractionOutcome::TreeChopped {
                items_gained: vec!["Code Snippet x2".to_string()],
            }),
            error: None,
        };
        let value: Value = serde_json::from_str(&chopped.encode().unwrap()).unwrap();
        assert_eq!(value["data"]["result"]["action"], "tree_chopped");
        assert!(value["data"].get("error").is_none());
    }

    #[test]
    fn test_object_state_omits_defaults() {
        let state = ObjectState {
            hp: Some(2),
            ..ObjectState::default()
        };
        assert_eq!(serde_json::to_value(&state).unwrap(), json!({"hp": 2}));
    }

    #[test]
    fn test_server_event_decode() {
        let id = Uuid::new_v4();
        let text = format!(
            r#"{{"type":"user_status","data":{{"user_id":"{}","is_online":true}}}}"#,
            id
        );
        assert_eq!(
            ServerEvent::decode(&text).unwrap(),
            ServerEvent::UserStatus {
                user_id: id,
                is_online: true
            }
        );
    }
}
