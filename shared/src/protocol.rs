//! Wire-level message types for both transports.

use crate::session::{PlayerId, REMOTE_PLAYER_ID};
use crate::snapshot::StateSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    MoveUp,
    MoveDown,
    Stop,
    ForcePush,
    Pause,
    Restart,
}

impl InputKind {
    /// Inputs that change the physical state of the match. Pause and Restart
    /// are session toggles and stay accepted while paused.
    pub fn affects_physics(self) -> bool {
        matches!(
            self,
            InputKind::MoveUp | InputKind::MoveDown | InputKind::Stop | InputKind::ForcePush
        )
    }
}

/// A single input event from the remote peer, applied exactly once by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInput {
    pub player_id: PlayerId,
    pub kind: InputKind,
}

impl RemoteInput {
    pub fn new(kind: InputKind) -> Self {
        Self {
            player_id: REMOTE_PLAYER_ID,
            kind,
        }
    }
}

/// Direct-socket message. One variant per wire kind so dispatch is an
/// exhaustive `match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    Welcome {
        player_id: PlayerId,
        room_code: Option<String>,
        win_score: u32,
    },
    GameStart {
        win_score: u32,
    },
    State(StateSnapshot),
    Input(RemoteInput),
    HostDisconnected {
        message: String,
    },
    PlayerDisconnected {
        message: String,
    },
}

impl Message {
    /// Wire name of the message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Welcome { .. } => "welcome",
            Message::GameStart { .. } => "game_start",
            Message::State(_) => "state",
            Message::Input(_) => "input",
            Message::HostDisconnected { .. } => "host_disconnected",
            Message::PlayerDisconnected { .. } => "player_disconnected",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelayPayload {
    #[serde(rename = "game_state")]
    State(StateSnapshot),
    #[serde(rename = "input")]
    Input(RemoteInput),
}

/// Relay-mode wrapper. Serialized flat so the payload key matches the relay
/// endpoint (`game_state` or `input`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub room_code: String,
    pub timestamp: u64,
    #[serde(flatten)]
    pub payload: RelayPayload,
}

impl RelayEnvelope {
    pub fn new(room_code: &str, payload: RelayPayload) -> Self {
        Self {
            room_code: room_code.to_string(),
            timestamp: crate::timestamp_ms(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::snapshot;

    #[test]
    fn test_message_kind_names() {
        let msgs = vec![
            (
                Message::Welcome {
                    player_id: 2,
                    room_code: None,
                    win_score: 5,
                },
                "welcome",
            ),
            (Message::GameStart { win_score: 5 }, "game_start"),
            (Message::State(snapshot(1)), "state"),
            (Message::Input(RemoteInput::new(InputKind::Stop)), "input"),
            (
                Message::HostDisconnected {
                    message: String::new(),
                },
                "host_disconnected",
            ),
            (
                Message::PlayerDisconnected {
                    message: String::new(),
                },
                "player_disconnected",
            ),
        ];

        for (msg, name) in msgs {
            assert_eq!(msg.kind(), name);
            assert_eq!(msg.to_string(), name);
        }
    }

    #[test]
    fn test_remote_input_defaults_to_remote_slot() {
        let input = RemoteInput::new(InputKind::MoveDown);
        assert_eq!(input.player_id, REMOTE_PLAYER_ID);
        assert_eq!(input.kind, InputKind::MoveDown);
    }

    #[test]
    fn test_physics_inputs() {
        assert!(InputKind::MoveUp.affects_physics());
        assert!(InputKind::ForcePush.affects_physics());
        assert!(!InputKind::Pause.affects_physics());
        assert!(!InputKind::Restart.affects_physics());
    }

    #[test]
    fn test_relay_envelope_flattens_payload_key() {
        let env = RelayEnvelope {
            room_code: "AB12CD".to_string(),
            timestamp: 42,
            payload: RelayPayload::Input(RemoteInput::new(InputKind::ForcePush)),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["room_code"], "AB12CD");
        assert_eq!(json["input"]["kind"], "force_push");
        assert_eq!(json["input"]["player_id"], 2);

        let back: RelayEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, env);

        let env = RelayEnvelope::new("AB12CD", RelayPayload::State(snapshot(7)));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["game_state"]["tick"], 7);
        assert!(json["timestamp"].as_u64().unwrap() > 0);
    }
}
