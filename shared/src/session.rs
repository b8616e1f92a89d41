//! Room, participant and session-phase types shared by both peers.
//!
//! The host owns the live [`SessionPhase`]; everything here is plain data plus
//! the transition rules, so the remote side can reason about phases it reads
//! from snapshots without being able to drive them.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// Player slot number. Slot 1 is always the host, slot 2 the remote.
pub type PlayerId = u8;

pub const HOST_PLAYER_ID: PlayerId = 1;
pub const REMOTE_PLAYER_ID: PlayerId = 2;
pub const MAX_PARTICIPANTS: usize = 2;

pub const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates a fresh room code from `[A-Z0-9]`.
pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// True if `code` is exactly six characters of `[A-Z0-9]`.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Normalizes user-typed codes: trims whitespace and upper-cases.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportRole {
    Host,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub id: PlayerId,
    pub display_name: String,
    pub transport_role: TransportRole,
}

impl PlayerIdentity {
    pub fn host(display_name: impl Into<String>) -> Self {
        Self {
            id: HOST_PLAYER_ID,
            display_name: display_name.into(),
            transport_role: TransportRole::Host,
        }
    }

    pub fn remote(display_name: impl Into<String>) -> Self {
        Self {
            id: REMOTE_PLAYER_ID,
            display_name: display_name.into(),
            transport_role: TransportRole::Remote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    InProgress,
    Closed,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::InProgress => "in_progress",
            RoomStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A matchmaking room as known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub code: String,
    pub host_name: String,
    pub host_public_addr: Option<IpAddr>,
    pub host_local_addr: IpAddr,
    pub host_port: u16,
    pub status: RoomStatus,
    pub participants: Vec<PlayerIdentity>,
}

impl Room {
    pub fn is_full(&self) -> bool {
        self.participants.len() >= MAX_PARTICIPANTS
    }

    /// Address a joining peer should dial: public first, local only as a
    /// same-network fallback.
    pub fn preferred_addr(&self) -> IpAddr {
        self.host_public_addr.unwrap_or(self.host_local_addr)
    }
}

/// Lifecycle phase of a single match. Owned by the simulation host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Waiting,
    Starting,
    InProgress,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal session phase transition {from:?} -> {to:?}")]
pub struct PhaseError {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

impl SessionPhase {
    /// Whether the simulation advances physics in this phase.
    pub fn is_running(self) -> bool {
        matches!(self, SessionPhase::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Ended)
    }

    /// Forward-only transitions, plus the Paused/InProgress toggle.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        match (self, next) {
            (Waiting, Starting) => true,
            (Starting, InProgress) => true,
            (InProgress, Paused) | (Paused, InProgress) => true,
            (Ended, _) => false,
            (_, Ended) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: SessionPhase) -> Result<SessionPhase, PhaseError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PhaseError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Waiting => "waiting",
            SessionPhase::Starting => "starting",
            SessionPhase::InProgress => "in progress",
            SessionPhase::Paused => "paused",
            SessionPhase::Ended => "ended",
        };
        f.write_str(s)
    }
}
