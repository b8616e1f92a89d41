//! Error taxonomy for the netplay layer.
//!
//! Lower layers have their own enums ([`FrameError`], [`RegistryError`]);
//! everything that reaches a user is a [`NetplayError`] carrying a readable
//! reason and a remediation hint.

use crate::codec::FrameError;
use crate::registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetplayError {
    #[error("could not register the room: {reason}")]
    Registration { reason: String },

    #[error("room '{code}' does not exist")]
    RoomNotFound { code: String },

    #[error("room '{code}' is already full")]
    RoomFull { code: String },

    #[error("'{code}' is not a valid room code")]
    InvalidRoomCode { code: String },

    #[error("matchmaking service unavailable: {reason}")]
    RegistryUnavailable { reason: String },

    #[error("connection lost: {reason}")]
    TransportClosed { reason: String },

    #[error("relay request timed out")]
    RelayTimeout,

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetplayError {
    /// One sentence telling the user what to try next.
    pub fn hint(&self) -> &'static str {
        match self {
            NetplayError::Registration { .. } => {
                "Check your internet connection and that the matchmaking server is running, then create the room again."
            }
            NetplayError::RoomNotFound { .. } => {
                "Check the code with the host; the room may have expired or not been created yet."
            }
            NetplayError::RoomFull { .. } => {
                "This room already has two players. Ask the host for a new room code."
            }
            NetplayError::InvalidRoomCode { .. } => {
                "Room codes are exactly 6 letters or digits, for example AB12CD."
            }
            NetplayError::RegistryUnavailable { .. } => {
                "The matchmaking server may be down or unreachable from your network. Try again later."
            }
            NetplayError::TransportClosed { .. } => {
                "The other player left or the network dropped. Start a new room to play again."
            }
            NetplayError::RelayTimeout => "The relay is slow; the next update will replace this one.",
            NetplayError::MalformedFrame(_) => {
                "The peer sent data this version does not understand. Make sure both players run the same version."
            }
            NetplayError::Io(_) => {
                "Check that the port is free, your firewall allows the game, and the address is correct."
            }
        }
    }

    /// Errors that end a session outright, as opposed to a single dropped
    /// relay attempt.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NetplayError::RelayTimeout)
    }

    /// `error` plus `hint`, for printing to a terminal or dialog.
    pub fn user_message(&self) -> String {
        format!("{}\n{}", self, self.hint())
    }
}

impl From<FrameError> for NetplayError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::EndOfStream { .. } => NetplayError::TransportClosed {
                reason: err.to_string(),
            },
            FrameError::Io(e) => NetplayError::TransportClosed {
                reason: e.to_string(),
            },
            FrameError::NeedMore | FrameError::TooLarge(_) | FrameError::Malformed(_) => {
                NetplayError::MalformedFrame(err.to_string())
            }
        }
    }
}

impl From<RegistryError> for NetplayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Timeout => NetplayError::RelayTimeout,
            other => NetplayError::RegistryUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_include_reason_and_hint() {
        let err = NetplayError::RoomNotFound {
            code: "ZZZZZZ".to_string(),
        };
        let msg = err.user_message();
        assert!(msg.contains("ZZZZZZ"));
        assert!(msg.contains("host"));
    }

    #[test]
    fn test_only_relay_timeout_is_non_fatal() {
        assert!(!NetplayError::RelayTimeout.is_fatal());
        assert!(NetplayError::TransportClosed {
            reason: "reset".to_string()
        }
        .is_fatal());
        assert!(NetplayError::MalformedFrame("bad".to_string()).is_fatal());
    }

    #[test]
    fn test_frame_errors_map_to_taxonomy() {
        let closed: NetplayError = FrameError::EndOfStream { buffered: 0 }.into();
        assert!(matches!(closed, NetplayError::TransportClosed { .. }));

        let big: NetplayError = FrameError::TooLarge(1 << 30).into();
        assert!(matches!(big, NetplayError::MalformedFrame(_)));
    }

    #[test]
    fn test_registry_timeout_maps_to_relay_timeout() {
        let err: NetplayError = RegistryError::Timeout.into();
        assert!(matches!(err, NetplayError::RelayTimeout));

        let err: NetplayError = RegistryError::Unreachable("refused".to_string()).into();
        assert!(matches!(err, NetplayError::RegistryUnavailable { .. }));
    }
}
