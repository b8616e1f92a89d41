//! # Pong Force netplay: shared layer
//!
//! Everything both peers agree on: the wire protocol, framing, snapshots,
//! room/session types, the matchmaking registry client and the two
//! transports.
//!
//! ## Transports
//! - **Direct**: one TCP connection, length-prefixed bincode frames
//!   ([`codec`], [`direct`]).
//! - **Relay**: the matchmaking service stores the latest host snapshot and a
//!   queue of remote inputs; both peers poll it over HTTP ([`relay`]).
//!
//! ## Authority
//! The host owns the simulation and the session phase. The remote only ever
//! receives whole [`StateSnapshot`]s and sends [`RemoteInput`]s.

pub mod address;
pub mod codec;
pub mod collab;
pub mod config;
pub mod direct;
pub mod error;
pub mod matchmaking;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod session;
pub mod shutdown;
pub mod snapshot;

pub use address::{AddressResolver, FixedAddresses, HttpAddressResolver};
pub use codec::{decode_frame, encode_frame, FrameError, FrameReader};
pub use collab::{ControlEdges, ControlSource, ControlState, ResultRecorder, SnapshotRenderer};
pub use config::{NetplayConfig, TransportMode};
pub use direct::{DirectTransport, TransportEvent};
pub use error::NetplayError;
pub use matchmaking::{ConnectInfo, Matchmaker};
pub use protocol::{InputKind, Message, RelayEnvelope, RelayPayload, RemoteInput};
pub use registry::{HttpRegistry, MemoryRegistry, Registry, RegistryError};
pub use relay::{RelayInputQueue, RelayLink, SnapshotFeed};
pub use session::{
    PhaseError, PlayerId, PlayerIdentity, Room, RoomStatus, SessionPhase, TransportRole, HOST_PLAYER_ID,
    MAX_PARTICIPANTS, REMOTE_PLAYER_ID,
};
pub use shutdown::{LoopHandle, Shutdown, ShutdownSignal};
pub use snapshot::{BallState, EndReason, MatchResult, PaddleState, StateSnapshot};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, 0 if the clock is before it.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}
