//! Matchmaking/relay service client.
//!
//! [`Registry`] mirrors the service's HTTP surface one call per endpoint.
//! [`HttpRegistry`] talks to the real service; [`MemoryRegistry`] keeps
//! everything in-process for local play and tests.

mod http;
mod memory;

pub use http::HttpRegistry;
pub use memory::MemoryRegistry;

use crate::protocol::RemoteInput;
use crate::session::{Room, RoomStatus};
use crate::snapshot::StateSnapshot;
use std::future::Future;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("request timed out")]
    Timeout,
    #[error("cannot reach matchmaking server: {0}")]
    Unreachable(String),
    #[error("not found")]
    NotFound,
    #[error("room is full")]
    Full,
    #[error("room code already in use")]
    CodeInUse,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// What the host sends when it creates a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRegistration {
    pub code: String,
    pub host_name: String,
    pub host_local_addr: IpAddr,
    pub host_public_addr: Option<IpAddr>,
    pub host_port: u16,
}

/// Registry answer to a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGrant {
    pub host_public_addr: Option<IpAddr>,
    pub host_local_addr: Option<IpAddr>,
    pub host_port: u16,
    /// Name the registry assigned; may differ from the requested one.
    pub player_name: String,
    pub players: Vec<String>,
}

pub trait Registry: Send + Sync + 'static {
    fn health(&self) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn create_room(
        &self,
        registration: &RoomRegistration,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// `Ok(None)` if no open room has this code.
    fn get_room(&self, code: &str) -> impl Future<Output = Result<Option<Room>, RegistryError>> + Send;

    fn join_room(
        &self,
        code: &str,
        player_name: &str,
    ) -> impl Future<Output = Result<JoinGrant, RegistryError>> + Send;

    fn update_room(
        &self,
        code: &str,
        status: RoomStatus,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn close_room(&self, code: &str) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// Removes a joined player from the room. The host keeps the room open.
    fn leave_room(
        &self,
        code: &str,
        player_name: &str,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn push_relay_state(
        &self,
        code: &str,
        snapshot: &StateSnapshot,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// `Ok(None)` until the host has pushed its first snapshot.
    fn poll_relay_state(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<StateSnapshot>, RegistryError>> + Send;

    fn push_relay_input(
        &self,
        code: &str,
        input: RemoteInput,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// Drains buffered inputs in arrival order; empty when none are waiting.
    fn poll_relay_input(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Vec<RemoteInput>, RegistryError>> + Send;
}
