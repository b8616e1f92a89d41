//! # Pong Force Host
//!
//! The authoritative side of a two-player Pong Force match. The host owns the
//! only copy of the simulation that matters: it applies both players' input,
//! advances the physics at a fixed tick and publishes an immutable snapshot
//! every tick for the remote player to mirror.
//!
//! ## Core Responsibilities
//!
//! ### Room Lifecycle
//! Before anything is accepted the host registers a room with the matchmaking
//! service. The room code is what the other player types in. Exactly one
//! remote participant is admitted and always becomes player 2; further
//! connection attempts are told the room is full.
//!
//! ### Authoritative Simulation
//! [`game::Simulation`] is the single writer of the session phase
//! (`Waiting -> Starting -> InProgress <-> Paused -> Ended`) and of every
//! snapshot. Remote input is queued and applied at the start of the next
//! tick, through the same path regardless of the transport it arrived on.
//!
//! ### State Broadcasting
//! - **Direct mode**: snapshots are written to the remote's TCP connection.
//! - **Relay mode**: the latest snapshot is pushed to the relay at the
//!   broadcast rate; a push that times out is dropped, not retried.
//!
//! ## Module Organization
//!
//! ### Physics Module (`physics`)
//! Pure functions over the shared ball and paddle state: paddle movement,
//! wall and paddle bounces, scoring, force meter and force push.
//!
//! ### Game Module (`game`)
//! The simulation: input queues, phase transitions, serve delay, win score
//! and the final match result.
//!
//! ### Lifecycle Module (`lifecycle`)
//! Who is in the room and whether anyone else may join.
//!
//! ### Network Module (`network`)
//! The [`network::Host`] runtime: room registration, accept loop or relay
//! join watch, the tick loop and an orderly end of session.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use host::network::Host;
//! use shared::{HttpAddressResolver, HttpRegistry, Matchmaker, NetplayConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetplayConfig::load(None)?;
//!     let registry = HttpRegistry::new(
//!         &config.registry_url,
//!         config.registry_timeout(),
//!         config.relay_timeout(),
//!     )?;
//!     let matchmaker = Matchmaker::new(
//!         Arc::new(registry),
//!         HttpAddressResolver::new(config.registry_timeout()),
//!         config.registry_timeout(),
//!     );
//!
//!     let mut host = Host::new(config, matchmaker, "Alice");
//!     let room = host.open().await?;
//!     println!("Room code: {}", room.code);
//!
//!     let result = host.run().await?;
//!     println!("Final score {} - {}", result.scores[0], result.scores[1]);
//!     Ok(())
//! }
//! ```
//!
//! ## Ending a Session
//! A session ends on the win score, on peer loss or on an explicit stop. In
//! every case the final snapshot carries `Ended`, the result is handed to the
//! [`shared::ResultRecorder`], background loops are stopped and awaited, and
//! the registry room is closed.

pub mod game;
pub mod lifecycle;
pub mod network;
pub mod physics;
