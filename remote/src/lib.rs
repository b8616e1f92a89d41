//! # Pong Force Remote
//!
//! The non-authoritative side of a Pong Force match. The remote player never
//! runs physics: it shows whatever the host last published and sends its own
//! paddle input back.
//!
//! ## Core Responsibilities
//!
//! ### Joining
//! The player types a room code; the matchmaking service answers with the
//! host's address (direct mode) or the room becomes the mailbox for the relay
//! (relay mode). The remote is always player 2.
//!
//! ### Mirroring
//! Every snapshot that is newer than the current view replaces it whole.
//! Older or repeated snapshots are dropped, so late relay polls and duplicate
//! frames cannot move the view backwards.
//!
//! ### Input Forwarding
//! Controls are sampled once per frame and turned into discrete inputs
//! (direction changes, force, pause, restart). Once the mirrored match has
//! ended nothing more is sent.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! [`game::Mirror`], the last applied snapshot plus what the host told us
//! on connect.
//!
//! ### Input Module (`input`)
//! [`input::InputManager`], edge detection over a
//! [`shared::ControlSource`].
//!
//! ### Network Module (`network`)
//! [`network::RemoteClient`]: join, transport setup, the frame loop and
//! leaving cleanly.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use remote::network::RemoteClient;
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
//!     let mut client = RemoteClient::new(config, matchmaker, "Bob");
//!     client.join("AB12CD").await?;
//!     let outcome = client.run().await?;
//!     println!("Left: {:?}", outcome.reason);
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
