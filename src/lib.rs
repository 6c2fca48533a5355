//! # voxel-protocol
//!
//! Protocol core for classic voxel world servers: the fixed-size packet
//! codec, a capability-aware packet registry, extension negotiation,
//! per-session state and compressed world streaming.
//!
//! ## Layout
//! - [`core`]: wire codec and frame types
//! - [`protocol`]: packet registry, handshake and in-game handlers
//! - [`session`]: per-connection state machine and send path
//! - [`server`]: session slots, worlds, broadcasts and the tick loop
//! - [`world`]: block storage, environment, custom blocks and particles
//! - [`transport`]: TCP, WebSocket and in-memory byte transports
//! - [`service`]: credential verification and command input
//! - [`utils`]: compression, logging and metrics
//!
//! ## Example
//! ```no_run
//! use std::net::TcpListener;
//! use std::sync::Arc;
//! use voxel_protocol::{Server, ServerConfig};
//!
//! # fn main() -> voxel_protocol::Result<()> {
//! let config = ServerConfig::default();
//! let listener = TcpListener::bind(config.bind_address()?)?;
//! let server = Arc::new(Server::new(config)?);
//! server.run(listener)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod groups;
pub mod protocol;
pub mod server;
pub mod service;
pub mod session;
pub mod transport;
pub mod utils;
pub mod world;

pub use config::{ConfigLookup, ServerConfig};
pub use error::{ProtocolError, Result};
pub use events::{Event, EventBus, EventKind};
pub use server::Server;
pub use session::{Session, SessionState};
pub use world::World;
