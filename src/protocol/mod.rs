//! # Protocol Layer
//!
//! Packet registry, extension negotiation and the handlers behind every
//! inbound packet id.
//!
//! ## Components
//! - **Registry**: id to frame size and handler, with capability-gated variants
//! - **Extensions**: extension hashes, the advertised table, negotiated sets
//! - **Handshake**: identification and extension negotiation handlers
//! - **Handlers**: in-game packets (blocks, movement, chat, clicks, pings)
//! - **Chat**: message splitting and long-message reassembly
//! - **Outbound**: builders for every frame the server sends
//! - **Transfer**: compressed world streaming
//!
//! ## Handshake Flow
//! ```text
//! Client                                   Server
//!   |-- Identification (0x00, marker 0x42) -->|
//!   |<-- Identification, ExtInfo, ExtEntry*, --|
//!   |    CustomBlockSupportLevel               |
//!   |-- ExtInfo (0x10) ----------------------->|
//!   |-- ExtEntry (0x11) x count -------------->|
//!   |-- CustomBlockSupportLevel (0x13)? ------>|
//!   |<-- LevelInit, LevelChunk*, Finalize -----|
//! ```

pub mod chat;
pub mod extensions;
pub mod handlers;
pub mod handshake;
pub mod outbound;
pub mod registry;
pub mod transfer;

pub use chat::MessageKind;
pub use extensions::{Extension, ExtensionTable, NegotiatedExtensions};
pub use registry::{HandlerContext, PacketRegistry};
