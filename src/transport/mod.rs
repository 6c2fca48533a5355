//! # Transport Layer
//!
//! Byte transports underneath a session, split into a read half owned by the
//! tick thread and a write half guarded by the session's send lock.
//!
//! ## Available Transports
//! - **TCP**: `std::net` stream with a non-blocking frame-start probe
//! - **WebSocket**: binary messages over an upgraded TCP stream, wrapping
//!   either of the above
//! - **Memory**: in-process pair for deterministic tests and benches
//!
//! Reading is deliberately two-phase. [`Inbound::poll_id`] never blocks, so an
//! idle client costs the tick nothing. [`Inbound::read_payload`] blocks until
//! the whole payload arrives, so a client that stalls mid-frame holds up the
//! tick for every session.

pub mod memory;
pub mod tcp;
pub mod websocket;

use std::io;

/// Read half of a transport.
pub trait Inbound: Send {
    /// Next frame id if one is already available.
    ///
    /// `Ok(None)` means no data yet; end of stream is an error.
    fn poll_id(&mut self) -> io::Result<Option<u8>>;

    /// Fill `buf` completely, blocking as long as needed.
    fn read_payload(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

/// Write half of a transport.
pub trait Outbound: Send {
    /// Write all of `bytes`.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Stop sending. Further sends fail.
    fn shutdown(&mut self);
}

pub use memory::{memory_transport, MemoryInbound, MemoryOutbound, MemoryPeer};
pub use tcp::{split_tcp, TcpInbound, TcpOutbound};
pub use websocket::{split_websocket, WsInbound, WsOutbound};
