//! In-process transport.
//!
//! [`memory_transport`] returns the two session halves plus a [`MemoryPeer`]
//! that plays the client: it pushes inbound bytes and inspects what the
//! server wrote, one entry per `send` call. Reads never block; a payload
//! that is not fully buffered fails with `UnexpectedEof`.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;

use crate::transport::{Inbound, Outbound};

#[derive(Debug, Default)]
struct Pipe {
    inbound: VecDeque<u8>,
    sent: Vec<Bytes>,
    shutdown: bool,
    peer_closed: bool,
    fail_writes: bool,
}

type Shared = Arc<Mutex<Pipe>>;

fn lock(shared: &Shared) -> std::sync::MutexGuard<'_, Pipe> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create a connected in-memory transport.
pub fn memory_transport() -> (MemoryInbound, MemoryOutbound, MemoryPeer) {
    let shared = Shared::default();
    (
        MemoryInbound {
            shared: Arc::clone(&shared),
        },
        MemoryOutbound {
            shared: Arc::clone(&shared),
        },
        MemoryPeer { shared },
    )
}

#[derive(Debug)]
pub struct MemoryInbound {
    shared: Shared,
}

impl Inbound for MemoryInbound {
    fn poll_id(&mut self) -> io::Result<Option<u8>> {
        let mut pipe = lock(&self.shared);
        match pipe.inbound.pop_front() {
            Some(id) => Ok(Some(id)),
            None if pipe.peer_closed => Err(io::ErrorKind::UnexpectedEof.into()),
            None => Ok(None),
        }
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut pipe = lock(&self.shared);
        if pipe.inbound.len() < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "payload not fully buffered",
            ));
        }
        let n = buf.len();
        for (dst, src) in buf.iter_mut().zip(pipe.inbound.drain(..n)) {
            *dst = src;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryOutbound {
    shared: Shared,
}

impl Outbound for MemoryOutbound {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut pipe = lock(&self.shared);
        if pipe.shutdown || pipe.fail_writes {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        pipe.sent.push(Bytes::copy_from_slice(bytes));
        Ok(())
    }

    fn shutdown(&mut self) {
        lock(&self.shared).shutdown = true;
    }
}

/// The client side of a memory transport.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    shared: Shared,
}

impl MemoryPeer {
    /// Queue bytes for the server to read.
    pub fn push(&self, bytes: &[u8]) {
        lock(&self.shared).inbound.extend(bytes.iter().copied());
    }

    /// Everything the server has sent so far.
    pub fn sent(&self) -> Vec<Bytes> {
        lock(&self.shared).sent.clone()
    }

    /// Drain what the server has sent so far.
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut lock(&self.shared).sent)
    }

    /// Ids of the frames sent so far.
    pub fn sent_ids(&self) -> Vec<u8> {
        lock(&self.shared)
            .sent
            .iter()
            .filter_map(|frame| frame.first().copied())
            .collect()
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.shared).shutdown
    }

    /// Simulate the client hanging up.
    pub fn close(&self) {
        lock(&self.shared).peer_closed = true;
    }

    /// Make every further server write fail.
    pub fn fail_writes(&self) {
        lock(&self.shared).fail_writes = true;
    }
}
