//! # Sessions
//!
//! One [`Session`] per connected client. A session is shared (`Arc`) between
//! the tick thread, the acceptor and anyone broadcasting, so its parts sit
//! behind separate locks:
//!
//! - **link**: state, write half and the queue of frames held back until the
//!   session is in game. This is the send lock; every outbound byte passes
//!   through [`Session::send`] while holding it.
//! - **inbound**: read half, used only by the tick thread.
//! - **data**: player and extension state.
//!
//! Lock order is data before link. Code never holds the data lock of two
//! sessions at once.

pub mod state;

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::core::packet::{Delivery, Frame};
use crate::error::constants;
use crate::protocol::outbound;
use crate::transport::{Inbound, Outbound};
use crate::utils::metrics::Metrics;
use crate::world::World;

pub use state::{
    Capability, CpeState, EntityView, Hacks, PingStats, PlayerState, SessionData, SessionState,
    UpdateFlags,
};

struct Link {
    state: SessionState,
    transport: Box<dyn Outbound>,
    pending: VecDeque<Frame>,
}

/// A connected client.
pub struct Session {
    id: u8,
    addr: IpAddr,
    closed: AtomicBool,
    link: Mutex<Link>,
    inbound: Mutex<Box<dyn Inbound>>,
    data: Mutex<SessionData>,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        id: u8,
        addr: IpAddr,
        inbound: Box<dyn Inbound>,
        outbound: Box<dyn Outbound>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            id,
            addr,
            closed: AtomicBool::new(false),
            link: Mutex::new(Link {
                state: SessionState::Initial,
                transport: outbound,
                pending: VecDeque::new(),
            }),
            inbound: Mutex::new(inbound),
            data: Mutex::new(SessionData::default()),
            metrics,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn is_local(&self) -> bool {
        self.addr.is_loopback()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_inbound(&self) -> MutexGuard<'_, Box<dyn Inbound>> {
        self.inbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock player and extension state.
    pub fn data(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_data<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        f(&mut self.data())
    }

    pub fn state(&self) -> SessionState {
        self.lock_link().state
    }

    pub fn is_ingame(&self) -> bool {
        self.state() == SessionState::Ingame
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let mut link = self.lock_link();
        if link.state != SessionState::Closed {
            link.state = state;
        }
    }

    /// Enter world transfer unless one is already running.
    pub(crate) fn begin_transfer(&self) -> bool {
        let mut link = self.lock_link();
        match link.state {
            SessionState::WorldTransfer | SessionState::Closed => false,
            _ => {
                link.state = SessionState::WorldTransfer;
                true
            }
        }
    }

    /// Return to the idle pre-game state and drop held-back frames. In-game
    /// frames sent afterwards are discarded rather than queued.
    pub(crate) fn park(&self) {
        let mut link = self.lock_link();
        if link.state != SessionState::Closed {
            link.state = SessionState::Initial;
            link.pending.clear();
        }
    }

    /// Frames held back until the session is in game.
    pub fn pending_frames(&self) -> usize {
        self.lock_link().pending.len()
    }

    fn write_locked(&self, link: &mut Link, bytes: &[u8]) -> bool {
        match link.transport.send(bytes) {
            Ok(()) => {
                self.metrics.frame_sent(bytes.len() as u64);
                true
            }
            Err(e) => {
                debug!(session = self.id, error = %e, "Send failed, closing session");
                self.closed.store(true, Ordering::Release);
                link.state = SessionState::Closed;
                false
            }
        }
    }

    /// Write one frame. In-game frames are queued while a handshake or
    /// transfer is running and dropped before identification.
    pub fn send(&self, frame: &Frame) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut link = self.lock_link();
        match (frame.delivery(), link.state) {
            (_, SessionState::Closed) => false,
            (Delivery::Ingame, SessionState::Initial) => true,
            (Delivery::Ingame, SessionState::AwaitingExt | SessionState::WorldTransfer) => {
                link.pending.push_back(frame.clone());
                true
            }
            _ => self.write_locked(&mut link, frame.as_bytes()),
        }
    }

    /// Switch to in game and flush every held-back frame in order.
    pub(crate) fn enter_ingame(&self) -> bool {
        let mut link = self.lock_link();
        if link.state == SessionState::Closed || self.is_closed() {
            return false;
        }
        link.state = SessionState::Ingame;
        while let Some(frame) = link.pending.pop_front() {
            if !self.write_locked(&mut link, frame.as_bytes()) {
                link.pending.clear();
                return false;
            }
        }
        true
    }

    /// Send a kick frame and close. A session is kicked at most once.
    pub fn kick(&self, reason: &str) {
        let reason = if reason.is_empty() {
            constants::KICK_NO_REASON
        } else {
            reason
        };
        let mut link = self.lock_link();
        if self.is_closed() {
            return;
        }
        let frame = outbound::kick(reason);
        self.write_locked(&mut link, frame.as_bytes());
        self.closed.store(true, Ordering::Release);
        link.state = SessionState::Closed;
        link.pending.clear();
        link.transport.shutdown();
        self.metrics.kick();
        info!(session = self.id, addr = %self.addr, reason, "Session kicked");
    }

    /// Close without a reason.
    pub fn close(&self) {
        let mut link = self.lock_link();
        self.closed.store(true, Ordering::Release);
        if link.state != SessionState::Closed {
            link.state = SessionState::Closed;
            link.pending.clear();
            link.transport.shutdown();
        }
    }

    pub fn has_player(&self) -> bool {
        self.data().player.is_some()
    }

    pub fn is_extension_enabled(&self) -> bool {
        self.data().cpe().is_some()
    }

    pub fn ext_version(&self, hash: u32) -> u32 {
        self.data().ext_version(hash)
    }

    /// Exact-version capability check.
    pub fn supports(&self, hash: u32, version: u32) -> bool {
        self.ext_version(hash) == version
    }

    pub fn name(&self) -> Option<String> {
        self.data().player.as_ref().map(|p| p.name.clone())
    }

    pub fn world(&self) -> Option<Arc<World>> {
        self.data()
            .player
            .as_ref()
            .and_then(|p| p.world.upgrade())
    }

    pub fn in_world(&self, world: &Arc<World>) -> bool {
        self.world().is_some_and(|w| Arc::ptr_eq(&w, world))
    }

    pub fn is_spawned(&self) -> bool {
        self.data().player.as_ref().is_some_and(|p| p.spawned)
    }

    pub fn is_operator(&self) -> bool {
        self.data().player.as_ref().is_some_and(|p| p.operator)
    }

    /// Snapshot used to render this player for others.
    pub fn entity(&self) -> Option<EntityView> {
        let data = self.data();
        let player = data.player.as_ref()?;
        let cpe = data.cpe();
        Some(EntityView {
            id: self.id,
            name: player.name.clone(),
            display_name: player.display_name.clone(),
            skin: cpe.map(|c| c.skin.clone()).unwrap_or_default(),
            hide_name: cpe.is_some_and(|c| c.hide_display_name),
            position: player.position,
            angles: player.angles,
            model: cpe.map_or(state::DEFAULT_MODEL, |c| c.model),
            group: cpe.map_or(crate::groups::NO_GROUP, |c| c.group),
            rotation: cpe.map_or([0; 3], |c| c.rotation),
            world: player.world.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::FrameWriter;
    use crate::transport::memory_transport;
    use std::net::Ipv4Addr;

    fn session() -> (Session, crate::transport::MemoryPeer) {
        let (inbound, outbound, peer) = memory_transport();
        let session = Session::new(
            0,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            Box::new(inbound),
            Box::new(outbound),
            Arc::new(Metrics::new()),
        );
        (session, peer)
    }

    #[test]
    fn ingame_frames_wait_for_finalize() {
        let (session, peer) = session();
        session.set_state(SessionState::WorldTransfer);

        assert!(session.send(&FrameWriter::ingame(0x06, 8).finish()));
        assert!(session.send(&FrameWriter::anytime(0x0D, 66).finish()));
        assert_eq!(peer.sent_ids(), vec![0x0D]);
        assert_eq!(session.pending_frames(), 1);

        assert!(session.enter_ingame());
        assert_eq!(peer.sent_ids(), vec![0x0D, 0x06]);
        assert_eq!(session.pending_frames(), 0);
    }

    #[test]
    fn kick_sends_reason_once_and_closes() {
        let (session, peer) = session();
        session.kick("Bye");
        session.kick("Again");
        assert_eq!(peer.sent_ids(), vec![0x0E]);
        assert!(peer.is_shutdown());
        assert!(session.is_closed());
        assert!(!session.send(&FrameWriter::anytime(0x0D, 66).finish()));
    }

    #[test]
    fn failed_write_closes_session() {
        let (session, peer) = session();
        peer.fail_writes();
        assert!(!session.send(&FrameWriter::anytime(0x0D, 66).finish()));
        assert!(session.is_closed());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn parked_session_drops_ingame_frames() {
        let (session, peer) = session();
        session.set_state(SessionState::AwaitingExt);
        assert!(session.send(&FrameWriter::ingame(0x06, 8).finish()));
        assert_eq!(session.pending_frames(), 1);

        session.park();
        assert_eq!(session.pending_frames(), 0);
        assert!(session.send(&FrameWriter::ingame(0x06, 8).finish()));
        assert_eq!(session.pending_frames(), 0);
        assert!(peer.sent().is_empty());
    }

    #[test]
    fn transfer_cannot_be_reentered() {
        let (session, _peer) = session();
        assert!(session.begin_transfer());
        assert!(!session.begin_transfer());
    }
}
