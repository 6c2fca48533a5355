//! Event bus for server extensions.
//!
//! Listeners subscribe to one [`EventKind`] and receive the matching
//! [`Event`]. Some events are vetoable: a listener returning `false` stops
//! the remaining listeners and cancels the action (a block placement, a chat
//! line, a handshake). Return values of non-vetoable events are ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::core::codec::{Angles, BlockPos};
use crate::protocol::chat::MessageKind;
use crate::session::Session;
use crate::world::World;

/// Decoded PlayerClicked payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Click {
    pub button: u8,
    pub action: u8,
    /// Degrees, converted from the signed 16-bit wire value.
    pub angles: Angles,
    pub target_entity: u8,
    pub target_block: BlockPos,
    pub target_face: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    HandshakeDone,
    BlockPlace,
    Message,
    Move,
    Rotate,
    HeldBlockChange,
    Click,
    Spawn,
    Despawn,
    Disconnect,
    PluginMessage,
    Tick,
}

pub enum Event<'a> {
    /// Vetoable. `world` may be replaced with another destination.
    HandshakeDone {
        session: &'a Arc<Session>,
        world: &'a mut Arc<World>,
    },
    /// Vetoable. `mode` is 1 for placement, 0 for removal.
    BlockPlace {
        session: &'a Arc<Session>,
        pos: BlockPos,
        mode: u8,
        block: u8,
    },
    /// Vetoable. Listeners may rewrite the text and the message kind.
    Message {
        session: &'a Arc<Session>,
        text: &'a mut String,
        kind: &'a mut MessageKind,
    },
    Move {
        session: &'a Arc<Session>,
    },
    Rotate {
        session: &'a Arc<Session>,
    },
    HeldBlockChange {
        session: &'a Arc<Session>,
        previous: u8,
        current: u8,
    },
    Click {
        session: &'a Arc<Session>,
        click: Click,
    },
    Spawn {
        session: &'a Arc<Session>,
    },
    Despawn {
        session: &'a Arc<Session>,
    },
    Disconnect {
        session: &'a Arc<Session>,
    },
    /// Vetoable; a veto closes the sender as malformed.
    PluginMessage {
        session: &'a Arc<Session>,
        channel: u8,
        text: &'a str,
    },
    Tick {
        delta: Duration,
    },
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::HandshakeDone { .. } => EventKind::HandshakeDone,
            Event::BlockPlace { .. } => EventKind::BlockPlace,
            Event::Message { .. } => EventKind::Message,
            Event::Move { .. } => EventKind::Move,
            Event::Rotate { .. } => EventKind::Rotate,
            Event::HeldBlockChange { .. } => EventKind::HeldBlockChange,
            Event::Click { .. } => EventKind::Click,
            Event::Spawn { .. } => EventKind::Spawn,
            Event::Despawn { .. } => EventKind::Despawn,
            Event::Disconnect { .. } => EventKind::Disconnect,
            Event::PluginMessage { .. } => EventKind::PluginMessage,
            Event::Tick { .. } => EventKind::Tick,
        }
    }
}

type Listener = Arc<dyn Fn(&mut Event<'_>) -> bool + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, EventKind, Listener)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&mut Event<'_>) -> bool + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, kind, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every listener for the event's kind in subscription order.
    /// Returns `false` as soon as one listener vetoes.
    pub fn call(&self, event: &mut Event<'_>) -> bool {
        let kind = event.kind();
        // Lock is released before listeners run; they may subscribe.
        let matching: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| Arc::clone(l))
            .collect();

        matching.iter().all(|listener| listener(&mut *event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn veto_stops_later_listeners() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        bus.subscribe(EventKind::Tick, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            false
        });
        let c = Arc::clone(&calls);
        bus.subscribe(EventKind::Tick, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            true
        });

        let mut event = Event::Tick {
            delta: Duration::from_millis(10),
        };
        assert!(!bus.call(&mut event));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribed_listener_is_not_called() {
        let bus = EventBus::new();
        let id = bus.subscribe(EventKind::Tick, |_| false);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        let mut event = Event::Tick {
            delta: Duration::ZERO,
        };
        assert!(bus.call(&mut event));
    }
}
