//! Packet registry: id to frame size and handler, with capability-gated
//! alternate definitions.
//!
//! The registry is owned by the [`Server`](crate::server::Server) rather than
//! held in a global, so each server instance (and each test) gets its own
//! table with an explicit [`PacketRegistry::with_defaults`] /
//! [`PacketRegistry::clear`] lifecycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::core::packet::ids;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::extensions;
use crate::protocol::{handlers, handshake};
use crate::server::Server;
use crate::session::Session;

/// Everything a handler may touch while processing one frame.
pub struct HandlerContext<'a> {
    pub server: &'a Server,
    pub session: &'a Arc<Session>,
    /// Whether the registry resolved the extended definition for this frame.
    pub extended: bool,
}

/// Packet handler. Returns `false` when the payload is malformed, which
/// terminates the session with a generic protocol error.
pub type Handler = Arc<dyn Fn(&HandlerContext<'_>, &[u8]) -> bool + Send + Sync>;

#[derive(Clone)]
struct ExtendedDescriptor {
    hash: u32,
    version: u32,
    size: usize,
    handler: Option<Handler>,
}

#[derive(Clone)]
struct PacketDescriptor {
    size: usize,
    handler: Handler,
    extended: Option<ExtendedDescriptor>,
}

/// Outcome of resolving an id for one session.
#[derive(Clone)]
pub struct Resolved {
    pub size: usize,
    pub handler: Handler,
    pub extended: bool,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("size", &self.size)
            .field("extended", &self.extended)
            .finish_non_exhaustive()
    }
}

/// Packet table keyed by id.
pub struct PacketRegistry {
    packets: RwLock<HashMap<u8, PacketDescriptor>>,
}

impl Default for PacketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            packets: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with every inbound packet this server understands.
    pub fn with_defaults() -> Result<Self> {
        let registry = Self::new();
        registry.register(ids::IDENTIFICATION, 130, handshake::identification)?;
        registry.register(ids::SET_BLOCK_CLIENT, 8, handlers::set_block)?;
        registry.register(ids::POSITION_ORIENTATION, 9, handlers::position_orientation)?;
        registry.register_extended(
            ids::POSITION_ORIENTATION,
            extensions::EXT_ENTITY_POSITIONS,
            1,
            15,
            None,
        )?;
        registry.register(ids::MESSAGE, 65, handlers::message)?;
        registry.register(ids::EXT_INFO, 66, handshake::ext_info)?;
        registry.register(ids::EXT_ENTRY, 68, handshake::ext_entry)?;
        registry.register(ids::CUSTOM_BLOCK_LEVEL, 1, handshake::custom_block_level)?;
        registry.register(ids::PLAYER_CLICKED, 14, handlers::player_click)?;
        registry.register(ids::TWO_WAY_PING, 3, handlers::two_way_ping)?;
        registry.register(ids::PLUGIN_MESSAGE, 65, handlers::plugin_message)?;
        Ok(registry)
    }

    /// Install the base definition for `id`.
    pub fn register<F>(&self, id: u8, size: usize, handler: F) -> Result<()>
    where
        F: Fn(&HandlerContext<'_>, &[u8]) -> bool + Send + Sync + 'static,
    {
        let mut packets = self
            .packets
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_WRITE_LOCK.to_string()))?;

        if packets.contains_key(&id) {
            return Err(ProtocolError::DuplicatePacket(id));
        }

        packets.insert(
            id,
            PacketDescriptor {
                size,
                handler: Arc::new(handler),
                extended: None,
            },
        );
        Ok(())
    }

    /// Attach an alternate definition used when a session negotiated exactly
    /// `version` of the extension identified by `hash`. Without a handler of
    /// its own, the base handler runs with the extended frame size.
    pub fn register_extended(
        &self,
        id: u8,
        hash: u32,
        version: u32,
        size: usize,
        handler: Option<Handler>,
    ) -> Result<()> {
        let mut packets = self
            .packets
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_WRITE_LOCK.to_string()))?;

        let descriptor = packets.get_mut(&id).ok_or_else(|| {
            ProtocolError::InvalidRegistration(format!("packet 0x{id:02X} has no base definition"))
        })?;

        if descriptor.extended.is_some() {
            return Err(ProtocolError::DuplicatePacket(id));
        }
        if size < descriptor.size {
            return Err(ProtocolError::InvalidRegistration(format!(
                "extended size {size} of packet 0x{id:02X} is smaller than base size {}",
                descriptor.size
            )));
        }
        if version == 0 {
            return Err(ProtocolError::InvalidRegistration(format!(
                "packet 0x{id:02X} gated on extension version 0"
            )));
        }

        descriptor.extended = Some(ExtendedDescriptor {
            hash,
            version,
            size,
            handler,
        });
        Ok(())
    }

    /// Pick the definition for `id` given a lookup of the session's negotiated
    /// extension versions. The extended definition applies only on an exact
    /// version match.
    pub fn resolve(&self, id: u8, version_of: impl Fn(u32) -> u32) -> Result<Resolved> {
        let packets = self
            .packets
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_READ_LOCK.to_string()))?;

        let descriptor = packets.get(&id).ok_or(ProtocolError::UnknownPacket(id))?;

        if let Some(ext) = &descriptor.extended {
            if version_of(ext.hash) == ext.version {
                return Ok(Resolved {
                    size: ext.size,
                    handler: ext
                        .handler
                        .clone()
                        .unwrap_or_else(|| Arc::clone(&descriptor.handler)),
                    extended: true,
                });
            }
        }

        Ok(Resolved {
            size: descriptor.size,
            handler: Arc::clone(&descriptor.handler),
            extended: false,
        })
    }

    pub fn contains(&self, id: u8) -> bool {
        self.packets
            .read()
            .map(|packets| packets.contains_key(&id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.packets.read().map(|packets| packets.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every definition.
    pub fn clear(&self) -> Result<()> {
        self.packets
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_WRITE_LOCK.to_string()))?
            .clear();
        Ok(())
    }
}
