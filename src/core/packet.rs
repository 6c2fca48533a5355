//! Packet ids, protocol constants and the outbound [`Frame`] type.

use bytes::Bytes;

/// Classic protocol version spoken by this server.
pub const PROTOCOL_VERSION: u8 = 0x07;

/// Last byte of the identification payload when the client supports extensions.
pub const EXTENSION_MARKER: u8 = 0x42;

/// Entity id a client uses for itself.
pub const SELF_ID: u8 = 0xFF;

/// Compressed bytes carried by one level chunk frame.
pub const CHUNK_LEN: usize = 1024;

/// On-wire size of a level chunk frame: id + length + chunk + percent.
pub const CHUNK_FRAME_LEN: usize = 1 + 2 + CHUNK_LEN + 1;

/// Packet ids in both directions.
pub mod ids {
    pub const IDENTIFICATION: u8 = 0x00;
    pub const LEVEL_INIT: u8 = 0x02;
    pub const LEVEL_CHUNK: u8 = 0x03;
    pub const LEVEL_FINALIZE: u8 = 0x04;
    pub const SET_BLOCK_CLIENT: u8 = 0x05;
    pub const SET_BLOCK: u8 = 0x06;
    pub const SPAWN_PLAYER: u8 = 0x07;
    pub const POSITION_ORIENTATION: u8 = 0x08;
    pub const DESPAWN_PLAYER: u8 = 0x0C;
    pub const MESSAGE: u8 = 0x0D;
    pub const KICK: u8 = 0x0E;
    pub const USER_TYPE: u8 = 0x0F;
    pub const EXT_INFO: u8 = 0x10;
    pub const EXT_ENTRY: u8 = 0x11;
    pub const CLICK_DISTANCE: u8 = 0x12;
    pub const CUSTOM_BLOCK_LEVEL: u8 = 0x13;
    pub const HOLD_THIS: u8 = 0x14;
    pub const SET_HOTKEY: u8 = 0x15;
    pub const EXT_ADD_PLAYER_NAME: u8 = 0x16;
    pub const EXT_REMOVE_PLAYER_NAME: u8 = 0x18;
    pub const ENV_COLOR: u8 = 0x19;
    pub const MAKE_SELECTION: u8 = 0x1A;
    pub const REMOVE_SELECTION: u8 = 0x1B;
    pub const BLOCK_PERMISSION: u8 = 0x1C;
    pub const CHANGE_MODEL: u8 = 0x1D;
    pub const MAP_APPEARANCE: u8 = 0x1E;
    pub const WEATHER: u8 = 0x1F;
    pub const HACK_CONTROL: u8 = 0x20;
    pub const EXT_ADD_ENTITY2: u8 = 0x21;
    pub const PLAYER_CLICKED: u8 = 0x22;
    pub const DEFINE_BLOCK: u8 = 0x23;
    pub const UNDEFINE_BLOCK: u8 = 0x24;
    pub const DEFINE_BLOCK_EXT: u8 = 0x25;
    pub const BULK_BLOCK_UPDATE: u8 = 0x26;
    pub const ADD_TEXT_COLOR: u8 = 0x27;
    pub const TEXTURE_PACK: u8 = 0x28;
    pub const MAP_PROPERTY: u8 = 0x29;
    pub const ENTITY_PROPERTY: u8 = 0x2A;
    pub const TWO_WAY_PING: u8 = 0x2B;
    pub const INVENTORY_ORDER: u8 = 0x2C;
    pub const SET_HOTBAR: u8 = 0x2D;
    pub const SET_SPAWNPOINT: u8 = 0x2E;
    pub const VELOCITY_CONTROL: u8 = 0x2F;
    pub const DEFINE_EFFECT: u8 = 0x30;
    pub const SPAWN_EFFECT: u8 = 0x31;
    pub const PLUGIN_MESSAGE: u8 = 0x35;
}

/// When a frame may be written to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written immediately in any state.
    Anytime,
    /// Refers to world entities; queued until the session is in game.
    Ingame,
}

/// One encoded outbound frame, id byte included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
    delivery: Delivery,
}

impl Frame {
    pub(crate) fn new(bytes: Bytes, delivery: Delivery) -> Self {
        Self { bytes, delivery }
    }

    pub fn id(&self) -> u8 {
        self.bytes.first().copied().unwrap_or_default()
    }

    pub fn payload(&self) -> &[u8] {
        self.bytes.get(1..).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}
