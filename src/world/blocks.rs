//! Block ids, custom block definitions and bulk updates.

use bitflags::bitflags;

use crate::error::{ProtocolError, Result};

pub const BLOCK_AIR: u8 = 0;
pub const BLOCK_STONE: u8 = 1;
pub const BLOCK_GRASS: u8 = 2;
pub const BLOCK_DIRT: u8 = 3;
pub const BLOCK_BEDROCK: u8 = 7;
pub const BLOCK_WATER: u8 = 8;
pub const BLOCK_STILL_LAVA: u8 = 11;

/// Highest id of the built-in block set (classic plus CustomBlocks level 1).
pub const MAX_BUILTIN_BLOCK: u8 = 65;

/// Entries in the definition table.
pub const BLOCK_TABLE_LEN: usize = 256;

/// Definitions with ids at or above this are never sent to clients.
pub const MAX_DEFINABLE_BLOCK: u8 = 254;

/// Updates carried by one bulk frame.
pub const BULK_CAPACITY: usize = 256;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlockDefFlags: u8 {
        /// Six-face textures and explicit bounds.
        const EXTENDED = 1 << 0;
        /// Removed from clients; kept until the slot is reused.
        const UNDEFINED = 1 << 1;
    }
}

/// Texture indices per face. Basic definitions send `left` as the side texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockTextures {
    pub top: u8,
    pub left: u8,
    pub right: u8,
    pub front: u8,
    pub back: u8,
    pub bottom: u8,
}

impl BlockTextures {
    pub const fn uniform(tex: u8) -> Self {
        Self {
            top: tex,
            left: tex,
            right: tex,
            front: tex,
            back: tex,
            bottom: tex,
        }
    }
}

/// A server-defined block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDef {
    pub id: u8,
    pub name: String,
    pub flags: BlockDefFlags,
    pub solidity: u8,
    pub move_speed: u8,
    pub textures: BlockTextures,
    pub transmits_light: bool,
    pub walk_sound: u8,
    pub full_bright: bool,
    /// Height for basic definitions; 0 renders as a sprite.
    pub shape: u8,
    /// Bounds for extended definitions, in 1/16 block units.
    pub min: [u8; 3],
    pub max: [u8; 3],
    pub draw_type: u8,
    pub fog_density: u8,
    pub fog_color: [u8; 3],
}

impl BlockDef {
    /// A solid full cube with one texture.
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            flags: BlockDefFlags::empty(),
            solidity: 2,
            move_speed: 128,
            textures: BlockTextures::uniform(1),
            transmits_light: false,
            walk_sound: 1,
            full_bright: false,
            shape: 16,
            min: [0, 0, 0],
            max: [16, 16, 16],
            draw_type: 0,
            fog_density: 0,
            fog_color: [0, 0, 0],
        }
    }

    pub fn extended(mut self) -> Self {
        self.flags |= BlockDefFlags::EXTENDED;
        self
    }

    pub fn is_extended(&self) -> bool {
        self.flags.contains(BlockDefFlags::EXTENDED)
    }

    pub fn is_undefined(&self) -> bool {
        self.flags.contains(BlockDefFlags::UNDEFINED)
    }
}

/// The 256-entry custom block table.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    defs: Vec<Option<BlockDef>>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self {
            defs: vec![None; BLOCK_TABLE_LEN],
        }
    }

    /// Install or replace a definition.
    pub fn define(&mut self, def: BlockDef) -> Result<()> {
        if def.id >= MAX_DEFINABLE_BLOCK {
            return Err(ProtocolError::Custom(format!(
                "block id {} cannot be defined",
                def.id
            )));
        }
        let slot = usize::from(def.id);
        self.defs[slot] = Some(def);
        Ok(())
    }

    /// Mark a definition undefined. Returns whether one was active.
    pub fn undefine(&mut self, id: u8) -> bool {
        match self.defs[usize::from(id)].as_mut() {
            Some(def) if !def.is_undefined() => {
                def.flags |= BlockDefFlags::UNDEFINED;
                true
            }
            _ => false,
        }
    }

    /// Active definition for `id`.
    pub fn get(&self, id: u8) -> Option<&BlockDef> {
        self.defs[usize::from(id)]
            .as_ref()
            .filter(|def| !def.is_undefined())
    }

    /// Built-in ids and active custom definitions are valid.
    pub fn is_valid(&self, id: u8) -> bool {
        id <= MAX_BUILTIN_BLOCK || self.get(id).is_some()
    }

    /// Active definitions in id order.
    pub fn defined(&self) -> impl Iterator<Item = &BlockDef> {
        self.defs
            .iter()
            .take(usize::from(MAX_DEFINABLE_BLOCK))
            .filter_map(|slot| slot.as_ref())
            .filter(|def| !def.is_undefined())
    }
}

/// Up to 256 block changes sent as one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkBlockUpdate {
    indices: Vec<u32>,
    blocks: Vec<u8>,
}

impl BulkBlockUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a change at a flat block index. Returns `false` when full.
    pub fn push(&mut self, index: u32, block: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.indices.push(index);
        self.blocks.push(block);
        true
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.indices.len() == BULK_CAPACITY
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn blocks(&self) -> &[u8] {
        &self.blocks
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.blocks.clear();
    }
}
