//! # Worlds
//!
//! A [`World`] is a named block volume plus the environment settings that
//! extension-capable clients receive. Block storage sits behind the
//! [`BlockStore`] trait and is produced lazily by a [`WorldLoader`] the first
//! time a session needs the world.
//!
//! Sessions hold worlds through `Weak` references; the server's world list
//! owns them.

pub mod blocks;
pub mod particles;

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bitflags::bitflags;
use tracing::{debug, info};

use crate::core::codec::{Angles, BlockPos, Color3, Vec3};
use crate::error::{ProtocolError, Result};
use blocks::{BLOCK_AIR, BLOCK_BEDROCK, BLOCK_DIRT, BLOCK_GRASS, BLOCK_STILL_LAVA, BLOCK_WATER};

/// Environment colors a world carries.
pub const ENV_COLOR_COUNT: usize = 5;

/// Map properties a world carries.
pub const ENV_PROP_COUNT: usize = 10;

/// Map property indices.
pub mod props {
    pub const SIDE_BLOCK: u8 = 0;
    pub const EDGE_BLOCK: u8 = 1;
    pub const EDGE_LEVEL: u8 = 2;
    pub const CLOUDS_LEVEL: u8 = 3;
    pub const MAX_VIEW_DISTANCE: u8 = 4;
    pub const CLOUDS_SPEED: u8 = 5;
    pub const WEATHER_SPEED: u8 = 6;
    pub const WEATHER_FADE: u8 = 7;
    pub const EXP_FOG: u8 = 8;
    pub const SIDE_OFFSET: u8 = 9;
}

/// Block volume size in blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u16,
    pub height: u16,
    pub length: u16,
}

impl Dimensions {
    pub const fn new(width: u16, height: u16, length: u16) -> Self {
        Self {
            width,
            height,
            length,
        }
    }

    pub fn volume(&self) -> usize {
        usize::from(self.width) * usize::from(self.height) * usize::from(self.length)
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.x < self.width && pos.y < self.height && pos.z < self.length
    }

    /// Flat array index: `(y * length + z) * width + x`.
    pub fn index(&self, pos: BlockPos) -> Option<usize> {
        if !self.contains(pos) {
            return None;
        }
        let (w, l) = (usize::from(self.width), usize::from(self.length));
        Some((usize::from(pos.y) * l + usize::from(pos.z)) * w + usize::from(pos.x))
    }

    /// World center at ground level of a flat world, in entity units.
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            f32::from(self.width) / 2.0,
            f32::from(self.height) / 2.0,
            f32::from(self.length) / 2.0,
        )
    }
}

/// Serialized snapshot layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// 4-byte big-endian volume followed by the block array.
    Legacy,
    /// The block array alone.
    Raw,
}

/// Block storage collaborator.
pub trait BlockStore: Send + Sync {
    fn dimensions(&self) -> Dimensions;
    fn get(&self, pos: BlockPos) -> Option<u8>;
    /// Returns `false` when `pos` is outside the volume.
    fn set(&mut self, pos: BlockPos, block: u8) -> bool;
    fn blocks(&self) -> &[u8];
}

/// Produces block storage for a world on first use.
pub trait WorldLoader: Send + Sync {
    fn load(&self, name: &str, dims: Dimensions) -> Result<Box<dyn BlockStore>>;
}

/// Plain in-memory block array.
#[derive(Debug, Clone)]
pub struct MemoryBlocks {
    dims: Dimensions,
    blocks: Vec<u8>,
}

impl MemoryBlocks {
    pub fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            blocks: vec![BLOCK_AIR; dims.volume()],
        }
    }
}

impl BlockStore for MemoryBlocks {
    fn dimensions(&self) -> Dimensions {
        self.dims
    }

    fn get(&self, pos: BlockPos) -> Option<u8> {
        self.dims.index(pos).map(|i| self.blocks[i])
    }

    fn set(&mut self, pos: BlockPos, block: u8) -> bool {
        match self.dims.index(pos) {
            Some(i) => {
                self.blocks[i] = block;
                true
            }
            None => false,
        }
    }

    fn blocks(&self) -> &[u8] {
        &self.blocks
    }
}

/// Generates flat terrain: bedrock floor, dirt, one grass layer at half height.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatGenerator;

impl WorldLoader for FlatGenerator {
    fn load(&self, name: &str, dims: Dimensions) -> Result<Box<dyn BlockStore>> {
        if dims.volume() == 0 {
            return Err(ProtocolError::WorldError(format!(
                "world {name} has an empty volume"
            )));
        }
        let mut store = MemoryBlocks::new(dims);
        let grass = dims.height / 2;
        for y in 0..=grass.min(dims.height - 1) {
            let block = match y {
                0 => BLOCK_BEDROCK,
                y if y == grass => BLOCK_GRASS,
                _ => BLOCK_DIRT,
            };
            for z in 0..dims.length {
                for x in 0..dims.width {
                    store.set(BlockPos::new(x, y, z), block);
                }
            }
        }
        debug!(world = name, ?dims, "Generated flat terrain");
        Ok(Box::new(store))
    }
}

bitflags! {
    /// Environment fields changed since the last flush.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EnvFlags: u8 {
        const COLORS = 1 << 0;
        const TEXTURE_PACK = 1 << 1;
        const PROPS = 1 << 2;
        const WEATHER = 1 << 3;
    }
}

/// Environment sent to extension-capable clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub colors: [Color3; ENV_COLOR_COUNT],
    pub props: [i32; ENV_PROP_COUNT],
    pub texture_pack: String,
    pub weather: u8,
    pub modified: EnvFlags,
    /// Bit `n` set when color `n` changed.
    pub modified_colors: u8,
    /// Bit `n` set when property `n` changed.
    pub modified_props: u16,
}

impl Environment {
    fn new(dims: Dimensions) -> Self {
        let half = i32::from(dims.height) / 2;
        Self {
            colors: [Color3::DEFAULT; ENV_COLOR_COUNT],
            props: [
                i32::from(BLOCK_BEDROCK),
                i32::from(BLOCK_WATER),
                half,
                i32::from(dims.height) + 2,
                0,
                256,
                256,
                128,
                0,
                -2,
            ],
            texture_pack: String::new(),
            weather: 0,
            modified: EnvFlags::empty(),
            modified_colors: 0,
            modified_props: 0,
        }
    }

    pub fn prop(&self, index: u8) -> i32 {
        self.props.get(usize::from(index)).copied().unwrap_or(0)
    }

    fn clear_modified(&mut self) {
        self.modified = EnvFlags::empty();
        self.modified_colors = 0;
        self.modified_props = 0;
    }
}

/// Where sessions appear after a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpawnPoint {
    pub position: Vec3,
    pub angles: Angles,
}

/// A named, lazily loaded block volume.
pub struct World {
    name: String,
    dims: Dimensions,
    spawn: RwLock<SpawnPoint>,
    environment: RwLock<Environment>,
    blocks: RwLock<Option<Box<dyn BlockStore>>>,
    loader: Arc<dyn WorldLoader>,
    load_guard: Mutex<()>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("name", &self.name)
            .field("dims", &self.dims)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl World {
    pub fn new(name: impl Into<String>, dims: Dimensions, loader: Arc<dyn WorldLoader>) -> Self {
        let mut center = dims.center();
        center.y += 1.0;
        Self {
            name: name.into(),
            dims,
            spawn: RwLock::new(SpawnPoint {
                position: center,
                angles: Angles::default(),
            }),
            environment: RwLock::new(Environment::new(dims)),
            blocks: RwLock::new(None),
            loader,
            load_guard: Mutex::new(()),
        }
    }

    /// Flat world generated on first use.
    pub fn flat(name: impl Into<String>, dims: Dimensions) -> Self {
        Self::new(name, dims, Arc::new(FlatGenerator))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn is_loaded(&self) -> bool {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Load block storage if this is the first access. Concurrent callers
    /// wait on the load guard; only one runs the loader.
    pub fn ensure_loaded(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let _guard = self.load_guard.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_loaded() {
            return Ok(());
        }

        let store = self.loader.load(&self.name, self.dims)?;
        if store.dimensions() != self.dims {
            return Err(ProtocolError::WorldError(format!(
                "loader returned {:?} for world {} sized {:?}",
                store.dimensions(),
                self.name,
                self.dims
            )));
        }
        *self.blocks.write().unwrap_or_else(PoisonError::into_inner) = Some(store);
        info!(world = %self.name, "World loaded");
        Ok(())
    }

    pub fn get_block(&self, pos: BlockPos) -> Option<u8> {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|store| store.get(pos))
    }

    /// Returns `false` when unloaded or out of bounds.
    pub fn set_block(&self, pos: BlockPos, block: u8) -> bool {
        self.blocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .is_some_and(|store| store.set(pos, block))
    }

    /// Serialized block data for a transfer.
    pub fn snapshot(&self, kind: SnapshotKind) -> Result<Vec<u8>> {
        self.ensure_loaded()?;
        let guard = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        let store = guard
            .as_ref()
            .ok_or_else(|| ProtocolError::WorldError(format!("world {} is not loaded", self.name)))?;
        let blocks = store.blocks();

        Ok(match kind {
            SnapshotKind::Raw => blocks.to_vec(),
            SnapshotKind::Legacy => {
                let volume = u32::try_from(blocks.len()).map_err(|_| {
                    ProtocolError::WorldError(format!("world {} is too large", self.name))
                })?;
                let mut data = Vec::with_capacity(blocks.len() + 4);
                data.extend_from_slice(&volume.to_be_bytes());
                data.extend_from_slice(blocks);
                data
            }
        })
    }

    pub fn spawn(&self) -> SpawnPoint {
        *self.spawn.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_spawn(&self, spawn: SpawnPoint) {
        *self.spawn.write().unwrap_or_else(PoisonError::into_inner) = spawn;
    }

    pub fn environment(&self) -> Environment {
        self.environment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_env_color(&self, kind: u8, color: Color3) -> bool {
        let mut env = self.environment.write().unwrap_or_else(PoisonError::into_inner);
        match env.colors.get_mut(usize::from(kind)) {
            Some(slot) => {
                *slot = color;
                env.modified |= EnvFlags::COLORS;
                env.modified_colors |= 1 << kind;
                true
            }
            None => false,
        }
    }

    pub fn set_env_prop(&self, prop: u8, value: i32) -> bool {
        let mut env = self.environment.write().unwrap_or_else(PoisonError::into_inner);
        match env.props.get_mut(usize::from(prop)) {
            Some(slot) => {
                *slot = value;
                env.modified |= EnvFlags::PROPS;
                env.modified_props |= 1 << prop;
                true
            }
            None => false,
        }
    }

    pub fn set_texture_pack(&self, url: impl Into<String>) {
        let mut env = self.environment.write().unwrap_or_else(PoisonError::into_inner);
        env.texture_pack = url.into();
        env.modified |= EnvFlags::TEXTURE_PACK;
    }

    pub fn set_weather(&self, weather: u8) {
        let mut env = self.environment.write().unwrap_or_else(PoisonError::into_inner);
        env.weather = weather;
        env.modified |= EnvFlags::WEATHER;
    }

    /// Current environment with its change masks; the masks are reset.
    pub fn take_env_changes(&self) -> Environment {
        let mut env = self.environment.write().unwrap_or_else(PoisonError::into_inner);
        let changes = env.clone();
        env.clear_modified();
        changes
    }

    /// Block two below the given entity position.
    pub fn stand_block(&self, position: Vec3) -> u8 {
        block_pos_of(position)
            .and_then(|mut pos| {
                pos.y = pos.y.checked_sub(2)?;
                self.get_block(pos)
            })
            .unwrap_or(BLOCK_AIR)
    }

    /// Fluid the entity is standing in and how deep: 2 at eye level, 1 at
    /// the feet.
    pub fn fluid_level(&self, position: Vec3) -> Option<(u8, u8)> {
        let mut pos = block_pos_of(position)?;
        for level in (1..=2u8).rev() {
            if let Some(block) = self.get_block(pos) {
                if (BLOCK_WATER..=BLOCK_STILL_LAVA).contains(&block) {
                    return Some((level, block));
                }
            }
            pos.y = pos.y.checked_sub(1)?;
        }
        None
    }
}

fn block_pos_of(position: Vec3) -> Option<BlockPos> {
    if position.x < 0.0 || position.y < 0.0 || position.z < 0.0 {
        return None;
    }
    Some(BlockPos::new(
        position.x as u16,
        position.y as u16,
        position.z as u16,
    ))
}
