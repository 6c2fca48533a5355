//! Per-session player and extension state.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bitflags::bitflags;

use crate::core::codec::{Angles, Vec3};
use crate::groups::NO_GROUP;
use crate::protocol::chat::MessageAssembler;
use crate::protocol::extensions::NegotiatedExtensions;
use crate::world::World;

/// Model id of the default humanoid model.
pub const DEFAULT_MODEL: i16 = 256;

/// Default reach: 5 blocks in 1/32 units.
pub const DEFAULT_CLICK_DISTANCE: u16 = 160;

/// Named models; the id of `MODEL_NAMES[i]` is `256 + i`. Ids below 256
/// render as the block with that id.
pub const MODEL_NAMES: &[&str] = &[
    "humanoid",
    "chicken",
    "creeper",
    "pig",
    "sheep",
    "skeleton",
    "sheep_nofur",
    "spider",
    "zombie",
    "head",
    "sit",
    "chibi",
];

/// Wire name of a model id.
pub fn model_name(model: i16) -> String {
    match u16::try_from(model) {
        Ok(id) if id < 256 => id.to_string(),
        Ok(id) => MODEL_NAMES
            .get(usize::from(id - 256))
            .unwrap_or(&MODEL_NAMES[0])
            .to_string(),
        Err(_) => MODEL_NAMES[0].to_string(),
    }
}

/// Parse a model name or block number. Unknown names map to the humanoid.
pub fn parse_model(name: &str) -> Option<i16> {
    if let Some(index) = MODEL_NAMES
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
    {
        return i16::try_from(index).ok().map(|i| DEFAULT_MODEL + i);
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return name.parse::<u8>().ok().map(i16::from);
    }
    Some(DEFAULT_MODEL)
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Connected, no identification yet.
    #[default]
    Initial,
    /// Waiting for the client's extension list.
    AwaitingExt,
    /// Streaming a world.
    WorldTransfer,
    Ingame,
    Closed,
}

/// Set once identification succeeds.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub name: String,
    pub key: String,
    pub display_name: String,
    pub world: Weak<World>,
    pub position: Vec3,
    pub angles: Angles,
    pub operator: bool,
    pub spawned: bool,
    pub first_spawn: bool,
    /// World to stream on the next tick.
    pub pending_world: Option<Arc<World>>,
}

impl PlayerState {
    pub fn new(name: String, key: String) -> Self {
        Self {
            display_name: name.clone(),
            name,
            key,
            world: Weak::new(),
            position: Vec3::default(),
            angles: Angles::default(),
            operator: false,
            spawned: false,
            first_spawn: true,
            pending_world: None,
        }
    }
}

bitflags! {
    /// Appearance changes waiting to be sent to other sessions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UpdateFlags: u8 {
        const GROUP = 1 << 0;
        const MODEL = 1 << 1;
        const SKIN = 1 << 2;
        const ENTITY_PROPERTY = 1 << 3;
    }
}

/// Movement restrictions sent with HackControl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hacks {
    pub flying: bool,
    pub noclip: bool,
    pub speeding: bool,
    pub spawn_control: bool,
    pub third_person: bool,
    /// -1 keeps the client default.
    pub jump_height: i16,
}

impl Default for Hacks {
    fn default() -> Self {
        Self {
            flying: true,
            noclip: true,
            speeding: true,
            spawn_control: true,
            third_person: true,
            jump_height: -1,
        }
    }
}

/// Round-trip measurements from TwoWayPing.
#[derive(Debug, Clone, Default)]
pub struct PingStats {
    pub started: Option<Instant>,
    pub data: u16,
    pub time_ms: u32,
    pub average_ms: f32,
    samples: u32,
}

impl PingStats {
    /// Record a completed round trip; ping is half of it.
    pub fn record(&mut self, round_trip: Duration) {
        self.time_ms = u32::try_from(round_trip.as_millis() / 2).unwrap_or(u32::MAX);
        let n = self.samples as f32;
        self.average_ms = (n * self.average_ms + self.time_ms as f32) / (n + 1.0);
        self.samples += 1;
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }
}

/// Extension state, present only for clients that sent the marker byte.
#[derive(Debug, Clone)]
pub struct CpeState {
    pub app_name: String,
    pub extensions: NegotiatedExtensions,
    /// Entries still expected from the client.
    pub expected_entries: u16,
    pub held_block: u8,
    pub model: i16,
    pub skin: String,
    pub click_distance: u16,
    pub group: i16,
    pub rotation: [i32; 3],
    pub assembler: MessageAssembler,
    pub ping: PingStats,
    pub updates: UpdateFlags,
    pub custom_block_level: u8,
    /// Last hacks sent, replayed after a world change.
    pub hacks: Option<Hacks>,
    pub hide_display_name: bool,
}

impl Default for CpeState {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            extensions: NegotiatedExtensions::new(),
            expected_entries: 0,
            held_block: 0,
            model: DEFAULT_MODEL,
            skin: String::new(),
            click_distance: DEFAULT_CLICK_DISTANCE,
            group: NO_GROUP,
            rotation: [0; 3],
            assembler: MessageAssembler::new(),
            ping: PingStats::default(),
            updates: UpdateFlags::empty(),
            custom_block_level: 0,
            hacks: None,
            hide_display_name: false,
        }
    }
}

/// Whether the client speaks protocol extensions.
#[derive(Debug, Clone, Default)]
pub enum Capability {
    #[default]
    Bare,
    ExtensionEnabled(Box<CpeState>),
}

/// Mutable per-session data guarded by the session's data lock.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub player: Option<PlayerState>,
    pub capability: Capability,
}

impl SessionData {
    pub fn cpe(&self) -> Option<&CpeState> {
        match &self.capability {
            Capability::ExtensionEnabled(cpe) => Some(cpe),
            Capability::Bare => None,
        }
    }

    pub fn cpe_mut(&mut self) -> Option<&mut CpeState> {
        match &mut self.capability {
            Capability::ExtensionEnabled(cpe) => Some(cpe),
            Capability::Bare => None,
        }
    }

    /// Negotiated version of an extension, 0 for bare clients.
    pub fn ext_version(&self, hash: u32) -> u32 {
        self.cpe().map_or(0, |cpe| cpe.extensions.version_of(hash))
    }
}

/// What other sessions need to render this player.
#[derive(Debug, Clone)]
pub struct EntityView {
    pub id: u8,
    pub name: String,
    pub display_name: String,
    pub skin: String,
    pub hide_name: bool,
    pub position: Vec3,
    pub angles: Angles,
    pub model: i16,
    pub group: i16,
    pub rotation: [i32; 3],
    pub world: Weak<World>,
}

impl EntityView {
    pub fn in_world(&self, world: &Weak<World>) -> bool {
        self.world.upgrade().is_some() && self.world.ptr_eq(world)
    }
}
