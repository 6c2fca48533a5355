//! Protocol extensions: names, hashes and negotiated sets.
//!
//! An extension is keyed by the CRC-32 of its name. Feature checks elsewhere
//! compare the negotiated version for a hash against an exact value; a
//! session that negotiated version 2 does not get version 1 behavior.

use std::borrow::Cow;

pub const CLICK_DISTANCE: u32 = 0x6DD2_B567;
pub const CUSTOM_BLOCKS: u32 = 0x9845_5F43;
pub const HELD_BLOCK: u32 = 0x40C3_3F88;
pub const EMOTE_FIX: u32 = 0x89C0_1AE6;
pub const TEXT_HOT_KEY: u32 = 0x73BB_9FBF;
pub const EXT_PLAYER_LIST: u32 = 0xBB0C_D618;
pub const ENV_COLORS: u32 = 0x4C05_6274;
pub const SELECTION_CUBOID: u32 = 0xE45D_A299;
pub const BLOCK_PERMISSIONS: u32 = 0xB2E8_C3D6;
pub const CHANGE_MODEL: u32 = 0xAE3A_EBAA;
pub const ENV_MAP_APPEARANCE: u32 = 0xB46C_AFAB;
pub const ENV_WEATHER_TYPE: u32 = 0x4050_1770;
pub const HACK_CONTROL: u32 = 0x6E4C_ED2D;
pub const MESSAGE_TYPES: u32 = 0x7470_960E;
pub const PLAYER_CLICK: u32 = 0x0294_42DB;
pub const LONGER_MESSAGES: u32 = 0x8535_AB13;
pub const FULL_CP437: u32 = 0x27FB_B82F;
pub const BLOCK_DEFINITIONS: u32 = 0x0C6B_AA7B;
pub const BLOCK_DEFINITIONS_EXT: u32 = 0xEFB2_BBEC;
pub const BULK_BLOCK_UPDATE: u32 = 0x2950_9B8F;
pub const TEXT_COLORS: u32 = 0x56C3_93B8;
pub const ENV_MAP_ASPECT: u32 = 0xB3F9_BDF0;
pub const ENTITY_PROPERTY: u32 = 0x5865_D50E;
pub const EXT_ENTITY_POSITIONS: u32 = 0x37D3_033F;
pub const TWO_WAY_PING: u32 = 0xBBC7_96E8;
pub const INVENTORY_ORDER: u32 = 0xEE0F_7B71;
pub const INSTANT_MOTD: u32 = 0x462B_FA8F;
pub const FAST_MAP: u32 = 0x7791_DB5F;
pub const SET_HOTBAR: u32 = 0xB870_3914;
pub const SET_SPAWNPOINT: u32 = 0x9149_FD59;
pub const VELOCITY_CONTROL: u32 = 0xF8DF_4FF7;
pub const CUSTOM_PARTICLES: u32 = 0x0D73_2743;
pub const PLUGIN_MESSAGES: u32 = 0x59FA_7285;

/// Server-advertised extensions, in advertisement order.
const STANDARD_EXTENSIONS: &[(&str, u32)] = &[
    ("ClickDistance", 1),
    ("CustomBlocks", 1),
    ("HeldBlock", 1),
    ("EmoteFix", 1),
    ("TextHotKey", 1),
    ("ExtPlayerList", 2),
    ("EnvColors", 1),
    ("SelectionCuboid", 1),
    ("BlockPermissions", 1),
    ("ChangeModel", 1),
    ("EnvMapAppearance", 1),
    ("EnvMapAppearance", 2),
    ("EnvWeatherType", 1),
    ("HackControl", 1),
    ("MessageTypes", 1),
    ("PlayerClick", 1),
    ("LongerMessages", 1),
    ("FullCP437", 1),
    ("BlockDefinitions", 1),
    ("BlockDefinitionsExt", 2),
    ("BulkBlockUpdate", 1),
    ("TextColors", 1),
    ("EnvMapAspect", 1),
    ("EntityProperty", 1),
    ("ExtEntityPositions", 1),
    ("TwoWayPing", 1),
    ("InventoryOrder", 1),
    ("FastMap", 1),
    ("SetHotbar", 1),
    ("SetSpawnpoint", 1),
    ("VelocityControl", 1),
    ("CustomParticles", 1),
    ("PluginMessages", 1),
];

/// Stable dispatch key for an extension name.
#[inline]
pub fn extension_hash(name: &str) -> u32 {
    crc32fast::hash(name.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: Cow<'static, str>,
    pub version: u32,
    pub hash: u32,
}

impl Extension {
    pub fn new(name: impl Into<Cow<'static, str>>, version: u32) -> Self {
        let name = name.into();
        let hash = extension_hash(&name);
        Self {
            name,
            version,
            hash,
        }
    }
}

/// The list a server advertises during negotiation.
/// A name may appear more than once with different versions.
#[derive(Debug, Clone, Default)]
pub struct ExtensionTable {
    entries: Vec<Extension>,
}

impl ExtensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every extension this crate implements.
    pub fn standard() -> Self {
        let mut table = Self::new();
        for &(name, version) in STANDARD_EXTENSIONS {
            table.register(name, version);
        }
        table
    }

    pub fn register(&mut self, name: impl Into<Cow<'static, str>>, version: u32) {
        self.entries.push(Extension::new(name, version));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Extensions a client declared during negotiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiatedExtensions {
    entries: Vec<Extension>,
}

impl NegotiatedExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry. A repeated name replaces the earlier version.
    pub fn insert(&mut self, ext: Extension) {
        match self.entries.iter_mut().find(|e| e.hash == ext.hash) {
            Some(existing) => *existing = ext,
            None => self.entries.push(ext),
        }
    }

    /// Negotiated version for `hash`, 0 when absent.
    pub fn version_of(&self, hash: u32) -> u32 {
        self.entries
            .iter()
            .find(|e| e.hash == hash)
            .map_or(0, |e| e.version)
    }

    pub fn supports(&self, hash: u32, version: u32) -> bool {
        self.version_of(hash) == version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_hashes_match_names() {
        let pairs = [
            ("ClickDistance", CLICK_DISTANCE),
            ("CustomBlocks", CUSTOM_BLOCKS),
            ("HeldBlock", HELD_BLOCK),
            ("EmoteFix", EMOTE_FIX),
            ("TextHotKey", TEXT_HOT_KEY),
            ("ExtPlayerList", EXT_PLAYER_LIST),
            ("EnvColors", ENV_COLORS),
            ("SelectionCuboid", SELECTION_CUBOID),
            ("BlockPermissions", BLOCK_PERMISSIONS),
            ("ChangeModel", CHANGE_MODEL),
            ("EnvMapAppearance", ENV_MAP_APPEARANCE),
            ("EnvWeatherType", ENV_WEATHER_TYPE),
            ("HackControl", HACK_CONTROL),
            ("MessageTypes", MESSAGE_TYPES),
            ("PlayerClick", PLAYER_CLICK),
            ("LongerMessages", LONGER_MESSAGES),
            ("FullCP437", FULL_CP437),
            ("BlockDefinitions", BLOCK_DEFINITIONS),
            ("BlockDefinitionsExt", BLOCK_DEFINITIONS_EXT),
            ("BulkBlockUpdate", BULK_BLOCK_UPDATE),
            ("TextColors", TEXT_COLORS),
            ("EnvMapAspect", ENV_MAP_ASPECT),
            ("EntityProperty", ENTITY_PROPERTY),
            ("ExtEntityPositions", EXT_ENTITY_POSITIONS),
            ("TwoWayPing", TWO_WAY_PING),
            ("InventoryOrder", INVENTORY_ORDER),
            ("InstantMOTD", INSTANT_MOTD),
            ("FastMap", FAST_MAP),
            ("SetHotbar", SET_HOTBAR),
            ("SetSpawnpoint", SET_SPAWNPOINT),
            ("VelocityControl", VELOCITY_CONTROL),
            ("CustomParticles", CUSTOM_PARTICLES),
            ("PluginMessages", PLUGIN_MESSAGES),
        ];
        for (name, hash) in pairs {
            assert_eq!(extension_hash(name), hash, "hash mismatch for {name}");
        }
    }

    #[test]
    fn standard_table_keeps_duplicate_names() {
        let table = ExtensionTable::standard();
        let appearance: Vec<u32> = table
            .iter()
            .filter(|e| e.hash == ENV_MAP_APPEARANCE)
            .map(|e| e.version)
            .collect();
        assert_eq!(appearance, vec![1, 2]);
        assert_eq!(table.len(), STANDARD_EXTENSIONS.len());
    }

    #[test]
    fn version_lookup_is_exact() {
        let mut negotiated = NegotiatedExtensions::new();
        negotiated.insert(Extension::new("ExtEntityPositions", 2));
        assert_eq!(negotiated.version_of(EXT_ENTITY_POSITIONS), 2);
        assert!(!negotiated.supports(EXT_ENTITY_POSITIONS, 1));
        assert_eq!(negotiated.version_of(FAST_MAP), 0);
    }

    #[test]
    fn repeated_entry_replaces_version() {
        let mut negotiated = NegotiatedExtensions::new();
        negotiated.insert(Extension::new("EnvMapAppearance", 1));
        negotiated.insert(Extension::new("EnvMapAppearance", 2));
        assert_eq!(negotiated.len(), 1);
        assert_eq!(negotiated.version_of(ENV_MAP_APPEARANCE), 2);
    }
}
