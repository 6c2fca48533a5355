//! Custom particle effects.

/// Texture rectangle within the particle atlas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureRect {
    pub u1: u8,
    pub v1: u8,
    pub u2: u8,
    pub v2: u8,
}

/// Behavior of a particle effect as registered with a client. Durations are
/// in seconds, distances in blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomParticle {
    pub id: u8,
    pub texture: TextureRect,
    /// Red, green and blue multipliers.
    pub tint: [u8; 3],
    pub frame_count: u8,
    pub particle_count: u8,
    pub size: f32,
    pub size_variation: f32,
    pub spread: f32,
    pub speed: f32,
    pub gravity: f32,
    pub base_lifetime: f32,
    pub lifetime_variation: f32,
    pub collide_flags: u8,
    pub full_bright: bool,
}

impl CustomParticle {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            texture: TextureRect::default(),
            tint: [255; 3],
            frame_count: 1,
            particle_count: 1,
            size: 1.0,
            size_variation: 0.0,
            spread: 0.0,
            speed: 0.0,
            gravity: 0.0,
            base_lifetime: 1.0,
            lifetime_variation: 0.0,
            collide_flags: 0,
            full_bright: false,
        }
    }
}
