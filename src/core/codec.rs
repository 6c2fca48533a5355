//! Fixed-width field codec for the classic wire format.
//!
//! Every field has a fixed size on the wire:
//!
//! ```text
//! string    64 bytes, content then 0x20 padding
//! position  3 x i16 BE (legacy) or 3 x i32 BE (extended positions), value * 32
//! angles    yaw byte + pitch byte, 256 units = 360 degrees
//! block pos 3 x u16 BE
//! ```
//!
//! Strings are carried byte-for-char (Latin-1) so that code page 437 text
//! survives a decode/encode cycle untouched.

use bytes::{Buf, BufMut, BytesMut};

use crate::core::packet::{Delivery, Frame};
use crate::error::{ProtocolError, Result};

/// Width of every string field on the wire.
pub const STRING_LEN: usize = 64;

/// Fixed-point scale for entity coordinates.
pub const FIXED_POINT_SCALE: f32 = 32.0;

const PAD: u8 = b' ';

/// Entity position in block units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Angles {
    pub yaw: f32,
    pub pitch: f32,
}

impl Angles {
    pub const fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }
}

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockPos {
    pub x: u16,
    pub y: u16,
    pub z: u16,
}

impl BlockPos {
    pub const fn new(x: u16, y: u16, z: u16) -> Self {
        Self { x, y, z }
    }
}

/// Environment color. A component of -1 asks the client for its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color3 {
    pub r: i16,
    pub g: i16,
    pub b: i16,
}

impl Color3 {
    pub const DEFAULT: Color3 = Color3 { r: -1, g: -1, b: -1 };

    pub const fn new(r: i16, g: i16, b: i16) -> Self {
        Self { r, g, b }
    }
}

impl Default for Color3 {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color4 {
    pub r: i16,
    pub g: i16,
    pub b: i16,
    pub a: i16,
}

impl Color4 {
    pub const fn new(r: i16, g: i16, b: i16, a: i16) -> Self {
        Self { r, g, b, a }
    }
}

/// Convert a coordinate to its 32-bit network value.
#[inline]
pub fn to_fixed(value: f32) -> i32 {
    (value * FIXED_POINT_SCALE).round() as i32
}

/// Convert a coordinate to its legacy 16-bit network value. Saturates.
#[inline]
pub fn to_fixed_short(value: f32) -> i16 {
    (value * FIXED_POINT_SCALE).round() as i16
}

#[inline]
pub fn from_fixed(value: i32) -> f32 {
    value as f32 / FIXED_POINT_SCALE
}

/// `round(degrees / 360 * 256) mod 256`
#[inline]
pub fn angle_to_byte(degrees: f32) -> u8 {
    ((degrees / 360.0 * 256.0).round() as i64).rem_euclid(256) as u8
}

#[inline]
pub fn byte_to_angle(value: u8) -> f32 {
    f32::from(value) / 256.0 * 360.0
}

fn latin1_byte(ch: char) -> u8 {
    u8::try_from(u32::from(ch)).unwrap_or(b'?')
}

fn trimmed_len(field: &[u8]) -> usize {
    field.iter().rposition(|&b| b != PAD).map_or(0, |i| i + 1)
}

/// Encode `text` into a padded 64-byte field. Longer text is truncated.
pub fn encode_string(text: &str, out: &mut [u8; STRING_LEN]) {
    out.fill(PAD);
    for (slot, ch) in out.iter_mut().zip(text.chars()) {
        *slot = latin1_byte(ch);
    }
}

/// Allocating decode. An all-space field is absent.
pub fn decode_string(field: &[u8]) -> Option<String> {
    let end = trimmed_len(field);
    if end == 0 {
        return None;
    }
    Some(field[..end].iter().copied().map(char::from).collect())
}

/// In-place decode into `dst`. An all-space field leaves `dst` empty.
/// Returns the decoded length.
pub fn decode_string_into(field: &[u8], dst: &mut String) -> usize {
    dst.clear();
    let end = trimmed_len(field);
    dst.extend(field[..end].iter().copied().map(char::from));
    end
}

/// Cursor over a received frame payload.
///
/// Reads never panic; running past the end yields [`ProtocolError::Truncated`].
#[derive(Debug)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
}

impl<'a> FrameReader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { buf: payload }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    /// Raw 64-byte string field.
    pub fn read_field(&mut self) -> Result<&'a [u8]> {
        self.ensure(STRING_LEN)?;
        let (field, rest) = self.buf.split_at(STRING_LEN);
        self.buf = rest;
        Ok(field)
    }

    pub fn read_string(&mut self) -> Result<Option<String>> {
        Ok(decode_string(self.read_field()?))
    }

    pub fn read_string_into(&mut self, dst: &mut String) -> Result<usize> {
        Ok(decode_string_into(self.read_field()?, dst))
    }

    pub fn read_position(&mut self, wide: bool) -> Result<Vec3> {
        if wide {
            Ok(Vec3::new(
                from_fixed(self.read_i32()?),
                from_fixed(self.read_i32()?),
                from_fixed(self.read_i32()?),
            ))
        } else {
            Ok(Vec3::new(
                from_fixed(i32::from(self.read_i16()?)),
                from_fixed(i32::from(self.read_i16()?)),
                from_fixed(i32::from(self.read_i16()?)),
            ))
        }
    }

    pub fn read_angles(&mut self) -> Result<Angles> {
        let yaw = byte_to_angle(self.read_u8()?);
        let pitch = byte_to_angle(self.read_u8()?);
        Ok(Angles::new(yaw, pitch))
    }

    pub fn read_block_pos(&mut self) -> Result<BlockPos> {
        Ok(BlockPos::new(
            self.read_u16()?,
            self.read_u16()?,
            self.read_u16()?,
        ))
    }
}

/// Builder for one outbound frame: id byte followed by fixed fields.
#[derive(Debug)]
pub struct FrameWriter {
    buf: BytesMut,
    delivery: Delivery,
}

impl FrameWriter {
    pub fn new(id: u8, size: usize, delivery: Delivery) -> Self {
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8(id);
        Self { buf, delivery }
    }

    /// Frame that may be written in any session state.
    pub fn anytime(id: u8, size: usize) -> Self {
        Self::new(id, size, Delivery::Anytime)
    }

    /// Frame that is held back until the session is in game.
    pub fn ingame(id: u8, size: usize) -> Self {
        Self::new(id, size, Delivery::Ingame)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_i8(&mut self, value: i8) -> &mut Self {
        self.buf.put_i8(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    pub fn put_i16(&mut self, value: i16) -> &mut Self {
        self.buf.put_i16(value);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    pub fn put_string(&mut self, text: &str) -> &mut Self {
        let mut field = [PAD; STRING_LEN];
        encode_string(text, &mut field);
        self.buf.put_slice(&field);
        self
    }

    pub fn put_position(&mut self, pos: Vec3, wide: bool) -> &mut Self {
        if wide {
            self.buf.put_i32(to_fixed(pos.x));
            self.buf.put_i32(to_fixed(pos.y));
            self.buf.put_i32(to_fixed(pos.z));
        } else {
            self.buf.put_i16(to_fixed_short(pos.x));
            self.buf.put_i16(to_fixed_short(pos.y));
            self.buf.put_i16(to_fixed_short(pos.z));
        }
        self
    }

    pub fn put_angles(&mut self, angles: Angles) -> &mut Self {
        self.buf.put_u8(angle_to_byte(angles.yaw));
        self.buf.put_u8(angle_to_byte(angles.pitch));
        self
    }

    pub fn put_block_pos(&mut self, pos: BlockPos) -> &mut Self {
        self.buf.put_u16(pos.x);
        self.buf.put_u16(pos.y);
        self.buf.put_u16(pos.z);
        self
    }

    pub fn put_color3(&mut self, color: Color3) -> &mut Self {
        self.buf.put_i16(color.r);
        self.buf.put_i16(color.g);
        self.buf.put_i16(color.b);
        self
    }

    pub fn put_color4(&mut self, color: Color4) -> &mut Self {
        self.buf.put_i16(color.r);
        self.buf.put_i16(color.g);
        self.buf.put_i16(color.b);
        self.buf.put_i16(color.a);
        self
    }

    /// Text colors travel as four single bytes.
    pub fn put_byte_color4(&mut self, color: Color4) -> &mut Self {
        self.buf.put_u8(color.r as u8);
        self.buf.put_u8(color.g as u8);
        self.buf.put_u8(color.b as u8);
        self.buf.put_u8(color.a as u8);
        self
    }

    /// Zero-fill up to `len` total bytes (id included).
    pub fn pad_to(&mut self, len: usize) -> &mut Self {
        if self.buf.len() < len {
            self.buf.put_bytes(0, len - self.buf.len());
        }
        self
    }

    pub fn finish(self) -> Frame {
        Frame::new(self.buf.freeze(), self.delivery)
    }
}
