//! Outbound frame builders.
//!
//! Each function returns a finished [`Frame`] tagged with its delivery class.
//! Builders know nothing about sessions; callers pass the receiver-dependent
//! bits (extended positions, CP437 support) explicitly.

use crate::core::codec::{Angles, BlockPos, Color3, Color4, FrameWriter, Vec3, STRING_LEN};
use crate::core::packet::{ids, Frame, CHUNK_FRAME_LEN, CHUNK_LEN, PROTOCOL_VERSION, SELF_ID};
use crate::protocol::chat::{sanitize_legacy, MessageKind};
use crate::protocol::extensions::Extension;
use crate::session::Hacks;
use crate::world::blocks::{BlockDef, BulkBlockUpdate, BULK_CAPACITY};
use crate::world::particles::CustomParticle;
use crate::world::Dimensions;

/// User type byte for operators.
pub const USER_TYPE_OP: u8 = 0x64;

const fn position_len(wide: bool) -> usize {
    if wide {
        12
    } else {
        6
    }
}

/// Entity id as seen by the receiver.
pub fn entity_id(receiver: u8, subject: u8) -> u8 {
    if receiver == subject {
        SELF_ID
    } else {
        subject
    }
}

pub fn server_identification(name: &str, motd: &str, operator: bool) -> Frame {
    let mut w = FrameWriter::anytime(ids::IDENTIFICATION, 131);
    w.put_u8(PROTOCOL_VERSION)
        .put_string(name)
        .put_string(motd)
        .put_u8(if operator { USER_TYPE_OP } else { 0 });
    w.finish()
}

pub fn level_init() -> Frame {
    FrameWriter::anytime(ids::LEVEL_INIT, 1).finish()
}

/// Level init carrying the uncompressed size, for fast-map clients.
pub fn fast_map_init(size: u32) -> Frame {
    let mut w = FrameWriter::anytime(ids::LEVEL_INIT, 5);
    w.put_u32(size);
    w.finish()
}

/// Level chunk: length, 1024 zero-padded bytes, percent.
pub fn level_chunk(chunk: &[u8], percent: u8) -> Frame {
    let len = chunk.len().min(CHUNK_LEN);
    let mut w = FrameWriter::anytime(ids::LEVEL_CHUNK, CHUNK_FRAME_LEN);
    w.put_u16(len as u16)
        .put_slice(&chunk[..len])
        .pad_to(CHUNK_FRAME_LEN - 1)
        .put_u8(percent);
    w.finish()
}

pub fn level_finalize(dims: Dimensions) -> Frame {
    let mut w = FrameWriter::anytime(ids::LEVEL_FINALIZE, 7);
    w.put_u16(dims.width).put_u16(dims.height).put_u16(dims.length);
    w.finish()
}

pub fn set_block(pos: BlockPos, block: u8) -> Frame {
    let mut w = FrameWriter::ingame(ids::SET_BLOCK, 8);
    w.put_block_pos(pos).put_u8(block);
    w.finish()
}

pub fn spawn_player(id: u8, name: &str, pos: Vec3, angles: Angles, wide: bool) -> Frame {
    let mut w = FrameWriter::ingame(ids::SPAWN_PLAYER, 2 + STRING_LEN + position_len(wide) + 2);
    w.put_u8(id)
        .put_string(name)
        .put_position(pos, wide)
        .put_angles(angles);
    w.finish()
}

pub fn position_orientation(id: u8, pos: Vec3, angles: Angles, wide: bool) -> Frame {
    let mut w = FrameWriter::ingame(ids::POSITION_ORIENTATION, 2 + position_len(wide) + 2);
    w.put_u8(id).put_position(pos, wide).put_angles(angles);
    w.finish()
}

/// Move the receiver itself.
pub fn teleport(pos: Vec3, angles: Angles, wide: bool) -> Frame {
    position_orientation(SELF_ID, pos, angles, wide)
}

pub fn despawn_player(id: u8) -> Frame {
    let mut w = FrameWriter::ingame(ids::DESPAWN_PLAYER, 2);
    w.put_u8(id);
    w.finish()
}

/// Chat line. Without CP437 support, non-printable characters become `?`.
pub fn chat(kind: MessageKind, text: &str, full_cp437: bool) -> Frame {
    let mut w = FrameWriter::anytime(ids::MESSAGE, 66);
    w.put_u8(kind.code());
    if full_cp437 {
        w.put_string(text);
    } else {
        w.put_string(&sanitize_legacy(text));
    }
    w.finish()
}

pub fn kick(reason: &str) -> Frame {
    let mut w = FrameWriter::anytime(ids::KICK, 65);
    w.put_string(reason);
    w.finish()
}

pub fn user_type(operator: bool) -> Frame {
    let mut w = FrameWriter::ingame(ids::USER_TYPE, 2);
    w.put_u8(if operator { USER_TYPE_OP } else { 0 });
    w.finish()
}

pub fn ext_info(app_name: &str, count: u16) -> Frame {
    let mut w = FrameWriter::anytime(ids::EXT_INFO, 67);
    w.put_string(app_name).put_u16(count);
    w.finish()
}

pub fn ext_entry(ext: &Extension) -> Frame {
    let mut w = FrameWriter::anytime(ids::EXT_ENTRY, 69);
    w.put_string(&ext.name).put_u32(ext.version);
    w.finish()
}

pub fn click_distance(distance: u16) -> Frame {
    let mut w = FrameWriter::ingame(ids::CLICK_DISTANCE, 3);
    w.put_u16(distance);
    w.finish()
}

pub fn custom_block_level(level: u8) -> Frame {
    let mut w = FrameWriter::anytime(ids::CUSTOM_BLOCK_LEVEL, 2);
    w.put_u8(level);
    w.finish()
}

pub fn hold_this(block: u8, prevent_change: bool) -> Frame {
    let mut w = FrameWriter::ingame(ids::HOLD_THIS, 3);
    w.put_u8(block).put_bool(prevent_change);
    w.finish()
}

pub fn set_hotkey(label: &str, action: &str, keycode: i32, modifiers: i8) -> Frame {
    let mut w = FrameWriter::ingame(ids::SET_HOTKEY, 134);
    w.put_string(label)
        .put_string(action)
        .put_i32(keycode)
        .put_i8(modifiers);
    w.finish()
}

/// Player list entry. The name id is a 16-bit field whose high byte is zero.
pub fn add_player_name(id: u8, name: &str, list_name: &str, group: &str, rank: u8) -> Frame {
    let mut w = FrameWriter::ingame(ids::EXT_ADD_PLAYER_NAME, 196);
    w.put_u8(0)
        .put_u8(id)
        .put_string(name)
        .put_string(list_name)
        .put_string(group)
        .put_u8(rank);
    w.finish()
}

pub fn remove_player_name(id: u8) -> Frame {
    let mut w = FrameWriter::ingame(ids::EXT_REMOVE_PLAYER_NAME, 3);
    w.put_u8(0).put_u8(id);
    w.finish()
}

pub fn env_color(kind: u8, color: Color3) -> Frame {
    let mut w = FrameWriter::ingame(ids::ENV_COLOR, 8);
    w.put_u8(kind).put_color3(color);
    w.finish()
}

pub fn make_selection(id: u8, label: &str, start: BlockPos, end: BlockPos, color: Color4) -> Frame {
    let mut w = FrameWriter::ingame(ids::MAKE_SELECTION, 86);
    w.put_u8(id)
        .put_string(label)
        .put_block_pos(start)
        .put_block_pos(end)
        .put_color4(color);
    w.finish()
}

pub fn remove_selection(id: u8) -> Frame {
    let mut w = FrameWriter::ingame(ids::REMOVE_SELECTION, 2);
    w.put_u8(id);
    w.finish()
}

pub fn block_permission(block: u8, allow_place: bool, allow_destroy: bool) -> Frame {
    let mut w = FrameWriter::ingame(ids::BLOCK_PERMISSION, 4);
    w.put_u8(block).put_bool(allow_place).put_bool(allow_destroy);
    w.finish()
}

pub fn change_model(id: u8, model: &str) -> Frame {
    let mut w = FrameWriter::ingame(ids::CHANGE_MODEL, 66);
    w.put_u8(id).put_string(model);
    w.finish()
}

pub fn map_appearance_v1(texture: &str, side: u8, edge: u8, side_level: i16) -> Frame {
    let mut w = FrameWriter::ingame(ids::MAP_APPEARANCE, 69);
    w.put_string(texture)
        .put_u8(side)
        .put_u8(edge)
        .put_i16(side_level);
    w.finish()
}

pub fn map_appearance_v2(
    texture: &str,
    side: u8,
    edge: u8,
    side_level: i16,
    cloud_level: i16,
    max_view: i16,
) -> Frame {
    let mut w = FrameWriter::ingame(ids::MAP_APPEARANCE, 73);
    w.put_string(texture)
        .put_u8(side)
        .put_u8(edge)
        .put_i16(side_level)
        .put_i16(cloud_level)
        .put_i16(max_view);
    w.finish()
}

pub fn weather(kind: u8) -> Frame {
    let mut w = FrameWriter::ingame(ids::WEATHER, 2);
    w.put_u8(kind);
    w.finish()
}

pub fn hack_control(hacks: &Hacks) -> Frame {
    let mut w = FrameWriter::anytime(ids::HACK_CONTROL, 8);
    w.put_bool(hacks.flying)
        .put_bool(hacks.noclip)
        .put_bool(hacks.speeding)
        .put_bool(hacks.spawn_control)
        .put_bool(hacks.third_person)
        .put_i16(hacks.jump_height);
    w.finish()
}

pub fn add_entity2(id: u8, name: &str, skin: &str, pos: Vec3, angles: Angles, wide: bool) -> Frame {
    let len = 2 + 2 * STRING_LEN + position_len(wide) + 2;
    let mut w = FrameWriter::ingame(ids::EXT_ADD_ENTITY2, len);
    w.put_u8(id)
        .put_string(name)
        .put_string(skin)
        .put_position(pos, wide)
        .put_angles(angles);
    w.finish()
}

pub fn define_block(def: &BlockDef) -> Frame {
    let mut w = FrameWriter::anytime(ids::DEFINE_BLOCK, 80);
    w.put_u8(def.id)
        .put_string(&def.name)
        .put_u8(def.solidity)
        .put_u8(def.move_speed)
        .put_u8(def.textures.top)
        .put_u8(def.textures.left)
        .put_u8(def.textures.bottom)
        .put_bool(def.transmits_light)
        .put_u8(def.walk_sound)
        .put_bool(def.full_bright)
        .put_u8(def.shape)
        .put_u8(def.draw_type)
        .put_u8(def.fog_density)
        .put_slice(&def.fog_color);
    w.finish()
}

pub fn undefine_block(id: u8) -> Frame {
    let mut w = FrameWriter::anytime(ids::UNDEFINE_BLOCK, 2);
    w.put_u8(id);
    w.finish()
}

pub fn define_block_ext(def: &BlockDef) -> Frame {
    let mut w = FrameWriter::anytime(ids::DEFINE_BLOCK_EXT, 88);
    w.put_u8(def.id)
        .put_string(&def.name)
        .put_u8(def.solidity)
        .put_u8(def.move_speed)
        .put_u8(def.textures.top)
        .put_u8(def.textures.left)
        .put_u8(def.textures.right)
        .put_u8(def.textures.front)
        .put_u8(def.textures.back)
        .put_u8(def.textures.bottom)
        .put_bool(def.transmits_light)
        .put_u8(def.walk_sound)
        .put_bool(def.full_bright)
        .put_slice(&def.min)
        .put_slice(&def.max)
        .put_u8(def.draw_type)
        .put_u8(def.fog_density)
        .put_slice(&def.fog_color);
    w.finish()
}

/// Count byte is the number of updates minus one; unused slots are zero.
pub fn bulk_block_update(update: &BulkBlockUpdate) -> Frame {
    let mut w = FrameWriter::ingame(ids::BULK_BLOCK_UPDATE, 1282);
    w.put_u8(update.len().saturating_sub(1) as u8);
    for slot in 0..BULK_CAPACITY {
        w.put_u32(update.indices().get(slot).copied().unwrap_or(0));
    }
    for slot in 0..BULK_CAPACITY {
        w.put_u8(update.blocks().get(slot).copied().unwrap_or(0));
    }
    w.finish()
}

pub fn add_text_color(color: Color4, code: char) -> Frame {
    let mut w = FrameWriter::ingame(ids::ADD_TEXT_COLOR, 6);
    w.put_byte_color4(color)
        .put_u8(u8::try_from(u32::from(code)).unwrap_or(b'?'));
    w.finish()
}

pub fn texture_pack(url: &str) -> Frame {
    let mut w = FrameWriter::ingame(ids::TEXTURE_PACK, 65);
    w.put_string(url);
    w.finish()
}

pub fn map_property(property: u8, value: i32) -> Frame {
    let mut w = FrameWriter::ingame(ids::MAP_PROPERTY, 6);
    w.put_u8(property).put_i32(value);
    w.finish()
}

pub fn entity_property(id: u8, property: u8, value: i32) -> Frame {
    let mut w = FrameWriter::ingame(ids::ENTITY_PROPERTY, 7);
    w.put_u8(id).put_u8(property).put_i32(value);
    w.finish()
}

pub fn two_way_ping(direction: u8, data: u16) -> Frame {
    let mut w = FrameWriter::anytime(ids::TWO_WAY_PING, 4);
    w.put_u8(direction).put_u16(data);
    w.finish()
}

pub fn inventory_order(block: u8, order: u8) -> Frame {
    let mut w = FrameWriter::ingame(ids::INVENTORY_ORDER, 3);
    w.put_u8(block).put_u8(order);
    w.finish()
}

pub fn set_hotbar(block: u8, slot: u8) -> Frame {
    let mut w = FrameWriter::ingame(ids::SET_HOTBAR, 3);
    w.put_u8(block).put_u8(slot);
    w.finish()
}

pub fn set_spawnpoint(pos: Vec3, angles: Angles, wide: bool) -> Frame {
    let mut w = FrameWriter::ingame(ids::SET_SPAWNPOINT, 1 + position_len(wide) + 2);
    w.put_position(pos, wide).put_angles(angles);
    w.finish()
}

/// Velocity and particle timing values travel as fixed point with four
/// decimal places.
const FINE_SCALE: f32 = 10_000.0;

fn fine(value: f32) -> i32 {
    (value * FINE_SCALE).round() as i32
}

/// Push the player. With `set` the velocity replaces the current one on all
/// three axes, otherwise it is added.
pub fn velocity_control(velocity: Vec3, set: bool) -> Frame {
    let mut w = FrameWriter::ingame(ids::VELOCITY_CONTROL, 16);
    w.put_i32(fine(velocity.x))
        .put_i32(fine(velocity.y))
        .put_i32(fine(velocity.z))
        .put_bool(set)
        .put_bool(set)
        .put_bool(set);
    w.finish()
}

pub fn define_effect(effect: &CustomParticle) -> Frame {
    let rect = effect.texture;
    let mut w = FrameWriter::ingame(ids::DEFINE_EFFECT, 36);
    w.put_u8(effect.id)
        .put_u8(rect.u1)
        .put_u8(rect.v1)
        .put_u8(rect.u2)
        .put_u8(rect.v2)
        .put_slice(&effect.tint)
        .put_u8(effect.frame_count)
        .put_u8(effect.particle_count)
        .put_u8((effect.size * 32.0).round().clamp(0.0, 255.0) as u8)
        .put_i32(fine(effect.size_variation))
        .put_u16((effect.spread * 32.0).round().clamp(0.0, f32::from(u16::MAX)) as u16)
        .put_i32(fine(effect.speed))
        .put_i32(fine(effect.gravity))
        .put_i32(fine(effect.base_lifetime))
        .put_i32(fine(effect.lifetime_variation))
        .put_u8(effect.collide_flags)
        .put_bool(effect.full_bright);
    w.finish()
}

/// Spawn effect `id` at `pos`; particles fly away from `origin`.
pub fn spawn_effect(id: u8, pos: Vec3, origin: Vec3) -> Frame {
    let mut w = FrameWriter::ingame(ids::SPAWN_EFFECT, 26);
    w.put_u8(id).put_position(pos, true).put_position(origin, true);
    w.finish()
}

pub fn plugin_message(channel: u8, text: &str) -> Frame {
    let mut w = FrameWriter::anytime(ids::PLUGIN_MESSAGE, 66);
    w.put_u8(channel).put_string(text);
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::Delivery;

    #[test]
    fn frame_sizes_match_wire_layout() {
        let pos = Vec3::new(1.0, 2.0, 3.0);
        let ang = Angles::default();
        let cases: Vec<(Frame, usize)> = vec![
            (server_identification("n", "m", false), 131),
            (level_init(), 1),
            (fast_map_init(10), 5),
            (level_chunk(&[1, 2, 3], 50), 1028),
            (level_finalize(Dimensions::new(1, 2, 3)), 7),
            (set_block(BlockPos::default(), 1), 8),
            (spawn_player(1, "a", pos, ang, false), 74),
            (spawn_player(1, "a", pos, ang, true), 80),
            (teleport(pos, ang, false), 10),
            (teleport(pos, ang, true), 16),
            (despawn_player(1), 2),
            (chat(MessageKind::Chat, "hi", true), 66),
            (kick("bye"), 65),
            (user_type(true), 2),
            (ext_info("app", 1), 67),
            (ext_entry(&Extension::new("FastMap", 1)), 69),
            (click_distance(160), 3),
            (custom_block_level(1), 2),
            (hold_this(1, false), 3),
            (set_hotkey("", "/help", 35, 0), 134),
            (add_player_name(1, "a", "a", "g", 0), 196),
            (remove_player_name(1), 3),
            (env_color(0, Color3::DEFAULT), 8),
            (
                make_selection(0, "", BlockPos::default(), BlockPos::default(), Color4::default()),
                86,
            ),
            (remove_selection(0), 2),
            (block_permission(1, true, false), 4),
            (change_model(1, "humanoid"), 66),
            (map_appearance_v1("", 7, 8, 32), 69),
            (map_appearance_v2("", 7, 8, 32, 66, 0), 73),
            (weather(1), 2),
            (hack_control(&Hacks::default()), 8),
            (add_entity2(1, "a", "a", pos, ang, false), 138),
            (add_entity2(1, "a", "a", pos, ang, true), 144),
            (define_block(&BlockDef::new(70, "b")), 80),
            (undefine_block(70), 2),
            (define_block_ext(&BlockDef::new(70, "b").extended()), 88),
            (bulk_block_update(&BulkBlockUpdate::new()), 1282),
            (add_text_color(Color4::default(), 'h'), 6),
            (texture_pack(""), 65),
            (map_property(0, 1), 6),
            (entity_property(1, 0, 90), 7),
            (two_way_ping(0, 7), 4),
            (inventory_order(1, 1), 3),
            (set_hotbar(1, 0), 3),
            (set_spawnpoint(pos, ang, false), 9),
            (set_spawnpoint(pos, ang, true), 15),
            (plugin_message(1, "x"), 66),
            (velocity_control(pos, true), 16),
            (define_effect(&CustomParticle::new(1)), 36),
            (spawn_effect(1, pos, pos), 26),
        ];
        for (frame, len) in cases {
            assert_eq!(frame.len(), len, "frame 0x{:02X}", frame.id());
        }
    }

    #[test]
    fn delivery_classes() {
        assert_eq!(kick("x").delivery(), Delivery::Anytime);
        assert_eq!(hack_control(&Hacks::default()).delivery(), Delivery::Anytime);
        assert_eq!(set_block(BlockPos::default(), 1).delivery(), Delivery::Ingame);
        assert_eq!(despawn_player(1).delivery(), Delivery::Ingame);
    }

    #[test]
    fn chunk_is_zero_padded_with_trailing_percent() {
        let frame = level_chunk(&[0xAA, 0xBB], 42);
        let bytes = frame.as_bytes();
        assert_eq!(&bytes[..5], &[ids::LEVEL_CHUNK, 0x00, 0x02, 0xAA, 0xBB]);
        assert!(bytes[5..1027].iter().all(|&b| b == 0));
        assert_eq!(bytes[1027], 42);
    }

    #[test]
    fn legacy_chat_is_sanitized() {
        let frame = chat(MessageKind::Chat, "\u{2}ok", false);
        assert_eq!(&frame.payload()[1..4], b"?ok");
        let frame = chat(MessageKind::Chat, "\u{2}ok", true);
        assert_eq!(frame.payload()[1], 0x02);
    }

    #[test]
    fn velocity_uses_four_decimal_fixed_point() {
        let frame = velocity_control(Vec3::new(1.5, -0.25, 0.0), false);
        let p = frame.payload();
        assert_eq!(&p[0..4], &15_000i32.to_be_bytes());
        assert_eq!(&p[4..8], &(-2_500i32).to_be_bytes());
        assert_eq!(&p[8..12], &0i32.to_be_bytes());
        assert_eq!(&p[12..15], &[0, 0, 0]);
        assert_eq!(&velocity_control(Vec3::default(), true).payload()[12..15], &[1, 1, 1]);
    }

    #[test]
    fn effect_definition_layout() {
        let mut effect = CustomParticle::new(9);
        effect.tint = [10, 20, 30];
        effect.size = 0.5;
        effect.spread = 2.0;
        effect.gravity = -1.0;
        effect.full_bright = true;
        let frame = define_effect(&effect);
        let p = frame.payload();
        assert_eq!(p[0], 9);
        assert_eq!(&p[5..8], &[10, 20, 30]);
        assert_eq!(p[10], 16);
        assert_eq!(&p[15..17], &64u16.to_be_bytes());
        assert_eq!(&p[21..25], &(-10_000i32).to_be_bytes());
        assert_eq!(p[34], 1);
    }

    #[test]
    fn self_id_for_own_entity() {
        assert_eq!(entity_id(3, 3), SELF_ID);
        assert_eq!(entity_id(3, 4), 4);
    }
}
