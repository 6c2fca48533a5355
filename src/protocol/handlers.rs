//! In-game packet handlers.
//!
//! Every handler returns `false` only for a malformed or out-of-place frame;
//! the server turns that into a protocol-error disconnect.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::core::codec::{Angles, BlockPos, FrameReader, Vec3, STRING_LEN};
use crate::error::{constants, Result};
use crate::events::{Click, Event};
use crate::protocol::chat::{rewrite_color_codes, MessageKind};
use crate::protocol::extensions;
use crate::protocol::outbound;
use crate::protocol::registry::HandlerContext;
use crate::server::Server;
use crate::session::Session;
use crate::utils::logging::CHAT_TARGET;
use crate::world::blocks::BLOCK_AIR;

const MODE_DESTROY: u8 = 0;
const MODE_PLACE: u8 = 1;

fn read_set_block(payload: &[u8]) -> Result<(BlockPos, u8, u8)> {
    let mut reader = FrameReader::new(payload);
    Ok((reader.read_block_pos()?, reader.read_u8()?, reader.read_u8()?))
}

/// 0x05 SetBlock.
pub fn set_block(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let server = ctx.server;
    let session = ctx.session;
    if !session.is_ingame() {
        return false;
    }
    let Ok((pos, mode, block)) = read_set_block(payload) else {
        return false;
    };
    let Some(world) = session.world() else {
        return false;
    };

    let placed = match mode {
        MODE_PLACE => {
            if !server.blocks().is_valid(block) {
                session.kick(constants::KICK_UNKNOWN_BLOCK);
                return true;
            }
            block
        }
        MODE_DESTROY => BLOCK_AIR,
        _ => return false,
    };

    let allowed = server.events().call(&mut Event::BlockPlace {
        session,
        pos,
        mode,
        block,
    });

    if allowed && world.set_block(pos, placed) {
        server.broadcast_in_world(&world, &outbound::set_block(pos, placed));
    } else {
        let actual = world.get_block(pos).unwrap_or(BLOCK_AIR);
        session.send(&outbound::set_block(pos, actual));
    }
    true
}

fn read_pose(payload: &[u8], wide: bool) -> Result<(u8, Vec3, Angles)> {
    let mut reader = FrameReader::new(payload);
    Ok((
        reader.read_u8()?,
        reader.read_position(wide)?,
        reader.read_angles()?,
    ))
}

/// 0x08 PositionAndOrientation, 9 or 15 bytes.
pub fn position_orientation(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let server = ctx.server;
    let session = ctx.session;
    if !session.is_ingame() {
        return true;
    }
    let Ok((held, position, angles)) = read_pose(payload, ctx.extended) else {
        return false;
    };

    let (held_change, moved, rotated) = session.with_data(|data| {
        let mut held_change = None;
        if data.ext_version(extensions::HELD_BLOCK) == 1 {
            if let Some(cpe) = data.cpe_mut() {
                if cpe.held_block != held {
                    held_change = Some(cpe.held_block);
                    cpe.held_block = held;
                }
            }
        }
        let Some(player) = data.player.as_mut() else {
            return (held_change, false, false);
        };
        let moved = player.position != position;
        let rotated = player.angles != angles;
        player.position = position;
        player.angles = angles;
        (held_change, moved, rotated)
    });

    let events = server.events();
    if let Some(previous) = held_change {
        events.call(&mut Event::HeldBlockChange {
            session,
            previous,
            current: held,
        });
    }
    if moved {
        events.call(&mut Event::Move { session });
    }
    if rotated {
        events.call(&mut Event::Rotate { session });
    }

    if moved || rotated {
        relay_pose(server, session, position, angles);
    }
    true
}

fn relay_pose(server: &Server, session: &Arc<Session>, position: Vec3, angles: Angles) {
    let Some(world) = session.world() else {
        return;
    };
    for other in server.sessions() {
        if other.id() == session.id() || !other.is_ingame() || !other.in_world(&world) {
            continue;
        }
        let wide = other.supports(extensions::EXT_ENTITY_POSITIONS, 1);
        other.send(&outbound::position_orientation(
            session.id(),
            position,
            angles,
            wide,
        ));
    }
}

/// 0x0D Message.
pub fn message(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let server = ctx.server;
    let session = ctx.session;
    if !session.is_ingame() {
        return true;
    }

    let mut reader = FrameReader::new(payload);
    let mut fragment = String::with_capacity(STRING_LEN);
    let (Ok(partial), Ok(len)) = (reader.read_u8(), reader.read_string_into(&mut fragment)) else {
        return false;
    };
    if len == 0 {
        return false;
    }
    rewrite_color_codes(&mut fragment);
    let partial = partial == 1;

    let text = session.with_data(|data| {
        if data.ext_version(extensions::LONGER_MESSAGES) != 1 {
            return Some(fragment);
        }
        let cpe = data.cpe_mut()?;
        if cpe.assembler.append(&fragment) && partial {
            return None;
        }
        Some(cpe.assembler.take())
    });
    let Some(text) = text else {
        return true;
    };

    deliver_message(server, session, text);
    true
}

/// Run a complete chat line through listeners, commands and the broadcast.
pub(crate) fn deliver_message(server: &Server, session: &Arc<Session>, mut text: String) {
    let mut kind = MessageKind::Chat;
    let accepted = server.events().call(&mut Event::Message {
        session,
        text: &mut text,
        kind: &mut kind,
    });
    if !accepted {
        return;
    }

    let display = session
        .with_data(|data| data.player.as_ref().map(|p| p.display_name.clone()))
        .unwrap_or_default();
    let formatted = format!("<{display}&f>: {text}");

    if text.starts_with('/') {
        if !server.handle_command(Some(session), &text) {
            server.chat(session, kind, constants::MSG_UNKNOWN_COMMAND);
        }
    } else {
        server.chat_all(kind, &formatted);
    }
    info!(target: CHAT_TARGET, "{formatted}");
}

fn read_click(payload: &[u8]) -> Result<Click> {
    let mut reader = FrameReader::new(payload);
    let button = reader.read_u8()?;
    let action = reader.read_u8()?;
    let yaw = click_angle(reader.read_i16()?);
    let pitch = click_angle(reader.read_i16()?);
    Ok(Click {
        button,
        action,
        angles: Angles::new(yaw, pitch),
        target_entity: reader.read_u8()?,
        target_block: reader.read_block_pos()?,
        target_face: reader.read_u8()?,
    })
}

/// 32767 on the wire is a full turn.
fn click_angle(raw: i16) -> f32 {
    f32::from(raw) / 32767.0 * 360.0
}

/// 0x22 PlayerClicked.
pub fn player_click(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let session = ctx.session;
    if !session.supports(extensions::PLAYER_CLICK, 1) || !session.is_ingame() {
        return false;
    }
    let Ok(click) = read_click(payload) else {
        return false;
    };
    ctx.server.events().call(&mut Event::Click { session, click });
    true
}

/// 0x2B TwoWayPing.
pub fn two_way_ping(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let session = ctx.session;
    if !session.supports(extensions::TWO_WAY_PING, 1) {
        return false;
    }
    let mut reader = FrameReader::new(payload);
    let (Ok(direction), Ok(data)) = (reader.read_u8(), reader.read_u16()) else {
        return false;
    };

    match direction {
        // Client-initiated: echo, then start our own measurement.
        0 => {
            session.send(&outbound::two_way_ping(0, data));
            let probe = session.with_data(|d| {
                let ping = &mut d.cpe_mut()?.ping;
                if ping.started.is_some() {
                    return None;
                }
                ping.data = ping.data.wrapping_add(1);
                ping.started = Some(Instant::now());
                Some(ping.data)
            });
            if let Some(probe) = probe {
                session.send(&outbound::two_way_ping(1, probe));
            }
            true
        }
        1 => session.with_data(|d| {
            let Some(cpe) = d.cpe_mut() else {
                return false;
            };
            let ping = &mut cpe.ping;
            let Some(started) = ping.started.take() else {
                return false;
            };
            if ping.data == data {
                ping.record(started.elapsed());
            }
            true
        }),
        _ => false,
    }
}

/// 0x35 PluginMessage.
pub fn plugin_message(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let session = ctx.session;
    if !session.supports(extensions::PLUGIN_MESSAGES, 1) {
        return false;
    }
    let mut reader = FrameReader::new(payload);
    let mut text = String::with_capacity(STRING_LEN);
    let (Ok(channel), Ok(_)) = (reader.read_u8(), reader.read_string_into(&mut text)) else {
        return false;
    };
    ctx.server.events().call(&mut Event::PluginMessage {
        session,
        channel,
        text: &text,
    })
}
