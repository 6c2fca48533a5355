//! Per-session setters gated on negotiated extensions.
//!
//! Every setter checks the exact extension version the frame belongs to and
//! returns `false` without sending anything when the client lacks it.

use crate::core::codec::{Angles, BlockPos, Color3, Color4, Vec3};
use crate::core::packet::Frame;
use crate::error::Result;
use crate::protocol::extensions;
use crate::protocol::outbound;
use crate::server::Server;
use crate::session::{Hacks, Session, SessionState};
use crate::world::blocks::{BlockDef, BulkBlockUpdate};
use crate::world::particles::CustomParticle;
use crate::world::ENV_COLOR_COUNT;

/// Hotbar slots addressable with SetHotbar.
pub const HOTBAR_SLOTS: u8 = 9;

/// Arguments of an EnvMapAppearance frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapAppearance {
    pub texture_pack: String,
    pub side_block: u8,
    pub edge_block: u8,
    pub side_level: i16,
    /// Version 2 only.
    pub clouds_level: i16,
    /// Version 2 only.
    pub max_view_distance: i16,
}

fn send_if(session: &Session, hash: u32, version: u32, frame: impl FnOnce() -> Frame) -> bool {
    session.supports(hash, version) && session.send(&frame())
}

/// Definition frame for `session`, if it can render `def` at all.
fn definition_frame(session: &Session, def: &BlockDef) -> Option<Frame> {
    if !session.supports(extensions::BLOCK_DEFINITIONS, 1) {
        return None;
    }
    match (def.is_extended(), session.supports(extensions::BLOCK_DEFINITIONS_EXT, 2)) {
        (true, true) => Some(outbound::define_block_ext(def)),
        (true, false) => None,
        (false, _) => Some(outbound::define_block(def)),
    }
}

impl Server {
    pub fn set_click_distance(&self, session: &Session, distance: u16) -> bool {
        let stored = session.with_data(|data| {
            if data.ext_version(extensions::CLICK_DISTANCE) != 1 {
                return false;
            }
            if let Some(cpe) = data.cpe_mut() {
                cpe.click_distance = distance;
            }
            true
        });
        stored && session.send(&outbound::click_distance(distance))
    }

    /// Put `block` in the player's hand, optionally locking the selection.
    pub fn hold_this(&self, session: &Session, block: u8, prevent_change: bool) -> bool {
        let stored = session.with_data(|data| {
            if data.ext_version(extensions::HELD_BLOCK) != 1 {
                return false;
            }
            if let Some(cpe) = data.cpe_mut() {
                cpe.held_block = block;
            }
            true
        });
        stored && session.send(&outbound::hold_this(block, prevent_change))
    }

    pub fn held_block(&self, session: &Session) -> Option<u8> {
        session.with_data(|data| data.cpe().map(|cpe| cpe.held_block))
    }

    pub fn set_hotkey(
        &self,
        session: &Session,
        label: &str,
        action: &str,
        keycode: i32,
        modifiers: i8,
    ) -> bool {
        send_if(session, extensions::TEXT_HOT_KEY, 1, || {
            outbound::set_hotkey(label, action, keycode, modifiers)
        })
    }

    pub fn set_env_color(&self, session: &Session, kind: u8, color: Color3) -> bool {
        usize::from(kind) < ENV_COLOR_COUNT
            && send_if(session, extensions::ENV_COLORS, 1, || outbound::env_color(kind, color))
    }

    pub fn make_selection(
        &self,
        session: &Session,
        id: u8,
        label: &str,
        start: BlockPos,
        end: BlockPos,
        color: Color4,
    ) -> bool {
        send_if(session, extensions::SELECTION_CUBOID, 1, || {
            outbound::make_selection(id, label, start, end, color)
        })
    }

    pub fn remove_selection(&self, session: &Session, id: u8) -> bool {
        send_if(session, extensions::SELECTION_CUBOID, 1, || outbound::remove_selection(id))
    }

    pub fn set_block_permission(
        &self,
        session: &Session,
        block: u8,
        allow_place: bool,
        allow_destroy: bool,
    ) -> bool {
        send_if(session, extensions::BLOCK_PERMISSIONS, 1, || {
            outbound::block_permission(block, allow_place, allow_destroy)
        })
    }

    /// Version 2 wins when both appearance versions were negotiated.
    pub fn set_map_appearance(&self, session: &Session, appearance: &MapAppearance) -> bool {
        let frame = match session.ext_version(extensions::ENV_MAP_APPEARANCE) {
            2 => outbound::map_appearance_v2(
                &appearance.texture_pack,
                appearance.side_block,
                appearance.edge_block,
                appearance.side_level,
                appearance.clouds_level,
                appearance.max_view_distance,
            ),
            1 => outbound::map_appearance_v1(
                &appearance.texture_pack,
                appearance.side_block,
                appearance.edge_block,
                appearance.side_level,
            ),
            _ => return false,
        };
        session.send(&frame)
    }

    pub fn set_weather(&self, session: &Session, weather: u8) -> bool {
        send_if(session, extensions::ENV_WEATHER_TYPE, 1, || outbound::weather(weather))
    }

    pub fn set_texture_pack(&self, session: &Session, url: &str) -> bool {
        send_if(session, extensions::ENV_MAP_ASPECT, 1, || outbound::texture_pack(url))
    }

    pub fn set_map_property(&self, session: &Session, property: u8, value: i32) -> bool {
        send_if(session, extensions::ENV_MAP_ASPECT, 1, || {
            outbound::map_property(property, value)
        })
    }

    /// Send movement restrictions. The last value is replayed after every
    /// world change.
    pub fn send_hacks(&self, session: &Session, hacks: Hacks) -> bool {
        let stored = session.with_data(|data| {
            if data.ext_version(extensions::HACK_CONTROL) != 1 {
                return false;
            }
            if let Some(cpe) = data.cpe_mut() {
                cpe.hacks = Some(hacks);
            }
            true
        });
        stored && session.send(&outbound::hack_control(&hacks))
    }

    /// Send one block definition to one session.
    ///
    /// Extended definitions need BlockDefinitionsExt version 2.
    pub fn define_block(&self, session: &Session, def: &BlockDef) -> bool {
        definition_frame(session, def).is_some_and(|frame| session.send(&frame))
    }

    pub fn undefine_block(&self, session: &Session, id: u8) -> bool {
        send_if(session, extensions::BLOCK_DEFINITIONS, 1, || outbound::undefine_block(id))
    }

    /// Install a server-wide definition and push it to every capable
    /// session. Returns how many sessions received it.
    pub fn register_block(&self, def: BlockDef) -> Result<usize> {
        self.blocks_mut().define(def.clone())?;
        Ok(self
            .sessions()
            .iter()
            .filter(|session| self.define_block(session, &def))
            .count())
    }

    /// Remove a server-wide definition. `None` when nothing was defined.
    pub fn unregister_block(&self, id: u8) -> Option<usize> {
        if !self.blocks_mut().undefine(id) {
            return None;
        }
        Some(
            self.sessions()
                .iter()
                .filter(|session| self.undefine_block(session, id))
                .count(),
        )
    }

    pub fn bulk_block_update(&self, session: &Session, update: &BulkBlockUpdate) -> bool {
        !update.is_empty()
            && send_if(session, extensions::BULK_BLOCK_UPDATE, 1, || {
                outbound::bulk_block_update(update)
            })
    }

    pub fn add_text_color(&self, session: &Session, color: Color4, code: char) -> bool {
        send_if(session, extensions::TEXT_COLORS, 1, || outbound::add_text_color(color, code))
    }

    pub fn set_inventory_order(&self, session: &Session, block: u8, order: u8) -> bool {
        send_if(session, extensions::INVENTORY_ORDER, 1, || {
            outbound::inventory_order(block, order)
        })
    }

    pub fn set_hotbar(&self, session: &Session, block: u8, slot: u8) -> bool {
        slot < HOTBAR_SLOTS
            && send_if(session, extensions::SET_HOTBAR, 1, || outbound::set_hotbar(block, slot))
    }

    pub fn set_spawnpoint(&self, session: &Session, pos: Vec3, angles: Angles) -> bool {
        let wide = session.supports(extensions::EXT_ENTITY_POSITIONS, 1);
        send_if(session, extensions::SET_SPAWNPOINT, 1, || {
            outbound::set_spawnpoint(pos, angles, wide)
        })
    }

    pub fn send_plugin_message(&self, session: &Session, channel: u8, text: &str) -> bool {
        send_if(session, extensions::PLUGIN_MESSAGES, 1, || {
            outbound::plugin_message(channel, text)
        })
    }

    pub fn set_velocity(&self, session: &Session, velocity: Vec3, set: bool) -> bool {
        send_if(session, extensions::VELOCITY_CONTROL, 1, || {
            outbound::velocity_control(velocity, set)
        })
    }

    pub fn register_particle(&self, session: &Session, effect: &CustomParticle) -> bool {
        send_if(session, extensions::CUSTOM_PARTICLES, 1, || outbound::define_effect(effect))
    }

    /// Spawn a particle effect the client registered earlier.
    pub fn spawn_particle(&self, session: &Session, id: u8, pos: Vec3, origin: Vec3) -> bool {
        send_if(session, extensions::CUSTOM_PARTICLES, 1, || {
            outbound::spawn_effect(id, pos, origin)
        })
    }

    /// Grant or revoke operator rights. The client learns the new user type
    /// immediately; returns `false` before the player identified.
    pub fn set_operator(&self, session: &Session, operator: bool) -> bool {
        let changed = session.with_data(|data| match data.player.as_mut() {
            Some(player) => {
                player.operator = operator;
                true
            }
            None => false,
        });
        changed && session.send(&outbound::user_type(operator))
    }

    /// Move the player. Works for every client.
    pub fn teleport(&self, session: &Session, pos: Vec3, angles: Angles) -> bool {
        let moved = session.with_data(|data| match data.player.as_mut() {
            Some(player) => {
                player.position = pos;
                player.angles = angles;
                true
            }
            None => false,
        });
        let wide = session.supports(extensions::EXT_ENTITY_POSITIONS, 1);
        moved && session.send(&outbound::teleport(pos, angles, wide))
    }

    /// Resend the identification frame with a new name and MOTD. Clients in
    /// game only accept it with InstantMOTD.
    pub fn set_server_ident(&self, session: &Session, name: &str, motd: &str) -> bool {
        match session.state() {
            SessionState::Closed | SessionState::Initial => return false,
            SessionState::Ingame if !session.supports(extensions::INSTANT_MOTD, 1) => return false,
            _ => {}
        }
        session.send(&outbound::server_identification(
            name,
            motd,
            session.is_operator(),
        ))
    }
}
