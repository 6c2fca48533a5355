//! Fan-out: chat, spawn bookkeeping, environment and appearance updates.
//!
//! Every send here locks one recipient at a time. Nothing holds a session's
//! data lock while sending to another session.

use std::sync::Arc;

use crate::core::codec::STRING_LEN;
use crate::core::packet::Frame;
use crate::events::Event;
use crate::groups::{Group, NO_GROUP};
use crate::protocol::chat::{split_message, MessageKind};
use crate::protocol::extensions;
use crate::protocol::outbound::{self, entity_id};
use crate::server::Server;
use crate::session::state::{model_name, parse_model};
use crate::session::{CpeState, EntityView, Session, SessionState, UpdateFlags};
use crate::world::{props, EnvFlags, Environment, World};

/// Number of entity rotation axes.
pub const ROTATION_AXES: usize = 3;

fn spawn_frame(receiver: &Session, subject: &EntityView) -> Frame {
    let id = entity_id(receiver.id(), subject.id);
    let wide = receiver.supports(extensions::EXT_ENTITY_POSITIONS, 1);
    if receiver.supports(extensions::EXT_PLAYER_LIST, 2) {
        let name = if subject.hide_name { "" } else { subject.name.as_str() };
        let skin = if subject.skin.is_empty() {
            subject.name.as_str()
        } else {
            subject.skin.as_str()
        };
        outbound::add_entity2(id, name, skin, subject.position, subject.angles, wide)
    } else {
        outbound::spawn_player(id, &subject.name, subject.position, subject.angles, wide)
    }
}

fn list_entry(receiver: &Session, subject: &EntityView, group: &Group) -> Frame {
    outbound::add_player_name(
        entity_id(receiver.id(), subject.id),
        &subject.name,
        &subject.display_name,
        &group.name,
        group.rank,
    )
}

fn model_frame(receiver: &Session, subject: &EntityView) -> Frame {
    outbound::change_model(entity_id(receiver.id(), subject.id), &model_name(subject.model))
}

fn prop_u8(env: &Environment, prop: u8) -> u8 {
    u8::try_from(env.prop(prop)).unwrap_or(0)
}

fn prop_i16(env: &Environment, prop: u8) -> i16 {
    let value = env.prop(prop).clamp(i32::from(i16::MIN), i32::from(i16::MAX));
    i16::try_from(value).unwrap_or(0)
}

impl Server {
    /// Send `frame` to every session. Returns how many accepted it.
    pub fn broadcast(&self, frame: &Frame) -> usize {
        self.sessions()
            .iter()
            .filter(|session| session.send(frame))
            .count()
    }

    /// Send `frame` to every session whose player is in `world`.
    pub fn broadcast_in_world(&self, world: &Arc<World>, frame: &Frame) -> usize {
        self.sessions()
            .iter()
            .filter(|session| session.in_world(world) && session.send(frame))
            .count()
    }

    /// Send a chat message, split into lines that fit a frame.
    ///
    /// Clients without MessageTypes only ever see the chat area; clients
    /// without FullCP437 get `?` for characters they cannot render.
    pub fn chat(&self, session: &Session, kind: MessageKind, text: &str) -> bool {
        let (message_types, full_cp437) = session.with_data(|data| {
            (
                data.ext_version(extensions::MESSAGE_TYPES) == 1,
                data.ext_version(extensions::FULL_CP437) == 1,
            )
        });
        let kind = if message_types { kind } else { MessageKind::Chat };
        split_message(text, kind)
            .iter()
            .all(|line| session.send(&outbound::chat(kind, line, full_cp437)))
    }

    /// Chat to every identified session.
    pub fn chat_all(&self, kind: MessageKind, text: &str) {
        for session in self.sessions() {
            if session.has_player() {
                self.chat(&session, kind, text);
            }
        }
    }

    /// Show `session` to everyone in its world and everyone to it.
    ///
    /// Returns `false` when the session is closed, has no player or is
    /// already spawned.
    pub fn spawn(&self, session: &Arc<Session>) -> bool {
        if session.is_closed() {
            return false;
        }
        let first_spawn = session.with_data(|data| {
            data.player
                .as_ref()
                .filter(|player| !player.spawned)
                .map(|player| player.first_spawn)
        });
        let (Some(first_spawn), Some(me)) = (first_spawn, session.entity()) else {
            return false;
        };
        let Some(world) = me.world.upgrade() else {
            return false;
        };

        self.update_world_info(session, &world.environment(), true);
        self.replay_hacks(session);
        let my_group = self.groups().resolve(me.group);

        for other in self.sessions() {
            let same = Arc::ptr_eq(&other, session);
            let them = if same { Some(me.clone()) } else { other.entity() };
            let Some(them) = them else {
                continue;
            };

            if first_spawn {
                if other.supports(extensions::EXT_PLAYER_LIST, 2) {
                    other.send(&list_entry(&other, &me, &my_group));
                }
                if !same && session.supports(extensions::EXT_PLAYER_LIST, 2) {
                    let their_group = self.groups().resolve(them.group);
                    session.send(&list_entry(session, &them, &their_group));
                }
            }

            if !them.in_world(&me.world) || !(same || other.is_spawned()) {
                continue;
            }
            other.send(&spawn_frame(&other, &me));
            if other.supports(extensions::CHANGE_MODEL, 1) {
                other.send(&model_frame(&other, &me));
            }
            if !same {
                session.send(&spawn_frame(session, &them));
                if session.supports(extensions::CHANGE_MODEL, 1) {
                    session.send(&model_frame(session, &them));
                }
            }
        }

        session.with_data(|data| {
            if let Some(player) = data.player.as_mut() {
                player.spawned = true;
            }
        });
        self.events.call(&mut Event::Spawn { session });
        session.with_data(|data| {
            if let Some(player) = data.player.as_mut() {
                player.first_spawn = false;
            }
        });
        true
    }

    /// Remove `session`'s entity from every client. No-op unless spawned.
    pub fn despawn(&self, session: &Arc<Session>) -> bool {
        let was_spawned = session.with_data(|data| match data.player.as_mut() {
            Some(player) if player.spawned => {
                player.spawned = false;
                true
            }
            _ => false,
        });
        if !was_spawned {
            return false;
        }

        for other in self.sessions() {
            other.send(&outbound::despawn_player(entity_id(other.id(), session.id())));
        }
        self.events.call(&mut Event::Despawn { session });
        true
    }

    /// Send environment state. With `update_all` every field goes out,
    /// otherwise only the fields flagged in `env`.
    pub fn update_world_info(&self, session: &Session, env: &Environment, update_all: bool) {
        if !session.is_extension_enabled() {
            return;
        }
        let (aspect, appearance, colors, weather) = session.with_data(|data| {
            (
                data.ext_version(extensions::ENV_MAP_ASPECT),
                data.ext_version(extensions::ENV_MAP_APPEARANCE),
                data.ext_version(extensions::ENV_COLORS),
                data.ext_version(extensions::ENV_WEATHER_TYPE),
            )
        });
        let changed = |flag: EnvFlags| update_all || env.modified.contains(flag);

        if colors == 1 && changed(EnvFlags::COLORS) {
            for (index, color) in (0u8..).zip(env.colors.iter()) {
                if update_all || env.modified_colors & (1 << index) != 0 {
                    session.send(&outbound::env_color(index, *color));
                }
            }
        }

        if aspect == 1 {
            if changed(EnvFlags::TEXTURE_PACK) {
                session.send(&outbound::texture_pack(&env.texture_pack));
            }
            if changed(EnvFlags::PROPS) {
                for (index, value) in (0u8..).zip(env.props.iter()) {
                    if update_all || env.modified_props & (1 << index) != 0 {
                        session.send(&outbound::map_property(index, *value));
                    }
                }
            }
        } else if appearance == 2 {
            session.send(&outbound::map_appearance_v2(
                &env.texture_pack,
                prop_u8(env, props::SIDE_BLOCK),
                prop_u8(env, props::EDGE_BLOCK),
                prop_i16(env, props::EDGE_LEVEL),
                prop_i16(env, props::CLOUDS_LEVEL),
                prop_i16(env, props::MAX_VIEW_DISTANCE),
            ));
        } else if appearance == 1 {
            session.send(&outbound::map_appearance_v1(
                &env.texture_pack,
                prop_u8(env, props::SIDE_BLOCK),
                prop_u8(env, props::EDGE_BLOCK),
                prop_i16(env, props::EDGE_LEVEL),
            ));
        }

        if weather == 1 && changed(EnvFlags::WEATHER) {
            session.send(&outbound::weather(env.weather));
        }
    }

    /// Push pending environment changes of `world` to its players.
    pub fn flush_environment(&self, world: &Arc<World>) {
        let env = world.take_env_changes();
        if env.modified.is_empty() {
            return;
        }
        for session in self.sessions() {
            if session.is_ingame() && session.in_world(world) {
                self.update_world_info(&session, &env, false);
            }
        }
    }

    fn replay_hacks(&self, session: &Session) {
        let hacks = session.with_data(|data| {
            let hacks = data.cpe()?.hacks?;
            (data.ext_version(extensions::HACK_CONTROL) == 1).then_some(hacks)
        });
        if let Some(hacks) = hacks {
            session.send(&outbound::hack_control(&hacks));
        }
    }

    /// Send pending appearance changes of `session` to every client able to
    /// show them. Group changes reach every client; model, skin and
    /// rotation changes only reach clients in the same world.
    pub fn flush_updates(&self, session: &Arc<Session>) -> bool {
        let updates = session.with_data(|data| {
            data.cpe_mut()
                .map(|cpe| std::mem::take(&mut cpe.updates))
                .unwrap_or_default()
        });
        if updates.is_empty() {
            return false;
        }
        let Some(me) = session.entity() else {
            return false;
        };
        let world = me.world.upgrade();
        let group = self.groups().resolve(me.group);

        for other in self.sessions() {
            let (player_list, change_model, entity_property) = other.with_data(|data| {
                (
                    data.ext_version(extensions::EXT_PLAYER_LIST) == 2,
                    data.ext_version(extensions::CHANGE_MODEL) == 1,
                    data.ext_version(extensions::ENTITY_PROPERTY) == 1,
                )
            });

            if updates.contains(UpdateFlags::GROUP) && player_list {
                other.send(&list_entry(&other, &me, &group));
            }
            if !world.as_ref().is_some_and(|w| other.in_world(w)) {
                continue;
            }
            if updates.contains(UpdateFlags::MODEL) && change_model {
                other.send(&model_frame(&other, &me));
            }
            if updates.contains(UpdateFlags::SKIN) && player_list {
                other.send(&spawn_frame(&other, &me));
            }
            if updates.contains(UpdateFlags::ENTITY_PROPERTY) && entity_property {
                let id = entity_id(other.id(), me.id);
                for (axis, value) in (0u8..).zip(me.rotation.iter()) {
                    other.send(&outbound::entity_property(id, axis, *value));
                }
            }
        }
        true
    }

    /// Move `session` to `world`. The transfer runs on the next tick.
    ///
    /// Rejected while a transfer is already running.
    pub fn change_world(&self, session: &Arc<Session>, world: Arc<World>) -> bool {
        if matches!(
            session.state(),
            SessionState::WorldTransfer | SessionState::Closed
        ) {
            return false;
        }
        self.despawn(session);
        if !session.begin_transfer() {
            return false;
        }
        session.with_data(|data| {
            if let Some(player) = data.player.as_mut() {
                player.world = Arc::downgrade(&world);
                player.pending_world = Some(world);
            }
        });
        true
    }

    fn mark_update(session: &Session, flag: UpdateFlags, apply: impl FnOnce(&mut CpeState)) -> bool {
        session.with_data(|data| match data.cpe_mut() {
            Some(cpe) => {
                apply(cpe);
                cpe.updates |= flag;
                true
            }
            None => false,
        })
    }

    /// Create or rename a group. Members see the new name on the next tick.
    pub fn add_group(&self, id: i16, name: &str, rank: u8) -> Group {
        let group = self.groups_mut().add(id, name, rank).clone();
        self.mark_group_members(id, None);
        group
    }

    fn mark_group_members(&self, id: i16, reassign: Option<i16>) {
        for session in self.sessions() {
            session.with_data(|data| {
                if let Some(cpe) = data.cpe_mut() {
                    if cpe.group == id {
                        if let Some(to) = reassign {
                            cpe.group = to;
                        }
                        cpe.updates |= UpdateFlags::GROUP;
                    }
                }
            });
        }
    }

    /// Delete a group; its members fall back to no group.
    pub fn remove_group(&self, id: i16) -> Option<Group> {
        let removed = self.groups_mut().remove(id)?;
        self.mark_group_members(id, Some(NO_GROUP));
        Some(removed)
    }

    pub fn set_group(&self, session: &Session, id: i16) -> bool {
        Self::mark_update(session, UpdateFlags::GROUP, |cpe| cpe.group = id)
    }

    pub fn set_model(&self, session: &Session, model: i16) -> bool {
        Self::mark_update(session, UpdateFlags::MODEL, |cpe| cpe.model = model)
    }

    /// Set the model by name or block number.
    pub fn set_model_name(&self, session: &Session, name: &str) -> bool {
        parse_model(name).is_some_and(|model| self.set_model(session, model))
    }

    pub fn set_skin(&self, session: &Session, skin: &str) -> bool {
        if skin.chars().count() > STRING_LEN {
            return false;
        }
        Self::mark_update(session, UpdateFlags::SKIN, |cpe| cpe.skin = skin.to_string())
    }

    /// Hide or show the name tag above the entity.
    pub fn set_hide_display_name(&self, session: &Session, hide: bool) -> bool {
        Self::mark_update(session, UpdateFlags::SKIN, |cpe| cpe.hide_display_name = hide)
    }

    pub fn set_rotation(&self, session: &Session, axis: usize, value: i32) -> bool {
        if axis >= ROTATION_AXES {
            return false;
        }
        Self::mark_update(session, UpdateFlags::ENTITY_PROPERTY, |cpe| {
            cpe.rotation[axis] = value;
        })
    }
}
