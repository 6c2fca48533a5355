//! # Handshake
//!
//! Identification and the extension negotiation that may follow it.
//!
//! ```text
//! client                         server
//!   | Identification(7, name, key, 0x42)
//!   |----------------------------->|
//!   |        ServerIdentification  |
//!   |<-----------------------------|
//!   |    ExtInfo, ExtEntry * N,    |   only with the 0x42 marker
//!   |    CustomBlockSupportLevel   |
//!   |<-----------------------------|
//!   | ExtInfo, ExtEntry * M        |
//!   |----------------------------->|
//!   | CustomBlockSupportLevel      |   only if CustomBlocks was negotiated
//!   |----------------------------->|
//! ```
//!
//! Completion fires [`Event::HandshakeDone`] and schedules the transfer of
//! the destination world on the next tick.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ConfigLookup;
use crate::core::codec::FrameReader;
use crate::core::packet::{EXTENSION_MARKER, PROTOCOL_VERSION};
use crate::error::{constants, ProtocolError, Result};
use crate::events::Event;
use crate::protocol::extensions::{self, Extension};
use crate::protocol::outbound;
use crate::protocol::registry::HandlerContext;
use crate::server::{Server, SOFTWARE_NAME};
use crate::session::{Capability, PlayerState, Session, SessionState};

/// Custom block level announced to extension clients.
pub const CUSTOM_BLOCK_SUPPORT_LEVEL: u8 = 1;

/// App name recorded when a client sends an empty one.
pub const UNKNOWN_APP: &str = "(unknown)";

struct Identification {
    version: u8,
    name: Option<String>,
    key: Option<String>,
    marker: u8,
}

impl Identification {
    fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = FrameReader::new(payload);
        Ok(Self {
            version: reader.read_u8()?,
            name: reader.read_string()?,
            key: reader.read_string()?,
            marker: reader.read_u8()?,
        })
    }
}

/// 0x00 Identification.
pub fn identification(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let server = ctx.server;
    let session = ctx.session;

    if session.has_player() {
        return false;
    }
    let Ok(ident) = Identification::parse(payload) else {
        return false;
    };

    let metrics = server.metrics();
    metrics.handshake_attempt();

    if ident.version != PROTOCOL_VERSION {
        metrics.handshake_failed();
        let err = ProtocolError::UnsupportedVersion {
            expected: PROTOCOL_VERSION,
            actual: ident.version,
        };
        session.kick(&err.to_string());
        return true;
    }

    let (Some(name), Some(key)) = (ident.name, ident.key) else {
        metrics.handshake_failed();
        return false;
    };

    if server.is_name_taken(&name, session.id()) {
        metrics.handshake_failed();
        session.kick(constants::KICK_NAME_IN_USE);
        return true;
    }

    if !server.verify_credentials(&name, &key) {
        metrics.handshake_failed();
        session.kick(constants::KICK_AUTH_FAILED);
        return true;
    }

    let settings = server.settings();
    let operator = settings.get_bool("always-local-op").unwrap_or(false) && session.is_local();
    let extended = ident.marker == EXTENSION_MARKER;

    session.with_data(|data| {
        let mut player = PlayerState::new(name.clone(), key);
        player.operator = operator;
        data.player = Some(player);
        if extended {
            data.capability = Capability::ExtensionEnabled(Box::default());
        }
    });
    info!(session = session.id(), player = %name, extended, "Player identified");

    let server_name = settings.get_str("server-name").unwrap_or_default();
    let motd = settings.get_str("server-motd").unwrap_or_default();
    if !session.send(&outbound::server_identification(&server_name, &motd, operator)) {
        return true;
    }

    if !extended {
        return finish_handshake(server, session);
    }

    session.set_state(SessionState::AwaitingExt);
    let table = server.extensions();
    let count = u16::try_from(table.len()).unwrap_or(u16::MAX);
    if !session.send(&outbound::ext_info(SOFTWARE_NAME, count)) {
        return true;
    }
    for ext in table.iter() {
        if !session.send(&outbound::ext_entry(ext)) {
            return true;
        }
    }
    session.send(&outbound::custom_block_level(CUSTOM_BLOCK_SUPPORT_LEVEL));
    true
}

fn read_ext_info(payload: &[u8]) -> Result<(Option<String>, u16)> {
    let mut reader = FrameReader::new(payload);
    Ok((reader.read_string()?, reader.read_u16()?))
}

/// 0x10 ExtInfo.
pub fn ext_info(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let session = ctx.session;
    if session.state() != SessionState::AwaitingExt {
        return false;
    }
    let Ok((app_name, count)) = read_ext_info(payload) else {
        return false;
    };

    let stored = session.with_data(|data| match data.cpe_mut() {
        Some(cpe) => {
            cpe.app_name = app_name.unwrap_or_else(|| UNKNOWN_APP.to_string());
            cpe.expected_entries = count;
            debug!(session = session.id(), app = %cpe.app_name, count, "Client extension info");
            true
        }
        None => false,
    });

    if !stored {
        return false;
    }
    if count == 0 {
        return finish_handshake(ctx.server, session);
    }
    true
}

fn read_ext_entry(payload: &[u8]) -> Result<(Option<String>, i32)> {
    let mut reader = FrameReader::new(payload);
    Ok((reader.read_string()?, reader.read_i32()?))
}

enum EntryOutcome {
    Malformed,
    MoreExpected,
    AwaitBlockLevel,
    Complete,
}

/// 0x11 ExtEntry.
pub fn ext_entry(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let session = ctx.session;
    if session.state() != SessionState::AwaitingExt {
        return false;
    }
    let Ok((Some(name), version)) = read_ext_entry(payload) else {
        return false;
    };
    let Ok(version) = u32::try_from(version) else {
        return false;
    };
    if version < 1 {
        return false;
    }

    let outcome = session.with_data(|data| {
        let Some(cpe) = data.cpe_mut() else {
            return EntryOutcome::Malformed;
        };
        // More entries than the client announced.
        if cpe.expected_entries == 0 {
            return EntryOutcome::Malformed;
        }
        cpe.extensions.insert(Extension::new(name, version));
        cpe.expected_entries -= 1;

        if cpe.expected_entries > 0 {
            EntryOutcome::MoreExpected
        } else if cpe.extensions.supports(extensions::CUSTOM_BLOCKS, 1) {
            EntryOutcome::AwaitBlockLevel
        } else {
            EntryOutcome::Complete
        }
    });

    match outcome {
        EntryOutcome::Malformed => false,
        EntryOutcome::MoreExpected | EntryOutcome::AwaitBlockLevel => true,
        EntryOutcome::Complete => finish_handshake(ctx.server, session),
    }
}

/// 0x13 CustomBlockSupportLevel.
pub fn custom_block_level(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let session = ctx.session;
    if session.state() != SessionState::AwaitingExt {
        return false;
    }
    let Ok(level) = FrameReader::new(payload).read_u8() else {
        return false;
    };

    let accepted = session.with_data(|data| match data.cpe_mut() {
        Some(cpe)
            if cpe.expected_entries == 0 && cpe.extensions.supports(extensions::CUSTOM_BLOCKS, 1) =>
        {
            cpe.custom_block_level = level;
            true
        }
        _ => false,
    });

    accepted && finish_handshake(ctx.server, session)
}

/// Fire `HandshakeDone` and move the session into its first world.
///
/// A vetoed handshake leaves the session connected and idle: it goes back
/// to the pre-game state, so in-game broadcasts are dropped instead of
/// piling up for a transfer that never comes.
pub(crate) fn finish_handshake(server: &Server, session: &Arc<Session>) -> bool {
    let mut world = server.main_world();
    let accepted = server.events().call(&mut Event::HandshakeDone {
        session,
        world: &mut world,
    });
    if !accepted {
        debug!(session = session.id(), "Handshake vetoed by listener");
        session.park();
        return true;
    }

    server.metrics().handshake_success();
    server.change_world(session, world)
}
