//! # World Transfer
//!
//! Streams a world snapshot to one session through a 1024-byte window.
//!
//! ```text
//! LevelInit            0x02  (empty, or u32 size under FastMap)
//! LevelChunk * N       0x03  u16 len + 1024 bytes + percent
//! LevelFinalize        0x04  width, height, length
//! ```
//!
//! FastMap v1 clients get raw deflate of the bare block array. Everyone else
//! gets gzip of the block count followed by the block array.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::packet::{Frame, CHUNK_LEN};
use crate::error::{ProtocolError, Result};
use crate::protocol::extensions;
use crate::protocol::outbound;
use crate::server::Server;
use crate::session::Session;
use crate::utils::compression::{CompressionKind, Compressor};
use crate::utils::metrics::Timer;
use crate::world::{SnapshotKind, World};

/// Totals of one completed transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Level chunk frames sent.
    pub frames: usize,
    pub compressed_bytes: usize,
    pub consumed_bytes: usize,
    /// Snapshot size fed to the compressor.
    pub total_bytes: usize,
}

/// Progress byte: `100 - floor(queued / total * 100)`.
pub fn percent(queued: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let left = (queued as u64 * 100 / total as u64).min(100);
    100 - left as u8
}

fn deliver(session: &Session, frame: &Frame) -> Result<()> {
    if session.send(frame) {
        Ok(())
    } else {
        Err(ProtocolError::ConnectionClosed)
    }
}

/// Send custom block definitions the session can understand.
fn send_block_definitions(server: &Server, session: &Session) -> Result<()> {
    if !session.supports(extensions::BLOCK_DEFINITIONS, 1) {
        return Ok(());
    }
    let extended = session.supports(extensions::BLOCK_DEFINITIONS_EXT, 2);
    let frames: Vec<Frame> = server
        .blocks()
        .defined()
        .filter_map(|def| match (def.is_extended(), extended) {
            (true, true) => Some(outbound::define_block_ext(def)),
            (true, false) => None,
            (false, _) => Some(outbound::define_block(def)),
        })
        .collect();
    frames.iter().try_for_each(|frame| deliver(session, frame))
}

/// Stream `world` to `session`. The caller owns the state transitions
/// around the stream.
pub fn send_world(server: &Server, session: &Session, world: &Arc<World>) -> Result<TransferReport> {
    let _timer = Timer::start("world_transfer");
    world.ensure_loaded()?;

    let fast_map = session.supports(extensions::FAST_MAP, 1);
    let (kind, snapshot_kind) = if fast_map {
        (CompressionKind::Deflate, SnapshotKind::Raw)
    } else {
        (CompressionKind::Gzip, SnapshotKind::Legacy)
    };
    let snapshot = world.snapshot(snapshot_kind)?;
    let total = snapshot.len();

    let spawn = world.spawn();
    session.with_data(|data| {
        if let Some(player) = data.player.as_mut() {
            player.world = Arc::downgrade(world);
            player.position = spawn.position;
            player.angles = spawn.angles;
            player.spawned = false;
        }
    });

    let init = if fast_map {
        let size = u32::try_from(total)
            .map_err(|_| ProtocolError::WorldError(format!("world {} is too large", world.name())))?;
        outbound::fast_map_init(size)
    } else {
        outbound::level_init()
    };
    deliver(session, &init)?;
    send_block_definitions(server, session)?;

    let mut compressor = Compressor::new(kind);
    compressor.set_input(snapshot);
    let mut window = [0u8; CHUNK_LEN];
    let mut report = TransferReport {
        total_bytes: total,
        ..TransferReport::default()
    };

    while !compressor.is_done() {
        if session.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let written = compressor.update(&mut window)?;
        if written == 0 {
            continue;
        }
        let progress = percent(compressor.queued(), total);
        deliver(session, &outbound::level_chunk(&window[..written], progress))?;
        report.frames += 1;
        report.compressed_bytes += written;
    }
    report.consumed_bytes = compressor.consumed();

    deliver(session, &outbound::level_finalize(world.dimensions()))?;
    server.metrics().world_transfer(report.compressed_bytes as u64);
    debug!(
        session = session.id(),
        world = %world.name(),
        frames = report.frames,
        compressed = report.compressed_bytes,
        "World sent"
    );
    Ok(report)
}

/// Transfer, then enter the game and spawn; on failure the session is
/// closed with the error's reason.
pub(crate) fn transfer(server: &Server, session: &Arc<Session>, world: &Arc<World>) -> bool {
    match send_world(server, session, world) {
        Ok(_) => {
            if !session.enter_ingame() {
                return false;
            }
            server.spawn(session);
            true
        }
        Err(err) => {
            warn!(session = session.id(), world = %world.name(), error = %err, "World transfer failed");
            server.terminate(session, &err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_counts_consumed_input() {
        assert_eq!(percent(1000, 1000), 0);
        assert_eq!(percent(999, 1000), 1);
        assert_eq!(percent(500, 1000), 50);
        assert_eq!(percent(1, 1000), 100);
        assert_eq!(percent(0, 1000), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn percent_never_decreases_as_input_drains() {
        let total = 4099;
        let mut last = 0;
        for queued in (0..=total).rev() {
            let p = percent(queued, total);
            assert!(p >= last);
            last = p;
        }
    }
}
