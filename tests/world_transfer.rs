//! World streaming: the chunk stream must decompress to the world snapshot,
//! percent must never go backwards and the report must account for every
//! snapshot byte exactly once.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::io::Read;

use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::*;
use voxel_protocol::core::codec::BlockPos;
use voxel_protocol::core::packet::ids;
use voxel_protocol::protocol::transfer::send_world;
use voxel_protocol::world::{Dimensions, SnapshotKind, World};

/// Concatenated chunk payloads and their percent bytes.
fn chunks(frames: &[Bytes]) -> (Vec<u8>, Vec<u8>) {
    let mut data = Vec::new();
    let mut percents = Vec::new();
    for frame in frames.iter().filter(|f| f[0] == ids::LEVEL_CHUNK) {
        assert_eq!(frame.len(), 1028);
        let len = usize::from(u16::from_be_bytes([frame[1], frame[2]]));
        assert!(len <= 1024);
        data.extend_from_slice(&frame[3..3 + len]);
        // Padding after the payload is zeroed.
        assert!(frame[3 + len..1027].iter().all(|b| *b == 0));
        percents.push(frame[1027]);
    }
    (data, percents)
}

#[test]
fn legacy_stream_is_gzip_of_prefixed_blocks() {
    let server = server();
    let world = server.main_world();
    world.ensure_loaded().unwrap();
    world.set_block(BlockPos::new(3, 14, 5), 20);

    let (_session, peer) = join(&server, "Alice", None);
    let frames = peer.sent();
    let order: Vec<u8> = frames.iter().map(|f| f[0]).collect();

    let init = order.iter().position(|id| *id == ids::LEVEL_INIT).unwrap();
    let finalize = order.iter().position(|id| *id == ids::LEVEL_FINALIZE).unwrap();
    assert!(init < finalize);
    assert_eq!(frames[init].len(), 1);

    let (compressed, percents) = chunks(&frames);
    let mut decoded = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut decoded)
        .unwrap();
    assert_eq!(decoded, world.snapshot(SnapshotKind::Legacy).unwrap());
    assert_eq!(&decoded[..4], &(16u32 * 16 * 16).to_be_bytes());

    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));

    let fin = &frames[finalize];
    assert_eq!(&fin[1..], &[0, 16, 0, 16, 0, 16]);
}

#[test]
fn scattered_edits_survive_the_stream() {
    let server = server();
    let world = server.main_world();
    world.ensure_loaded().unwrap();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut placed = Vec::new();
    for _ in 0..200 {
        let pos = BlockPos::new(
            rng.random_range(0..16),
            rng.random_range(0..16),
            rng.random_range(0..16),
        );
        let block = rng.random_range(1..50);
        assert!(world.set_block(pos, block));
        placed.push(pos);
    }

    let (_session, peer) = join(&server, "Alice", None);
    let (compressed, _) = chunks(&peer.sent());
    let mut decoded = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut decoded)
        .unwrap();

    let dims = world.dimensions();
    for pos in placed {
        let index = dims.index(pos).unwrap();
        assert_eq!(Some(decoded[4 + index]), world.get_block(pos));
    }
}

#[test]
fn noisy_world_streams_in_many_chunks() {
    let server = server();
    let dims = Dimensions::new(64, 32, 64);
    let world = server.add_world(World::flat("noise", dims));
    world.ensure_loaded().unwrap();

    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    for y in 0..dims.height {
        for z in 0..dims.length {
            for x in 0..dims.width {
                world.set_block(BlockPos::new(x, y, z), rng.random_range(0..50));
            }
        }
    }

    let (session, peer) = connect(&server);
    handshake(&server, &session, &peer, "Alice", None);
    peer.take_sent();
    let report = send_world(&server, &session, &world).unwrap();
    assert!(report.frames > 10, "only {} chunk frames", report.frames);

    let (compressed, percents) = chunks(&peer.sent());
    assert_eq!(percents.len(), report.frames);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert!(percents[0] < 100);
    assert_eq!(percents.last(), Some(&100));

    let mut decoded = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut decoded)
        .unwrap();
    assert_eq!(decoded, world.snapshot(SnapshotKind::Legacy).unwrap());
}

#[test]
fn fast_map_stream_is_raw_deflate() {
    let server = server();
    let (_session, peer) = join(&server, "Alice", Some(&[("FastMap", 1)][..]));
    let frames = peer.sent();

    let init = frames.iter().find(|f| f[0] == ids::LEVEL_INIT).unwrap();
    assert_eq!(init.len(), 5);
    let volume = u32::from_be_bytes([init[1], init[2], init[3], init[4]]);
    assert_eq!(volume, 16 * 16 * 16);

    let (compressed, _) = chunks(&frames);
    let mut decoded = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .read_to_end(&mut decoded)
        .unwrap();
    assert_eq!(decoded, server.main_world().snapshot(SnapshotKind::Raw).unwrap());
}

#[test]
fn report_accounts_for_every_byte() {
    let server = server();
    let world = server.add_world(World::flat("wide", Dimensions::new(64, 32, 64)));
    let (session, peer) = connect(&server);
    handshake(&server, &session, &peer, "Alice", None);
    peer.take_sent();

    let report = send_world(&server, &session, &world).unwrap();

    assert_eq!(report.consumed_bytes, report.total_bytes);
    assert_eq!(report.total_bytes, 64 * 32 * 64 + 4);
    let sent = peer.sent();
    let (compressed, _) = chunks(&sent);
    assert_eq!(report.compressed_bytes, compressed.len());
    assert_eq!(report.frames, sent.iter().filter(|f| f[0] == ids::LEVEL_CHUNK).count());
}

#[test]
fn block_definitions_follow_init() {
    let server = server();
    let mut def = voxel_protocol::world::blocks::BlockDef::new(80, "Lamp");
    def.full_bright = true;
    server.register_block(def).unwrap();

    let (_session, peer) = join(&server, "Alice", Some(&[("BlockDefinitions", 1)][..]));
    let order = peer.sent_ids();
    let init = order.iter().position(|id| *id == ids::LEVEL_INIT).unwrap();
    let define = order.iter().position(|id| *id == ids::DEFINE_BLOCK).unwrap();
    let chunk = order.iter().position(|id| *id == ids::LEVEL_CHUNK).unwrap();
    assert!(init < define && define < chunk);
}

#[test]
fn closed_session_aborts_transfer() {
    let server = server();
    let (session, peer) = connect(&server);
    handshake(&server, &session, &peer, "Alice", None);
    peer.fail_writes();

    assert!(send_world(&server, &session, &server.main_world()).is_err());
    assert!(session.is_closed());
}
