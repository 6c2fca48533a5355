//! Shared helpers for integration tests: a small-world server, in-memory
//! clients and client-side frame builders.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use voxel_protocol::config::ServerConfig;
use voxel_protocol::core::codec::{Angles, BlockPos, FrameWriter, Vec3};
use voxel_protocol::core::packet::ids;
use voxel_protocol::transport::{memory_transport, MemoryPeer};
use voxel_protocol::world::{Dimensions, World};
use voxel_protocol::{Server, Session, SessionState};

pub const SMALL: Dimensions = Dimensions::new(16, 16, 16);

pub fn server() -> Server {
    server_with(ServerConfig::default())
}

pub fn server_with(config: ServerConfig) -> Server {
    Server::new(config)
        .expect("valid config")
        .with_main_world(World::flat("main", SMALL))
}

pub fn addr(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, last))
}

pub fn connect_from(server: &Server, ip: IpAddr) -> Option<(Arc<Session>, MemoryPeer)> {
    let (inbound, outbound, peer) = memory_transport();
    server
        .accept(Box::new(inbound), Box::new(outbound), ip)
        .map(|session| (session, peer))
}

pub fn connect(server: &Server) -> (Arc<Session>, MemoryPeer) {
    connect_from(server, addr(1)).expect("slot available")
}

pub fn identification(name: &str, cpe: bool) -> Vec<u8> {
    let mut w = FrameWriter::anytime(ids::IDENTIFICATION, 131);
    w.put_u8(7)
        .put_string(name)
        .put_string("key")
        .put_u8(if cpe { 0x42 } else { 0 });
    w.finish().as_bytes().to_vec()
}

pub fn ext_info(count: u16) -> Vec<u8> {
    let mut w = FrameWriter::anytime(ids::EXT_INFO, 67);
    w.put_string("TestClient").put_u16(count);
    w.finish().as_bytes().to_vec()
}

pub fn ext_entry(name: &str, version: i32) -> Vec<u8> {
    let mut w = FrameWriter::anytime(ids::EXT_ENTRY, 69);
    w.put_string(name).put_i32(version);
    w.finish().as_bytes().to_vec()
}

pub fn set_block(pos: BlockPos, mode: u8, block: u8) -> Vec<u8> {
    let mut w = FrameWriter::anytime(ids::SET_BLOCK_CLIENT, 9);
    w.put_block_pos(pos).put_u8(mode).put_u8(block);
    w.finish().as_bytes().to_vec()
}

pub fn position(held: u8, pos: Vec3, angles: Angles, wide: bool) -> Vec<u8> {
    let mut w = FrameWriter::anytime(ids::POSITION_ORIENTATION, if wide { 16 } else { 10 });
    w.put_u8(held).put_position(pos, wide).put_angles(angles);
    w.finish().as_bytes().to_vec()
}

pub fn message(partial: bool, text: &str) -> Vec<u8> {
    let mut w = FrameWriter::anytime(ids::MESSAGE, 66);
    w.put_u8(u8::from(partial)).put_string(text);
    w.finish().as_bytes().to_vec()
}

pub fn two_way_ping(direction: u8, data: u16) -> Vec<u8> {
    let mut w = FrameWriter::anytime(ids::TWO_WAY_PING, 4);
    w.put_u8(direction).put_u16(data);
    w.finish().as_bytes().to_vec()
}

pub fn plugin_message(channel: u8, text: &str) -> Vec<u8> {
    let mut w = FrameWriter::anytime(ids::PLUGIN_MESSAGE, 66);
    w.put_u8(channel).put_string(text);
    w.finish().as_bytes().to_vec()
}

/// Push one frame and handle it; panics if the server rejects it.
pub fn feed(server: &Server, session: &Arc<Session>, peer: &MemoryPeer, frame: &[u8]) {
    peer.push(frame);
    assert!(server.receive(session).expect("frame handled"));
}

/// Identify, negotiate `exts` (when given) and run the transfer.
pub fn join(server: &Server, name: &str, exts: Option<&[(&str, i32)]>) -> (Arc<Session>, MemoryPeer) {
    let (session, peer) = connect(server);
    handshake(server, &session, &peer, name, exts);
    server.tick(Duration::ZERO);
    assert_eq!(session.state(), SessionState::Ingame);
    (session, peer)
}

pub fn handshake(
    server: &Server,
    session: &Arc<Session>,
    peer: &MemoryPeer,
    name: &str,
    exts: Option<&[(&str, i32)]>,
) {
    feed(server, session, peer, &identification(name, exts.is_some()));
    if let Some(exts) = exts {
        feed(server, session, peer, &ext_info(u16::try_from(exts.len()).unwrap()));
        for (ext, version) in exts {
            feed(server, session, peer, &ext_entry(ext, *version));
        }
    }
}
