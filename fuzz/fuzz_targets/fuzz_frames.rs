#![no_main]

use std::net::{IpAddr, Ipv4Addr};

use libfuzzer_sys::fuzz_target;
use voxel_protocol::transport::memory_transport;
use voxel_protocol::world::{Dimensions, World};
use voxel_protocol::{Server, ServerConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(server) = Server::new(ServerConfig::default()) else {
        return;
    };
    let server = server.with_main_world(World::flat("fuzz", Dimensions::new(16, 16, 16)));
    let (inbound, outbound, peer) = memory_transport();
    let Some(session) = server.accept(
        Box::new(inbound),
        Box::new(outbound),
        IpAddr::V4(Ipv4Addr::LOCALHOST),
    ) else {
        return;
    };

    peer.push(data);
    peer.close();
    while !session.is_closed() {
        match server.receive(&session) {
            Ok(_) => {}
            Err(err) => server.terminate(&session, &err),
        }
    }
});
