//! End-to-end session behavior over in-memory transports: spawning,
//! movement relay, block changes, chat, world changes and disconnects.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::time::Duration;

use common::*;
use voxel_protocol::core::codec::{decode_string, Angles, BlockPos, Vec3};
use voxel_protocol::core::packet::ids;
use voxel_protocol::events::EventKind;
use voxel_protocol::groups::NO_GROUP;
use voxel_protocol::protocol::extensions;
use voxel_protocol::session::Hacks;
use voxel_protocol::world::blocks::BlockDef;
use voxel_protocol::world::{Dimensions, World};
use voxel_protocol::SessionState;

const PLAYER_LIST: &[(&str, i32)] = &[("ExtPlayerList", 2)];

#[test]
fn players_see_each_other_after_joining() {
    let server = server();
    let (_alice, alice_peer) = join(&server, "Alice", None);
    alice_peer.take_sent();

    let (bob, bob_peer) = join(&server, "Bob", None);

    let to_alice = alice_peer.take_sent();
    assert!(to_alice
        .iter()
        .any(|f| f[0] == ids::SPAWN_PLAYER && f[1] == bob.id()));

    let bob_spawns: Vec<u8> = bob_peer
        .sent()
        .iter()
        .filter(|f| f[0] == ids::SPAWN_PLAYER)
        .map(|f| f[1])
        .collect();
    // Own entity (0xFF) and Alice, each once.
    assert_eq!(bob_spawns.len(), 2);
    assert!(bob_spawns.contains(&0xFF));
}

#[test]
fn player_list_clients_get_add_entity2() {
    let server = server();
    let (_alice, alice_peer) = join(&server, "Alice", Some(PLAYER_LIST));
    alice_peer.take_sent();
    let (_bob, _) = join(&server, "Bob", None);

    let ids_seen = alice_peer.sent_ids();
    assert!(ids_seen.contains(&ids::EXT_ADD_ENTITY2));
    assert!(ids_seen.contains(&ids::EXT_ADD_PLAYER_NAME));
    assert!(!ids_seen.contains(&ids::SPAWN_PLAYER));
}

#[test]
fn movement_is_relayed_to_others() {
    let server = server();
    let (alice, alice_peer) = join(&server, "Alice", None);
    let (_bob, bob_peer) = join(&server, "Bob", None);
    alice_peer.take_sent();
    bob_peer.take_sent();

    let target = Vec3::new(4.0, 9.0, 4.0);
    feed(
        &server,
        &alice,
        &alice_peer,
        &position(0xFF, target, Angles::new(90.0, 0.0), false),
    );

    let relayed = bob_peer.take_sent();
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0][0], ids::POSITION_ORIENTATION);
    assert_eq!(relayed[0][1], alice.id());
    assert!(alice_peer.sent().is_empty());

    let stored = alice.entity().unwrap().position;
    assert_eq!(stored, target);
}

#[test]
fn placed_block_reaches_everyone_in_world() {
    let server = server();
    let (alice, alice_peer) = join(&server, "Alice", None);
    let (_bob, bob_peer) = join(&server, "Bob", None);
    alice_peer.take_sent();
    bob_peer.take_sent();

    let pos = BlockPos::new(2, 12, 2);
    feed(&server, &alice, &alice_peer, &set_block(pos, 1, 1));

    assert_eq!(alice_peer.sent_ids(), vec![ids::SET_BLOCK]);
    assert_eq!(bob_peer.sent_ids(), vec![ids::SET_BLOCK]);
    assert_eq!(server.main_world().get_block(pos), Some(1));
}

#[test]
fn vetoed_block_is_reverted_for_sender_only() {
    let server = server();
    server.events().subscribe(EventKind::BlockPlace, |_| false);
    let (alice, alice_peer) = join(&server, "Alice", None);
    let (_bob, bob_peer) = join(&server, "Bob", None);
    alice_peer.take_sent();
    bob_peer.take_sent();

    let pos = BlockPos::new(2, 12, 2);
    feed(&server, &alice, &alice_peer, &set_block(pos, 1, 1));

    let echoed = alice_peer.take_sent();
    assert_eq!(echoed.len(), 1);
    assert_eq!(echoed[0][0], ids::SET_BLOCK);
    // Air is still there.
    assert_eq!(echoed[0][7], 0);
    assert!(bob_peer.sent().is_empty());
}

#[test]
fn chat_is_broadcast() {
    let server = server();
    let (alice, alice_peer) = join(&server, "Alice", None);
    let (_bob, bob_peer) = join(&server, "Bob", None);
    bob_peer.take_sent();

    feed(&server, &alice, &alice_peer, &message(false, "hi there"));
    assert_eq!(bob_peer.sent_ids(), vec![ids::MESSAGE]);
}

#[test]
fn disconnect_despawns_and_updates_player_list() {
    let server = server();
    let (alice, alice_peer) = join(&server, "Alice", None);
    let (_bob, bob_peer) = join(&server, "Bob", Some(PLAYER_LIST));
    bob_peer.take_sent();

    alice_peer.close();
    server.tick(Duration::ZERO);

    assert!(alice.is_closed());
    assert!(server.session(alice.id()).is_none());
    let ids_seen = bob_peer.sent_ids();
    assert!(ids_seen.contains(&ids::DESPAWN_PLAYER));
    assert!(ids_seen.contains(&ids::EXT_REMOVE_PLAYER_NAME));
}

#[test]
fn world_change_moves_player_out_of_sight() {
    let server = server();
    let lobby = server.add_world(World::flat("lobby", Dimensions::new(16, 16, 16)));
    let (alice, alice_peer) = join(&server, "Alice", None);
    let (_bob, bob_peer) = join(&server, "Bob", None);
    bob_peer.take_sent();
    alice_peer.take_sent();

    assert!(server.change_world(&alice, lobby.clone()));
    assert!(!server.change_world(&alice, lobby.clone()));
    assert_eq!(alice.state(), SessionState::WorldTransfer);
    assert_eq!(bob_peer.sent_ids(), vec![ids::DESPAWN_PLAYER]);

    server.tick(Duration::ZERO);
    assert_eq!(alice.state(), SessionState::Ingame);
    assert!(alice.in_world(&lobby));
    assert!(alice_peer.sent_ids().contains(&ids::LEVEL_FINALIZE));
    assert!(!bob_peer.sent_ids().contains(&ids::SPAWN_PLAYER));
}

#[test]
fn group_change_is_flushed_on_tick() {
    let server = server();
    server.add_group(3, "Builders", 20);
    let (alice, _) = join(&server, "Alice", Some(PLAYER_LIST));
    let (_bob, bob_peer) = join(&server, "Bob", Some(PLAYER_LIST));
    bob_peer.take_sent();

    assert!(server.set_group(&alice, 3));
    server.tick(Duration::ZERO);

    let updates = bob_peer.take_sent();
    assert!(updates
        .iter()
        .any(|f| f[0] == ids::EXT_ADD_PLAYER_NAME && f[2] == alice.id()));

    // Nothing left to flush.
    server.tick(Duration::ZERO);
    assert!(bob_peer.sent().is_empty());
}

#[test]
fn environment_changes_reach_capable_players() {
    let server = server();
    let (_alice, alice_peer) = join(&server, "Alice", Some(&[("EnvWeatherType", 1)][..]));
    let (_bob, bob_peer) = join(&server, "Bob", None);
    alice_peer.take_sent();
    bob_peer.take_sent();

    server.main_world().set_weather(1);
    server.tick(Duration::ZERO);

    assert_eq!(alice_peer.sent_ids(), vec![ids::WEATHER]);
    assert!(bob_peer.sent().is_empty());
}

#[test]
fn removed_group_members_fall_back_to_no_group() {
    let server = server();
    server.add_group(3, "Builders", 20);
    let (alice, _) = join(&server, "Alice", Some(PLAYER_LIST));
    let (_bob, bob_peer) = join(&server, "Bob", Some(PLAYER_LIST));
    assert!(server.set_group(&alice, 3));
    server.tick(Duration::ZERO);
    bob_peer.take_sent();

    assert_eq!(server.remove_group(3).map(|g| g.name), Some("Builders".to_string()));
    assert!(server.remove_group(3).is_none());
    assert_eq!(alice.entity().unwrap().group, NO_GROUP);

    server.tick(Duration::ZERO);
    let entry = bob_peer
        .take_sent()
        .into_iter()
        .find(|f| f[0] == ids::EXT_ADD_PLAYER_NAME && f[2] == alice.id())
        .expect("list entry resent");
    // Group name field is blank, rank is zero.
    assert_eq!(decode_string(&entry[131..195]), None);
    assert_eq!(entry[195], 0);
}

#[test]
fn extension_session_world_change_replays_state() {
    let server = server();
    server.register_block(BlockDef::new(80, "Lamp")).unwrap();
    let lobby = server.add_world(World::flat("lobby", Dimensions::new(16, 16, 16)));
    lobby.set_weather(2);

    let exts: &[(&str, i32)] = &[
        ("BlockDefinitions", 1),
        ("EnvColors", 1),
        ("EnvWeatherType", 1),
        ("HackControl", 1),
    ];
    let (alice, alice_peer) = join(&server, "Alice", Some(exts));
    let hacks = Hacks {
        flying: true,
        ..Hacks::default()
    };
    assert!(server.send_hacks(&alice, hacks));
    alice_peer.take_sent();

    assert!(server.change_world(&alice, lobby.clone()));
    server.tick(Duration::ZERO);
    assert_eq!(alice.state(), SessionState::Ingame);
    assert!(alice.in_world(&lobby));

    let sent = alice_peer.take_sent();
    let order: Vec<u8> = sent.iter().map(|f| f[0]).collect();
    let init = order.iter().position(|id| *id == ids::LEVEL_INIT).unwrap();
    let define = order.iter().position(|id| *id == ids::DEFINE_BLOCK).unwrap();
    assert!(init < define);
    assert!(order.contains(&ids::ENV_COLOR));
    assert!(sent.iter().any(|f| f[0] == ids::WEATHER && f[1] == 2));
    let replayed = sent.iter().find(|f| f[0] == ids::HACK_CONTROL).unwrap();
    assert_eq!(replayed[1], 1);

    for hash in [
        extensions::BLOCK_DEFINITIONS,
        extensions::ENV_COLORS,
        extensions::ENV_WEATHER_TYPE,
        extensions::HACK_CONTROL,
    ] {
        assert!(alice.supports(hash, 1));
    }
}
