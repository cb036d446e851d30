use std::sync::Arc;

use vox::{
    Client, ClientConfig, ClientEvent, ConnectionState, DisconnectReason, PlayerState, Server,
    ServerConfig,
};
use vox_blocks::builtin::{COMPUTER, LIGHT_THING, RAMP, STEEL};
use vox_blocks::BlockRegistry;
use vox_chunk::ChunkKey;
use vox_geom::{IVec3, Quat, Vec3};
use vox_net::{
    LeaveReason, LoopbackHub, LoopbackTransport, Message, Origin, PacketKind, Priority,
    Reliability, SendMode, Target, Transport,
};

type TestServer = Server<LoopbackTransport>;
type TestClient = Client<LoopbackTransport>;

const PORT: u16 = 16660;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registry() -> Arc<BlockRegistry> {
    Arc::new(BlockRegistry::with_builtin().unwrap())
}

fn setup(n_clients: usize, chunk_size: u8) -> (LoopbackHub, TestServer, Vec<TestClient>) {
    init_logs();
    let hub = LoopbackHub::new();
    let config = ServerConfig {
        port: PORT,
        start_plane_radius: 0,
        chunk_size,
        transform_broadcast_ticks: 0,
        ..ServerConfig::default()
    };
    let mut server = Server::new(config, registry(), hub.endpoint());
    server.start().unwrap();
    let mut clients = Vec::new();
    for _ in 0..n_clients {
        let mut c = Client::new(ClientConfig::default(), registry(), hub.endpoint());
        c.connect().unwrap();
        clients.push(c);
    }
    pump(&mut server, &mut clients);
    for c in &clients {
        assert_eq!(c.state(), ConnectionState::Connected);
    }
    (hub, server, clients)
}

fn pump(server: &mut TestServer, clients: &mut [TestClient]) {
    for _ in 0..4 {
        server.tick();
        for c in clients.iter_mut() {
            c.tick();
        }
    }
}

fn key_of(client: &TestClient, id: u16) -> ChunkKey {
    client.chunk_key(id).unwrap()
}

fn assert_same_world(server: &TestServer, client: &TestClient) {
    let s = server.world().chunks();
    let c = client.world().chunks();
    assert_eq!(s.chunk_count(), c.chunk_count());
    for key in s.chunk_keys() {
        let sc = s.chunk(key).unwrap();
        let cc = c.chunk(key_of(client, sc.id)).unwrap();
        assert_eq!(sc.dims(), cc.dims());
        assert_eq!(sc.packed_blocks(), cc.packed_blocks());
        assert!(sc.position.approx_eq(cc.position, 1e-4), "{:?} vs {:?}", sc.position, cc.position);
        assert!(sc.rotation.approx_eq(cc.rotation, 1e-5));
        assert_eq!(sc.position_in_neighborhood(), cc.position_in_neighborhood());
        assert_eq!(sc.dynamic_count(), cc.dynamic_count());
    }
}

#[test]
fn snapshot_replicates_start_world() {
    let (_hub, server, mut clients) = setup(1, 8);
    let client = &mut clients[0];
    assert_same_world(&server, client);
    assert!(client.player_id().is_some());
    let events = client.take_events();
    assert_eq!(events[0], ClientEvent::Connected);
    assert!(matches!(events[1], ClientEvent::Welcome(_)));
    // The replicated floor is meshed and collidable on the client.
    let key = key_of(client, 1);
    assert!(client.world().mesh(key).is_some());
    let hit = client
        .world()
        .raycast(Vec3::new(3.5, 10.0, -3.5), Vec3::new(3.5, -60.0, -3.5))
        .unwrap();
    assert_eq!(hit.chunk, key);
}

#[test]
fn rotated_neighborhood_matches_on_client() {
    let (hub, mut server, mut clients) = setup(1, 4);
    let rotation = Quat::from_axis_angle(Vec3::UP, std::f32::consts::FRAC_PI_4);
    let neigh = server.create_neighborhood(Vec3::new(5.0, 2.0, -3.0), rotation);
    let key = server.create_chunk((3, 3, 3), Some((neigh, IVec3::new(1, -1, 2)))).unwrap();
    server.set_block(key, IVec3::new(1, 1, 1), RAMP, 3, None).unwrap();
    pump(&mut server, &mut clients);
    assert_same_world(&server, &clients[0]);

    // A late joiner gets the same result from the snapshot alone.
    let mut late = Client::new(ClientConfig::default(), registry(), hub.endpoint());
    late.connect().unwrap();
    clients.push(late);
    pump(&mut server, &mut clients);
    assert_same_world(&server, &clients[1]);

    let id = server.world().chunks().chunk(key).unwrap().id;
    let c = clients[1].world().chunks().chunk(key_of(&clients[1], id)).unwrap();
    assert!(c.rotation.approx_eq(rotation, 1e-5));
}

#[test]
fn moving_a_neighborhood_moves_client_chunks() {
    let (_hub, mut server, mut clients) = setup(1, 4);
    let rotation = Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), 0.3);
    assert!(server.set_neighborhood_transform(1, Vec3::new(0.0, 10.0, 4.0), rotation));
    pump(&mut server, &mut clients);
    assert_same_world(&server, &clients[0]);
}

#[test]
fn conflicting_set_block_last_write_wins() {
    let (_hub, mut server, mut clients) = setup(2, 4);
    let pos = IVec3::new(2, 2, 2);
    clients[0].send_set_block(1, pos, STEEL, 1).unwrap();
    clients[1].send_set_block(1, pos, LIGHT_THING, 2).unwrap();
    pump(&mut server, &mut clients);

    let sk = server.world().chunks().chunk_by_id(1).unwrap();
    let expect = server.world().chunks().chunk(sk).unwrap().get_block(pos).unwrap();
    assert_eq!((expect.id, expect.orientation), (LIGHT_THING, 2));
    for c in &clients {
        let b = c.world().chunks().chunk(key_of(c, 1)).unwrap().get_block(pos).unwrap();
        assert_eq!(b, expect);
        assert_same_world(&server, c);
    }
}

#[test]
fn out_of_bounds_edit_grows_a_neighbor_everywhere() {
    let (_hub, mut server, mut clients) = setup(1, 4);
    clients[0].send_set_block(1, IVec3::new(1, -1, 1), STEEL, 0).unwrap();
    pump(&mut server, &mut clients);
    assert_eq!(server.world().chunks().chunk_count(), 2);
    assert_same_world(&server, &clients[0]);
    let grown = key_of(&clients[0], 2);
    let c = clients[0].world().chunks().chunk(grown).unwrap();
    assert_eq!(c.position_in_neighborhood(), IVec3::new(0, -1, 0));
    assert_eq!(c.get_block(IVec3::new(1, 3, 1)).map(|b| b.id), Some(STEEL));
}

#[test]
fn standalone_chunk_groups_on_overflow() {
    let (_hub, mut server, mut clients) = setup(1, 4);
    let key = server.create_chunk((2, 2, 2), None).unwrap();
    server.world_mut().chunks_mut().chunk_mut(key).unwrap().position = Vec3::new(50.0, 0.0, 0.0);
    let id = server.world().chunks().chunk(key).unwrap().id;
    pump(&mut server, &mut clients);
    // The move was never broadcast; a full refresh picks it up.
    clients[0].request_refresh(0).unwrap();
    pump(&mut server, &mut clients);
    assert_same_world(&server, &clients[0]);

    clients[0].send_set_block(id, IVec3::new(0, 0, 2), STEEL, 0).unwrap();
    pump(&mut server, &mut clients);
    let s = server.world().chunks();
    assert!(s.chunk(key).unwrap().neighborhood().is_some());
    assert_same_world(&server, &clients[0]);
}

#[test]
fn join_and_leave_reasons_reach_other_clients() {
    let (hub, mut server, mut clients) = setup(3, 4);
    for c in clients.iter_mut() {
        c.take_events();
    }
    assert_eq!(clients[0].players().len(), 2);
    let id1 = clients[1].player_id().unwrap();
    let id2 = clients[2].player_id().unwrap();

    clients[1].disconnect();
    pump(&mut server, &mut clients);
    assert!(clients[0].take_events().contains(&ClientEvent::PlayerLeft(id1, LeaveReason::Disconnected)));

    let (server_peer, c2_peer) = (server.transport_mut().peer_id(), clients[2].transport().peer_id());
    hub.sever(server_peer, c2_peer);
    pump(&mut server, &mut clients);
    assert!(clients[0].take_events().contains(&ClientEvent::PlayerLeft(id2, LeaveReason::Lost)));
    assert_eq!(clients[2].state(), ConnectionState::Disconnected(Some(DisconnectReason::Lost)));
    assert_eq!(server.players().len(), 1);
    assert!(clients[0].players().is_empty());
}

#[test]
fn oversized_chunks_are_announced_without_content() {
    let (hub, mut server, mut clients) = setup(1, 40);
    let c = &clients[0];
    assert_eq!(c.world().chunks().chunk_count(), 1);
    let replica = c.world().chunks().chunk(key_of(c, 1)).unwrap();
    assert_eq!(replica.dims(), (40, 40, 40));
    assert!(replica.is_all_empty());

    // Watch the raw snapshot a fresh peer receives.
    let mut watcher = hub.endpoint();
    watcher.connect("127.0.0.1", PORT).unwrap();
    pump(&mut server, &mut clients);
    let mut received = Vec::new();
    while let Some(p) = watcher.get_packet() {
        if let PacketKind::Data(bytes) = p.kind {
            received.push(Message::decode(&bytes, Origin::Server).unwrap());
        }
    }
    assert!(received.iter().any(|m| matches!(
        m,
        Message::NewChunk { chunk: 1, dims: (40, 40, 40), .. }
    )));
    assert!(!received.iter().any(|m| matches!(m, Message::ChunkDownload { .. })));
}

#[test]
fn content_for_unknown_chunks_is_dropped() {
    let (_hub, mut server, mut clients) = setup(1, 4);
    let before = clients[0].world().chunks().chunk(key_of(&clients[0], 1)).unwrap().packed_blocks();
    let bogus = [
        Message::ChunkDownload { chunk: 77, offset: 0, entries: vec![4; 10] },
        Message::SetBlock { chunk: 77, pos: IVec3::ZERO, block: 4 },
        Message::SetNeighborhoodTransform { neighborhood: 9, position: Vec3::ZERO, rotation: Quat::IDENTITY },
        Message::SetBlock { chunk: 1, pos: IVec3::new(9, 0, 0), block: 4 },
    ];
    for m in &bogus {
        server.transport_mut().send(&m.encode(), m.send_mode(), Target::All).unwrap();
    }
    let mode = SendMode::new(Reliability::Reliable, Priority::High);
    server.transport_mut().send(&[200, 1, 2], mode, Target::All).unwrap();
    pump(&mut server, &mut clients);
    let c = &clients[0];
    assert!(c.chunk_key(77).is_none());
    assert_eq!(c.world().chunks().chunk(key_of(c, 1)).unwrap().packed_blocks(), before);
    assert_eq!(c.state(), ConnectionState::Connected);
}

#[test]
fn refresh_restores_local_damage() {
    let (_hub, mut server, mut clients) = setup(1, 4);
    let key = key_of(&clients[0], 1);
    {
        let world = clients[0].world_mut();
        let ctx = world.hook_ctx(None);
        let c = world.chunks_mut().chunk_mut(key).unwrap();
        c.destroy_block(IVec3::new(0, 0, 0), &ctx);
        c.destroy_block(IVec3::new(3, 3, 0), &ctx);
    }
    clients[0].request_refresh(1).unwrap();
    pump(&mut server, &mut clients);
    assert_same_world(&server, &clients[0]);
}

#[test]
fn dynamic_blocks_and_removal_replicate() {
    let (_hub, mut server, mut clients) = setup(1, 4);
    let pos = IVec3::new(1, 1, 1);
    clients[0].send_set_block(1, pos, COMPUTER, 0).unwrap();
    pump(&mut server, &mut clients);
    clients[0].send_interact(1, pos).unwrap();
    pump(&mut server, &mut clients);
    assert_same_world(&server, &clients[0]);
    assert_eq!(clients[0].world().chunks().chunk(key_of(&clients[0], 1)).unwrap().dynamic_count(), 1);

    clients[0].send_set_block(1, pos, 0, 0).unwrap();
    pump(&mut server, &mut clients);
    assert_same_world(&server, &clients[0]);

    assert!(server.remove_chunk(1));
    pump(&mut server, &mut clients);
    assert!(clients[0].chunk_key(1).is_none());
    assert_eq!(clients[0].world().chunks().chunk_count(), 0);
}

#[test]
fn player_state_is_forwarded_to_others() {
    let (_hub, mut server, mut clients) = setup(2, 4);
    let state = PlayerState {
        position: Vec3::new(1.0, 2.0, 3.0),
        velocity: Vec3::new(0.0, -1.0, 0.0),
        ..PlayerState::default()
    };
    clients[0].send_player_state(state).unwrap();
    pump(&mut server, &mut clients);
    let id0 = clients[0].player_id().unwrap();
    assert_eq!(server.players().get(id0).unwrap().state, state);
    assert_eq!(clients[1].players().get(id0).unwrap().state, state);
    assert!(clients[0].players().get(id0).is_none());
}
