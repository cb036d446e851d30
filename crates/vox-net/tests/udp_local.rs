use std::thread;
use std::time::{Duration, Instant};

use vox_net::{Message, PacketKind, Target, Transport, UdpTransport};

fn pump_until<F: FnMut(&mut UdpTransport, &mut UdpTransport) -> bool>(
    a: &mut UdpTransport,
    b: &mut UdpTransport,
    mut done: F,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        a.update();
        b.update();
        if done(a, b) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn handshake_and_reliable_delivery_over_localhost() {
    let mut server = UdpTransport::new();
    server.host(0, 4).unwrap();
    let port = server.local_port().unwrap();
    let mut client = UdpTransport::new();
    client.connect("127.0.0.1", port).unwrap();

    let mut joined = None;
    let mut accepted = false;
    assert!(pump_until(&mut server, &mut client, |s, c| {
        while let Some(p) = s.get_packet() {
            if p.kind == PacketKind::NewIncomingConnection {
                joined = Some(p.from);
            }
        }
        while let Some(p) = c.get_packet() {
            accepted |= p.kind == PacketKind::ConnectionAccepted;
        }
        joined.is_some() && accepted
    }));
    let peer = joined.unwrap();

    let msgs: Vec<Message> = (0..20u16).map(|chunk| Message::RemoveChunk { chunk }).collect();
    for m in &msgs {
        server.send(&m.encode(), m.send_mode(), Target::Peer(peer)).unwrap();
    }
    let mut got = Vec::new();
    assert!(pump_until(&mut server, &mut client, |_, c| {
        while let Some(p) = c.get_packet() {
            if let PacketKind::Data(bytes) = p.kind {
                got.push(Message::decode(&bytes, vox_net::Origin::Server).unwrap());
            }
        }
        got.len() == msgs.len()
    }));
    assert_eq!(got, msgs);

    client.shutdown();
    let mut notified = false;
    assert!(pump_until(&mut server, &mut client, |s, _| {
        while let Some(p) = s.get_packet() {
            notified |= p.kind == PacketKind::DisconnectionNotification;
        }
        notified
    }));
    assert_eq!(server.connection_count(), 0);
}
