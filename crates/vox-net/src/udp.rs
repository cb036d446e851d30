//! UDP transport with a small connection and reliability layer.
//!
//! Datagram layout: one kind byte, then a kind-specific body. `DATA`
//! carries the reliability channel and a u32 sequence number ahead of the
//! payload; reliable data is acknowledged with `ACK` and resent until
//! acknowledged. Both reliable modes are delivered in send order.

use std::collections::{BTreeMap, VecDeque};
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use hashbrown::HashMap;

use crate::codec::{Reader, Writer};
use crate::protocol::{Reliability, SendMode};
use crate::transport::{Packet, PacketKind, PeerId, Target, Transport, TransportError};

const CONNECT: u8 = 1;
const ACCEPT: u8 = 2;
const REJECT: u8 = 3;
const DISCONNECT: u8 = 4;
const PING: u8 = 5;
const PONG: u8 = 6;
const DATA: u8 = 7;
const ACK: u8 = 8;

const MAX_DATAGRAM: usize = 1400;
const DATA_HEADER: usize = 1 + 1 + 4;
/// Largest payload accepted by [`Transport::send`].
pub const MAX_PAYLOAD: usize = MAX_DATAGRAM - DATA_HEADER;

/// Reliable packets further than this ahead of the next expected sequence
/// are dropped unacked; the sender resends them once the gap closes.
pub const REORDER_WINDOW: u32 = 1024;

#[derive(Clone, Debug)]
pub struct UdpConfig {
    pub timeout: Duration,
    pub ping_interval: Duration,
    pub resend_after: Duration,
    pub connect_attempts: u32,
    pub connect_retry: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            ping_interval: Duration::from_millis(1000),
            resend_after: Duration::from_millis(200),
            connect_attempts: 100,
            connect_retry: Duration::from_millis(100),
        }
    }
}

struct Unacked {
    datagram: Vec<u8>,
    sent_at: Instant,
}

struct PeerState {
    id: PeerId,
    last_recv: Instant,
    last_ping: Instant,
    next_reliable: u32,
    next_sequenced: u32,
    unacked: BTreeMap<u32, Unacked>,
    expected_reliable: u32,
    reorder: BTreeMap<u32, Vec<u8>>,
    newest_sequenced: Option<u32>,
}

impl PeerState {
    fn new(id: PeerId, now: Instant) -> Self {
        Self {
            id,
            last_recv: now,
            last_ping: now,
            next_reliable: 0,
            next_sequenced: 0,
            unacked: BTreeMap::new(),
            expected_reliable: 0,
            reorder: BTreeMap::new(),
            newest_sequenced: None,
        }
    }
}

enum Role {
    Idle,
    Hosting { max_connections: usize },
    Connecting { server: SocketAddr, attempts: u32, last_try: Instant },
    Client { server: SocketAddr },
}

pub struct UdpTransport {
    config: UdpConfig,
    socket: Option<UdpSocket>,
    role: Role,
    peers: HashMap<SocketAddr, PeerState>,
    addrs: HashMap<PeerId, SocketAddr>,
    next_peer: PeerId,
    inbox: VecDeque<Packet>,
    buf: Vec<u8>,
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::with_config(UdpConfig::default())
    }

    pub fn with_config(config: UdpConfig) -> Self {
        Self {
            config,
            socket: None,
            role: Role::Idle,
            peers: HashMap::new(),
            addrs: HashMap::new(),
            next_peer: 0,
            inbox: VecDeque::new(),
            buf: vec![0; 2048],
        }
    }

    /// Port actually bound; useful after hosting on port 0.
    pub fn local_port(&self) -> Option<u16> {
        self.socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map(|a| a.port())
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Server address once the client handshake has completed.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        match self.role {
            Role::Client { server } => Some(server),
            _ => None,
        }
    }

    fn bind(&mut self, port: u16) -> Result<(), TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_nonblocking(true)?;
        self.socket = Some(socket);
        Ok(())
    }

    fn send_raw(&self, addr: SocketAddr, datagram: &[u8]) {
        if let Some(socket) = &self.socket {
            if let Err(e) = socket.send_to(datagram, addr) {
                if e.kind() != ErrorKind::WouldBlock {
                    log::debug!(target: "net", "udp send to {addr} failed: {e}");
                }
            }
        }
    }

    fn add_peer(&mut self, addr: SocketAddr, now: Instant) -> PeerId {
        self.next_peer += 1;
        let id = self.next_peer;
        self.peers.insert(addr, PeerState::new(id, now));
        self.addrs.insert(id, addr);
        id
    }

    fn remove_peer(&mut self, addr: SocketAddr) -> Option<PeerId> {
        let peer = self.peers.remove(&addr)?;
        self.addrs.remove(&peer.id);
        if matches!(self.role, Role::Client { .. }) {
            self.role = Role::Idle;
        }
        Some(peer.id)
    }

    fn poll_socket(&mut self) {
        loop {
            let Some(socket) = &self.socket else { return };
            match socket.recv_from(&mut self.buf) {
                Ok((n, addr)) => {
                    let datagram = self.buf[..n].to_vec();
                    self.on_datagram(addr, &datagram, Instant::now());
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::ConnectionReset => continue,
                Err(e) => {
                    log::warn!(target: "net", "udp receive failed: {e}");
                    return;
                }
            }
        }
    }

    fn on_datagram(&mut self, addr: SocketAddr, datagram: &[u8], now: Instant) {
        let mut r = Reader::new(datagram);
        let Ok(kind) = r.u8() else { return };
        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.last_recv = now;
        }
        match kind {
            CONNECT => self.on_connect(addr, now),
            ACCEPT => {
                if let Role::Connecting { server, .. } = self.role {
                    if server == addr {
                        let id = self.add_peer(addr, now);
                        self.role = Role::Client { server };
                        self.inbox
                            .push_back(Packet::new(id, PacketKind::ConnectionAccepted));
                    }
                }
            }
            REJECT => {
                if let Role::Connecting { server, .. } = self.role {
                    if server == addr {
                        self.role = Role::Idle;
                        self.inbox
                            .push_back(Packet::new(0, PacketKind::ConnectionFailed));
                    }
                }
            }
            DISCONNECT => {
                if let Some(id) = self.remove_peer(addr) {
                    self.inbox
                        .push_back(Packet::new(id, PacketKind::DisconnectionNotification));
                }
            }
            PING => {
                if self.peers.contains_key(&addr) {
                    self.send_raw(addr, &[PONG]);
                }
            }
            PONG => {}
            ACK => {
                if let (Ok(seq), Some(peer)) = (r.u32(), self.peers.get_mut(&addr)) {
                    peer.unacked.remove(&seq);
                }
            }
            DATA => self.on_data(addr, &mut r),
            other => log::trace!(target: "net", "udp: unknown datagram kind {other} from {addr}"),
        }
    }

    fn on_connect(&mut self, addr: SocketAddr, now: Instant) {
        let Role::Hosting { max_connections } = self.role else {
            return;
        };
        if self.peers.contains_key(&addr) {
            // Our ACCEPT was lost; answer again.
            self.send_raw(addr, &[ACCEPT]);
            return;
        }
        if self.peers.len() >= max_connections {
            log::info!(target: "net", "udp: refusing {addr}, server full");
            self.send_raw(addr, &[REJECT]);
            return;
        }
        let id = self.add_peer(addr, now);
        self.send_raw(addr, &[ACCEPT]);
        self.inbox
            .push_back(Packet::new(id, PacketKind::NewIncomingConnection));
    }

    fn on_data(&mut self, addr: SocketAddr, r: &mut Reader<'_>) {
        let (Ok(channel), Ok(seq)) = (r.u8(), r.u32()) else {
            return;
        };
        let payload = r.rest().to_vec();
        let Some(peer) = self.peers.get_mut(&addr) else {
            log::trace!(target: "net", "udp: data from unknown {addr}");
            return;
        };
        let id = peer.id;
        match channel_reliability(channel) {
            Some(Reliability::Unreliable) => {
                self.inbox.push_back(Packet::new(id, PacketKind::Data(payload)));
            }
            Some(Reliability::UnreliableSequenced) => {
                if peer.newest_sequenced.is_some_and(|n| (seq.wrapping_sub(n) as i32) <= 0) {
                    return;
                }
                peer.newest_sequenced = Some(seq);
                self.inbox.push_back(Packet::new(id, PacketKind::Data(payload)));
            }
            Some(Reliability::Reliable | Reliability::ReliableOrdered) => {
                let ahead = seq.wrapping_sub(peer.expected_reliable);
                if (ahead as i32) >= 0 {
                    if ahead >= REORDER_WINDOW {
                        log::trace!(target: "net", "udp: seq {seq} from {addr} outside reorder window");
                        return;
                    }
                    peer.reorder.entry(seq).or_insert(payload);
                }
                let mut ack = Writer::with_capacity(5);
                ack.u8(ACK).u32(seq);
                while let Some(p) = peer.reorder.remove(&peer.expected_reliable) {
                    peer.expected_reliable = peer.expected_reliable.wrapping_add(1);
                    self.inbox.push_back(Packet::new(id, PacketKind::Data(p)));
                }
                self.send_raw(addr, &ack.into_bytes());
            }
            None => log::trace!(target: "net", "udp: bad channel {channel} from {addr}"),
        }
    }

    fn pump_timers(&mut self, now: Instant) {
        if let Role::Connecting { server, attempts, last_try } = self.role {
            if now.duration_since(last_try) >= self.config.connect_retry {
                if attempts >= self.config.connect_attempts {
                    log::info!(target: "net", "udp: no answer from {server}");
                    self.role = Role::Idle;
                    self.inbox.push_back(Packet::new(0, PacketKind::ConnectionFailed));
                } else {
                    self.send_raw(server, &[CONNECT]);
                    self.role = Role::Connecting { server, attempts: attempts + 1, last_try: now };
                }
            }
        }

        let mut lost = Vec::new();
        let mut outgoing = Vec::new();
        for (addr, peer) in self.peers.iter_mut() {
            if now.duration_since(peer.last_recv) >= self.config.timeout {
                lost.push(*addr);
                continue;
            }
            if now.duration_since(peer.last_ping) >= self.config.ping_interval {
                peer.last_ping = now;
                outgoing.push((*addr, vec![PING]));
            }
            for pending in peer.unacked.values_mut() {
                if now.duration_since(pending.sent_at) >= self.config.resend_after {
                    pending.sent_at = now;
                    outgoing.push((*addr, pending.datagram.clone()));
                }
            }
        }
        for (addr, datagram) in outgoing {
            self.send_raw(addr, &datagram);
        }
        for addr in lost {
            if let Some(id) = self.remove_peer(addr) {
                log::info!(target: "net", "udp: peer {id} at {addr} timed out");
                self.inbox.push_back(Packet::new(id, PacketKind::ConnectionLost));
            }
        }
    }
}

fn channel_reliability(c: u8) -> Option<Reliability> {
    Some(match c {
        0 => Reliability::Unreliable,
        1 => Reliability::UnreliableSequenced,
        2 => Reliability::Reliable,
        3 => Reliability::ReliableOrdered,
        _ => return None,
    })
}

fn channel_byte(r: Reliability) -> u8 {
    match r {
        Reliability::Unreliable => 0,
        Reliability::UnreliableSequenced => 1,
        Reliability::Reliable => 2,
        Reliability::ReliableOrdered => 3,
    }
}

impl Transport for UdpTransport {
    fn host(&mut self, port: u16, max_connections: usize) -> Result<(), TransportError> {
        self.bind(port)?;
        self.role = Role::Hosting { max_connections };
        log::info!(target: "net", "udp: hosting on port {}", self.local_port().unwrap_or(port));
        Ok(())
    }

    fn connect(&mut self, address: &str, port: u16) -> Result<(), TransportError> {
        let server = (address, port)
            .to_socket_addrs()
            .map_err(|_| TransportError::BadAddress(format!("{address}:{port}")))?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| TransportError::BadAddress(format!("{address}:{port}")))?;
        self.bind(0)?;
        self.send_raw(server, &[CONNECT]);
        self.role = Role::Connecting { server, attempts: 1, last_try: Instant::now() };
        Ok(())
    }

    fn update(&mut self) {
        self.poll_socket();
        self.pump_timers(Instant::now());
    }

    fn send(&mut self, payload: &[u8], mode: SendMode, target: Target) -> Result<(), TransportError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(TransportError::PayloadTooLarge { size: payload.len(), max: MAX_PAYLOAD });
        }
        if self.socket.is_none() {
            return Err(TransportError::NotConnected);
        }
        let targets: Vec<SocketAddr> = match target {
            Target::Peer(id) => vec![*self.addrs.get(&id).ok_or(TransportError::NotConnected)?],
            _ => self
                .addrs
                .iter()
                .filter(|(id, _)| target.includes(**id))
                .map(|(_, a)| *a)
                .collect(),
        };
        let now = Instant::now();
        let mut outgoing = Vec::with_capacity(targets.len());
        for addr in targets {
            let Some(peer) = self.peers.get_mut(&addr) else { continue };
            let seq = match mode.reliability {
                Reliability::Unreliable => 0,
                Reliability::UnreliableSequenced => {
                    peer.next_sequenced = peer.next_sequenced.wrapping_add(1);
                    peer.next_sequenced
                }
                Reliability::Reliable | Reliability::ReliableOrdered => {
                    let s = peer.next_reliable;
                    peer.next_reliable = s.wrapping_add(1);
                    s
                }
            };
            let mut w = Writer::with_capacity(DATA_HEADER + payload.len());
            w.u8(DATA).u8(channel_byte(mode.reliability)).u32(seq).bytes(payload);
            let datagram = w.into_bytes();
            if mode.reliability.is_reliable() {
                peer.unacked.insert(seq, Unacked { datagram: datagram.clone(), sent_at: now });
            }
            outgoing.push((addr, datagram));
        }
        for (addr, datagram) in outgoing {
            self.send_raw(addr, &datagram);
        }
        Ok(())
    }

    fn get_packet(&mut self) -> Option<Packet> {
        if self.inbox.is_empty() {
            self.poll_socket();
        }
        self.inbox.pop_front()
    }

    fn shutdown(&mut self) {
        let addrs: Vec<SocketAddr> = self.peers.keys().copied().collect();
        for addr in addrs {
            self.send_raw(addr, &[DISCONNECT]);
        }
        self.peers.clear();
        self.addrs.clear();
        self.role = Role::Idle;
        self.socket = None;
    }
}
