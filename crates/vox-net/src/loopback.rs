//! In-process transport for tests and single-process setups.
//!
//! Every endpoint owns a crossbeam mailbox registered with a shared
//! [`LoopbackHub`]. Delivery is ordered and lossless regardless of the
//! requested [`SendMode`]; connection loss is simulated with
//! [`LoopbackHub::sever`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use hashbrown::{HashMap, HashSet};

use crate::protocol::SendMode;
use crate::transport::{Packet, PacketKind, PeerId, Target, Transport, TransportError};

#[derive(Debug)]
enum Body {
    Connect,
    Accept,
    Reject,
    Data(Vec<u8>),
    Disconnect,
    Lost,
}

#[derive(Debug)]
struct Envelope {
    from: PeerId,
    body: Body,
}

#[derive(Default)]
struct HubState {
    next_peer: PeerId,
    listeners: HashMap<u16, PeerId>,
    mailboxes: HashMap<PeerId, Sender<Envelope>>,
}

/// Shared switchboard for loopback endpoints. Cheap to clone.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// New endpoint attached to this hub.
    pub fn endpoint(&self) -> LoopbackTransport {
        let (tx, rx) = unbounded();
        let id = {
            let mut st = self.lock();
            st.next_peer += 1;
            let id = st.next_peer;
            st.mailboxes.insert(id, tx);
            id
        };
        LoopbackTransport {
            hub: self.clone(),
            id,
            inbox: rx,
            local: VecDeque::new(),
            connections: HashSet::new(),
            hosting: None,
        }
    }

    /// Drop the link between two endpoints; both sides see `ConnectionLost`.
    pub fn sever(&self, a: PeerId, b: PeerId) {
        self.post(b, a, Body::Lost);
        self.post(a, b, Body::Lost);
    }

    fn post(&self, from: PeerId, to: PeerId, body: Body) -> bool {
        let tx = self.lock().mailboxes.get(&to).cloned();
        match tx {
            Some(tx) => tx.send(Envelope { from, body }).is_ok(),
            None => false,
        }
    }

    fn listener(&self, port: u16) -> Option<PeerId> {
        self.lock().listeners.get(&port).copied()
    }
}

pub struct LoopbackTransport {
    hub: LoopbackHub,
    id: PeerId,
    inbox: Receiver<Envelope>,
    local: VecDeque<Packet>,
    connections: HashSet<PeerId>,
    hosting: Option<(u16, usize)>,
}

impl LoopbackTransport {
    /// This endpoint's address as seen by its peers.
    pub fn peer_id(&self) -> PeerId {
        self.id
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn handle(&mut self, env: Envelope) -> Option<PacketKind> {
        match env.body {
            Body::Connect => {
                let room = self
                    .hosting
                    .is_some_and(|(_, max)| self.connections.len() < max);
                if room {
                    self.connections.insert(env.from);
                    self.hub.post(self.id, env.from, Body::Accept);
                    Some(PacketKind::NewIncomingConnection)
                } else {
                    log::debug!(target: "net", "loopback: refusing peer {}", env.from);
                    self.hub.post(self.id, env.from, Body::Reject);
                    None
                }
            }
            Body::Accept => {
                self.connections.insert(env.from);
                Some(PacketKind::ConnectionAccepted)
            }
            Body::Reject => Some(PacketKind::ConnectionFailed),
            Body::Data(bytes) => {
                if self.connections.contains(&env.from) {
                    Some(PacketKind::Data(bytes))
                } else {
                    log::trace!(target: "net", "loopback: data from unconnected peer {}", env.from);
                    None
                }
            }
            Body::Disconnect => self
                .connections
                .remove(&env.from)
                .then_some(PacketKind::DisconnectionNotification),
            Body::Lost => self
                .connections
                .remove(&env.from)
                .then_some(PacketKind::ConnectionLost),
        }
    }
}

impl Transport for LoopbackTransport {
    fn host(&mut self, port: u16, max_connections: usize) -> Result<(), TransportError> {
        self.hub.lock().listeners.insert(port, self.id);
        self.hosting = Some((port, max_connections));
        Ok(())
    }

    fn connect(&mut self, address: &str, port: u16) -> Result<(), TransportError> {
        match self.hub.listener(port) {
            Some(server) => {
                self.hub.post(self.id, server, Body::Connect);
            }
            None => {
                log::debug!(target: "net", "loopback: nobody listening on {address}:{port}");
                self.local
                    .push_back(Packet::new(0, PacketKind::ConnectionFailed));
            }
        }
        Ok(())
    }

    fn send(
        &mut self,
        payload: &[u8],
        _mode: SendMode,
        target: Target,
    ) -> Result<(), TransportError> {
        if let Target::Peer(p) = target {
            if !self.connections.contains(&p) {
                return Err(TransportError::NotConnected);
            }
        }
        for &peer in &self.connections {
            if target.includes(peer) {
                self.hub.post(self.id, peer, Body::Data(payload.to_vec()));
            }
        }
        Ok(())
    }

    fn get_packet(&mut self) -> Option<Packet> {
        if let Some(p) = self.local.pop_front() {
            return Some(p);
        }
        loop {
            match self.inbox.try_recv() {
                Ok(env) => {
                    let from = env.from;
                    if let Some(kind) = self.handle(env) {
                        return Some(Packet::new(from, kind));
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    fn shutdown(&mut self) {
        for peer in self.connections.drain().collect::<Vec<_>>() {
            self.hub.post(self.id, peer, Body::Disconnect);
        }
        if let Some((port, _)) = self.hosting.take() {
            let mut st = self.hub.lock();
            if st.listeners.get(&port) == Some(&self.id) {
                st.listeners.remove(&port);
            }
        }
    }
}
