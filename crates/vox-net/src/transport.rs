//! Transport seam: connection events and opaque payload delivery.

use crate::protocol::SendMode;

/// Transport-level address of a connected endpoint.
pub type PeerId = u32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PacketKind {
    /// Server side: a client finished the handshake.
    NewIncomingConnection,
    /// Client side: the server accepted us.
    ConnectionAccepted,
    /// Client side: the handshake was refused or timed out.
    ConnectionFailed,
    /// The remote end closed the connection.
    DisconnectionNotification,
    /// The remote end stopped answering.
    ConnectionLost,
    Data(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub from: PeerId,
    pub kind: PacketKind,
}

impl Packet {
    pub fn new(from: PeerId, kind: PacketKind) -> Self {
        Self { from, kind }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Peer(PeerId),
    All,
    AllExcept(PeerId),
}

impl Target {
    #[inline]
    pub fn includes(self, peer: PeerId) -> bool {
        match self {
            Target::Peer(p) => p == peer,
            Target::All => true,
            Target::AllExcept(p) => p != peer,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not connected")]
    NotConnected,
    #[error("transport is not hosting")]
    NotHosting,
    #[error("bad address {0}")]
    BadAddress(String),
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Packet transport with connection events. Polled once per tick.
pub trait Transport {
    /// Start accepting up to `max_connections` peers on `port`.
    fn host(&mut self, port: u16, max_connections: usize) -> Result<(), TransportError>;

    /// Begin connecting to a server. Completion arrives as a packet.
    fn connect(&mut self, address: &str, port: u16) -> Result<(), TransportError>;

    /// Pump timers, resends, and keepalives.
    fn update(&mut self) {}

    fn send(&mut self, payload: &[u8], mode: SendMode, target: Target)
    -> Result<(), TransportError>;

    fn broadcast(&mut self, payload: &[u8], mode: SendMode) -> Result<(), TransportError> {
        self.send(payload, mode, Target::All)
    }

    /// Next queued packet, if any.
    fn get_packet(&mut self) -> Option<Packet>;

    /// Notify peers and close. Further sends fail with `NotConnected`.
    fn shutdown(&mut self);
}
