//! Wire protocol and packet transports shared by the server and client.
#![forbid(unsafe_code)]

pub mod codec;
pub mod loopback;
pub mod protocol;
pub mod transport;
pub mod udp;

pub use codec::{DecodeError, Reader, Writer};
pub use loopback::{LoopbackHub, LoopbackTransport};
pub use protocol::{
    ChunkPlacement, JoinReason, LeaveReason, MAX_DOWNLOAD_ENTRIES, Message, MessageType, Origin,
    PlayerStateWire, Priority, Reliability, SendMode, download_messages, download_ranges,
    linear_to_voxel, pack_block, transferable, unpack_block,
};
pub use transport::{Packet, PacketKind, PeerId, Target, Transport, TransportError};
pub use udp::UdpTransport;

/// Default game port.
pub const DEFAULT_PORT: u16 = 16660;
