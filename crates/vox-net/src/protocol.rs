//! Message catalog, wire layout and delivery policy.

use vox_blocks::{Block, BlockId, Orientation, PlayerId};
use vox_chunk::{ChunkId, NeighborhoodId};
use vox_geom::{IVec3, Quat, Vec3};

use crate::codec::{DecodeError, Reader, Writer};

/// First message id available to the game; lower ids belong to the transport.
pub const FIRST_USER_MESSAGE: u8 = 134;
/// Entries per bulk-download packet.
pub const MAX_DOWNLOAD_ENTRIES: usize = 245;
/// Chunks larger than this in any dimension are never sent as bulk content.
pub const MAX_TRANSFER_DIM: u8 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    RemoteJoin = FIRST_USER_MESSAGE,
    RemoteLeave,
    UpdatePlayerState,
    SetPlayerName,
    SetPlayerTeam,
    SetPlayerSector,
    SetBlock,
    NewChunk,
    RemoveChunk,
    SetNeighborhoodTransform,
    SetChunkNeighborhood,
    ChunkDownload,
    PlayerInteract,
}

impl MessageType {
    /// Ids the game understands. Player name/team/sector are reserved.
    pub fn from_id(id: u8) -> Result<Self, DecodeError> {
        use MessageType::*;
        let t = match id.wrapping_sub(FIRST_USER_MESSAGE) {
            0 => RemoteJoin,
            1 => RemoteLeave,
            2 => UpdatePlayerState,
            6 => SetBlock,
            7 => NewChunk,
            8 => RemoveChunk,
            9 => SetNeighborhoodTransform,
            10 => SetChunkNeighborhood,
            11 => ChunkDownload,
            12 => PlayerInteract,
            _ => return Err(DecodeError::UnknownType(id)),
        };
        Ok(t)
    }
}

/// Who produced the bytes being decoded. Some layouts differ by direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Server,
    Client,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reliability {
    Unreliable,
    UnreliableSequenced,
    Reliable,
    ReliableOrdered,
}

impl Reliability {
    #[inline]
    pub fn is_reliable(self) -> bool {
        matches!(self, Reliability::Reliable | Reliability::ReliableOrdered)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Immediate,
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendMode {
    pub reliability: Reliability,
    pub priority: Priority,
}

impl SendMode {
    pub const fn new(reliability: Reliability, priority: Priority) -> Self {
        Self {
            reliability,
            priority,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinReason {
    /// Another player joined.
    Joined = 0,
    /// The receiver's own player id.
    Welcome = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaveReason {
    Disconnected = 0,
    Lost = 1,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerStateWire {
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: Quat,
    pub eye_orientation: Quat,
}

impl Default for PlayerStateWire {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            eye_orientation: Quat::IDENTITY,
        }
    }
}

/// Where a newly announced chunk sits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChunkPlacement {
    /// Standalone chunk with its own transform.
    Explicit { position: Vec3, rotation: Quat },
    /// Lattice slot inside the announced neighborhood.
    Lattice(IVec3),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    RemoteJoin {
        player: PlayerId,
        reason: JoinReason,
    },
    RemoteLeave {
        player: PlayerId,
        reason: LeaveReason,
    },
    /// `player` is present only on the server-to-client form.
    UpdatePlayerState {
        player: Option<PlayerId>,
        state: PlayerStateWire,
    },
    SetBlock {
        chunk: ChunkId,
        pos: IVec3,
        block: u16,
    },
    PlayerInteract {
        chunk: ChunkId,
        pos: IVec3,
    },
    NewChunk {
        chunk: ChunkId,
        neighborhood: NeighborhoodId,
        dims: (u8, u8, u8),
        placement: ChunkPlacement,
    },
    RemoveChunk {
        chunk: ChunkId,
    },
    SetChunkNeighborhood {
        chunk: ChunkId,
        neighborhood: NeighborhoodId,
        pin: IVec3,
    },
    SetNeighborhoodTransform {
        neighborhood: NeighborhoodId,
        position: Vec3,
        rotation: Quat,
    },
    ChunkDownload {
        chunk: ChunkId,
        offset: u16,
        entries: Vec<u16>,
    },
    /// Client-to-server form of ChunkDownload; chunk 0 asks for everything.
    RefreshRequest {
        chunk: ChunkId,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::RemoteJoin { .. } => MessageType::RemoteJoin,
            Message::RemoteLeave { .. } => MessageType::RemoteLeave,
            Message::UpdatePlayerState { .. } => MessageType::UpdatePlayerState,
            Message::SetBlock { .. } => MessageType::SetBlock,
            Message::PlayerInteract { .. } => MessageType::PlayerInteract,
            Message::NewChunk { .. } => MessageType::NewChunk,
            Message::RemoveChunk { .. } => MessageType::RemoveChunk,
            Message::SetChunkNeighborhood { .. } => MessageType::SetChunkNeighborhood,
            Message::SetNeighborhoodTransform { .. } => MessageType::SetNeighborhoodTransform,
            Message::ChunkDownload { .. } | Message::RefreshRequest { .. } => {
                MessageType::ChunkDownload
            }
        }
    }

    pub fn reliability(&self) -> Reliability {
        match self {
            Message::UpdatePlayerState { .. } => Reliability::UnreliableSequenced,
            Message::SetBlock { .. }
            | Message::NewChunk { .. }
            | Message::ChunkDownload { .. }
            | Message::RefreshRequest { .. } => Reliability::ReliableOrdered,
            _ => Reliability::Reliable,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Message::UpdatePlayerState { player: None, .. } => Priority::Medium,
            Message::UpdatePlayerState { .. } => Priority::Low,
            Message::ChunkDownload { .. } | Message::SetNeighborhoodTransform { .. } => {
                Priority::Medium
            }
            _ => Priority::High,
        }
    }

    pub fn send_mode(&self) -> SendMode {
        SendMode::new(self.reliability(), self.priority())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(32);
        w.u8(self.message_type() as u8);
        match self {
            Message::RemoteJoin { player, reason } => {
                w.u16(*player).u8(*reason as u8);
            }
            Message::RemoteLeave { player, reason } => {
                w.u16(*player).u8(*reason as u8);
            }
            Message::UpdatePlayerState { player, state } => {
                if let Some(p) = player {
                    w.u16(*p);
                }
                w.vec3(state.position)
                    .vec3(state.velocity)
                    .quat(state.orientation)
                    .quat(state.eye_orientation);
            }
            Message::SetBlock { chunk, pos, block } => {
                w.u16(*chunk).ivec3(*pos).u16(*block);
            }
            Message::PlayerInteract { chunk, pos } => {
                w.u16(*chunk).ivec3(*pos);
            }
            Message::NewChunk {
                chunk,
                neighborhood,
                dims,
                placement,
            } => {
                w.u16(*chunk).u16(*neighborhood).u8(dims.0).u8(dims.1).u8(dims.2);
                match placement {
                    ChunkPlacement::Explicit { position, rotation } => {
                        w.vec3(*position).quat(*rotation);
                    }
                    ChunkPlacement::Lattice(pin) => {
                        w.ivec3(*pin);
                    }
                }
            }
            Message::RemoveChunk { chunk } => {
                w.u16(*chunk);
            }
            Message::SetChunkNeighborhood {
                chunk,
                neighborhood,
                pin,
            } => {
                w.u16(*chunk).u16(*neighborhood).ivec3(*pin);
            }
            Message::SetNeighborhoodTransform {
                neighborhood,
                position,
                rotation,
            } => {
                w.u16(*neighborhood).vec3(*position).quat(*rotation);
            }
            Message::ChunkDownload {
                chunk,
                offset,
                entries,
            } => {
                if entries.len() > MAX_DOWNLOAD_ENTRIES {
                    log::warn!(
                        target: "net",
                        "chunk download with {} entries truncated to {}",
                        entries.len(), MAX_DOWNLOAD_ENTRIES
                    );
                }
                let n = entries.len().min(MAX_DOWNLOAD_ENTRIES);
                w.u16(*chunk).u16(*offset).u8(n as u8);
                for e in &entries[..n] {
                    w.u16(*e);
                }
            }
            Message::RefreshRequest { chunk } => {
                w.u16(*chunk);
            }
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8], origin: Origin) -> Result<Message, DecodeError> {
        let mut r = Reader::new(bytes);
        let id = r.u8().map_err(|_| DecodeError::Empty)?;
        let msg = match MessageType::from_id(id)? {
            MessageType::RemoteJoin => Message::RemoteJoin {
                player: r.u16()?,
                reason: match r.u8()? {
                    0 => JoinReason::Joined,
                    1 => JoinReason::Welcome,
                    v => {
                        return Err(DecodeError::InvalidValue {
                            field: "join reason",
                            value: v as u32,
                        });
                    }
                },
            },
            MessageType::RemoteLeave => Message::RemoteLeave {
                player: r.u16()?,
                reason: match r.u8()? {
                    0 => LeaveReason::Disconnected,
                    1 => LeaveReason::Lost,
                    v => {
                        return Err(DecodeError::InvalidValue {
                            field: "leave reason",
                            value: v as u32,
                        });
                    }
                },
            },
            MessageType::UpdatePlayerState => {
                let player = match origin {
                    Origin::Server => Some(r.u16()?),
                    Origin::Client => None,
                };
                Message::UpdatePlayerState {
                    player,
                    state: PlayerStateWire {
                        position: r.vec3()?,
                        velocity: r.vec3()?,
                        orientation: r.quat()?,
                        eye_orientation: r.quat()?,
                    },
                }
            }
            MessageType::SetBlock => Message::SetBlock {
                chunk: r.u16()?,
                pos: r.ivec3()?,
                block: r.u16()?,
            },
            MessageType::PlayerInteract => Message::PlayerInteract {
                chunk: r.u16()?,
                pos: r.ivec3()?,
            },
            MessageType::NewChunk => {
                let chunk = r.u16()?;
                let neighborhood = r.u16()?;
                let dims = (r.u8()?, r.u8()?, r.u8()?);
                let placement = if neighborhood == 0 {
                    ChunkPlacement::Explicit {
                        position: r.vec3()?,
                        rotation: r.quat()?,
                    }
                } else {
                    ChunkPlacement::Lattice(r.ivec3()?)
                };
                Message::NewChunk {
                    chunk,
                    neighborhood,
                    dims,
                    placement,
                }
            }
            MessageType::RemoveChunk => Message::RemoveChunk { chunk: r.u16()? },
            MessageType::SetChunkNeighborhood => Message::SetChunkNeighborhood {
                chunk: r.u16()?,
                neighborhood: r.u16()?,
                pin: r.ivec3()?,
            },
            MessageType::SetNeighborhoodTransform => Message::SetNeighborhoodTransform {
                neighborhood: r.u16()?,
                position: r.vec3()?,
                rotation: r.quat()?,
            },
            MessageType::ChunkDownload => match origin {
                Origin::Client => Message::RefreshRequest { chunk: r.u16()? },
                Origin::Server => {
                    let chunk = r.u16()?;
                    let offset = r.u16()?;
                    let count = r.u8()? as usize;
                    if count > MAX_DOWNLOAD_ENTRIES {
                        return Err(DecodeError::TooManyEntries(count));
                    }
                    let mut entries = Vec::with_capacity(count);
                    for _ in 0..count {
                        entries.push(r.u16()?);
                    }
                    Message::ChunkDownload {
                        chunk,
                        offset,
                        entries,
                    }
                }
            },
            MessageType::SetPlayerName | MessageType::SetPlayerTeam | MessageType::SetPlayerSector => {
                return Err(DecodeError::UnknownType(id));
            }
        };
        r.finish()?;
        Ok(msg)
    }
}

/// `id << 2 | orientation`; id 0 means "remove the block".
#[inline]
pub fn pack_block(id: BlockId, orientation: Orientation) -> u16 {
    Block::new(id, orientation).packed()
}

#[inline]
pub fn unpack_block(v: u16) -> (BlockId, Orientation) {
    let b = Block::from_packed(v);
    (b.id, b.orientation)
}

/// Splits `total` linear entries into `(offset, count)` ranges of at most 245.
pub fn download_ranges(total: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..total)
        .step_by(MAX_DOWNLOAD_ENTRIES)
        .map(move |start| (start, MAX_DOWNLOAD_ENTRIES.min(total - start)))
}

/// Linear download index to voxel coordinates: z fastest, then y, then x.
#[inline]
pub fn linear_to_voxel(index: usize, dims: (u8, u8, u8)) -> IVec3 {
    let (w, h, d) = (dims.0 as usize, dims.1 as usize, dims.2 as usize);
    IVec3::new(
        ((index / d / h) % w) as i32,
        ((index / d) % h) as i32,
        (index % d) as i32,
    )
}

/// Whether a chunk of `dims` may be sent as bulk content.
#[inline]
pub fn transferable(dims: (u8, u8, u8)) -> bool {
    dims.0 <= MAX_TRANSFER_DIM && dims.1 <= MAX_TRANSFER_DIM && dims.2 <= MAX_TRANSFER_DIM
}

/// Bulk-download packets for a chunk's packed block grid, in linear order.
pub fn download_messages(chunk: ChunkId, packed: &[u16]) -> Vec<Message> {
    download_ranges(packed.len())
        .map(|(offset, count)| Message::ChunkDownload {
            chunk,
            offset: offset as u16,
            entries: packed[offset..offset + count].to_vec(),
        })
        .collect()
}
