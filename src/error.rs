use vox_blocks::{BlockId, ChunkKey, RegistryError};
use vox_chunk::{ChunkId, NeighborhoodId};
use vox_geom::IVec3;
use vox_net::{DecodeError, MessageType, TransportError};

use crate::config::ConfigError;

/// Why a single packet was dropped. Never fatal; logged by the dispatch loop.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("unknown chunk id {0}")]
    UnknownChunk(ChunkId),
    #[error("no chunk for {0:?}")]
    MissingChunk(ChunkKey),
    #[error("unknown neighborhood id {0}")]
    UnknownNeighborhood(NeighborhoodId),
    /// Carries the peer id on the server and the player id on the client.
    #[error("unknown player {0}")]
    UnknownPlayer(u32),
    #[error("invalid block id {0}")]
    InvalidBlock(BlockId),
    #[error("voxel {pos:?} is outside chunk {chunk}")]
    OutOfBounds { chunk: ChunkId, pos: IVec3 },
    #[error("chunk {chunk} with dims {dims:?} is too large to transfer")]
    ChunkTooLarge { chunk: ChunkId, dims: (u8, u8, u8) },
    #[error("{0:?} is not valid in this direction")]
    Unexpected(MessageType),
    #[error("malformed packet: {0}")]
    Decode(#[from] DecodeError),
}

/// Failures that stop a binary before its loop starts.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("block registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("log file: {0}")]
    LogFile(#[from] std::io::Error),
    #[error("logger: {0}")]
    Logger(#[from] log::SetLoggerError),
}
