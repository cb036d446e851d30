//! Chunks, neighborhoods, and the manager that owns them.
#![forbid(unsafe_code)]

pub mod chunk;
pub mod collider;
pub mod manager;
pub mod neighborhood;

pub use chunk::Chunk;
pub use collider::TriMesh;
pub use manager::{ChunkManager, NeighborResolution, overflow_direction};
pub use neighborhood::ChunkNeighborhood;
pub use vox_blocks::ChunkKey;

/// Server-assigned chunk id on the wire; 0 = unassigned.
pub type ChunkId = u16;
/// Server-assigned neighborhood id on the wire; 0 = none.
pub type NeighborhoodId = u16;

/// Arena handle of a neighborhood inside [`ChunkManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NeighborhoodKey(pub u32);
