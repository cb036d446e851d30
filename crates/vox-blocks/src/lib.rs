//! Block kinds, placed blocks, and the fixed-capacity block registry.
#![forbid(unsafe_code)]

pub mod builtin;
pub mod config;
pub mod dynamic;
pub mod registry;
pub mod types;

pub use dynamic::{BlockFactory, DynamicBlock};
pub use registry::{BlockDescriptor, BlockInfo, BlockRegistry, GeometryEntry, RegistryError};
pub use types::{
    Block, BlockId, BlockSite, ChunkKey, Face, GeometryKind, HookCtx, Orientation, PlayerId, Side,
};
