//! Voxel meshing and chunk colliders.
#![forbid(unsafe_code)]

pub mod generator;
pub mod greedy;
pub mod mesher;
pub mod packing;
pub mod physics;

pub use generator::{ChunkMesh, ChunkMeshGenerator, collider_from_buffers};
pub use greedy::GreedyMesher;
pub use mesher::{MeshBuffers, MeshStatus, Mesher, VoxelInput, VoxelTables};
pub use packing::{fits_vertex_range, pack_vertex, unpack_vertex, vertex_to_model};
pub use physics::{PhysicsWorld, RaycastHit, TriangleWorld};
