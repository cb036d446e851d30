use std::sync::Arc;

use vox_blocks::{BlockRegistry, ChunkKey};
use vox_chunk::{Chunk, TriMesh};
use vox_geom::Vec3;

use crate::greedy::GreedyMesher;
use crate::mesher::{MeshBuffers, MeshStatus, Mesher, VoxelInput, VoxelTables};
use crate::packing::vertex_to_model;
use crate::physics::PhysicsWorld;

/// Packed render data for one chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkMesh {
    pub chunk: ChunkKey,
    pub vertices: Vec<u32>,
    pub faces: Vec<u32>,
    pub status: MeshStatus,
}

impl ChunkMesh {
    #[inline]
    pub fn quad_count(&self) -> usize {
        self.faces.len()
    }
}

/// Turns a chunk's blocks into packed quads and a triangle collider.
pub struct ChunkMeshGenerator<M: Mesher = GreedyMesher> {
    registry: Arc<BlockRegistry>,
    mesher: M,
    buffers: MeshBuffers,
}

impl ChunkMeshGenerator<GreedyMesher> {
    pub fn greedy(registry: Arc<BlockRegistry>) -> Self {
        Self::new(registry, GreedyMesher::new())
    }
}

impl<M: Mesher> ChunkMeshGenerator<M> {
    pub fn new(registry: Arc<BlockRegistry>, mesher: M) -> Self {
        Self::with_buffers(registry, mesher, MeshBuffers::default())
    }

    pub fn with_buffers(registry: Arc<BlockRegistry>, mesher: M, buffers: MeshBuffers) -> Self {
        Self {
            registry,
            mesher,
            buffers,
        }
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Rebuilds voxel arrays, mesh and collider for `chunk`.
    ///
    /// The old body is removed from `physics` first; a new one is inserted
    /// only when the mesh has at least one quad.
    pub fn generate(
        &mut self,
        key: ChunkKey,
        chunk: &mut Chunk,
        physics: &mut dyn PhysicsWorld,
    ) -> ChunkMesh {
        chunk.update_voxel_data(&self.registry);

        self.buffers.clear();
        let status = {
            let input = VoxelInput::from_chunk(chunk);
            let tables = VoxelTables {
                geometry: self.registry.geometry_table(),
                textures: self.registry.texture_table(),
            };
            self.mesher.make_mesh(&input, &tables, &mut self.buffers)
        };
        match status {
            MeshStatus::OutOfRoom => log::warn!(
                target: "mesh",
                "mesh buffers full for chunk {:?} (id {}); keeping {} quads",
                key, chunk.id, self.buffers.quad_count()
            ),
            MeshStatus::TooLarge => log::warn!(
                target: "mesh",
                "chunk {:?} (id {}) with dims {:?} exceeds the vertex range; not meshed",
                key, chunk.id, chunk.dims()
            ),
            MeshStatus::Complete => {}
        }

        let quads = self.buffers.quad_count();
        let collider = Arc::new(collider_from_buffers(&self.buffers));

        if chunk.in_simulation || physics.contains_body(key) {
            physics.remove_body(key);
            chunk.in_simulation = false;
        }
        chunk.collider = None;
        if quads > 0 {
            physics.insert_body(key, Arc::clone(&collider), chunk.transform());
            chunk.collider = Some(collider);
            chunk.in_simulation = true;
        }
        chunk.num_quads = quads;
        chunk.voxels_dirty = false;
        chunk.physics_dirty = false;
        log::trace!(target: "mesh", "meshed chunk {:?}: {} quads", key, quads);

        ChunkMesh {
            chunk: key,
            vertices: self.buffers.vertices.clone(),
            faces: self.buffers.faces.clone(),
            status,
        }
    }

    /// Regenerates only when blocks, voxels or physics are stale.
    pub fn generate_if_dirty(
        &mut self,
        key: ChunkKey,
        chunk: &mut Chunk,
        physics: &mut dyn PhysicsWorld,
    ) -> Option<ChunkMesh> {
        if chunk.blocks_dirty || chunk.voxels_dirty || chunk.physics_dirty {
            Some(self.generate(key, chunk, physics))
        } else {
            None
        }
    }
}

/// Decodes every quad's four packed vertices and triangulates them.
pub fn collider_from_buffers(buffers: &MeshBuffers) -> TriMesh {
    let quads: Vec<[Vec3; 4]> = (0..buffers.quad_count())
        .map(|q| {
            let v = buffers.quad_vertices(q);
            [
                vertex_to_model(v[0]),
                vertex_to_model(v[1]),
                vertex_to_model(v[2]),
                vertex_to_model(v[3]),
            ]
        })
        .collect();
    TriMesh::from_quads(&quads)
}
