//! Per-process world context: registry, chunk graph, meshing and physics.

use std::collections::BTreeMap;
use std::sync::Arc;

use vox_blocks::{BlockRegistry, ChunkKey, HookCtx, PlayerId, Side};
use vox_chunk::ChunkManager;
use vox_geom::Vec3;
use vox_mesh::{ChunkMesh, ChunkMeshGenerator, PhysicsWorld, RaycastHit, TriangleWorld};
use vox_net::{Message, linear_to_voxel, transferable, unpack_block};

use crate::error::HandlerError;

pub struct World {
    registry: Arc<BlockRegistry>,
    chunks: ChunkManager,
    generator: ChunkMeshGenerator,
    physics: TriangleWorld,
    side: Side,
    meshes: BTreeMap<ChunkKey, ChunkMesh>,
}

impl World {
    pub fn new(registry: Arc<BlockRegistry>, side: Side) -> Self {
        Self {
            generator: ChunkMeshGenerator::greedy(Arc::clone(&registry)),
            registry,
            chunks: ChunkManager::new(),
            physics: TriangleWorld::new(),
            side,
            meshes: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn chunks(&self) -> &ChunkManager {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> &mut ChunkManager {
        &mut self.chunks
    }

    pub fn physics(&self) -> &TriangleWorld {
        &self.physics
    }

    /// Hook context for this side; the player is dropped on clients.
    pub fn hook_ctx(&self, player: Option<PlayerId>) -> HookCtx {
        match self.side {
            Side::Server => HookCtx::server(player),
            Side::Client => HookCtx::client(),
        }
    }

    /// Last mesh built for `key`. Only kept on the client.
    pub fn mesh(&self, key: ChunkKey) -> Option<&ChunkMesh> {
        self.meshes.get(&key)
    }

    /// One simulation step. Returns how many chunks were re-meshed.
    pub fn tick(&mut self) -> usize {
        let ctx = self.hook_ctx(None);
        let mut rebuilt = 0;
        for (key, chunk) in self.chunks.chunks_mut() {
            chunk.update_dynamics(&ctx);
            chunk.update_voxel_data(&self.registry);
            if chunk.in_simulation {
                self.physics.set_body_transform(key, chunk.transform());
            }
            if let Some(mesh) = self.generator.generate_if_dirty(key, chunk, &mut self.physics) {
                rebuilt += 1;
                if self.side == Side::Client {
                    self.meshes.insert(key, mesh);
                }
            }
        }
        rebuilt
    }

    /// Removes a chunk together with its physics body and cached mesh.
    pub fn destroy_chunk(&mut self, key: ChunkKey) -> bool {
        let ctx = self.hook_ctx(None);
        let Some(chunk) = self.chunks.destroy_chunk(key, &ctx) else {
            return false;
        };
        if chunk.in_simulation || self.physics.contains_body(key) {
            self.physics.remove_body(key);
        }
        self.meshes.remove(&key);
        true
    }

    pub fn raycast(&self, from: Vec3, to: Vec3) -> Option<RaycastHit> {
        self.physics.raycast(from, to)
    }

    /// Bulk-download packets for one chunk, in linear order.
    pub fn chunk_download_messages(&self, key: ChunkKey) -> Result<Vec<Message>, HandlerError> {
        let chunk = self
            .chunks
            .chunk(key)
            .ok_or(HandlerError::MissingChunk(key))?;
        if !transferable(chunk.dims()) {
            return Err(HandlerError::ChunkTooLarge {
                chunk: chunk.id,
                dims: chunk.dims(),
            });
        }
        Ok(vox_net::download_messages(chunk.id, &chunk.packed_blocks()))
    }

    /// Replays one bulk-download packet. Entries that already match are
    /// skipped so dynamic hooks do not fire again on refresh.
    pub fn apply_chunk_download(
        &mut self,
        key: ChunkKey,
        offset: u16,
        entries: &[u16],
    ) -> Result<usize, HandlerError> {
        let ctx = self.hook_ctx(None);
        let chunk = self
            .chunks
            .chunk_mut(key)
            .ok_or(HandlerError::MissingChunk(key))?;
        let dims = chunk.dims();
        let start = offset as usize;
        if start + entries.len() > chunk.volume() {
            return Err(HandlerError::OutOfBounds {
                chunk: chunk.id,
                pos: linear_to_voxel(start, dims),
            });
        }
        let mut applied = 0;
        for (i, packed) in entries.iter().enumerate() {
            let pos = linear_to_voxel(start + i, dims);
            let (id, orientation) = unpack_block(*packed);
            match chunk.get_block(pos) {
                None if id == 0 => continue,
                Some(b) if b.id == id && b.orientation == orientation => continue,
                _ => {}
            }
            if id == 0 {
                chunk.destroy_block(pos, &ctx);
            } else if chunk
                .create_block(&self.registry, pos, id, orientation, &ctx)
                .is_none()
            {
                log::warn!(target: "client", "download for chunk {} has invalid block id {}", chunk.id, id);
                continue;
            }
            applied += 1;
        }
        Ok(applied)
    }
}
