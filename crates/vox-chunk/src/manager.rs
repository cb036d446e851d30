use std::collections::BTreeMap;

use hashbrown::HashMap;
use vox_blocks::{ChunkKey, HookCtx};
use vox_geom::{IVec3, Quat, Vec3};

use crate::chunk::Chunk;
use crate::neighborhood::ChunkNeighborhood;
use crate::{ChunkId, NeighborhoodId, NeighborhoodKey};

/// Overflow directions, checked in this order.
const AXIS_ORDER: [IVec3; 6] = [
    IVec3::new(1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 0, -1),
];

/// Outcome of resolving an out-of-bounds voxel to the chunk that holds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NeighborResolution {
    pub chunk: ChunkKey,
    pub created_chunk: bool,
    pub created_neighborhood: bool,
}

/// Unit offset for the first axis `pos` overflows in a chunk of `dims`.
pub fn overflow_direction(pos: IVec3, dims: IVec3) -> Option<IVec3> {
    let over = [
        pos.x >= dims.x,
        pos.y >= dims.y,
        pos.z >= dims.z,
        pos.x < 0,
        pos.y < 0,
        pos.z < 0,
    ];
    over.iter().position(|&o| o).map(|i| AXIS_ORDER[i])
}

/// Sole owner of every chunk and neighborhood. Chunks and neighborhoods
/// refer to each other only through keys handed out here.
#[derive(Default)]
pub struct ChunkManager {
    chunks: BTreeMap<ChunkKey, Chunk>,
    neighborhoods: BTreeMap<NeighborhoodKey, ChunkNeighborhood>,
    next_chunk: u32,
    next_neighborhood: u32,
    chunk_ids: HashMap<ChunkId, ChunkKey>,
    neighborhood_ids: HashMap<NeighborhoodId, NeighborhoodKey>,
}

impl ChunkManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_chunk(&mut self, w: u8, h: u8, d: u8) -> ChunkKey {
        self.next_chunk += 1;
        let key = ChunkKey(self.next_chunk);
        let mut chunk = Chunk::new(w, h, d);
        chunk.key = key;
        self.chunks.insert(key, chunk);
        log::debug!(target: "chunk", "created chunk {:?} {}x{}x{}", key, w, h, d);
        key
    }

    pub fn create_neighborhood(&mut self, position: Vec3, rotation: Quat) -> NeighborhoodKey {
        self.next_neighborhood += 1;
        let key = NeighborhoodKey(self.next_neighborhood);
        self.neighborhoods
            .insert(key, ChunkNeighborhood::new(position, rotation));
        log::debug!(target: "chunk", "created neighborhood {:?} at {:?}", key, position);
        key
    }

    #[inline]
    pub fn chunk(&self, key: ChunkKey) -> Option<&Chunk> {
        self.chunks.get(&key)
    }

    #[inline]
    pub fn chunk_mut(&mut self, key: ChunkKey) -> Option<&mut Chunk> {
        self.chunks.get_mut(&key)
    }

    #[inline]
    pub fn neighborhood(&self, key: NeighborhoodKey) -> Option<&ChunkNeighborhood> {
        self.neighborhoods.get(&key)
    }

    #[inline]
    pub fn neighborhood_mut(&mut self, key: NeighborhoodKey) -> Option<&mut ChunkNeighborhood> {
        self.neighborhoods.get_mut(&key)
    }

    pub fn chunk_by_id(&self, id: ChunkId) -> Option<ChunkKey> {
        if id == 0 {
            return None;
        }
        self.chunk_ids.get(&id).copied()
    }

    pub fn neighborhood_by_id(&self, id: NeighborhoodId) -> Option<NeighborhoodKey> {
        if id == 0 {
            return None;
        }
        self.neighborhood_ids.get(&id).copied()
    }

    /// Binds a network id to a chunk. Fails if another chunk already holds it.
    pub fn assign_chunk_id(&mut self, key: ChunkKey, id: ChunkId) -> bool {
        if id != 0 && self.chunk_ids.get(&id).is_some_and(|k| *k != key) {
            log::warn!(target: "chunk", "chunk id {} already in use", id);
            return false;
        }
        let Some(chunk) = self.chunks.get_mut(&key) else {
            return false;
        };
        if chunk.id != 0 {
            self.chunk_ids.remove(&chunk.id);
        }
        chunk.id = id;
        if id != 0 {
            self.chunk_ids.insert(id, key);
        }
        true
    }

    pub fn assign_neighborhood_id(&mut self, key: NeighborhoodKey, id: NeighborhoodId) -> bool {
        if id != 0 && self.neighborhood_ids.get(&id).is_some_and(|k| *k != key) {
            log::warn!(target: "chunk", "neighborhood id {} already in use", id);
            return false;
        }
        let Some(neigh) = self.neighborhoods.get_mut(&key) else {
            return false;
        };
        if neigh.id != 0 {
            self.neighborhood_ids.remove(&neigh.id);
        }
        neigh.id = id;
        if id != 0 {
            self.neighborhood_ids.insert(id, key);
        }
        true
    }

    /// Moves `chunk` into `neigh` at lattice slot `pin` and derives its transform.
    pub fn set_neighborhood(&mut self, chunk: ChunkKey, neigh: NeighborhoodKey, pin: IVec3) -> bool {
        let Some(dims) = self.chunks.get(&chunk).map(Chunk::dims) else {
            return false;
        };
        let Some(target) = self.neighborhoods.get(&neigh) else {
            return false;
        };
        if !target.accepts(dims) {
            log::warn!(
                target: "chunk",
                "chunk {:?} {:?} does not match neighborhood {:?} dims {:?}",
                chunk, dims, neigh, target.chunk_dims()
            );
            return false;
        }
        if target.member_at(pin).is_some_and(|k| k != chunk) {
            log::warn!(target: "chunk", "lattice slot {:?} of {:?} is taken", pin, neigh);
            return false;
        }
        self.leave_neighborhood(chunk);
        if let Some(n) = self.neighborhoods.get_mut(&neigh) {
            n.join(chunk, pin, dims);
        }
        if let Some(c) = self.chunks.get_mut(&chunk) {
            c.neighborhood = Some(neigh);
            c.pin = pin;
        }
        self.update_chunk_transform(chunk);
        true
    }

    /// Detaches `chunk` from its group; it keeps its last world transform.
    pub fn leave_neighborhood(&mut self, chunk: ChunkKey) {
        let Some(c) = self.chunks.get_mut(&chunk) else {
            return;
        };
        let Some(old) = c.neighborhood.take() else {
            return;
        };
        c.pin = IVec3::ZERO;
        if let Some(n) = self.neighborhoods.get_mut(&old) {
            n.leave(chunk);
            if n.is_empty() {
                log::debug!(target: "chunk", "neighborhood {:?} (id {}) now empty", old, n.id);
            }
        }
    }

    /// Returns the chunk's neighborhood, creating one at its current transform if needed.
    /// The flag reports whether a neighborhood was created.
    pub fn ensure_neighborhood(&mut self, chunk: ChunkKey) -> Option<(NeighborhoodKey, bool)> {
        let c = self.chunks.get(&chunk)?;
        if let Some(n) = c.neighborhood {
            return Some((n, false));
        }
        let (position, rotation) = (c.position, c.rotation);
        let neigh = self.create_neighborhood(position, rotation);
        self.set_neighborhood(chunk, neigh, IVec3::ZERO);
        Some((neigh, true))
    }

    /// Finds or creates the chunk holding `vxpos`, given in `chunk`'s voxel space.
    ///
    /// In-bounds positions resolve to `chunk` itself. Otherwise existing members
    /// of the neighborhood are searched first; failing that, one same-sized chunk
    /// is created in the slot adjacent along the first overflowing axis.
    pub fn get_or_create_neighbor_containing(
        &mut self,
        chunk: ChunkKey,
        vxpos: IVec3,
    ) -> Option<NeighborResolution> {
        let origin = self.chunks.get(&chunk)?;
        if origin.in_bounds(vxpos) {
            return Some(NeighborResolution {
                chunk,
                created_chunk: false,
                created_neighborhood: false,
            });
        }
        let world = origin.voxel_to_world(vxpos);
        let dims = origin.dims_ivec();
        let (w, h, d) = origin.dims();

        if let Some(found) = self.find_member_containing(chunk, world) {
            return Some(NeighborResolution {
                chunk: found,
                created_chunk: false,
                created_neighborhood: false,
            });
        }

        let (neigh, created_neighborhood) = self.ensure_neighborhood(chunk)?;
        let dir = overflow_direction(vxpos, dims)?;
        let pin = self.chunks.get(&chunk)?.pin + dir;
        if let Some(existing) = self.neighborhoods.get(&neigh)?.member_at(pin) {
            return Some(NeighborResolution {
                chunk: existing,
                created_chunk: false,
                created_neighborhood,
            });
        }

        let created = self.create_chunk(w, h, d);
        if !self.set_neighborhood(created, neigh, pin) {
            self.chunks.remove(&created);
            return None;
        }
        log::info!(
            target: "chunk",
            "grew neighborhood {:?}: chunk {:?} at {:?} (overflow {:?} from {:?})",
            neigh, created, pin, dir, chunk
        );
        Some(NeighborResolution {
            chunk: created,
            created_chunk: true,
            created_neighborhood,
        })
    }

    fn find_member_containing(&self, chunk: ChunkKey, world: Vec3) -> Option<ChunkKey> {
        let neigh = self.chunks.get(&chunk)?.neighborhood?;
        self.neighborhoods
            .get(&neigh)?
            .members()
            .iter()
            .copied()
            .filter(|k| *k != chunk)
            .find(|k| {
                self.chunks
                    .get(k)
                    .is_some_and(|m| m.in_bounds(m.world_to_voxel(world)))
            })
    }

    /// Like [`Self::get_or_create_neighbor_containing`], also mapping `vxpos`
    /// into the resolved chunk's voxel space.
    pub fn resolve_voxel(
        &mut self,
        chunk: ChunkKey,
        vxpos: IVec3,
    ) -> Option<(NeighborResolution, IVec3)> {
        let res = self.get_or_create_neighbor_containing(chunk, vxpos)?;
        if res.chunk == chunk {
            return Some((res, vxpos));
        }
        let src = self.chunks.get(&chunk)?;
        let dst = self.chunks.get(&res.chunk)?;
        let local = if src.neighborhood.is_some() && src.neighborhood == dst.neighborhood {
            // Exact lattice arithmetic; avoids float round-off at cell borders.
            vxpos + (src.pin - dst.pin).mul_elem(src.dims_ivec())
        } else {
            dst.world_to_voxel(src.voxel_to_world(vxpos))
        };
        Some((res, local))
    }

    /// Recomputes a grouped chunk's world transform from its lattice slot.
    pub fn update_chunk_transform(&mut self, chunk: ChunkKey) -> bool {
        let Some(c) = self.chunks.get(&chunk) else {
            return false;
        };
        let Some(t) = c
            .neighborhood
            .and_then(|n| self.neighborhoods.get(&n))
            .map(|n| n.chunk_transform(c.pin))
        else {
            return false;
        };
        if let Some(c) = self.chunks.get_mut(&chunk) {
            c.position = t.position;
            c.rotation = t.rotation;
        }
        true
    }

    pub fn update_chunk_transforms(&mut self, neigh: NeighborhoodKey) {
        let members = match self.neighborhoods.get(&neigh) {
            Some(n) => n.members().to_vec(),
            None => return,
        };
        for key in members {
            self.update_chunk_transform(key);
        }
    }

    pub fn set_neighborhood_transform(
        &mut self,
        neigh: NeighborhoodKey,
        position: Vec3,
        rotation: Quat,
    ) -> bool {
        let Some(n) = self.neighborhoods.get_mut(&neigh) else {
            return false;
        };
        n.position = position;
        n.rotation = rotation;
        self.update_chunk_transforms(neigh);
        true
    }

    /// Removes a chunk, breaking its dynamic blocks. The caller owns physics cleanup.
    pub fn destroy_chunk(&mut self, key: ChunkKey, ctx: &HookCtx) -> Option<Chunk> {
        self.leave_neighborhood(key);
        let mut chunk = self.chunks.remove(&key)?;
        if chunk.id != 0 {
            self.chunk_ids.remove(&chunk.id);
        }
        chunk.teardown(ctx);
        log::debug!(target: "chunk", "destroyed chunk {:?} (id {})", key, chunk.id);
        Some(chunk)
    }

    /// Drops a neighborhood. Members are detached and keep their current transforms.
    pub fn discard_neighborhood(&mut self, key: NeighborhoodKey) -> bool {
        let Some(n) = self.neighborhoods.remove(&key) else {
            return false;
        };
        for member in n.members() {
            if let Some(c) = self.chunks.get_mut(member) {
                c.neighborhood = None;
                c.pin = IVec3::ZERO;
            }
        }
        if n.id != 0 {
            self.neighborhood_ids.remove(&n.id);
        }
        log::debug!(target: "chunk", "discarded neighborhood {:?} (id {})", key, n.id);
        true
    }

    /// Chunk keys in creation order.
    pub fn chunk_keys(&self) -> Vec<ChunkKey> {
        self.chunks.keys().copied().collect()
    }

    pub fn neighborhood_keys(&self) -> Vec<NeighborhoodKey> {
        self.neighborhoods.keys().copied().collect()
    }

    pub fn chunks_mut(&mut self) -> impl Iterator<Item = (ChunkKey, &mut Chunk)> {
        self.chunks.iter_mut().map(|(k, c)| (*k, c))
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn neighborhood_count(&self) -> usize {
        self.neighborhoods.len()
    }
}
