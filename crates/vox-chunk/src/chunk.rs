use std::sync::Arc;

use hashbrown::HashMap;
use vox_blocks::{
    Block, BlockId, BlockRegistry, BlockSite, ChunkKey, DynamicBlock, HookCtx, Orientation,
};
use vox_geom::{IVec3, Quat, Transform, Vec3};

use crate::collider::TriMesh;
use crate::{ChunkId, NeighborhoodKey};

/// Geometry code of an empty voxel.
pub const EMPTY_GEOMETRY: u8 = 0;
/// Occlusion byte that never hides a neighbor face.
pub const NO_OCCLUSION: u8 = 255;

/// A fixed-size grid of blocks plus the padded byte arrays the mesher reads.
pub struct Chunk {
    pub(crate) key: ChunkKey,
    pub id: ChunkId,
    w: u8,
    h: u8,
    d: u8,
    blocks: Vec<Block>,
    dynamics: HashMap<usize, Box<dyn DynamicBlock>>,
    geometry: Vec<u8>,
    rotation_bytes: Vec<u8>,
    occlusion: Vec<u8>,
    /// World position; derived from the neighborhood while grouped.
    pub position: Vec3,
    pub rotation: Quat,
    pub(crate) neighborhood: Option<NeighborhoodKey>,
    pub(crate) pin: IVec3,
    pub blocks_dirty: bool,
    pub voxels_dirty: bool,
    pub physics_dirty: bool,
    pub num_quads: usize,
    pub collider: Option<Arc<TriMesh>>,
    pub in_simulation: bool,
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("dims", &(self.w, self.h, self.d))
            .field("position", &self.position)
            .field("neighborhood", &self.neighborhood)
            .field("pin", &self.pin)
            .field("dynamics", &self.dynamics.len())
            .finish()
    }
}

impl Chunk {
    pub fn new(w: u8, h: u8, d: u8) -> Self {
        let volume = w as usize * h as usize * d as usize;
        let padded = (w as usize + 2) * (h as usize + 2) * (d as usize + 2);
        Chunk {
            key: ChunkKey(0),
            id: 0,
            w,
            h,
            d,
            blocks: vec![Block::EMPTY; volume],
            dynamics: HashMap::new(),
            geometry: vec![EMPTY_GEOMETRY; padded],
            rotation_bytes: vec![0; padded],
            occlusion: vec![NO_OCCLUSION; padded],
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            neighborhood: None,
            pin: IVec3::ZERO,
            blocks_dirty: false,
            voxels_dirty: true,
            physics_dirty: true,
            num_quads: 0,
            collider: None,
            in_simulation: false,
        }
    }

    #[inline]
    pub fn key(&self) -> ChunkKey {
        self.key
    }

    #[inline]
    pub fn dims(&self) -> (u8, u8, u8) {
        (self.w, self.h, self.d)
    }

    #[inline]
    pub fn dims_ivec(&self) -> IVec3 {
        IVec3::new(self.w as i32, self.h as i32, self.d as i32)
    }

    #[inline]
    pub fn volume(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn neighborhood(&self) -> Option<NeighborhoodKey> {
        self.neighborhood
    }

    #[inline]
    pub fn position_in_neighborhood(&self) -> IVec3 {
        self.pin
    }

    /// Negative components wrap to huge unsigned values, so one compare per axis suffices.
    #[inline]
    pub fn in_bounds(&self, pos: IVec3) -> bool {
        (pos.x as u32) < self.w as u32 && (pos.y as u32) < self.h as u32 && (pos.z as u32) < self.d as u32
    }

    /// Linear block index `z + y*d + x*d*h`. Caller checks bounds.
    #[inline]
    pub fn index(&self, pos: IVec3) -> usize {
        let (h, d) = (self.h as usize, self.d as usize);
        pos.z as usize + pos.y as usize * d + pos.x as usize * d * h
    }

    /// Inverse of [`Self::index`].
    #[inline]
    pub fn position_of(&self, index: usize) -> IVec3 {
        let (h, d) = (self.h as usize, self.d as usize);
        IVec3::new(
            (index / (d * h)) as i32,
            ((index / d) % h) as i32,
            (index % d) as i32,
        )
    }

    /// Index into the padded arrays for an in-bounds voxel.
    #[inline]
    pub fn padded_index(&self, pos: IVec3) -> usize {
        let (ph, pd) = (self.h as usize + 2, self.d as usize + 2);
        (pos.z as usize + 1) + (pos.y as usize + 1) * pd + (pos.x as usize + 1) * pd * ph
    }

    fn site(&self, index: usize) -> BlockSite {
        let p = self.position_of(index);
        BlockSite {
            chunk: self.key,
            x: p.x as u8,
            y: p.y as u8,
            z: p.z as u8,
            block: self.blocks[index],
        }
    }

    /// Places `id` at `pos`, replacing whatever was there.
    ///
    /// Returns `None` when the position is outside the chunk or the id is not
    /// registered. A replaced dynamic block gets `on_break` before the new kind
    /// is constructed; a new dynamic block gets `on_place`.
    pub fn create_block(
        &mut self,
        reg: &BlockRegistry,
        pos: IVec3,
        id: BlockId,
        orientation: Orientation,
        ctx: &HookCtx,
    ) -> Option<Block> {
        if !self.in_bounds(pos) {
            log::debug!(target: "chunk", "create_block out of bounds {:?} in {:?}", pos, self.key);
            return None;
        }
        let info = match reg.get(id) {
            Some(info) => info,
            None => {
                log::debug!(target: "chunk", "create_block with invalid id {}", id);
                return None;
            }
        };
        let idx = self.index(pos);
        if !self.blocks[idx].is_empty() {
            self.break_extension(idx, ctx);
        }
        let block = Block::new(id, orientation);
        self.blocks[idx] = block;
        if let Some(mut ext) = info.create_dynamic() {
            let site = self.site(idx);
            ext.on_place(&site, ctx);
            self.dynamics.insert(idx, ext);
        }
        self.blocks_dirty = true;
        Some(block)
    }

    /// Removes the block at `pos`. No-op for empty or out-of-bounds slots.
    pub fn destroy_block(&mut self, pos: IVec3, ctx: &HookCtx) -> Option<Block> {
        if !self.in_bounds(pos) {
            return None;
        }
        let idx = self.index(pos);
        let old = self.blocks[idx];
        if old.is_empty() {
            return None;
        }
        self.break_extension(idx, ctx);
        self.blocks[idx] = Block::EMPTY;
        self.blocks_dirty = true;
        Some(old)
    }

    fn break_extension(&mut self, idx: usize, ctx: &HookCtx) {
        if let Some(mut ext) = self.dynamics.remove(&idx) {
            let site = self.site(idx);
            ext.on_break(&site, ctx);
        }
    }

    #[inline]
    pub fn get_block(&self, pos: IVec3) -> Option<Block> {
        if !self.in_bounds(pos) {
            return None;
        }
        let b = self.blocks[self.index(pos)];
        if b.is_empty() { None } else { Some(b) }
    }

    /// Rotates an existing block in place without re-running its hooks.
    pub fn set_orientation(&mut self, pos: IVec3, orientation: Orientation) -> bool {
        if !self.in_bounds(pos) {
            return false;
        }
        let idx = self.index(pos);
        let b = &mut self.blocks[idx];
        if b.is_empty() {
            return false;
        }
        *b = Block::new(b.id, orientation);
        self.blocks_dirty = true;
        true
    }

    pub fn dynamic_mut(&mut self, pos: IVec3) -> Option<&mut (dyn DynamicBlock + 'static)> {
        if !self.in_bounds(pos) {
            return None;
        }
        let idx = self.index(pos);
        self.dynamics.get_mut(&idx).map(|b| b.as_mut())
    }

    #[inline]
    pub fn dynamic_count(&self) -> usize {
        self.dynamics.len()
    }

    /// Runs `on_interact` on the dynamic block at `pos`. False if there is none.
    pub fn interact(&mut self, pos: IVec3, ctx: &HookCtx) -> bool {
        if !self.in_bounds(pos) {
            return false;
        }
        let idx = self.index(pos);
        let site = self.site(idx);
        match self.dynamics.get_mut(&idx) {
            Some(ext) => {
                ext.on_interact(&site, ctx);
                true
            }
            None => false,
        }
    }

    pub fn update_dynamics(&mut self, ctx: &HookCtx) {
        if self.dynamics.is_empty() {
            return;
        }
        let (key, h, d) = (self.key, self.h as usize, self.d as usize);
        let blocks = &self.blocks;
        for (&idx, ext) in self.dynamics.iter_mut() {
            let site = BlockSite {
                chunk: key,
                x: (idx / (d * h)) as u8,
                y: ((idx / d) % h) as u8,
                z: (idx % d) as u8,
                block: blocks[idx],
            };
            ext.update(&site, ctx);
        }
    }

    /// Rebuilds the padded geometry/rotation/occlusion arrays if blocks changed.
    pub fn update_voxel_data(&mut self, reg: &BlockRegistry) -> bool {
        if !self.blocks_dirty {
            return false;
        }
        self.geometry.fill(EMPTY_GEOMETRY);
        self.rotation_bytes.fill(0);
        self.occlusion.fill(NO_OCCLUSION);
        for idx in 0..self.blocks.len() {
            let b = self.blocks[idx];
            if b.is_empty() {
                continue;
            }
            let Some(info) = reg.get(b.id) else { continue };
            let p = self.padded_index(self.position_of(idx));
            self.geometry[p] = info.voxel_id_for(b.orientation);
            self.rotation_bytes[p] = b.orientation;
            self.occlusion[p] = info.occlusion_byte();
        }
        self.blocks_dirty = false;
        self.voxels_dirty = true;
        self.physics_dirty = true;
        true
    }

    /// Center of voxel `pos` in world space.
    pub fn voxel_to_world(&self, pos: IVec3) -> Vec3 {
        let local = Vec3::new(
            pos.x as f32 + 1.5,
            pos.z as f32 + 1.5,
            -(pos.y as f32) - 1.5,
        );
        self.position + self.rotation.rotate(local)
    }

    pub fn world_to_voxel(&self, world: Vec3) -> IVec3 {
        let m = self.rotation.inverse().rotate(world - self.position);
        IVec3::new(
            (m.x - 1.0).floor() as i32,
            (-m.z - 1.0).floor() as i32,
            (m.y - 1.0).floor() as i32,
        )
    }

    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.rotation)
    }

    /// Breaks every dynamic block; used right before the chunk is dropped.
    pub fn teardown(&mut self, ctx: &HookCtx) {
        let mut indices: Vec<usize> = self.dynamics.keys().copied().collect();
        indices.sort_unstable();
        for idx in indices {
            self.break_extension(idx, ctx);
        }
        self.collider = None;
        self.num_quads = 0;
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Blocks in linear index order, packed as `id << 2 | orientation`.
    pub fn packed_blocks(&self) -> Vec<u16> {
        self.blocks.iter().map(Block::packed).collect()
    }

    pub fn geometry_bytes(&self) -> &[u8] {
        &self.geometry
    }

    pub fn rotation_bytes(&self) -> &[u8] {
        &self.rotation_bytes
    }

    pub fn occlusion_bytes(&self) -> &[u8] {
        &self.occlusion
    }

    pub fn is_all_empty(&self) -> bool {
        self.blocks.iter().all(Block::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vox_blocks::builtin::{COMPUTER, POLE, RAMP, STEEL};

    fn reg() -> BlockRegistry {
        BlockRegistry::with_builtin().unwrap()
    }

    #[test]
    fn new_chunk_is_empty_and_voxels_dirty() {
        let c = Chunk::new(3, 4, 5);
        assert_eq!(c.volume(), 60);
        assert_eq!(c.geometry_bytes().len(), 5 * 6 * 7);
        assert!(c.voxels_dirty);
        assert!(c.is_all_empty());
        assert!(c.occlusion_bytes().iter().all(|&o| o == NO_OCCLUSION));
    }

    #[test]
    fn in_bounds_rejects_negatives_and_overflow() {
        let c = Chunk::new(2, 3, 4);
        assert!(c.in_bounds(IVec3::new(1, 2, 3)));
        assert!(!c.in_bounds(IVec3::new(-1, 0, 0)));
        assert!(!c.in_bounds(IVec3::new(0, 3, 0)));
        assert!(!c.in_bounds(IVec3::new(0, 0, 4)));
    }

    #[test]
    fn index_layout_is_z_fastest() {
        let c = Chunk::new(2, 3, 4);
        assert_eq!(c.index(IVec3::new(0, 0, 1)), 1);
        assert_eq!(c.index(IVec3::new(0, 1, 0)), 4);
        assert_eq!(c.index(IVec3::new(1, 0, 0)), 12);
        for i in 0..c.volume() {
            assert_eq!(c.index(c.position_of(i)), i);
        }
    }

    #[test]
    fn create_rejects_invalid_inputs() {
        let reg = reg();
        let mut c = Chunk::new(4, 4, 4);
        let ctx = HookCtx::client();
        assert!(c.create_block(&reg, IVec3::new(4, 0, 0), STEEL, 0, &ctx).is_none());
        assert!(c.create_block(&reg, IVec3::new(0, 0, 0), 0, 0, &ctx).is_none());
        assert!(c.create_block(&reg, IVec3::new(0, 0, 0), 999, 0, &ctx).is_none());
        assert!(!c.blocks_dirty);
    }

    #[test]
    fn destroy_empty_slot_is_noop() {
        let mut c = Chunk::new(4, 4, 4);
        assert!(c.destroy_block(IVec3::new(1, 1, 1), &HookCtx::client()).is_none());
        assert!(!c.blocks_dirty);
    }

    #[test]
    fn dynamic_blocks_follow_placement() {
        let reg = reg();
        let mut c = Chunk::new(4, 4, 4);
        let ctx = HookCtx::server(Some(1));
        let p = IVec3::new(1, 2, 3);
        c.create_block(&reg, p, COMPUTER, 0, &ctx).unwrap();
        assert_eq!(c.dynamic_count(), 1);
        assert!(c.interact(p, &ctx));
        // Replacing with a static kind drops the extension.
        c.create_block(&reg, p, STEEL, 0, &ctx).unwrap();
        assert_eq!(c.dynamic_count(), 0);
        assert!(!c.interact(p, &ctx));
        c.create_block(&reg, p, COMPUTER, 0, &ctx).unwrap();
        c.destroy_block(p, &ctx);
        assert_eq!(c.dynamic_count(), 0);
    }

    #[test]
    fn voxel_data_reflects_blocks() {
        let reg = reg();
        let mut c = Chunk::new(3, 3, 3);
        let ctx = HookCtx::client();
        c.create_block(&reg, IVec3::new(0, 0, 0), STEEL, 0, &ctx);
        c.create_block(&reg, IVec3::new(1, 1, 1), RAMP, 2, &ctx);
        c.create_block(&reg, IVec3::new(2, 2, 2), POLE, 1, &ctx);
        c.voxels_dirty = false;
        assert!(c.update_voxel_data(&reg));
        assert!(c.voxels_dirty && c.physics_dirty && !c.blocks_dirty);

        let steel = c.padded_index(IVec3::new(0, 0, 0));
        assert_eq!(c.geometry_bytes()[steel], 1);
        assert_eq!(c.occlusion_bytes()[steel], 0);

        let ramp = c.padded_index(IVec3::new(1, 1, 1));
        assert_eq!(c.geometry_bytes()[ramp], reg.get(RAMP).unwrap().voxel_id + 2);
        assert_eq!(c.rotation_bytes()[ramp], 2);

        let pole = c.padded_index(IVec3::new(2, 2, 2));
        assert_eq!(c.occlusion_bytes()[pole], NO_OCCLUSION);
        assert_eq!(c.rotation_bytes()[pole], 1);

        // Halo stays empty.
        assert_eq!(c.geometry_bytes()[0], EMPTY_GEOMETRY);
        assert!(!c.update_voxel_data(&reg));
    }

    #[test]
    fn voxel_world_roundtrip_rotated() {
        let mut c = Chunk::new(8, 8, 8);
        c.position = Vec3::new(3.0, -24.0, 7.5);
        c.rotation = Quat::from_axis_angle(Vec3::UP, 0.7);
        for x in 0..8 {
            for y in 0..8 {
                for z in 0..8 {
                    let p = IVec3::new(x, y, z);
                    assert_eq!(c.world_to_voxel(c.voxel_to_world(p)), p);
                }
            }
        }
    }
}
