use hashbrown::HashMap;
use vox_blocks::ChunkKey;
use vox_geom::{IVec3, Quat, Transform, Vec3};

use crate::NeighborhoodId;

/// A rigid group of equally sized chunks laid out on an integer lattice.
#[derive(Clone, Debug)]
pub struct ChunkNeighborhood {
    pub id: NeighborhoodId,
    pub position: Vec3,
    pub rotation: Quat,
    dims: Option<(u8, u8, u8)>,
    members: Vec<ChunkKey>,
    slots: HashMap<IVec3, ChunkKey>,
}

impl ChunkNeighborhood {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            id: 0,
            position,
            rotation,
            dims: None,
            members: Vec::new(),
            slots: HashMap::new(),
        }
    }

    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.rotation)
    }

    /// Chunk dimensions shared by every member, fixed by the first one to join.
    #[inline]
    pub fn chunk_dims(&self) -> Option<(u8, u8, u8)> {
        self.dims
    }

    #[inline]
    pub fn members(&self) -> &[ChunkKey] {
        &self.members
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_at(&self, pin: IVec3) -> Option<ChunkKey> {
        self.slots.get(&pin).copied()
    }

    /// Model-space offset of lattice slot `pin`: voxel x/y/z map to model x/-z/y.
    pub fn lattice_offset(&self, pin: IVec3) -> Vec3 {
        let (w, h, d) = self.dims.unwrap_or((0, 0, 0));
        Vec3::new(
            (pin.x * w as i32) as f32,
            (pin.z * d as i32) as f32,
            (-pin.y * h as i32) as f32,
        )
    }

    pub fn chunk_transform(&self, pin: IVec3) -> Transform {
        Transform::new(
            self.position + self.rotation.rotate(self.lattice_offset(pin)),
            self.rotation,
        )
    }

    pub(crate) fn accepts(&self, dims: (u8, u8, u8)) -> bool {
        self.dims.is_none_or(|own| own == dims)
    }

    pub(crate) fn join(&mut self, key: ChunkKey, pin: IVec3, dims: (u8, u8, u8)) {
        self.dims.get_or_insert(dims);
        if !self.members.contains(&key) {
            self.members.push(key);
        }
        self.slots.insert(pin, key);
    }

    pub(crate) fn leave(&mut self, key: ChunkKey) {
        self.members.retain(|k| *k != key);
        self.slots.retain(|_, k| *k != key);
    }
}
