use vox_blocks::GeometryEntry;
use vox_chunk::Chunk;

pub const DEFAULT_VERTEX_CAPACITY: usize = 16 * 1024 * 1024;
pub const DEFAULT_FACE_CAPACITY: usize = 4 * 1024 * 1024;
pub const VERTEX_BYTES_PER_QUAD: usize = 4 * 4;
pub const FACE_BYTES_PER_QUAD: usize = 4;

/// Stride-described view of a chunk's padded voxel arrays.
///
/// The z stride is 1. `min`/`max` bound the half-open range of padded
/// coordinates to mesh; the cells just outside it are the halo.
#[derive(Clone, Copy, Debug)]
pub struct VoxelInput<'a> {
    pub geometry: &'a [u8],
    pub rotation: &'a [u8],
    pub occlusion: &'a [u8],
    pub x_stride: usize,
    pub y_stride: usize,
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl<'a> VoxelInput<'a> {
    pub fn from_chunk(chunk: &'a Chunk) -> Self {
        let (w, h, d) = chunk.dims();
        let (w, h, d) = (w as usize, h as usize, d as usize);
        VoxelInput {
            geometry: chunk.geometry_bytes(),
            rotation: chunk.rotation_bytes(),
            occlusion: chunk.occlusion_bytes(),
            x_stride: (d + 2) * (h + 2),
            y_stride: d + 2,
            min: [1, 1, 1],
            max: [w + 1, h + 1, d + 1],
        }
    }

    #[inline]
    pub fn index(&self, p: [usize; 3]) -> usize {
        p[2] + p[1] * self.y_stride + p[0] * self.x_stride
    }
}

/// Geometry-code and texture tables indexed by geometry code.
#[derive(Clone, Copy, Debug)]
pub struct VoxelTables<'a> {
    pub geometry: &'a [GeometryEntry],
    pub textures: &'a [[u8; 6]],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshStatus {
    Complete,
    /// A buffer filled up; the quads emitted so far are kept.
    OutOfRoom,
    /// The chunk is too large for the vertex layout; nothing was emitted.
    TooLarge,
}

/// Fixed-capacity output buffers: four vertex words and one face word per quad.
#[derive(Clone, Debug)]
pub struct MeshBuffers {
    pub vertices: Vec<u32>,
    pub faces: Vec<u32>,
    vertex_capacity: usize,
    face_capacity: usize,
}

impl Default for MeshBuffers {
    fn default() -> Self {
        Self::with_capacity_bytes(DEFAULT_VERTEX_CAPACITY, DEFAULT_FACE_CAPACITY)
    }
}

impl MeshBuffers {
    pub fn with_capacity_bytes(vertex_bytes: usize, face_bytes: usize) -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            vertex_capacity: vertex_bytes,
            face_capacity: face_bytes,
        }
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.faces.clear();
    }

    #[inline]
    pub fn quad_count(&self) -> usize {
        self.faces.len()
    }

    /// Appends one quad, or returns false if either buffer would exceed its capacity.
    pub fn push_quad(&mut self, verts: [u32; 4], face: u32) -> bool {
        let quads = self.faces.len() + 1;
        if quads * VERTEX_BYTES_PER_QUAD > self.vertex_capacity
            || quads * FACE_BYTES_PER_QUAD > self.face_capacity
        {
            return false;
        }
        self.vertices.extend_from_slice(&verts);
        self.faces.push(face);
        true
    }

    pub fn quad_vertices(&self, quad: usize) -> &[u32] {
        &self.vertices[quad * 4..quad * 4 + 4]
    }
}

/// Turns voxel arrays into packed quads.
pub trait Mesher {
    fn make_mesh(
        &mut self,
        input: &VoxelInput<'_>,
        tables: &VoxelTables<'_>,
        out: &mut MeshBuffers,
    ) -> MeshStatus;
}
