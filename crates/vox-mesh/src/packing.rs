//! Bit layouts of the mesher's vertex and face-attribute words.
//!
//! Vertex: `x:7 | y:7 | z:9` where x/y are whole padded-voxel units and z is
//! in half units, so slabs can sit at `z + 0.5`.
//!
//! Face: `texture:8 | face:3 | rotation:2 | (pad) | geometry:8` at bits 0, 8, 11 and 16.

use vox_geom::Vec3;

pub const VERTEX_X_MAX: u32 = 127;
pub const VERTEX_Y_MAX: u32 = 127;
pub const VERTEX_Z2_MAX: u32 = 511;

/// Whether every corner of a `w x h x d` chunk fits the vertex fields.
/// Corners reach padded coordinate `dim + 1`.
#[inline]
pub const fn fits_vertex_range(w: u32, h: u32, d: u32) -> bool {
    w < VERTEX_X_MAX && h < VERTEX_Y_MAX && 2 * (d + 1) <= VERTEX_Z2_MAX
}

#[inline]
pub const fn pack_vertex(x: u32, y: u32, z2: u32) -> u32 {
    (x & 127) | ((y & 127) << 7) | ((z2 & 511) << 14)
}

/// Returns `(x, y, z2)`.
#[inline]
pub const fn unpack_vertex(v: u32) -> (u32, u32, u32) {
    (v & 127, (v >> 7) & 127, (v >> 14) & 511)
}

/// Packed vertex to chunk-local model space: voxel (x, y, z) -> model (x, z, -y).
#[inline]
pub fn vertex_to_model(v: u32) -> Vec3 {
    let (x, y, z2) = unpack_vertex(v);
    Vec3::new(x as f32, z2 as f32 * 0.5, -(y as f32))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceAttrs {
    pub texture: u8,
    pub face: u8,
    pub rotation: u8,
    pub geometry: u8,
}

#[inline]
pub const fn pack_face(attrs: FaceAttrs) -> u32 {
    attrs.texture as u32
        | ((attrs.face as u32 & 7) << 8)
        | ((attrs.rotation as u32 & 3) << 11)
        | ((attrs.geometry as u32) << 16)
}

#[inline]
pub const fn unpack_face(w: u32) -> FaceAttrs {
    FaceAttrs {
        texture: (w & 0xff) as u8,
        face: ((w >> 8) & 7) as u8,
        rotation: ((w >> 11) & 3) as u8,
        geometry: ((w >> 16) & 0xff) as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_fields_do_not_overlap() {
        let v = pack_vertex(VERTEX_X_MAX, 0, 0);
        assert_eq!(unpack_vertex(v), (127, 0, 0));
        let v = pack_vertex(0, VERTEX_Y_MAX, 0);
        assert_eq!(unpack_vertex(v), (0, 127, 0));
        let v = pack_vertex(0, 0, VERTEX_Z2_MAX);
        assert_eq!(unpack_vertex(v), (0, 0, 511));
    }

    #[test]
    fn vertex_range_limits() {
        assert!(fits_vertex_range(126, 126, 254));
        assert!(!fits_vertex_range(127, 1, 1));
        assert!(!fits_vertex_range(1, 127, 1));
        assert!(!fits_vertex_range(1, 1, 255));
    }

    #[test]
    fn model_space_swaps_axes() {
        let m = vertex_to_model(pack_vertex(3, 4, 5));
        assert_eq!(m, Vec3::new(3.0, 2.5, -4.0));
    }

    #[test]
    fn face_word_layout() {
        let a = FaceAttrs {
            texture: 200,
            face: 5,
            rotation: 3,
            geometry: 77,
        };
        let w = pack_face(a);
        assert_eq!(w, 200 | (5 << 8) | (3 << 11) | (77 << 16));
        assert_eq!(unpack_face(w), a);
    }
}
