//! Default mesher: greedy-merged cube faces plus per-voxel slabs, slopes and crosses.

use vox_blocks::{Face, GeometryKind};

use crate::mesher::{MeshBuffers, MeshStatus, Mesher, VoxelInput, VoxelTables};
use crate::packing::{FaceAttrs, fits_vertex_range, pack_face, pack_vertex};

/// Corner in half-voxel units, padded coordinates.
type Point = [u32; 3];

#[derive(Clone, Copy, Debug)]
struct FaceDir {
    face: Face,
    axis: usize,
    positive: bool,
    // Tangent axes with u x v == +axis.
    u: usize,
    v: usize,
}

const fn dir(face: Face, axis: usize, positive: bool) -> FaceDir {
    let (u, v) = match axis {
        0 => (1, 2),
        1 => (2, 0),
        _ => (0, 1),
    };
    FaceDir {
        face,
        axis,
        positive,
        u,
        v,
    }
}

const FACE_DIRS: [FaceDir; 6] = [
    dir(Face::East, 0, true),
    dir(Face::North, 1, true),
    dir(Face::West, 0, false),
    dir(Face::South, 1, false),
    dir(Face::Up, 2, true),
    dir(Face::Down, 2, false),
];

#[inline]
fn face_dir(face: Face) -> FaceDir {
    FACE_DIRS[face.index()]
}

/// Quarter turn about +Z: east -> north -> west -> south.
#[inline]
fn turn_face(face: Face, quarter_turns: u8) -> Face {
    let ring = [Face::East, Face::North, Face::West, Face::South];
    match ring.iter().position(|f| *f == face) {
        Some(i) => ring[(i + quarter_turns as usize) % 4],
        None => face,
    }
}

#[inline]
fn turn_point(p: Point, quarter_turns: u8) -> Point {
    let mut p = p;
    for _ in 0..quarter_turns {
        p = [2 - p[1], p[0], p[2]];
    }
    p
}

/// Axis-aligned box face in half units, wound counter-clockwise seen from outside.
fn box_face(min: Point, max: Point, d: FaceDir) -> [Point; 4] {
    let plane = if d.positive { max[d.axis] } else { min[d.axis] };
    let at = |uval: u32, vval: u32| {
        let mut p = [0u32; 3];
        p[d.axis] = plane;
        p[d.u] = uval;
        p[d.v] = vval;
        p
    };
    let (u0, u1, v0, v1) = (min[d.u], max[d.u], min[d.v], max[d.v]);
    if d.positive {
        [at(u0, v0), at(u1, v0), at(u1, v1), at(u0, v1)]
    } else {
        [at(u0, v0), at(u0, v1), at(u1, v1), at(u1, v0)]
    }
}

#[inline]
fn pack_points(points: [Point; 4]) -> [u32; 4] {
    points.map(|p| pack_vertex(p[0] / 2, p[1] / 2, p[2]))
}

#[inline]
fn offset(points: [Point; 4], origin: Point) -> [Point; 4] {
    points.map(|p| [p[0] + origin[0], p[1] + origin[1], p[2] + origin[2]])
}

#[derive(Default)]
pub struct GreedyMesher {
    mask: Vec<Option<u32>>,
    used: Vec<bool>,
}

impl GreedyMesher {
    pub fn new() -> Self {
        Self::default()
    }

    fn neighbor_open(input: &VoxelInput<'_>, p: [usize; 3], d: FaceDir) -> bool {
        let mut n = p;
        if d.positive {
            n[d.axis] += 1;
        } else {
            n[d.axis] -= 1;
        }
        input.occlusion[input.index(n)] != 0
    }

    fn face_word(tables: &VoxelTables<'_>, code: u8, face: Face, rotation: u8) -> u32 {
        let texture = tables
            .textures
            .get(code as usize)
            .map(|t| t[face.index()])
            .unwrap_or(0);
        pack_face(FaceAttrs {
            texture,
            face: face as u8,
            rotation,
            geometry: code,
        })
    }

    fn kind_of(tables: &VoxelTables<'_>, code: u8) -> Option<GeometryKind> {
        tables.geometry.get(code as usize).and_then(|e| e.kind)
    }

    fn mesh_cubes(
        &mut self,
        input: &VoxelInput<'_>,
        tables: &VoxelTables<'_>,
        out: &mut MeshBuffers,
    ) -> bool {
        for d in FACE_DIRS {
            let (n, u, v) = (d.axis, d.u, d.v);
            let ulen = input.max[u].saturating_sub(input.min[u]);
            let vlen = input.max[v].saturating_sub(input.min[v]);
            for s in input.min[n]..input.max[n] {
                self.mask.clear();
                self.mask.resize(ulen * vlen, None);
                for b in 0..vlen {
                    for a in 0..ulen {
                        let mut p = [0usize; 3];
                        p[n] = s;
                        p[u] = input.min[u] + a;
                        p[v] = input.min[v] + b;
                        let i = input.index(p);
                        let code = input.geometry[i];
                        if Self::kind_of(tables, code) != Some(GeometryKind::Cube) {
                            continue;
                        }
                        if !Self::neighbor_open(input, p, d) {
                            continue;
                        }
                        self.mask[b * ulen + a] =
                            Some(Self::face_word(tables, code, d.face, input.rotation[i]));
                    }
                }
                let plane = if d.positive { s + 1 } else { s };
                let ok = greedy_rects(ulen, vlen, &self.mask, &mut self.used, |a, b, w, h, word| {
                    let mut min = [0u32; 3];
                    let mut max = [0u32; 3];
                    min[n] = plane as u32 * 2;
                    max[n] = plane as u32 * 2;
                    min[u] = (input.min[u] + a) as u32 * 2;
                    max[u] = (input.min[u] + a + w) as u32 * 2;
                    min[v] = (input.min[v] + b) as u32 * 2;
                    max[v] = (input.min[v] + b + h) as u32 * 2;
                    out.push_quad(pack_points(box_face(min, max, d)), word)
                });
                if !ok {
                    return false;
                }
            }
        }
        true
    }

    fn mesh_shapes(
        &mut self,
        input: &VoxelInput<'_>,
        tables: &VoxelTables<'_>,
        out: &mut MeshBuffers,
    ) -> bool {
        for x in input.min[0]..input.max[0] {
            for y in input.min[1]..input.max[1] {
                for z in input.min[2]..input.max[2] {
                    let p = [x, y, z];
                    let i = input.index(p);
                    let code = input.geometry[i];
                    let rotation = input.rotation[i];
                    let origin = [x as u32 * 2, y as u32 * 2, z as u32 * 2];
                    let ok = match Self::kind_of(tables, code) {
                        Some(GeometryKind::Slab) => {
                            Self::slab(input, tables, p, code, rotation, origin, out)
                        }
                        Some(GeometryKind::Slope) => {
                            let turns = tables
                                .geometry
                                .get(code as usize)
                                .map(|e| e.rotation)
                                .unwrap_or(0);
                            Self::slope(input, tables, p, code, rotation, turns, origin, out)
                        }
                        Some(GeometryKind::Cross) => {
                            Self::cross(tables, code, rotation, origin, out)
                        }
                        _ => true,
                    };
                    if !ok {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn slab(
        input: &VoxelInput<'_>,
        tables: &VoxelTables<'_>,
        p: [usize; 3],
        code: u8,
        rotation: u8,
        origin: Point,
        out: &mut MeshBuffers,
    ) -> bool {
        let min = origin;
        let max = [origin[0] + 2, origin[1] + 2, origin[2] + 1];
        for d in FACE_DIRS {
            // The top of a slab is never flush with the voxel above.
            if d.face != Face::Up && !Self::neighbor_open(input, p, d) {
                continue;
            }
            let word = Self::face_word(tables, code, d.face, rotation);
            if !out.push_quad(pack_points(box_face(min, max, d)), word) {
                return false;
            }
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn slope(
        input: &VoxelInput<'_>,
        tables: &VoxelTables<'_>,
        p: [usize; 3],
        code: u8,
        rotation: u8,
        turns: u8,
        origin: Point,
        out: &mut MeshBuffers,
    ) -> bool {
        // Unturned ramp rises toward north; triangles repeat their last corner.
        let unit_min = [0, 0, 0];
        let unit_max = [2, 2, 2];
        let pieces: [(Face, Option<Face>, [Point; 4]); 5] = [
            (Face::Down, Some(Face::Down), box_face(unit_min, unit_max, face_dir(Face::Down))),
            (Face::North, Some(Face::North), box_face(unit_min, unit_max, face_dir(Face::North))),
            (Face::Up, None, [[0, 0, 0], [2, 0, 0], [2, 2, 2], [0, 2, 2]]),
            (Face::East, Some(Face::East), [[2, 0, 0], [2, 2, 0], [2, 2, 2], [2, 2, 2]]),
            (Face::West, Some(Face::West), [[0, 0, 0], [0, 2, 2], [0, 2, 0], [0, 2, 0]]),
        ];
        for (face, cull, points) in pieces {
            let face = turn_face(face, turns);
            if let Some(cull) = cull {
                if !Self::neighbor_open(input, p, face_dir(turn_face(cull, turns))) {
                    continue;
                }
            }
            let turned = points.map(|q| turn_point(q, turns));
            let word = Self::face_word(tables, code, face, rotation);
            if !out.push_quad(pack_points(offset(turned, origin)), word) {
                return false;
            }
        }
        true
    }

    fn cross(
        tables: &VoxelTables<'_>,
        code: u8,
        rotation: u8,
        origin: Point,
        out: &mut MeshBuffers,
    ) -> bool {
        let planes: [(Face, [Point; 4]); 2] = [
            (Face::East, [[0, 0, 0], [2, 2, 0], [2, 2, 2], [0, 0, 2]]),
            (Face::North, [[2, 0, 0], [0, 2, 0], [0, 2, 2], [2, 0, 2]]),
        ];
        for (face, points) in planes {
            let word = Self::face_word(tables, code, face, rotation);
            if !out.push_quad(pack_points(offset(points, origin)), word) {
                return false;
            }
        }
        true
    }
}

impl Mesher for GreedyMesher {
    fn make_mesh(
        &mut self,
        input: &VoxelInput<'_>,
        tables: &VoxelTables<'_>,
        out: &mut MeshBuffers,
    ) -> MeshStatus {
        let [w, h, d] = [0, 1, 2].map(|a| input.max[a].saturating_sub(1) as u32);
        if !fits_vertex_range(w, h, d) {
            return MeshStatus::TooLarge;
        }
        if self.mesh_cubes(input, tables, out) && self.mesh_shapes(input, tables, out) {
            MeshStatus::Complete
        } else {
            MeshStatus::OutOfRoom
        }
    }
}

/// Greedy rectangle cover of equal, non-empty mask cells. Stops early when
/// `emit` returns false and reports it.
fn greedy_rects(
    width: usize,
    height: usize,
    mask: &[Option<u32>],
    used: &mut Vec<bool>,
    mut emit: impl FnMut(usize, usize, usize, usize, u32) -> bool,
) -> bool {
    used.clear();
    used.resize(width * height, false);
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let Some(code) = mask[idx] else { continue };
            if used[idx] {
                continue;
            }
            let mut w = 1;
            while x + w < width
                && mask[y * width + x + w] == Some(code)
                && !used[y * width + x + w]
            {
                w += 1;
            }
            let mut h = 1;
            'expand: while y + h < height {
                for i in 0..w {
                    let j = (y + h) * width + x + i;
                    if mask[j] != Some(code) || used[j] {
                        break 'expand;
                    }
                }
                h += 1;
            }
            if !emit(x, y, w, h, code) {
                return false;
            }
            for yy in 0..h {
                for xx in 0..w {
                    used[(y + yy) * width + x + xx] = true;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turning_is_periodic() {
        let p = [0, 2, 1];
        assert_eq!(turn_point(p, 4), p);
        assert_eq!(turn_point([2, 1, 0], 1), [1, 2, 0]);
        assert_eq!(turn_face(Face::East, 1), Face::North);
        assert_eq!(turn_face(Face::South, 1), Face::East);
        assert_eq!(turn_face(Face::Up, 3), Face::Up);
    }

    #[test]
    fn greedy_merges_uniform_mask() {
        let mask = vec![Some(1u32); 6];
        let mut used = Vec::new();
        let mut rects = Vec::new();
        assert!(greedy_rects(3, 2, &mask, &mut used, |x, y, w, h, c| {
            rects.push((x, y, w, h, c));
            true
        }));
        assert_eq!(rects, vec![(0, 0, 3, 2, 1)]);
    }

    #[test]
    fn greedy_splits_on_different_codes() {
        let mask = vec![Some(1), Some(1), None, Some(2)];
        let mut used = Vec::new();
        let mut rects = Vec::new();
        greedy_rects(2, 2, &mask, &mut used, |x, y, w, h, c| {
            rects.push((x, y, w, h, c));
            true
        });
        assert_eq!(rects, vec![(0, 0, 2, 1, 1), (1, 1, 1, 1, 2)]);
    }
}
