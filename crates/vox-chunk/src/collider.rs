use vox_geom::{Aabb, Vec3};

/// Triangle mesh collider in chunk-local model space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriMesh {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    pub bounds: Option<Aabb>,
}

impl TriMesh {
    /// Two triangles per quad: (0,1,2) and (0,2,3).
    pub fn from_quads(quads: &[[Vec3; 4]]) -> TriMesh {
        let mut vertices = Vec::with_capacity(quads.len() * 4);
        let mut triangles = Vec::with_capacity(quads.len() * 2);
        for quad in quads {
            let base = vertices.len() as u32;
            vertices.extend_from_slice(quad);
            triangles.push([base, base + 1, base + 2]);
            triangles.push([base, base + 2, base + 3]);
        }
        let bounds = Aabb::from_points(vertices.iter().copied());
        TriMesh {
            vertices,
            triangles,
            bounds,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    #[inline]
    pub fn triangle(&self, i: usize) -> [Vec3; 3] {
        let [a, b, c] = self.triangles[i];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }
}
