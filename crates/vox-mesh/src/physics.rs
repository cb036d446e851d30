use std::collections::BTreeMap;
use std::sync::Arc;

use vox_blocks::ChunkKey;
use vox_chunk::TriMesh;
use vox_geom::{Transform, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaycastHit {
    pub position: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    /// Owner of the collider that was hit.
    pub chunk: ChunkKey,
}

/// Collision world the chunk colliders are installed into.
pub trait PhysicsWorld {
    fn insert_body(&mut self, owner: ChunkKey, collider: Arc<TriMesh>, transform: Transform);
    fn remove_body(&mut self, owner: ChunkKey) -> bool;
    fn set_body_transform(&mut self, owner: ChunkKey, transform: Transform) -> bool;
    fn contains_body(&self, owner: ChunkKey) -> bool;
    /// Nearest hit along the segment `from -> to`.
    fn raycast(&self, from: Vec3, to: Vec3) -> Option<RaycastHit>;
}

#[derive(Debug)]
struct Body {
    collider: Arc<TriMesh>,
    transform: Transform,
}

/// Static triangle-mesh bodies with segment queries; no dynamics.
#[derive(Debug, Default)]
pub struct TriangleWorld {
    bodies: BTreeMap<ChunkKey, Body>,
}

impl TriangleWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn body_transform(&self, owner: ChunkKey) -> Option<Transform> {
        self.bodies.get(&owner).map(|b| b.transform)
    }
}

impl PhysicsWorld for TriangleWorld {
    fn insert_body(&mut self, owner: ChunkKey, collider: Arc<TriMesh>, transform: Transform) {
        self.bodies.insert(
            owner,
            Body {
                collider,
                transform,
            },
        );
    }

    fn remove_body(&mut self, owner: ChunkKey) -> bool {
        self.bodies.remove(&owner).is_some()
    }

    fn set_body_transform(&mut self, owner: ChunkKey, transform: Transform) -> bool {
        match self.bodies.get_mut(&owner) {
            Some(b) => {
                b.transform = transform;
                true
            }
            None => false,
        }
    }

    fn contains_body(&self, owner: ChunkKey) -> bool {
        self.bodies.contains_key(&owner)
    }

    fn raycast(&self, from: Vec3, to: Vec3) -> Option<RaycastHit> {
        let seg = to - from;
        let length = seg.length();
        if length <= 0.0 {
            return None;
        }
        let mut best: Option<(f32, Vec3, ChunkKey)> = None;
        for (owner, body) in &self.bodies {
            let inv = body.transform.rotation.inverse();
            let origin = body.transform.inverse_apply(from);
            let dir = inv.rotate(seg);
            if let Some(bounds) = body.collider.bounds {
                if !bounds.intersects_segment(origin, dir) {
                    continue;
                }
            }
            for i in 0..body.collider.triangles.len() {
                let tri = body.collider.triangle(i);
                let Some(t) = segment_triangle(origin, dir, tri) else {
                    continue;
                };
                if best.is_some_and(|(bt, _, _)| bt <= t) {
                    continue;
                }
                let mut n = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalized();
                if n.dot(dir) > 0.0 {
                    n = -n;
                }
                best = Some((t, body.transform.rotation.rotate(n), *owner));
            }
        }
        best.map(|(t, normal, chunk)| RaycastHit {
            position: from + seg * t,
            normal,
            distance: t * length,
            chunk,
        })
    }
}

/// Moller-Trumbore, two-sided. Returns the segment parameter in `[0, 1]`.
fn segment_triangle(origin: Vec3, dir: Vec3, tri: [Vec3; 3]) -> Option<f32> {
    const EPS: f32 = 1e-7;
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPS {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - tri[0];
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    (0.0..=1.0).contains(&t).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vox_geom::Quat;

    fn floor_quad() -> Arc<TriMesh> {
        Arc::new(TriMesh::from_quads(&[[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, -4.0),
            Vec3::new(0.0, 0.0, -4.0),
        ]]))
    }

    #[test]
    fn ray_hits_nearest_body() {
        let mut world = TriangleWorld::new();
        world.insert_body(ChunkKey(1), floor_quad(), Transform::IDENTITY);
        world.insert_body(
            ChunkKey(2),
            floor_quad(),
            Transform::new(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY),
        );
        let hit = world
            .raycast(Vec3::new(1.0, 10.0, -1.0), Vec3::new(1.0, -10.0, -1.0))
            .unwrap();
        assert_eq!(hit.chunk, ChunkKey(2));
        assert!((hit.distance - 8.0).abs() < 1e-4);
        assert!(hit.position.approx_eq(Vec3::new(1.0, 2.0, -1.0), 1e-4));
        assert!(hit.normal.approx_eq(Vec3::UP, 1e-5));
    }

    #[test]
    fn ray_respects_segment_end_and_removal() {
        let mut world = TriangleWorld::new();
        world.insert_body(ChunkKey(1), floor_quad(), Transform::IDENTITY);
        assert!(world.raycast(Vec3::new(1.0, 10.0, -1.0), Vec3::new(1.0, 5.0, -1.0)).is_none());
        assert!(world.remove_body(ChunkKey(1)));
        assert!(world.raycast(Vec3::new(1.0, 10.0, -1.0), Vec3::new(1.0, -5.0, -1.0)).is_none());
    }

    #[test]
    fn body_transform_moves_collider() {
        let mut world = TriangleWorld::new();
        world.insert_body(ChunkKey(1), floor_quad(), Transform::IDENTITY);
        world.set_body_transform(ChunkKey(1), Transform::new(Vec3::new(100.0, 0.0, 0.0), Quat::IDENTITY));
        assert!(world.raycast(Vec3::new(1.0, 1.0, -1.0), Vec3::new(1.0, -1.0, -1.0)).is_none());
        assert!(world.raycast(Vec3::new(101.0, 1.0, -1.0), Vec3::new(101.0, -1.0, -1.0)).is_some());
    }
}
