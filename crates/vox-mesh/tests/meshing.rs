use std::sync::Arc;

use vox_blocks::builtin::{LIGHT_THING, POLE, RAMP, STEEL, STEEL_SLAB};
use vox_blocks::{BlockRegistry, HookCtx};
use vox_chunk::ChunkManager;
use vox_geom::{IVec3, Vec3};
use vox_mesh::packing::unpack_face;
use vox_mesh::{
    ChunkMeshGenerator, GreedyMesher, MeshBuffers, MeshStatus, PhysicsWorld, TriangleWorld,
    unpack_vertex,
};

fn registry() -> Arc<BlockRegistry> {
    Arc::new(BlockRegistry::with_builtin().unwrap())
}

fn mesh_blocks(dims: (u8, u8, u8), blocks: &[(IVec3, u16, u8)]) -> (usize, usize) {
    let reg = registry();
    let mut mgr = ChunkManager::new();
    let key = mgr.create_chunk(dims.0, dims.1, dims.2);
    let chunk = mgr.chunk_mut(key).unwrap();
    for (p, id, o) in blocks {
        chunk.create_block(&reg, *p, *id, *o, &HookCtx::client()).unwrap();
    }
    let mut physics = TriangleWorld::new();
    let mut generator = ChunkMeshGenerator::greedy(reg);
    let mesh = generator.generate(key, chunk, &mut physics);
    assert_eq!(mesh.status, MeshStatus::Complete);
    let tris = chunk.collider.as_ref().map(|c| c.triangles.len()).unwrap_or(0);
    (mesh.quad_count(), tris)
}

#[test]
fn single_cube_has_six_faces() {
    let (quads, tris) = mesh_blocks((1, 1, 1), &[(IVec3::ZERO, STEEL, 0)]);
    assert_eq!(quads, 6);
    assert_eq!(tris, 12);
}

#[test]
fn adjacent_cubes_merge_and_hide_shared_faces() {
    let (quads, _) = mesh_blocks(
        (2, 1, 1),
        &[(IVec3::new(0, 0, 0), STEEL, 0), (IVec3::new(1, 0, 0), STEEL, 0)],
    );
    assert_eq!(quads, 6);
}

#[test]
fn different_textures_do_not_merge() {
    let (quads, _) = mesh_blocks(
        (2, 1, 1),
        &[(IVec3::new(0, 0, 0), STEEL, 0), (IVec3::new(1, 0, 0), LIGHT_THING, 0)],
    );
    // North, south, up and down split in two; the shared face stays hidden.
    assert_eq!(quads, 10);
}

#[test]
fn non_occluding_neighbor_keeps_face() {
    let (quads, _) = mesh_blocks(
        (2, 1, 1),
        &[(IVec3::new(0, 0, 0), STEEL, 0), (IVec3::new(1, 0, 0), POLE, 0)],
    );
    // Six cube faces plus the pole's two diagonal quads.
    assert_eq!(quads, 8);
}

#[test]
fn slab_and_slope_shapes() {
    assert_eq!(mesh_blocks((1, 1, 1), &[(IVec3::ZERO, STEEL_SLAB, 0)]).0, 6);
    for o in 0..4 {
        assert_eq!(mesh_blocks((1, 1, 1), &[(IVec3::ZERO, RAMP, o)]).0, 5);
    }
    // A slab on top of a cube hides the cube's top and the slab's bottom.
    let (quads, _) = mesh_blocks(
        (1, 1, 2),
        &[(IVec3::new(0, 0, 0), STEEL, 0), (IVec3::new(0, 0, 1), STEEL_SLAB, 0)],
    );
    assert_eq!(quads, 10);
}

#[test]
fn slab_top_sits_at_half_height() {
    let reg = registry();
    let mut mgr = ChunkManager::new();
    let key = mgr.create_chunk(1, 1, 1);
    let chunk = mgr.chunk_mut(key).unwrap();
    chunk.create_block(&reg, IVec3::ZERO, STEEL_SLAB, 0, &HookCtx::client());
    let mut generator = ChunkMeshGenerator::greedy(reg);
    let mesh = generator.generate(key, chunk, &mut TriangleWorld::new());
    let z_max = mesh.vertices.iter().map(|v| unpack_vertex(*v).2).max().unwrap();
    // Padded z runs 1..2 in whole units, so the half-height top is z2 = 3.
    assert_eq!(z_max, 3);
}

#[test]
fn ramp_faces_follow_orientation() {
    let reg = registry();
    let ramp_code = reg.get(RAMP).unwrap().voxel_id;
    for o in 0..4u8 {
        let mut mgr = ChunkManager::new();
        let key = mgr.create_chunk(1, 1, 1);
        let chunk = mgr.chunk_mut(key).unwrap();
        chunk.create_block(&reg, IVec3::ZERO, RAMP, o, &HookCtx::client());
        let mut generator = ChunkMeshGenerator::greedy(Arc::clone(&reg));
        let mesh = generator.generate(key, chunk, &mut TriangleWorld::new());
        let attrs: Vec<_> = mesh.faces.iter().map(|f| unpack_face(*f)).collect();
        assert!(attrs.iter().all(|a| a.geometry == ramp_code + o && a.rotation == o));
        // Sloped surface uses the up texture.
        assert!(attrs.iter().any(|a| a.face == 4 && a.texture == 4));
    }
}

#[test]
fn overflow_keeps_partial_mesh() {
    let reg = registry();
    let mut mgr = ChunkManager::new();
    let key = mgr.create_chunk(4, 4, 4);
    let chunk = mgr.chunk_mut(key).unwrap();
    for x in 0..4 {
        for y in 0..4 {
            chunk.create_block(&reg, IVec3::new(x, y, 0), if (x + y) % 2 == 0 { STEEL } else { LIGHT_THING }, 0, &HookCtx::client());
        }
    }
    // Room for three quads.
    let buffers = MeshBuffers::with_capacity_bytes(3 * 16, 1024);
    let mut generator = ChunkMeshGenerator::with_buffers(reg, GreedyMesher::new(), buffers);
    let mut physics = TriangleWorld::new();
    let mesh = generator.generate(key, chunk, &mut physics);
    assert_eq!(mesh.status, MeshStatus::OutOfRoom);
    assert_eq!(mesh.quad_count(), 3);
    assert_eq!(chunk.num_quads, 3);
    assert!(physics.contains_body(key));
}

#[test]
fn chunk_beyond_vertex_range_is_not_meshed() {
    let reg = registry();
    let mut mgr = ChunkManager::new();
    let key = mgr.create_chunk(130, 2, 2);
    let chunk = mgr.chunk_mut(key).unwrap();
    chunk.create_block(&reg, IVec3::new(128, 0, 0), STEEL, 0, &HookCtx::client());
    let mut generator = ChunkMeshGenerator::greedy(reg);
    let mut physics = TriangleWorld::new();
    let mesh = generator.generate(key, chunk, &mut physics);
    assert_eq!(mesh.status, MeshStatus::TooLarge);
    assert_eq!(mesh.quad_count(), 0);
    assert!(!physics.contains_body(key));
}

#[test]
fn body_lifecycle_tracks_quads() {
    let reg = registry();
    let mut mgr = ChunkManager::new();
    let key = mgr.create_chunk(2, 2, 2);
    let mut physics = TriangleWorld::new();
    let mut generator = ChunkMeshGenerator::greedy(Arc::clone(&reg));
    let ctx = HookCtx::server(None);

    let chunk = mgr.chunk_mut(key).unwrap();
    assert!(generator.generate_if_dirty(key, chunk, &mut physics).is_some());
    assert!(!physics.contains_body(key));
    assert!(!chunk.in_simulation);
    assert!(generator.generate_if_dirty(key, chunk, &mut physics).is_none());

    chunk.create_block(&reg, IVec3::ZERO, STEEL, 0, &ctx);
    generator.generate_if_dirty(key, chunk, &mut physics).unwrap();
    assert!(physics.contains_body(key));
    assert!(chunk.in_simulation);

    // Identity chunk transform: voxel (0,0,0) spans model x 1..2, y 1..2, z -2..-1.
    let hit = physics
        .raycast(Vec3::new(1.5, 10.0, -1.5), Vec3::new(1.5, -10.0, -1.5))
        .unwrap();
    assert_eq!(hit.chunk, key);
    assert!((hit.distance - 8.0).abs() < 1e-4);
    assert!(hit.normal.approx_eq(Vec3::UP, 1e-5));

    chunk.destroy_block(IVec3::ZERO, &ctx);
    generator.generate_if_dirty(key, chunk, &mut physics).unwrap();
    assert!(!physics.contains_body(key));
    assert_eq!(chunk.num_quads, 0);
    assert!(chunk.collider.is_none());
}
