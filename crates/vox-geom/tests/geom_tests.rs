use std::f32::consts::FRAC_PI_2;
use vox_geom::{Aabb, IVec3, Quat, Transform, Vec3};

#[test]
fn vec3_basic_ops() {
    let a = Vec3::new(1.0, 2.0, 3.0);
    let b = Vec3::new(-4.0, 5.0, -6.0);
    assert!((a + b).approx_eq(Vec3::new(-3.0, 7.0, -3.0), 1e-6));
    assert!((a - b).approx_eq(Vec3::new(5.0, -3.0, 9.0), 1e-6));
    assert!((a * 2.0).approx_eq(Vec3::new(2.0, 4.0, 6.0), 1e-6));
    assert!((-a).approx_eq(Vec3::new(-1.0, -2.0, -3.0), 1e-6));
    assert_eq!(a.dot(b), -4.0 + 10.0 - 18.0);
    assert!(Vec3::new(1.0, 0.0, 0.0)
        .cross(Vec3::new(0.0, 1.0, 0.0))
        .approx_eq(Vec3::new(0.0, 0.0, 1.0), 1e-6));
}

#[test]
fn vec3_floor_handles_negatives() {
    let v = Vec3::new(-0.5, 1.5, -2.0).floor();
    assert_eq!(v, Vec3::new(-1.0, 1.0, -2.0));
}

#[test]
fn ivec3_ops() {
    let a = IVec3::new(1, -2, 3);
    let b = IVec3::new(4, 5, 6);
    assert_eq!(a + b, IVec3::new(5, 3, 9));
    assert_eq!(b - a, IVec3::new(3, 7, 3));
    assert_eq!(a * 3, IVec3::new(3, -6, 9));
    assert_eq!(a.mul_elem(b), IVec3::new(4, -10, 18));
    assert_eq!(IVec3::splat(2).as_vec3(), Vec3::splat(2.0));
}

#[test]
fn quat_quarter_turn_about_y() {
    let q = Quat::from_axis_angle(Vec3::UP, FRAC_PI_2);
    let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
    assert!(r.approx_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5), "{r:?}");
}

#[test]
fn quat_identity_and_sign() {
    let q = Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0), 0.7);
    assert!((q * Quat::IDENTITY).approx_eq(q, 1e-6));
    let neg = Quat::from_xyzw(-q.x, -q.y, -q.z, -q.w);
    assert!(q.approx_eq(neg, 1e-6));
    assert!((q * q.inverse()).approx_eq(Quat::IDENTITY, 1e-5));
}

#[test]
fn transform_apply_translates_after_rotating() {
    let t = Transform::new(
        Vec3::new(10.0, 0.0, 0.0),
        Quat::from_axis_angle(Vec3::UP, FRAC_PI_2),
    );
    let p = t.apply(Vec3::new(1.0, 0.0, 0.0));
    assert!(p.approx_eq(Vec3::new(10.0, 0.0, -1.0), 1e-5));
    assert!(t.inverse_apply(p).approx_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
}

#[test]
fn aabb_from_points_and_segment() {
    assert!(Aabb::from_points(std::iter::empty()).is_none());
    let b = Aabb::from_points([
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(2.0, 1.0, -1.0),
        Vec3::new(1.0, 3.0, 0.5),
    ])
    .unwrap();
    assert_eq!(b.min, Vec3::new(0.0, 0.0, -1.0));
    assert_eq!(b.max, Vec3::new(2.0, 3.0, 0.5));

    // Segment passing through the box.
    assert!(b.intersects_segment(Vec3::new(-5.0, 1.0, 0.0), Vec3::new(10.0, 0.0, 0.0)));
    // Segment stopping short of the box.
    assert!(!b.intersects_segment(Vec3::new(-5.0, 1.0, 0.0), Vec3::new(4.0, 0.0, 0.0)));
    // Parallel segment outside the slab.
    assert!(!b.intersects_segment(Vec3::new(-5.0, 10.0, 0.0), Vec3::new(10.0, 0.0, 0.0)));
}
