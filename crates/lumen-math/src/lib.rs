#![warn(missing_docs)]

//! Math types for the lumen raytracer.
//!
//! Thin wrappers around nalgebra plus the value types the acceleration
//! structure is built from: axis-aligned boxes, rays, triangles and their
//! 8-lane SIMD counterparts.
//!
//! Scalar and 8-lane routines evaluate the same IEEE operations in the same
//! order, so a ray traced alone and the same ray traced inside a packet
//! produce bit-identical distances.

mod aabb;
mod lanes;
mod ray;
mod transform;
mod triangle;

pub use aabb::Aabb;
pub use lanes::{mask_lanes, RayX8, TriangleHitX8, Vec3x8, LANES};
pub use ray::Ray;
pub use transform::Transform;
pub use triangle::{Triangle, TriangleHit};

use nalgebra::{Vector2, Vector3};

/// A point or vector in 3D space.
pub type Vec3 = Vector3<f32>;

/// A 2D vector (texture coordinates, barycentrics).
pub type Vec2 = Vector2<f32>;

/// Number of spatial axes.
pub const NUM_AXES: usize = 3;

/// Dot product with a fixed evaluation order.
///
/// The lane-parallel code mirrors this order exactly.
#[inline(always)]
pub fn dot3(a: &Vec3, b: &Vec3) -> f32 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

/// Cross product with a fixed evaluation order.
#[inline(always)]
pub fn cross3(a: &Vec3, b: &Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

/// Component-wise reciprocal.
#[inline(always)]
pub fn reciprocal(v: &Vec3) -> Vec3 {
    Vec3::new(1.0 / v.x, 1.0 / v.y, 1.0 / v.z)
}

/// Build a tangent perpendicular to a unit normal.
pub fn orthogonal_tangent(normal: &Vec3) -> Vec3 {
    let helper = if normal.x.abs() > 0.9 {
        Vec3::new(0.0, 1.0, 0.0)
    } else {
        Vec3::new(1.0, 0.0, 0.0)
    };
    cross3(&helper, normal).normalize()
}
