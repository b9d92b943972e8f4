//! Geometric shapes placed in the scene by objects.
//!
//! Shapes live in their object's local space. Analytic shapes (spheres and
//! boxes) are intersected directly; meshes descend their own triangle BVH.

mod cuboid;
mod mesh;
mod sphere;

pub use cuboid::BoxShape;
pub use mesh::{MeshDesc, MeshShape};
pub use sphere::SphereShape;

use lumen_bvh::{HitPoint, PacketTraversalContext, SingleTraversalContext};
use lumen_math::{Aabb, Ray, Vec2, Vec3, LANES};

/// Interval of a ray inside a shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeIntersection {
    /// Entry distance, negative when the ray starts inside.
    pub near_distance: f32,
    /// Exit distance.
    pub far_distance: f32,
    /// Primitive within the shape.
    pub sub_object_id: u32,
    /// First surface coordinate.
    pub u: f32,
    /// Second surface coordinate.
    pub v: f32,
}

impl ShapeIntersection {
    /// The first of the two distances lying in `(0, max_distance)`.
    ///
    /// Zero is excluded, matching [`lumen_math::Triangle::intersect_ray`], so
    /// a ray leaving a surface does not hit that surface again.
    #[inline]
    pub fn closest_in(&self, max_distance: f32) -> Option<f32> {
        if self.near_distance > 0.0 && self.near_distance < max_distance {
            Some(self.near_distance)
        } else if self.far_distance > 0.0 && self.far_distance < max_distance {
            Some(self.far_distance)
        } else {
            None
        }
    }
}

/// Local-space surface attributes at a hit point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalSurface {
    /// Unit surface normal.
    pub normal: Vec3,
    /// Unit tangent, not necessarily orthogonal to the normal.
    pub tangent: Vec3,
    /// Texture coordinate.
    pub tex_coord: Vec2,
    /// Material of the hit primitive, if the shape has per-primitive materials.
    pub material_index: Option<u32>,
}

/// A shape of any supported kind.
#[derive(Debug, Clone)]
pub enum Shape {
    /// Sphere around the origin.
    Sphere(SphereShape),
    /// Box around the origin.
    Box(BoxShape),
    /// Triangle mesh.
    Mesh(MeshShape),
}

impl Shape {
    /// Local-space bounding box.
    pub fn bounding_box(&self) -> Aabb {
        match self {
            Shape::Sphere(s) => s.bounding_box(),
            Shape::Box(b) => b.bounding_box(),
            Shape::Mesh(m) => m.bounding_box(),
        }
    }

    /// Surface area.
    pub fn surface_area(&self) -> f32 {
        match self {
            Shape::Sphere(s) => s.surface_area(),
            Shape::Box(b) => b.surface_area(),
            Shape::Mesh(m) => m.surface_area(),
        }
    }

    /// Whether a local-space point is inside the shape.
    ///
    /// Meshes are not treated as closed volumes and never contain a point.
    pub fn contains_point(&self, point: &Vec3) -> bool {
        match self {
            Shape::Sphere(s) => s.contains_point(point),
            Shape::Box(b) => b.contains_point(point),
            Shape::Mesh(_) => false,
        }
    }

    fn intersect_analytic(&self, ray: &Ray) -> Option<ShapeIntersection> {
        match self {
            Shape::Sphere(s) => s.intersect(ray),
            Shape::Box(b) => b.intersect(ray),
            Shape::Mesh(_) => None,
        }
    }

    /// Closest-hit test of a local-space ray, recording `object_id` in the
    /// hit point.
    pub fn traverse(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32) {
        if let Shape::Mesh(mesh) = self {
            mesh.traverse(ctx, object_id);
            return;
        }

        ctx.context.local_counters.num_ray_object_tests += 1;
        let Some(intersection) = self.intersect_analytic(ctx.ray) else {
            return;
        };
        if let Some(distance) = intersection.closest_in(ctx.hit.distance) {
            ctx.hit.set(
                distance,
                object_id,
                intersection.sub_object_id,
                intersection.u,
                intersection.v,
            );
            ctx.context.local_counters.num_passed_ray_object_tests += 1;
        }
    }

    /// Any-hit test of a local-space ray against `ctx.hit.distance`.
    pub fn traverse_shadow(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32) -> bool {
        if let Shape::Mesh(mesh) = self {
            return mesh.traverse_shadow(ctx, object_id);
        }

        ctx.context.local_counters.num_ray_object_tests += 1;
        self.intersect_analytic(ctx.ray)
            .and_then(|intersection| intersection.closest_in(ctx.hit.distance))
            .is_some()
    }

    /// Closest-hit test of the first `num_active_groups` active groups,
    /// using the rays of slot `SLOT`.
    ///
    /// Every lane of the groups is tested: the groups' active masks may
    /// describe a different object.
    pub fn traverse_packet<const SLOT: usize>(
        &self,
        ctx: &mut PacketTraversalContext<'_>,
        object_id: u32,
        num_active_groups: usize,
    ) {
        if let Shape::Mesh(mesh) = self {
            mesh.traverse_packet::<SLOT>(ctx, object_id, num_active_groups);
            return;
        }

        let zero = [0.0f32; LANES];

        for i in 0..num_active_groups {
            let group = ctx.packet.active_group_mut(i);
            let (mask, distance) = match self {
                Shape::Sphere(s) => s.intersect_x8(&group.rays[SLOT], &group.max_distances),
                Shape::Box(b) => b.intersect_x8(&group.rays[SLOT], &group.max_distances),
                Shape::Mesh(_) => continue,
            };

            let stored = group.store_intersection(ctx.hits, mask, &distance, &zero, &zero, object_id, 0);

            let counters = &mut ctx.context.local_counters;
            counters.num_ray_object_tests += LANES as u64;
            counters.num_passed_ray_object_tests += stored as u64;
        }
    }

    /// Surface attributes at a local-space hit position.
    pub fn evaluate_intersection(&self, hit: &HitPoint, local_position: &Vec3) -> LocalSurface {
        match self {
            Shape::Sphere(s) => s.evaluate_intersection(local_position),
            Shape::Box(b) => b.evaluate_intersection(local_position),
            Shape::Mesh(m) => m.evaluate_intersection(hit),
        }
    }
}

impl From<SphereShape> for Shape {
    fn from(shape: SphereShape) -> Self {
        Shape::Sphere(shape)
    }
}

impl From<BoxShape> for Shape {
    fn from(shape: BoxShape) -> Self {
        Shape::Box(shape)
    }
}

impl From<MeshShape> for Shape {
    fn from(shape: MeshShape) -> Self {
        Shape::Mesh(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_in_skips_zero_distance() {
        let hit = ShapeIntersection {
            near_distance: 0.0,
            far_distance: 2.0,
            sub_object_id: 0,
            u: 0.0,
            v: 0.0,
        };
        assert_eq!(hit.closest_in(f32::INFINITY), Some(2.0));
        assert_eq!(hit.closest_in(2.0), None);

        let inside = ShapeIntersection {
            near_distance: -1.0,
            far_distance: 0.5,
            ..hit
        };
        assert_eq!(inside.closest_in(1.0), Some(0.5));
    }
}
