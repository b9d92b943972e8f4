#![allow(dead_code)]

use lumen_bvh::{
    BuildParams, Bvh, HitPoint, LeafProvider, Node, PacketLeafProvider, PacketTraversalContext,
    SingleTraversalContext,
};
use lumen_math::{Aabb, Ray, Triangle, Vec3};
use rand::rngs::StdRng;
use rand::Rng;

pub fn random_point(rng: &mut StdRng, extent: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
    )
}

pub fn random_boxes(rng: &mut StdRng, n: usize) -> Vec<Aabb> {
    (0..n)
        .map(|_| {
            let center = random_point(rng, 50.0);
            let half = Vec3::new(
                rng.gen_range(0.01..2.0),
                rng.gen_range(0.01..2.0),
                rng.gen_range(0.01..2.0),
            );
            Aabb::from_center(center, half)
        })
        .collect()
}

pub fn random_triangles(rng: &mut StdRng, n: usize, extent: f32, size: f32) -> Vec<Triangle> {
    (0..n)
        .map(|_| {
            let center = random_point(rng, extent);
            let v0 = center + random_point(rng, size);
            let v1 = center + random_point(rng, size);
            let v2 = center + random_point(rng, size);
            Triangle::new(v0, v1, v2)
        })
        .collect()
}

/// A ray from a random point on a sphere of radius `radius` aimed near the
/// origin.
pub fn random_ray(rng: &mut StdRng, radius: f32) -> Ray {
    let origin = loop {
        let p = random_point(rng, 1.0);
        if p.norm() > 0.1 && p.norm() <= 1.0 {
            break p.normalize() * radius;
        }
    };
    let target = random_point(rng, radius * 0.3);
    Ray::new(origin, target - origin)
}

/// Triangles stored in leaf order with their original indices.
pub struct TriangleSoup {
    pub bvh: Bvh,
    pub triangles: Vec<Triangle>,
    pub original_index: Vec<u32>,
}

impl TriangleSoup {
    pub fn new(triangles: &[Triangle], params: &BuildParams) -> Self {
        let boxes: Vec<Aabb> = triangles.iter().map(Triangle::bounding_box).collect();
        let (bvh, order) = Bvh::build(&boxes, params).unwrap();
        Self {
            bvh,
            triangles: order.iter().map(|&i| triangles[i as usize]).collect(),
            original_index: order,
        }
    }
}

impl LeafProvider for TriangleSoup {
    fn traverse_leaf(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32, leaf: &Node) {
        for slot in leaf.leaf_range() {
            let slot = slot as usize;
            ctx.context.local_counters.num_ray_object_tests += 1;
            if let Some(hit) = self.triangles[slot].intersect_ray(ctx.ray) {
                if hit.distance < ctx.hit.distance {
                    ctx.hit.set(hit.distance, object_id, self.original_index[slot], hit.u, hit.v);
                    ctx.context.local_counters.num_passed_ray_object_tests += 1;
                }
            }
        }
    }

    fn traverse_leaf_shadow(&self, ctx: &mut SingleTraversalContext<'_>, _object_id: u32, leaf: &Node) -> bool {
        leaf.leaf_range().any(|slot| {
            self.triangles[slot as usize]
                .intersect_ray(ctx.ray)
                .is_some_and(|hit| hit.distance < ctx.hit.distance)
        })
    }
}

impl PacketLeafProvider for TriangleSoup {
    fn traverse_leaf_packet<const SLOT: usize>(
        &self,
        ctx: &mut PacketTraversalContext<'_>,
        object_id: u32,
        leaf: &Node,
        num_active_groups: usize,
    ) {
        for slot in leaf.leaf_range() {
            let slot = slot as usize;
            let triangle = &self.triangles[slot];
            for i in 0..num_active_groups {
                let group = ctx.packet.active_group_mut(i);
                let (mask, hit) = group.rays[SLOT].intersect_triangle(triangle, &group.max_distances);
                group.store_intersection(
                    ctx.hits,
                    mask & group.active_mask,
                    &hit.distance,
                    &hit.u,
                    &hit.v,
                    object_id,
                    self.original_index[slot],
                );
            }
        }
    }
}

/// Closest hit by testing every triangle.
pub fn brute_force_closest(triangles: &[Triangle], ray: &Ray, max_distance: f32) -> HitPoint {
    let mut best = HitPoint::with_max_distance(max_distance);
    for (i, triangle) in triangles.iter().enumerate() {
        if let Some(hit) = triangle.intersect_ray(ray) {
            if hit.distance < best.distance {
                best.set(hit.distance, 0, i as u32, hit.u, hit.v);
            }
        }
    }
    best
}
