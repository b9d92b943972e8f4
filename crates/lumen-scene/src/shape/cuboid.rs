//! Axis-aligned box centered at the local origin.

use lumen_math::{mask_lanes, Aabb, Ray, RayX8, Vec2, Vec3, LANES, NUM_AXES};
use wide::{f32x8, CmpGe, CmpGt, CmpLt};

use super::{LocalSurface, ShapeIntersection};

/// A box spanning `[-half_extents, half_extents]` in local space.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxShape {
    half_extents: Vec3,
}

impl BoxShape {
    /// Create a box. All half extents must be positive.
    pub fn new(half_extents: Vec3) -> Self {
        debug_assert!(half_extents.iter().all(|&h| h > 0.0));
        Self { half_extents }
    }

    /// Half size on each axis.
    pub fn half_extents(&self) -> &Vec3 {
        &self.half_extents
    }

    /// Local-space bounding box (the box itself).
    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_center(Vec3::zeros(), self.half_extents)
    }

    /// Surface area.
    pub fn surface_area(&self) -> f32 {
        let h = &self.half_extents;
        8.0 * (h.x * h.y + h.y * h.z + h.z * h.x)
    }

    /// Whether `point` lies inside or on the box.
    pub fn contains_point(&self, point: &Vec3) -> bool {
        (0..NUM_AXES).all(|i| point[i].abs() <= self.half_extents[i])
    }

    /// Unclipped slab interval of `ray`.
    #[inline]
    pub fn intersect(&self, ray: &Ray) -> Option<ShapeIntersection> {
        let h = &self.half_extents;
        let (o, inv) = (&ray.origin, &ray.inv_dir);

        let t1x = (-h.x - o.x) * inv.x;
        let t2x = (h.x - o.x) * inv.x;
        let t1y = (-h.y - o.y) * inv.y;
        let t2y = (h.y - o.y) * inv.y;
        let t1z = (-h.z - o.z) * inv.z;
        let t2z = (h.z - o.z) * inv.z;

        let near = t1x.min(t2x).max(t1y.min(t2y)).max(t1z.min(t2z));
        let far = t1x.max(t2x).min(t1y.max(t2y)).min(t1z.max(t2z));

        (far >= near).then_some(ShapeIntersection {
            near_distance: near,
            far_distance: far,
            sub_object_id: 0,
            u: 0.0,
            v: 0.0,
        })
    }

    /// 8-lane version of [`BoxShape::intersect`] followed by
    /// [`ShapeIntersection::closest_in`].
    #[inline]
    pub fn intersect_x8(&self, ray: &RayX8, max_distances: &[f32; LANES]) -> (u8, [f32; LANES]) {
        let h = &self.half_extents;
        let [ox, oy, oz] = ray.origin.load();
        let [ix, iy, iz] = ray.inv_dir.load();

        let t1x = (f32x8::splat(-h.x) - ox) * ix;
        let t2x = (f32x8::splat(h.x) - ox) * ix;
        let t1y = (f32x8::splat(-h.y) - oy) * iy;
        let t2y = (f32x8::splat(h.y) - oy) * iy;
        let t1z = (f32x8::splat(-h.z) - oz) * iz;
        let t2z = (f32x8::splat(h.z) - oz) * iz;

        let near = t1x.min(t2x).max(t1y.min(t2y)).max(t1z.min(t2z));
        let far = t1x.max(t2x).min(t1y.max(t2y)).min(t1z.max(t2z));

        let zero = f32x8::splat(0.0);
        let distance = near.cmp_gt(zero).blend(near, far);
        let mask = far.cmp_ge(near)
            & distance.cmp_gt(zero)
            & distance.cmp_lt(f32x8::from(*max_distances));

        (mask_lanes(mask), distance.to_array())
    }

    /// Face frame and planar texture coordinates at `position`.
    pub fn evaluate_intersection(&self, position: &Vec3) -> LocalSurface {
        // the face is on the axis where the point is relatively farthest out
        let relative = position.component_div(&self.half_extents);
        let axis = (0..NUM_AXES)
            .max_by(|&a, &b| relative[a].abs().total_cmp(&relative[b].abs()))
            .unwrap_or(0);

        let mut normal = Vec3::zeros();
        normal[axis] = relative[axis].signum();

        let u_axis = (axis + 1) % NUM_AXES;
        let v_axis = (axis + 2) % NUM_AXES;
        let mut tangent = Vec3::zeros();
        tangent[u_axis] = 1.0;

        LocalSurface {
            normal,
            tangent,
            tex_coord: Vec2::new(
                0.5 * (relative[u_axis] + 1.0),
                0.5 * (relative[v_axis] + 1.0),
            ),
            material_index: None,
        }
    }
}
