//! Sphere centered at the local origin.

use std::f32::consts::PI;

use lumen_math::{cross3, dot3, mask_lanes, Aabb, Ray, RayX8, Vec2, Vec3, LANES};
use wide::{f32x8, CmpGt, CmpLt};

use super::{LocalSurface, ShapeIntersection};

/// A sphere of a given radius around the local origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereShape {
    radius: f32,
    inv_radius: f32,
}

impl SphereShape {
    /// Create a sphere. `radius` must be positive.
    pub fn new(radius: f32) -> Self {
        debug_assert!(radius > 0.0, "sphere radius must be positive");
        Self {
            radius,
            inv_radius: 1.0 / radius,
        }
    }

    /// Sphere radius.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Local-space bounding box.
    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_center(Vec3::zeros(), Vec3::repeat(self.radius))
    }

    /// Surface area.
    pub fn surface_area(&self) -> f32 {
        4.0 * PI * self.radius * self.radius
    }

    /// Whether `point` lies inside or on the sphere.
    pub fn contains_point(&self, point: &Vec3) -> bool {
        dot3(point, point) <= self.radius * self.radius
    }

    /// Entry and exit distances of `ray`.
    ///
    /// The direction does not need to be normalized; distances are in units
    /// of the ray's direction length.
    #[inline]
    pub fn intersect(&self, ray: &Ray) -> Option<ShapeIntersection> {
        // |o + t*d|^2 = r^2  =>  a*t^2 - 2*b*t + c = 0
        let a = dot3(&ray.dir, &ray.dir);
        let b = -dot3(&ray.dir, &ray.origin);
        let c = dot3(&ray.origin, &ray.origin) - self.radius * self.radius;

        let discriminant = b * b - a * c;
        if !(discriminant > 0.0) {
            return None;
        }

        let root = discriminant.sqrt();
        Some(ShapeIntersection {
            near_distance: (b - root) / a,
            far_distance: (b + root) / a,
            sub_object_id: 0,
            u: 0.0,
            v: 0.0,
        })
    }

    /// 8-lane version of [`SphereShape::intersect`] followed by
    /// [`ShapeIntersection::closest_in`].
    ///
    /// Returns the mask of lanes with a hit in `(0, max_distances)` and the
    /// hit distances.
    #[inline]
    pub fn intersect_x8(&self, ray: &RayX8, max_distances: &[f32; LANES]) -> (u8, [f32; LANES]) {
        let [ox, oy, oz] = ray.origin.load();
        let [dx, dy, dz] = ray.dir.load();

        let a = dx * dx + dy * dy + dz * dz;
        let b = -(dx * ox + dy * oy + dz * oz);
        let c = (ox * ox + oy * oy + oz * oz) - f32x8::splat(self.radius * self.radius);

        let discriminant = b * b - a * c;
        let root = discriminant.sqrt();
        let near = (b - root) / a;
        let far = (b + root) / a;

        let zero = f32x8::splat(0.0);
        let distance = near.cmp_gt(zero).blend(near, far);
        let mask = discriminant.cmp_gt(zero)
            & distance.cmp_gt(zero)
            & distance.cmp_lt(f32x8::from(*max_distances));

        (mask_lanes(mask), distance.to_array())
    }

    /// Surface frame and spherical texture coordinates at `position`.
    pub fn evaluate_intersection(&self, position: &Vec3) -> LocalSurface {
        let normal = (*position * self.inv_radius).normalize();

        let tex_coord = Vec2::new(
            normal.z.atan2(normal.x) / (2.0 * PI) + 0.5,
            normal.y.clamp(-1.0, 1.0).acos() / PI,
        );

        // cross(Y, normal), undefined at the poles
        let tangent = cross3(&Vec3::y(), &normal);
        let tangent = if tangent.norm_squared() > 1.0e-12 {
            tangent.normalize()
        } else {
            Vec3::x()
        };

        LocalSurface {
            normal,
            tangent,
            tex_coord,
            material_index: None,
        }
    }
}
