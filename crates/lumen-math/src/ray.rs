//! Ray representation and the ray-box slab test.

use crate::{reciprocal, Aabb, Vec3};

/// A ray in 3D space defined by origin and direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Origin point of the ray.
    pub origin: Vec3,
    /// Direction of the ray. Unit length unless the ray was transformed.
    pub dir: Vec3,
    /// Precomputed reciprocal of direction components for fast AABB tests.
    pub inv_dir: Vec3,
}

impl Ray {
    /// Create a new ray from origin and direction.
    ///
    /// The direction will be normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let dir = direction.normalize();
        Self {
            origin,
            dir,
            inv_dir: reciprocal(&dir),
        }
    }

    /// Create a ray whose direction is used as given (not normalized).
    pub fn with_direction(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir,
            inv_dir: reciprocal(&dir),
        }
    }

    /// Evaluate the ray at parameter `t`: `origin + t * dir`.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }

    /// Whether the direction points towards negative values on `axis`.
    #[inline]
    pub fn is_negative(&self, axis: usize) -> bool {
        self.dir[axis] < 0.0
    }

    /// Direction octant: bit `i` is set when the direction is negative on axis `i`.
    #[inline]
    pub fn octant(&self) -> u8 {
        (self.dir.x < 0.0) as u8 | ((self.dir.y < 0.0) as u8) << 1 | ((self.dir.z < 0.0) as u8) << 2
    }

    /// Slab test against a box, clipped to `[0, max_distance]`.
    ///
    /// Returns the entry distance when the clipped segment overlaps the box.
    /// The 8-lane [`crate::RayX8::intersect_box`] performs the same
    /// operations in the same order.
    #[inline]
    pub fn intersect_box(&self, aabb: &Aabb, max_distance: f32) -> Option<f32> {
        let t1x = (aabb.min.x - self.origin.x) * self.inv_dir.x;
        let t2x = (aabb.max.x - self.origin.x) * self.inv_dir.x;
        let t1y = (aabb.min.y - self.origin.y) * self.inv_dir.y;
        let t2y = (aabb.max.y - self.origin.y) * self.inv_dir.y;
        let t1z = (aabb.min.z - self.origin.z) * self.inv_dir.z;
        let t2z = (aabb.max.z - self.origin.z) * self.inv_dir.z;

        let enter = t1x.min(t2x).max(t1y.min(t2y)).max(t1z.min(t2z)).max(0.0);
        let exit = t1x
            .max(t2x)
            .min(t1y.max(t2y))
            .min(t1z.max(t2z))
            .min(max_distance);

        if enter <= exit {
            Some(enter)
        } else {
            None
        }
    }
}
