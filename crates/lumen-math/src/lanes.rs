//! 8-wide structure-of-arrays ray math.
//!
//! Lanes are stored as plain `[f32; 8]` arrays so single lanes can be read,
//! written and swapped with safe code; the arithmetic loads them into
//! [`wide::f32x8`] registers.

use wide::{f32x8, CmpGe, CmpGt, CmpLe, CmpLt};

use crate::{Aabb, Ray, Transform, Triangle, Vec3};

/// Number of rays processed together.
pub const LANES: usize = 8;

/// Convert a SIMD comparison result into a lane bitmask.
#[inline(always)]
pub fn mask_lanes(mask: f32x8) -> u8 {
    (mask.move_mask() & 0xFF) as u8
}

/// Eight 3D vectors in structure-of-arrays layout.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3x8 {
    /// X components.
    pub x: [f32; LANES],
    /// Y components.
    pub y: [f32; LANES],
    /// Z components.
    pub z: [f32; LANES],
}

impl Vec3x8 {
    /// Same vector in all lanes.
    pub fn splat(v: &Vec3) -> Self {
        Self {
            x: [v.x; LANES],
            y: [v.y; LANES],
            z: [v.z; LANES],
        }
    }

    /// Read one lane.
    #[inline]
    pub fn lane(&self, i: usize) -> Vec3 {
        Vec3::new(self.x[i], self.y[i], self.z[i])
    }

    /// All lanes of one component (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn component(&self, axis: usize) -> &[f32; LANES] {
        match axis {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }

    /// Write one lane.
    #[inline]
    pub fn set_lane(&mut self, i: usize, v: &Vec3) {
        self.x[i] = v.x;
        self.y[i] = v.y;
        self.z[i] = v.z;
    }

    /// Swap lane `i` of `self` with lane `j` of `other`.
    #[inline]
    pub fn swap_lane(&mut self, i: usize, other: &mut Vec3x8, j: usize) {
        std::mem::swap(&mut self.x[i], &mut other.x[j]);
        std::mem::swap(&mut self.y[i], &mut other.y[j]);
        std::mem::swap(&mut self.z[i], &mut other.z[j]);
    }

    /// Swap two lanes of the same vector.
    #[inline]
    pub fn swap_lanes(&mut self, i: usize, j: usize) {
        self.x.swap(i, j);
        self.y.swap(i, j);
        self.z.swap(i, j);
    }

    /// Load into SIMD registers.
    #[inline(always)]
    pub fn load(&self) -> [f32x8; 3] {
        [
            f32x8::from(self.x),
            f32x8::from(self.y),
            f32x8::from(self.z),
        ]
    }

    /// Store from SIMD registers.
    #[inline(always)]
    pub fn store(v: [f32x8; 3]) -> Self {
        Self {
            x: v[0].to_array(),
            y: v[1].to_array(),
            z: v[2].to_array(),
        }
    }

    /// Component-wise reciprocal.
    #[inline]
    pub fn reciprocal(&self) -> Self {
        let one = f32x8::splat(1.0);
        let [x, y, z] = self.load();
        Self::store([one / x, one / y, one / z])
    }
}

/// Result of an 8-lane ray-triangle test.
#[derive(Debug, Clone, Copy)]
pub struct TriangleHitX8 {
    /// Distances per lane.
    pub distance: [f32; LANES],
    /// Barycentric `u` per lane.
    pub u: [f32; LANES],
    /// Barycentric `v` per lane.
    pub v: [f32; LANES],
}

/// Eight rays in structure-of-arrays layout.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RayX8 {
    /// Origins.
    pub origin: Vec3x8,
    /// Directions.
    pub dir: Vec3x8,
    /// Reciprocal directions.
    pub inv_dir: Vec3x8,
}

impl RayX8 {
    /// Read one lane as a scalar ray.
    #[inline]
    pub fn lane(&self, i: usize) -> Ray {
        Ray {
            origin: self.origin.lane(i),
            dir: self.dir.lane(i),
            inv_dir: self.inv_dir.lane(i),
        }
    }

    /// Write one lane from a scalar ray.
    #[inline]
    pub fn set_lane(&mut self, i: usize, ray: &Ray) {
        self.origin.set_lane(i, &ray.origin);
        self.dir.set_lane(i, &ray.dir);
        self.inv_dir.set_lane(i, &ray.inv_dir);
    }

    /// Swap lane `i` of `self` with lane `j` of `other`.
    #[inline]
    pub fn swap_lane(&mut self, i: usize, other: &mut RayX8, j: usize) {
        self.origin.swap_lane(i, &mut other.origin, j);
        self.dir.swap_lane(i, &mut other.dir, j);
        self.inv_dir.swap_lane(i, &mut other.inv_dir, j);
    }

    /// Swap two lanes of the same ray set.
    #[inline]
    pub fn swap_lanes(&mut self, i: usize, j: usize) {
        self.origin.swap_lanes(i, j);
        self.dir.swap_lanes(i, j);
        self.inv_dir.swap_lanes(i, j);
    }

    /// Transform all lanes into the space of `transform`.
    ///
    /// Mirrors [`Transform::transform_ray`] lane by lane.
    pub fn transformed(&self, transform: &Transform) -> RayX8 {
        let m = &transform.matrix;
        let e = |r: usize, c: usize| f32x8::splat(m[(r, c)]);

        let [ox, oy, oz] = self.origin.load();
        let origin = [
            e(0, 0) * ox + e(0, 1) * oy + e(0, 2) * oz + e(0, 3),
            e(1, 0) * ox + e(1, 1) * oy + e(1, 2) * oz + e(1, 3),
            e(2, 0) * ox + e(2, 1) * oy + e(2, 2) * oz + e(2, 3),
        ];

        let [dx, dy, dz] = self.dir.load();
        let dir = [
            e(0, 0) * dx + e(0, 1) * dy + e(0, 2) * dz,
            e(1, 0) * dx + e(1, 1) * dy + e(1, 2) * dz,
            e(2, 0) * dx + e(2, 1) * dy + e(2, 2) * dz,
        ];

        let one = f32x8::splat(1.0);
        let inv_dir = [one / dir[0], one / dir[1], one / dir[2]];

        RayX8 {
            origin: Vec3x8::store(origin),
            dir: Vec3x8::store(dir),
            inv_dir: Vec3x8::store(inv_dir),
        }
    }

    /// Slab test of all lanes against one box, clipped to `[0, max_distances]`.
    ///
    /// Returns the bitmask of lanes whose segment overlaps the box.
    #[inline]
    pub fn intersect_box(&self, aabb: &Aabb, max_distances: &[f32; LANES]) -> u8 {
        let [ox, oy, oz] = self.origin.load();
        let [ix, iy, iz] = self.inv_dir.load();

        let t1x = (f32x8::splat(aabb.min.x) - ox) * ix;
        let t2x = (f32x8::splat(aabb.max.x) - ox) * ix;
        let t1y = (f32x8::splat(aabb.min.y) - oy) * iy;
        let t2y = (f32x8::splat(aabb.max.y) - oy) * iy;
        let t1z = (f32x8::splat(aabb.min.z) - oz) * iz;
        let t2z = (f32x8::splat(aabb.max.z) - oz) * iz;

        let enter = t1x
            .min(t2x)
            .max(t1y.min(t2y))
            .max(t1z.min(t2z))
            .max(f32x8::splat(0.0));
        let exit = t1x
            .max(t2x)
            .min(t1y.max(t2y))
            .min(t1z.max(t2z))
            .min(f32x8::from(*max_distances));

        mask_lanes(enter.cmp_le(exit))
    }

    /// Möller–Trumbore test of all lanes against one triangle.
    ///
    /// Mirrors [`Triangle::intersect_ray`]; a lane passes when its hit lies
    /// in `(0, max_distances)`.
    #[inline]
    pub fn intersect_triangle(
        &self,
        tri: &Triangle,
        max_distances: &[f32; LANES],
    ) -> (u8, TriangleHitX8) {
        let [dx, dy, dz] = self.dir.load();
        let [ox, oy, oz] = self.origin.load();

        let (e1x, e1y, e1z) = (
            f32x8::splat(tri.edge1.x),
            f32x8::splat(tri.edge1.y),
            f32x8::splat(tri.edge1.z),
        );
        let (e2x, e2y, e2z) = (
            f32x8::splat(tri.edge2.x),
            f32x8::splat(tri.edge2.y),
            f32x8::splat(tri.edge2.z),
        );

        // pvec = dir x edge2
        let px = dy * e2z - dz * e2y;
        let py = dz * e2x - dx * e2z;
        let pz = dx * e2y - dy * e2x;

        let det = e1x * px + e1y * py + e1z * pz;
        let inv_det = f32x8::splat(1.0) / det;

        let tx = ox - f32x8::splat(tri.v0.x);
        let ty = oy - f32x8::splat(tri.v0.y);
        let tz = oz - f32x8::splat(tri.v0.z);
        let u = (tx * px + ty * py + tz * pz) * inv_det;

        // qvec = tvec x edge1
        let qx = ty * e1z - tz * e1y;
        let qy = tz * e1x - tx * e1z;
        let qz = tx * e1y - ty * e1x;

        let v = (dx * qx + dy * qy + dz * qz) * inv_det;
        let distance = (e2x * qx + e2y * qy + e2z * qz) * inv_det;

        let zero = f32x8::splat(0.0);
        let mask = u.cmp_ge(zero)
            & v.cmp_ge(zero)
            & (u + v).cmp_le(f32x8::splat(1.0))
            & distance.cmp_gt(zero)
            & distance.cmp_lt(f32x8::from(*max_distances));

        (
            mask_lanes(mask),
            TriangleHitX8 {
                distance: distance.to_array(),
                u: u.to_array(),
                v: v.to_array(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rays() -> Vec<Ray> {
        (0..LANES)
            .map(|i| {
                let f = i as f32;
                Ray::new(
                    Vec3::new(-3.0 + 0.1 * f, 0.2 + 0.05 * f, 0.3 - 0.02 * f),
                    Vec3::new(1.0, 0.1 * (f - 4.0), 0.05 * f + 0.01),
                )
            })
            .collect()
    }

    fn pack(rays: &[Ray]) -> RayX8 {
        let mut packed = RayX8::default();
        for (i, ray) in rays.iter().enumerate() {
            packed.set_lane(i, ray);
        }
        packed
    }

    #[test]
    fn test_lane_round_trip() {
        let rays = sample_rays();
        let packed = pack(&rays);
        for (i, ray) in rays.iter().enumerate() {
            assert_eq!(packed.lane(i), *ray);
        }
    }

    #[test]
    fn test_swap_lane_between_sets() {
        let rays = sample_rays();
        let mut a = pack(&rays);
        let mut b = RayX8::default();
        a.swap_lane(2, &mut b, 5);
        assert_eq!(b.lane(5), rays[2]);
        assert_eq!(a.lane(2), RayX8::default().lane(0));
    }

    #[test]
    fn test_box_matches_scalar() {
        let rays = sample_rays();
        let packed = pack(&rays);
        let aabb = Aabb::new(Vec3::new(-0.5, -0.5, -0.5), Vec3::new(0.5, 0.7, 0.9));
        let max = [f32::INFINITY, 1.0, f32::INFINITY, 3.0, f32::INFINITY, 10.0, 2.5, 4.0];

        let mask = packed.intersect_box(&aabb, &max);
        for (i, ray) in rays.iter().enumerate() {
            let scalar = ray.intersect_box(&aabb, max[i]).is_some();
            assert_eq!(mask & (1 << i) != 0, scalar, "lane {i}");
        }
    }

    #[test]
    fn test_triangle_matches_scalar() {
        let rays = sample_rays();
        let packed = pack(&rays);
        let tri = Triangle::new(
            Vec3::new(0.0, -1.0, -1.0),
            Vec3::new(0.0, 2.0, -1.0),
            Vec3::new(0.5, 0.0, 2.0),
        );
        let max = [f32::INFINITY; LANES];

        let (mask, hit) = packed.intersect_triangle(&tri, &max);
        for (i, ray) in rays.iter().enumerate() {
            match tri.intersect_ray(ray) {
                Some(h) => {
                    assert!(mask & (1 << i) != 0, "lane {i}");
                    assert_eq!(hit.distance[i], h.distance);
                    assert_eq!(hit.u[i], h.u);
                    assert_eq!(hit.v[i], h.v);
                }
                None => assert_eq!(mask & (1 << i), 0, "lane {i}"),
            }
        }
    }

    #[test]
    fn test_transform_matches_scalar() {
        let rays = sample_rays();
        let packed = pack(&rays);
        let t = Transform::translation(1.0, -2.0, 0.5).then(&Transform::rotation_y(0.3));
        let transformed = packed.transformed(&t);
        for (i, ray) in rays.iter().enumerate() {
            assert_eq!(transformed.lane(i), t.transform_ray(ray));
        }
    }
}
