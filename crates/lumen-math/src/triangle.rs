//! Ray-triangle intersection (Möller–Trumbore).

use crate::{cross3, dot3, Aabb, Ray, Vec3};

/// A triangle stored as one vertex plus two edges, ready for intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// First vertex.
    pub v0: Vec3,
    /// `v1 - v0`.
    pub edge1: Vec3,
    /// `v2 - v0`.
    pub edge2: Vec3,
}

/// Result of a ray-triangle intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Parameter along the ray.
    pub distance: f32,
    /// Barycentric weight of `v1`.
    pub u: f32,
    /// Barycentric weight of `v2`.
    pub v: f32,
}

impl Triangle {
    /// Build from three vertex positions.
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self {
            v0,
            edge1: v1 - v0,
            edge2: v2 - v0,
        }
    }

    /// The three vertex positions.
    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v0, self.v0 + self.edge1, self.v0 + self.edge2]
    }

    /// Bounding box of the three vertices.
    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_points(self.vertices().iter())
    }

    /// Unnormalized geometric normal (`edge1 x edge2`).
    pub fn normal(&self) -> Vec3 {
        cross3(&self.edge1, &self.edge2)
    }

    /// Surface area.
    pub fn surface_area(&self) -> f32 {
        0.5 * self.normal().norm()
    }

    /// Intersect a ray with this triangle.
    ///
    /// Only hits in front of the origin (`distance > 0`) are reported.
    /// Degenerate triangles never produce a hit: every rejection test is
    /// written so that NaN fails it.
    #[inline]
    pub fn intersect_ray(&self, ray: &Ray) -> Option<TriangleHit> {
        let pvec = cross3(&ray.dir, &self.edge2);
        let det = dot3(&self.edge1, &pvec);
        let inv_det = 1.0 / det;

        let tvec = ray.origin - self.v0;
        let u = dot3(&tvec, &pvec) * inv_det;

        let qvec = cross3(&tvec, &self.edge1);
        let v = dot3(&ray.dir, &qvec) * inv_det;
        let distance = dot3(&self.edge2, &qvec) * inv_det;

        let inside = u >= 0.0 && v >= 0.0 && u + v <= 1.0 && distance > 0.0;
        inside.then_some(TriangleHit { distance, u, v })
    }
}
