//! Surface data computed for a hit point.

use lumen_math::{cross3, dot3, orthogonal_tangent, Vec2, Vec3};

/// World-space shading frame and surface attributes of a hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionData {
    /// Hit position.
    pub position: Vec3,
    /// Unit tangent, orthogonal to the normal.
    pub tangent: Vec3,
    /// Unit bitangent, `tangent x normal`.
    pub bitangent: Vec3,
    /// Unit shading normal.
    pub normal: Vec3,
    /// Texture coordinate.
    pub tex_coord: Vec2,
    /// Material of the hit primitive.
    pub material_index: Option<u32>,
    /// Traceable object that was hit.
    pub object_id: u32,
}

impl Default for IntersectionData {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            tangent: Vec3::x(),
            bitangent: -Vec3::y(),
            normal: Vec3::z(),
            tex_coord: Vec2::zeros(),
            material_index: None,
            object_id: lumen_bvh::INVALID_OBJECT,
        }
    }
}

impl IntersectionData {
    /// Express a world-space direction in the shading frame.
    pub fn world_to_local(&self, v: &Vec3) -> Vec3 {
        Vec3::new(dot3(v, &self.tangent), dot3(v, &self.bitangent), dot3(v, &self.normal))
    }
}

/// Surface state handed to shading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingData {
    /// Geometry of the hit.
    pub intersection: IntersectionData,
    /// Surface color before lighting.
    pub base_color: Vec3,
}

impl ShadingData {
    /// Shading data for a surface of the given color.
    pub fn new(intersection: IntersectionData, base_color: Vec3) -> Self {
        Self {
            intersection,
            base_color,
        }
    }
}

/// Make `tangent` orthogonal to the unit `normal` and normalize it.
pub(crate) fn orthonormalize(tangent: &Vec3, normal: &Vec3) -> Vec3 {
    let projected = tangent - normal * dot3(tangent, normal);
    if projected.norm_squared() > 1.0e-12 {
        projected.normalize()
    } else {
        orthogonal_tangent(normal)
    }
}

/// Complete a frame from a unit normal and an approximate tangent.
pub(crate) fn build_frame(tangent: &Vec3, normal: &Vec3) -> (Vec3, Vec3) {
    let tangent = orthonormalize(tangent, normal);
    (tangent, cross3(&tangent, normal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_build_frame_orthonormal() {
        let normal = Vec3::new(1.0, 2.0, 2.0).normalize();
        let (tangent, bitangent) = build_frame(&Vec3::new(1.0, 0.0, 0.0), &normal);
        assert_relative_eq!(tangent.norm(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(bitangent.norm(), 1.0, epsilon = 1e-6);
        assert!(dot3(&tangent, &normal).abs() < 1e-6);
        assert!(dot3(&bitangent, &normal).abs() < 1e-6);
        assert!(dot3(&bitangent, &tangent).abs() < 1e-6);
    }

    #[test]
    fn test_tangent_parallel_to_normal() {
        let (tangent, _) = build_frame(&Vec3::z(), &Vec3::z());
        assert!(dot3(&tangent, &Vec3::z()).abs() < 1e-6);
    }

    #[test]
    fn test_world_to_local() {
        let data = IntersectionData::default();
        let local = data.world_to_local(&Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(local, Vec3::new(0.0, 0.0, 2.0));
    }
}
