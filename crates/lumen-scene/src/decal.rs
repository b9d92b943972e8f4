//! Decals: colored boxes projected onto the surfaces they overlap.

use lumen_math::{Aabb, Vec3, NUM_AXES};

use crate::intersection::ShadingData;

/// A decal covering the unit cube `[-1, 1]^3` of its object's local space.
#[derive(Debug, Clone, PartialEq)]
pub struct Decal {
    /// Color blended into the surface.
    pub color: Vec3,
    /// Blend factor in `[0, 1]`.
    pub alpha: f32,
    /// Decals with a higher order are applied first.
    pub order: i32,
}

impl Decal {
    /// Create a decal.
    pub fn new(color: Vec3, alpha: f32, order: i32) -> Self {
        Self { color, alpha, order }
    }

    /// Local-space bounds.
    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_center(Vec3::zeros(), Vec3::repeat(1.0))
    }

    /// Whether a local-space point is covered by the decal.
    pub fn contains_point(&self, point: &Vec3) -> bool {
        (0..NUM_AXES).all(|i| point[i].abs() <= 1.0)
    }

    /// Blend the decal color into the surface color.
    pub fn apply(&self, shading: &mut ShadingData) {
        shading.base_color = shading.base_color.lerp(&self.color, self.alpha);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intersection::IntersectionData;
    use approx::assert_relative_eq;

    #[test]
    fn test_apply_blends_color() {
        let decal = Decal::new(Vec3::new(1.0, 0.0, 0.0), 0.25, 0);
        let mut shading = ShadingData::new(IntersectionData::default(), Vec3::new(0.0, 0.0, 1.0));
        decal.apply(&mut shading);
        assert_relative_eq!(shading.base_color, Vec3::new(0.25, 0.0, 0.75), epsilon = 1e-6);
    }

    #[test]
    fn test_containment() {
        let decal = Decal::new(Vec3::zeros(), 1.0, 0);
        assert!(decal.contains_point(&Vec3::new(1.0, -1.0, 0.5)));
        assert!(!decal.contains_point(&Vec3::new(0.0, 0.0, 1.01)));
    }
}
