//! Light sources.

use lumen_math::{Aabb, Vec3};

use crate::shape::Shape;

/// A light placed by a scene object.
#[derive(Debug, Clone)]
pub enum Light {
    /// Infinitely small light at the object's origin.
    Point {
        /// Emitted radiance.
        color: Vec3,
    },
    /// A shape emitting light from its surface. Visible to rays.
    Area {
        /// Emitting surface.
        shape: Shape,
        /// Emitted radiance.
        color: Vec3,
    },
    /// Constant light arriving from every direction.
    Background {
        /// Emitted radiance.
        color: Vec3,
    },
}

impl Light {
    /// Emitted radiance.
    pub fn color(&self) -> Vec3 {
        match self {
            Light::Point { color } | Light::Area { color, .. } | Light::Background { color } => *color,
        }
    }

    /// Whether the light occupies a bounded region of space.
    pub fn is_finite(&self) -> bool {
        !matches!(self, Light::Background { .. })
    }

    /// Whether the light has no extent and cannot be hit by rays.
    pub fn is_delta(&self) -> bool {
        matches!(self, Light::Point { .. })
    }

    /// The emitting surface of area lights.
    pub fn shape(&self) -> Option<&Shape> {
        match self {
            Light::Area { shape, .. } => Some(shape),
            _ => None,
        }
    }

    /// Local-space bounds. Empty for background lights.
    pub fn bounding_box(&self) -> Aabb {
        match self {
            Light::Point { .. } => Aabb::new(Vec3::zeros(), Vec3::zeros()),
            Light::Area { shape, .. } => shape.bounding_box(),
            Light::Background { .. } => Aabb::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::SphereShape;

    #[test]
    fn test_light_flags() {
        let white = Vec3::repeat(1.0);
        let point = Light::Point { color: white };
        let area = Light::Area {
            shape: SphereShape::new(1.0).into(),
            color: white,
        };
        let background = Light::Background { color: white };

        assert!(point.is_finite() && point.is_delta());
        assert!(area.is_finite() && !area.is_delta());
        assert!(!background.is_finite() && !background.is_delta());

        assert!(area.shape().is_some());
        assert!(point.shape().is_none());
        assert!(background.bounding_box().is_empty());
        assert_eq!(area.color(), white);
    }
}
