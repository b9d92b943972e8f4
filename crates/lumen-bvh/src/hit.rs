//! Ray hit records.

/// Object id of a hit point that has not hit anything.
pub const INVALID_OBJECT: u32 = u32::MAX;

/// Closest intersection found so far along one ray.
///
/// Traversal only ever lowers `distance`, so the record stays valid while
/// more of the tree is visited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitPoint {
    /// Distance along the ray.
    pub distance: f32,
    /// Index of the hit object in its container.
    pub object_id: u32,
    /// Primitive within the object (triangle index for meshes).
    pub sub_object_id: u32,
    /// First barycentric / surface coordinate.
    pub u: f32,
    /// Second barycentric / surface coordinate.
    pub v: f32,
}

impl Default for HitPoint {
    fn default() -> Self {
        Self {
            distance: f32::INFINITY,
            object_id: INVALID_OBJECT,
            sub_object_id: INVALID_OBJECT,
            u: 0.0,
            v: 0.0,
        }
    }
}

impl HitPoint {
    /// A miss record that only accepts hits closer than `max_distance`.
    pub fn with_max_distance(max_distance: f32) -> Self {
        Self {
            distance: max_distance,
            ..Self::default()
        }
    }

    /// Reset to the miss state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether an object was hit.
    #[inline]
    pub fn is_hit(&self) -> bool {
        self.object_id != INVALID_OBJECT
    }

    /// Record a hit.
    #[inline]
    pub fn set(&mut self, distance: f32, object_id: u32, sub_object_id: u32, u: f32, v: f32) {
        self.distance = distance;
        self.object_id = object_id;
        self.sub_object_id = sub_object_id;
        self.u = u;
        self.v = v;
    }
}
