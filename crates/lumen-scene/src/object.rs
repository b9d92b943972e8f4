//! Scene objects: a placement plus what is placed.

use lumen_math::{Aabb, Transform, Vec3};

use crate::decal::Decal;
use crate::error::{Result, SceneError};
use crate::light::Light;
use crate::shape::Shape;

/// What a scene object places in the world.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// A visible shape.
    Shape(Shape),
    /// A light source.
    Light(Light),
    /// A decal box.
    Decal(Decal),
}

/// An object with its local-to-world transform.
#[derive(Debug, Clone)]
pub struct SceneObject {
    kind: ObjectKind,
    transform: Transform,
    inverse_transform: Transform,
}

impl SceneObject {
    /// Place `kind` in the world with `transform`.
    pub fn new(kind: ObjectKind, transform: Transform) -> Result<Self> {
        let inverse_transform = transform.inverse().ok_or(SceneError::SingularTransform)?;
        Ok(Self {
            kind,
            transform,
            inverse_transform,
        })
    }

    /// Place a shape.
    pub fn shape(shape: impl Into<Shape>, transform: Transform) -> Result<Self> {
        Self::new(ObjectKind::Shape(shape.into()), transform)
    }

    /// Place a light.
    pub fn light(light: Light, transform: Transform) -> Result<Self> {
        Self::new(ObjectKind::Light(light), transform)
    }

    /// Place a decal.
    pub fn decal(decal: Decal, transform: Transform) -> Result<Self> {
        Self::new(ObjectKind::Decal(decal), transform)
    }

    /// What the object places.
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Local-to-world transform.
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// World-to-local transform.
    pub fn inverse_transform(&self) -> &Transform {
        &self.inverse_transform
    }

    /// The shape rays can hit, if any: shapes and area lights.
    pub fn traceable_shape(&self) -> Option<&Shape> {
        match &self.kind {
            ObjectKind::Shape(shape) => Some(shape),
            ObjectKind::Light(light) => light.shape(),
            ObjectKind::Decal(_) => None,
        }
    }

    /// The decal, for decal objects.
    pub fn as_decal(&self) -> Option<&Decal> {
        match &self.kind {
            ObjectKind::Decal(decal) => Some(decal),
            _ => None,
        }
    }

    /// The light, for light objects.
    pub fn as_light(&self) -> Option<&Light> {
        match &self.kind {
            ObjectKind::Light(light) => Some(light),
            _ => None,
        }
    }

    /// Local-space bounds.
    pub fn local_bounding_box(&self) -> Aabb {
        match &self.kind {
            ObjectKind::Shape(shape) => shape.bounding_box(),
            ObjectKind::Light(light) => light.bounding_box(),
            ObjectKind::Decal(decal) => decal.bounding_box(),
        }
    }

    /// World-space bounds.
    pub fn bounding_box(&self) -> Aabb {
        self.transform.transform_box(&self.local_bounding_box())
    }

    /// Whether a world-space point lies inside the object's volume.
    pub fn contains_point(&self, point: &Vec3) -> bool {
        let local = self.inverse_transform.transform_point(point);
        match &self.kind {
            ObjectKind::Shape(shape) => shape.contains_point(&local),
            ObjectKind::Light(light) => light.shape().is_some_and(|shape| shape.contains_point(&local)),
            ObjectKind::Decal(decal) => decal.contains_point(&local),
        }
    }
}
