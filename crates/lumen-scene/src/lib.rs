#![warn(missing_docs)]

//! Scene composition for the lumen raytracer.
//!
//! A [`Scene`] owns placed [`SceneObject`]s (shapes, lights and decals),
//! builds a BVH over the ones rays can hit and traces single rays, shadow
//! rays and ray packets through it. Meshes carry their own triangle BVH,
//! so a query descends two levels of trees.
//!
//! ```
//! use lumen_bvh::{HitPoint, RenderingContext, SingleTraversalContext};
//! use lumen_math::{Ray, Transform, Vec3};
//! use lumen_scene::{Scene, SceneObject, SphereShape};
//!
//! let mut scene = Scene::new();
//! scene.add_object(SceneObject::shape(SphereShape::new(1.0), Transform::translation(0.0, 0.0, 5.0))?);
//! scene.build_bvh()?;
//!
//! let ray = Ray::new(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0));
//! let mut hit = HitPoint::default();
//! let mut context = RenderingContext::new();
//! scene.traverse(&mut SingleTraversalContext { ray: &ray, hit: &mut hit, context: &mut context });
//! assert!((hit.distance - 4.0).abs() < 1e-5);
//! # Ok::<(), lumen_scene::SceneError>(())
//! ```

pub mod decal;
pub mod error;
pub mod intersection;
pub mod light;
pub mod object;
pub mod scene;
pub mod shape;

pub use decal::Decal;
pub use error::{Result, SceneError};
pub use intersection::{IntersectionData, ShadingData};
pub use light::Light;
pub use object::{ObjectKind, SceneObject};
pub use scene::Scene;
pub use shape::{BoxShape, LocalSurface, MeshDesc, MeshShape, Shape, ShapeIntersection, SphereShape};
