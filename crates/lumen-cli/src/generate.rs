//! Procedural test scenes and the camera looking at them.

use std::f32::consts::PI;

use anyhow::Result;
use lumen_math::{Ray, Transform, Vec2, Vec3};
use lumen_scene::{BoxShape, Decal, Light, MeshDesc, MeshShape, Scene, SceneObject, SphereShape};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RenderConfig;

/// Half-size of the cube objects are scattered in.
const SCENE_EXTENT: f32 = 20.0;

fn random_point(rng: &mut StdRng, extent: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
    )
}

fn random_placement(rng: &mut StdRng, scale: f32) -> Transform {
    let p = random_point(rng, SCENE_EXTENT);
    Transform::translation(p.x, p.y, p.z)
        .then(&Transform::rotation_y(rng.gen_range(0.0..2.0 * PI)))
        .then(&Transform::rotation_x(rng.gen_range(0.0..2.0 * PI)))
        .then(&Transform::scale(scale, scale, scale))
}

/// A wavy height field over `[-1, 1]^2` with `resolution^2` quads.
pub fn height_field(resolution: u32, phase: f32) -> MeshDesc {
    let n = resolution;
    let mut positions = Vec::with_capacity(((n + 1) * (n + 1)) as usize);
    let mut tex_coords = Vec::with_capacity(positions.capacity());
    for j in 0..=n {
        for i in 0..=n {
            let s = i as f32 / n as f32;
            let t = j as f32 / n as f32;
            let x = s * 2.0 - 1.0;
            let z = t * 2.0 - 1.0;
            let y = 0.15 * (4.0 * x + phase).sin() * (3.0 * z).cos();
            positions.push(Vec3::new(x, y, z));
            tex_coords.push(Vec2::new(s, t));
        }
    }

    let mut indices = Vec::with_capacity((n * n * 6) as usize);
    let mut material_indices = Vec::with_capacity((n * n * 2) as usize);
    for j in 0..n {
        for i in 0..n {
            let a = j * (n + 1) + i;
            let c = a + n + 1;
            indices.extend_from_slice(&[a, c, a + 1, a + 1, c, c + 1]);
            let checker = (i + j) % 2;
            material_indices.extend_from_slice(&[checker, checker]);
        }
    }

    MeshDesc {
        name: format!("height field {resolution}x{resolution}"),
        positions,
        indices,
        tex_coords: Some(tex_coords),
        material_indices: Some(material_indices),
        ..MeshDesc::default()
    }
}

/// Scatter the configured objects and build the scene BVHs.
pub fn generate_scene(config: &RenderConfig) -> Result<Scene> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut scene = Scene::with_build_params(config.build.clone());

    for _ in 0..config.num_spheres {
        let radius = rng.gen_range(0.3..1.5);
        let placement = random_placement(&mut rng, 1.0);
        scene.add_object(SceneObject::shape(SphereShape::new(radius), placement)?);
    }

    for _ in 0..config.num_boxes {
        let half_extents = Vec3::new(
            rng.gen_range(0.2..1.2),
            rng.gen_range(0.2..1.2),
            rng.gen_range(0.2..1.2),
        );
        let placement = random_placement(&mut rng, 1.0);
        scene.add_object(SceneObject::shape(BoxShape::new(half_extents), placement)?);
    }

    for _ in 0..config.num_meshes {
        let mesh = MeshShape::new(&height_field(config.mesh_resolution, rng.gen_range(0.0..PI)))?;
        let scale = rng.gen_range(1.0..4.0);
        let placement = random_placement(&mut rng, scale);
        scene.add_object(SceneObject::shape(mesh, placement)?);
    }

    for i in 0..config.num_decals {
        let color = Vec3::new(rng.gen(), rng.gen(), rng.gen());
        let scale = rng.gen_range(1.0..3.0);
        let placement = random_placement(&mut rng, scale);
        scene.add_object(SceneObject::decal(Decal::new(color, 0.5, i as i32), placement)?);
    }

    scene.add_object(SceneObject::light(
        Light::Area {
            shape: SphereShape::new(2.0).into(),
            color: Vec3::repeat(10.0),
        },
        Transform::translation(0.0, SCENE_EXTENT + 5.0, 0.0),
    )?);
    scene.add_object(SceneObject::light(
        Light::Point { color: Vec3::repeat(50.0) },
        Transform::translation(SCENE_EXTENT, SCENE_EXTENT, SCENE_EXTENT),
    )?);
    scene.add_object(SceneObject::light(
        Light::Background { color: Vec3::new(0.2, 0.3, 0.5) },
        Transform::identity(),
    )?);

    scene.build_bvh()?;
    Ok(scene)
}

/// Pinhole camera.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    tan_half_fov: f32,
}

impl Camera {
    /// Camera at `position` looking at `target` with a vertical field of
    /// view of `fov_y` radians.
    pub fn look_at(position: Vec3, target: Vec3, fov_y: f32) -> Self {
        let forward = (target - position).normalize();
        let right = forward.cross(&Vec3::y()).normalize();
        let up = right.cross(&forward);
        Self {
            position,
            forward,
            right,
            up,
            tan_half_fov: (fov_y * 0.5).tan(),
        }
    }

    /// Camera framing the generated scene.
    pub fn for_generated_scene() -> Self {
        let distance = SCENE_EXTENT * 2.5;
        Self::look_at(Vec3::new(distance * 0.6, distance * 0.4, distance), Vec3::zeros(), 60f32.to_radians())
    }

    /// Primary ray through the center of pixel `(x, y)`.
    pub fn primary_ray(&self, x: u32, y: u32, width: u32, height: u32) -> Ray {
        let aspect = width as f32 / height as f32;
        let sx = ((x as f32 + 0.5) / width as f32 * 2.0 - 1.0) * self.tan_half_fov * aspect;
        let sy = (1.0 - (y as f32 + 0.5) / height as f32 * 2.0) * self.tan_half_fov;
        Ray::new(self.position, self.forward + self.right * sx + self.up * sy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_field_buffers() {
        let desc = height_field(3, 0.0);
        assert_eq!(desc.positions.len(), 16);
        assert_eq!(desc.indices.len(), 54);
        assert_eq!(desc.material_indices.as_ref().map(Vec::len), Some(18));
        assert!(MeshShape::new(&desc).is_ok());
    }

    #[test]
    fn test_generate_scene_counts() {
        let config = RenderConfig {
            num_spheres: 5,
            num_boxes: 4,
            num_meshes: 2,
            mesh_resolution: 4,
            num_decals: 3,
            ..RenderConfig::default()
        };
        let scene = generate_scene(&config).unwrap();
        // shapes plus the area light
        assert_eq!(scene.num_traceable_objects(), 12);
        assert_eq!(scene.decals().count(), 3);
        assert_eq!(scene.lights().count(), 3);
        assert_eq!(scene.global_lights().count(), 1);
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), 1.0);
        let ray = camera.primary_ray(1, 1, 3, 3);
        assert!((ray.dir - Vec3::new(0.0, 0.0, -1.0)).norm() < 1e-6);
    }
}
