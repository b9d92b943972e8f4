//! The scene: placed objects and the acceleration structures over them.
//!
//! Objects are added in any order and categorized when [`Scene::build_bvh`]
//! runs. Shapes and area lights become *traceable* objects indexed by the
//! world BVH, decals get a separate BVH used for point queries, and lights
//! without a surface are only listed. Hit points store the traceable index
//! of the object they hit, which is also the object's leaf slot in the
//! world BVH.

use std::cmp::Reverse;

use log::info;
use lumen_bvh::{
    traverse_packet, traverse_shadow, traverse_single, BuildParams, Bvh, Heuristic, HitPoint, LeafProvider, Node,
    PacketLeafProvider, PacketTraversalContext, RayPacket, RenderingContext, SingleTraversalContext, MAX_DEPTH,
    OBJECT_SLOT, WORLD_SLOT,
};
use lumen_math::{Aabb, Ray, Vec3};

use crate::decal::Decal;
use crate::error::Result;
use crate::intersection::{build_frame, IntersectionData, ShadingData};
use crate::object::{ObjectKind, SceneObject};

/// A collection of placed objects with their BVHs.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
    build_params: BuildParams,

    traceable: Vec<u32>,
    decals: Vec<u32>,
    lights: Vec<u32>,
    global_lights: Vec<u32>,

    bvh: Bvh,
    decals_bvh: Bvh,
}

impl Scene {
    /// An empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty scene whose world BVH is built with `params`.
    ///
    /// The decal BVH uses the same parameters with the volume heuristic.
    pub fn with_build_params(params: BuildParams) -> Self {
        Self {
            build_params: params,
            ..Self::default()
        }
    }

    /// Add an object and return its index in [`Scene::objects`].
    ///
    /// The object is not traced until the next [`Scene::build_bvh`].
    pub fn add_object(&mut self, object: SceneObject) -> u32 {
        self.objects.push(object);
        (self.objects.len() - 1) as u32
    }

    /// All objects, in insertion order.
    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    /// Number of objects rays can hit.
    pub fn num_traceable_objects(&self) -> usize {
        self.traceable.len()
    }

    /// The traceable object stored at `id`, as recorded in hit points.
    pub fn traceable_object(&self, id: u32) -> &SceneObject {
        &self.objects[self.traceable[id as usize] as usize]
    }

    /// Light objects.
    pub fn lights(&self) -> impl Iterator<Item = &SceneObject> + '_ {
        self.lights.iter().map(|&i| &self.objects[i as usize])
    }

    /// Lights without a position in space.
    pub fn global_lights(&self) -> impl Iterator<Item = &SceneObject> + '_ {
        self.global_lights.iter().map(|&i| &self.objects[i as usize])
    }

    /// Decal objects, in decal BVH leaf order.
    pub fn decals(&self) -> impl Iterator<Item = &SceneObject> + '_ {
        self.decals.iter().map(|&i| &self.objects[i as usize])
    }

    /// BVH over the traceable objects.
    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    /// BVH over the decals.
    pub fn decals_bvh(&self) -> &Bvh {
        &self.decals_bvh
    }

    /// World-space bounds of the traceable objects.
    pub fn bounding_box(&self) -> Aabb {
        self.bvh.bounding_box()
    }

    /// Categorize the objects and rebuild both BVHs.
    ///
    /// On failure the scene keeps its previous acceleration structures.
    pub fn build_bvh(&mut self) -> Result<()> {
        let mut traceable = Vec::new();
        let mut decals = Vec::new();
        let mut lights = Vec::new();
        let mut global_lights = Vec::new();

        for (index, object) in self.objects.iter().enumerate() {
            let index = index as u32;
            match object.kind() {
                ObjectKind::Shape(_) => traceable.push(index),
                ObjectKind::Decal(_) => decals.push(index),
                ObjectKind::Light(light) => {
                    lights.push(index);
                    if !light.is_finite() {
                        global_lights.push(index);
                    } else if !light.is_delta() {
                        traceable.push(index);
                    }
                }
            }
        }

        let boxes: Vec<Aabb> = traceable
            .iter()
            .map(|&i| self.objects[i as usize].bounding_box())
            .collect();
        let (bvh, order) = Bvh::build(&boxes, &self.build_params)?;

        let decal_params = BuildParams {
            heuristic: Heuristic::Volume,
            ..self.build_params.clone()
        };
        let decal_boxes: Vec<Aabb> = decals
            .iter()
            .map(|&i| self.objects[i as usize].bounding_box())
            .collect();
        let (decals_bvh, decal_order) = Bvh::build(&decal_boxes, &decal_params)?;

        self.traceable = order.iter().map(|&slot| traceable[slot as usize]).collect();
        self.decals = decal_order.iter().map(|&slot| decals[slot as usize]).collect();
        self.lights = lights;
        self.global_lights = global_lights;
        self.bvh = bvh;
        self.decals_bvh = decals_bvh;

        info!(
            "Built scene BVH: {} traceable objects, {} decals, {} lights ({} global)",
            self.traceable.len(),
            self.decals.len(),
            self.lights.len(),
            self.global_lights.len()
        );
        Ok(())
    }

    /// Find the closest hit of `ctx.ray`, updating `ctx.hit`.
    pub fn traverse(&self, ctx: &mut SingleTraversalContext<'_>) {
        ctx.context.begin_query();
        ctx.context.local_counters.num_rays += 1;

        match self.traceable.len() {
            0 => {}
            1 => self.traverse_object(ctx, 0),
            _ => traverse_single(&self.bvh, self, ctx, 0),
        }

        ctx.context.end_query();
    }

    /// Whether anything is hit closer than `ctx.hit.distance`.
    pub fn traverse_shadow(&self, ctx: &mut SingleTraversalContext<'_>) -> bool {
        ctx.context.begin_query();
        ctx.context.local_counters.num_shadow_rays += 1;

        let occluded = match self.traceable.len() {
            0 => false,
            1 => self.traverse_object_shadow(ctx, 0),
            _ => traverse_shadow(&self.bvh, self, ctx, 0),
        };

        ctx.context.end_query();
        occluded
    }

    /// Find the closest hit of every ray in `packet`.
    ///
    /// `hits[i]` receives the result of the ray pushed with index `i`; hit
    /// records are reset first. The packet's lane order is permuted during
    /// traversal, so it must be rebuilt before it is traced again.
    pub fn traverse_packet(&self, packet: &mut RayPacket, hits: &mut [HitPoint], context: &mut RenderingContext) {
        debug_assert!(hits.len() >= packet.num_rays());

        context.begin_query();
        context.local_counters.num_rays += packet.num_rays() as u64;

        packet.reset_traversal();
        hits[..packet.num_rays()].iter_mut().for_each(HitPoint::reset);
        let num_groups = packet.num_groups();

        let mut ctx = PacketTraversalContext { packet, hits, context };
        match self.traceable.len() {
            0 => {}
            1 => self.traverse_object_packet(&mut ctx, 0, num_groups),
            _ => traverse_packet::<WORLD_SLOT, _>(&self.bvh, self, &mut ctx, 0, num_groups),
        }

        ctx.context.end_query();
    }

    fn traverse_object(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32) {
        let object = self.traceable_object(object_id);
        let Some(shape) = object.traceable_shape() else {
            return;
        };

        let local_ray = object.inverse_transform().transform_ray(ctx.ray);
        let mut local_ctx = SingleTraversalContext {
            ray: &local_ray,
            hit: &mut *ctx.hit,
            context: &mut *ctx.context,
        };
        shape.traverse(&mut local_ctx, object_id);
    }

    fn traverse_object_shadow(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32) -> bool {
        let object = self.traceable_object(object_id);
        let Some(shape) = object.traceable_shape() else {
            return false;
        };

        let local_ray = object.inverse_transform().transform_ray(ctx.ray);
        let mut local_ctx = SingleTraversalContext {
            ray: &local_ray,
            hit: &mut *ctx.hit,
            context: &mut *ctx.context,
        };
        shape.traverse_shadow(&mut local_ctx, object_id)
    }

    fn traverse_object_packet(&self, ctx: &mut PacketTraversalContext<'_>, object_id: u32, num_active_groups: usize) {
        let object = self.traceable_object(object_id);
        let Some(shape) = object.traceable_shape() else {
            return;
        };

        ctx.packet
            .transform_active_groups(object.inverse_transform(), num_active_groups);
        shape.traverse_packet::<OBJECT_SLOT>(ctx, object_id, num_active_groups);
    }

    /// World-space shading frame and surface attributes of a hit of `ray`.
    ///
    /// Returns `None` for misses.
    pub fn evaluate_intersection(&self, ray: &Ray, hit: &HitPoint) -> Option<IntersectionData> {
        if !hit.is_hit() {
            return None;
        }
        debug_assert!(hit.distance >= 0.0 && hit.distance.is_finite());
        debug_assert!((hit.object_id as usize) < self.traceable.len());

        let object = self.traceable_object(hit.object_id);
        let shape = object.traceable_shape()?;

        let position = ray.at(hit.distance);
        let local_position = object.inverse_transform().transform_point(&position);
        let local = shape.evaluate_intersection(hit, &local_position);

        let transform = object.transform();
        let normal = transform.transform_normal(&local.normal).normalize();
        let (tangent, bitangent) = build_frame(&transform.transform_vector(&local.tangent), &normal);

        Some(IntersectionData {
            position,
            tangent,
            bitangent,
            normal,
            tex_coord: local.tex_coord,
            material_index: local.material_index,
            object_id: hit.object_id,
        })
    }

    /// Decals covering a world-space point, highest order first.
    ///
    /// Returned values index [`Scene::decals`]. Decals of equal order keep
    /// their BVH order.
    pub fn collect_decals(&self, point: &Vec3) -> Vec<u32> {
        let mut found = Vec::new();

        let nodes = self.decals_bvh.nodes();
        let Some(root) = nodes.first() else {
            return found;
        };
        if !root.bounding_box().contains_point(point) {
            return found;
        }

        let mut stack = [0u32; MAX_DEPTH + 1];
        let mut stack_size = 0;
        let mut current: &Node = root;

        loop {
            if current.is_leaf() {
                for slot in current.leaf_range() {
                    if self.objects[self.decals[slot as usize] as usize].contains_point(point) {
                        found.push(slot);
                    }
                }
            } else {
                let first = current.child_index() as usize;
                let in_left = nodes[first].bounding_box().contains_point(point);
                let in_right = nodes[first + 1].bounding_box().contains_point(point);

                match (in_left, in_right) {
                    (true, true) => {
                        stack[stack_size] = first as u32 + 1;
                        stack_size += 1;
                        current = &nodes[first];
                        continue;
                    }
                    (true, false) => {
                        current = &nodes[first];
                        continue;
                    }
                    (false, true) => {
                        current = &nodes[first + 1];
                        continue;
                    }
                    (false, false) => {}
                }
            }

            if stack_size == 0 {
                break;
            }
            stack_size -= 1;
            current = &nodes[stack[stack_size] as usize];
        }

        found.sort_by_key(|&slot| Reverse(self.decal(slot).map_or(i32::MIN, |decal| decal.order)));
        found
    }

    /// Blend every decal covering the shading point into its base color.
    pub fn evaluate_decals(&self, shading: &mut ShadingData) {
        for slot in self.collect_decals(&shading.intersection.position) {
            if let Some(decal) = self.decal(slot) {
                decal.apply(shading);
            }
        }
    }

    fn decal(&self, slot: u32) -> Option<&Decal> {
        self.objects[self.decals[slot as usize] as usize].as_decal()
    }
}

impl LeafProvider for Scene {
    fn traverse_leaf(&self, ctx: &mut SingleTraversalContext<'_>, _object_id: u32, leaf: &Node) {
        for slot in leaf.leaf_range() {
            self.traverse_object(ctx, slot);
        }
    }

    fn traverse_leaf_shadow(&self, ctx: &mut SingleTraversalContext<'_>, _object_id: u32, leaf: &Node) -> bool {
        leaf.leaf_range().any(|slot| self.traverse_object_shadow(ctx, slot))
    }
}

impl PacketLeafProvider for Scene {
    fn traverse_leaf_packet<const SLOT: usize>(
        &self,
        ctx: &mut PacketTraversalContext<'_>,
        _object_id: u32,
        leaf: &Node,
        num_active_groups: usize,
    ) {
        for slot in leaf.leaf_range() {
            self.traverse_object_packet(ctx, slot, num_active_groups);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::Light;
    use crate::shape::{BoxShape, SphereShape};
    use lumen_math::Transform;

    fn trace(scene: &Scene, ray: &Ray) -> (HitPoint, RenderingContext) {
        let mut hit = HitPoint::default();
        let mut context = RenderingContext::new();
        scene.traverse(&mut SingleTraversalContext {
            ray,
            hit: &mut hit,
            context: &mut context,
        });
        (hit, context)
    }

    #[test]
    fn test_categorization() {
        let mut scene = Scene::new();
        let white = Vec3::repeat(1.0);
        scene.add_object(SceneObject::shape(SphereShape::new(1.0), Transform::identity()).unwrap());
        scene.add_object(SceneObject::light(Light::Point { color: white }, Transform::identity()).unwrap());
        scene.add_object(SceneObject::light(Light::Background { color: white }, Transform::identity()).unwrap());
        scene.add_object(
            SceneObject::light(
                Light::Area {
                    shape: BoxShape::new(Vec3::repeat(0.5)).into(),
                    color: white,
                },
                Transform::translation(0.0, 5.0, 0.0),
            )
            .unwrap(),
        );
        scene.add_object(SceneObject::decal(Decal::new(white, 0.5, 0), Transform::identity()).unwrap());
        scene.build_bvh().unwrap();

        assert_eq!(scene.num_traceable_objects(), 2);
        assert_eq!(scene.lights().count(), 3);
        assert_eq!(scene.global_lights().count(), 1);
        assert_eq!(scene.decals().count(), 1);
    }

    #[test]
    fn test_empty_scene() {
        let mut scene = Scene::new();
        scene.build_bvh().unwrap();

        let ray = Ray::new(Vec3::zeros(), Vec3::new(0.3, 0.2, 1.0));
        let (hit, context) = trace(&scene, &ray);
        assert_eq!(hit, HitPoint::default());
        assert_eq!(context.counters.num_ray_box_tests, 0);
        assert_eq!(context.counters.num_rays, 1);
    }

    #[test]
    fn test_single_object_skips_bvh() {
        let mut scene = Scene::new();
        scene.add_object(SceneObject::shape(SphereShape::new(1.0), Transform::translation(0.0, 0.0, 5.0)).unwrap());
        scene.build_bvh().unwrap();

        let ray = Ray::new(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0));
        let (hit, context) = trace(&scene, &ray);
        assert!(hit.is_hit());
        assert_eq!(hit.object_id, 0);
        assert!((hit.distance - 4.0).abs() < 1e-5);
        assert_eq!(context.counters.num_ray_box_tests, 0);
    }

    #[test]
    fn test_two_boxes_single_leaf() {
        let mut scene = Scene::new();
        scene.add_object(SceneObject::shape(BoxShape::new(Vec3::repeat(1.0)), Transform::translation(0.0, 0.0, 5.0)).unwrap());
        scene.add_object(SceneObject::shape(BoxShape::new(Vec3::repeat(1.0)), Transform::translation(0.0, 0.0, 10.0)).unwrap());
        scene.build_bvh().unwrap();
        assert_eq!(scene.bvh().num_nodes(), 1);

        let ray = Ray::new(Vec3::new(0.1, 0.2, 0.0), Vec3::new(0.0, 0.0, 1.0));
        let (hit, _) = trace(&scene, &ray);
        assert!((hit.distance - 4.0).abs() < 1e-5);
        let hit_object = scene.traceable_object(hit.object_id);
        assert!((hit_object.bounding_box().center().z - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_failed_object_stays_out() {
        let mut scene = Scene::new();
        assert!(SceneObject::shape(SphereShape::new(1.0), Transform::scale(0.0, 1.0, 1.0)).is_err());
        scene.build_bvh().unwrap();
        assert!(scene.bvh().is_empty());
    }
}
