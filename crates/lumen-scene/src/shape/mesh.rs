//! Triangle meshes with their own BVH.

use log::{debug, info};
use lumen_bvh::{
    traverse_packet, traverse_single, BuildParams, Bvh, HitPoint, LeafProvider, Node,
    PacketLeafProvider, PacketTraversalContext, RenderingContext, SingleTraversalContext,
};
use lumen_math::{orthogonal_tangent, Aabb, Ray, Triangle, Vec2, Vec3, LANES};

use super::{LocalSurface, ShapeIntersection};
use crate::error::{Result, SceneError};

/// Vertex and index buffers a mesh is created from.
#[derive(Debug, Clone, Default)]
pub struct MeshDesc {
    /// Name used in log messages.
    pub name: String,
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Three vertex indices per triangle.
    pub indices: Vec<u32>,
    /// Per-vertex normals. Geometric normals are used when absent.
    pub normals: Option<Vec<Vec3>>,
    /// Per-vertex tangents. Derived from the normal when absent.
    pub tangents: Option<Vec<Vec3>>,
    /// Per-vertex texture coordinates. Barycentrics are used when absent.
    pub tex_coords: Option<Vec<Vec2>>,
    /// Material index per triangle.
    pub material_indices: Option<Vec<u32>>,
}

/// A triangle mesh.
///
/// Triangles are stored in the leaf order of the mesh BVH, so the
/// `sub_object_id` of a hit is the index of the triangle in that order.
#[derive(Debug, Clone)]
pub struct MeshShape {
    bvh: Bvh,
    bounding_box: Aabb,
    surface_area: f32,
    triangles: Vec<Triangle>,
    vertex_indices: Vec<[u32; 3]>,
    material_indices: Option<Vec<u32>>,
    normals: Option<Vec<Vec3>>,
    tangents: Option<Vec<Vec3>>,
    tex_coords: Option<Vec<Vec2>>,
}

fn check_attribute<T>(attribute: &Option<Vec<T>>, expected: usize, what: &str) -> Result<()> {
    match attribute {
        Some(values) if values.len() != expected => Err(SceneError::InvalidMesh(format!(
            "{} {what} for {expected} entries",
            values.len()
        ))),
        _ => Ok(()),
    }
}

impl MeshShape {
    /// Validate the buffers, build the triangle BVH and reorder the
    /// triangles to match it.
    pub fn new(desc: &MeshDesc) -> Result<Self> {
        Self::with_params(desc, &BuildParams::default())
    }

    /// Like [`MeshShape::new`] with explicit BVH parameters.
    pub fn with_params(desc: &MeshDesc, params: &BuildParams) -> Result<Self> {
        if desc.indices.is_empty() {
            return Err(SceneError::EmptyMesh);
        }
        if desc.indices.len() % 3 != 0 {
            return Err(SceneError::InvalidMesh(format!(
                "index count {} is not a multiple of 3",
                desc.indices.len()
            )));
        }

        let num_vertices = desc.positions.len();
        if let Some(&index) = desc.indices.iter().find(|&&i| i as usize >= num_vertices) {
            return Err(SceneError::InvalidMesh(format!(
                "vertex index {index} out of range ({num_vertices} vertices)"
            )));
        }

        let num_triangles = desc.indices.len() / 3;
        check_attribute(&desc.normals, num_vertices, "normals")?;
        check_attribute(&desc.tangents, num_vertices, "tangents")?;
        check_attribute(&desc.tex_coords, num_vertices, "texture coordinates")?;
        check_attribute(&desc.material_indices, num_triangles, "material indices")?;

        let source_indices: Vec<[u32; 3]> = desc
            .indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let source_triangles: Vec<Triangle> = source_indices
            .iter()
            .map(|&[a, b, c]| {
                Triangle::new(
                    desc.positions[a as usize],
                    desc.positions[b as usize],
                    desc.positions[c as usize],
                )
            })
            .collect();

        let boxes: Vec<Aabb> = source_triangles.iter().map(Triangle::bounding_box).collect();
        let bounding_box = boxes.iter().fold(Aabb::empty(), |acc, b| Aabb::union(&acc, b));

        let (bvh, order) = Bvh::build(&boxes, params)?;

        let stats = bvh.calculate_stats();
        debug!("BVH stats:");
        debug!("    - max depth: {}", stats.max_depth);
        debug!("    - total surface area: {}", stats.total_nodes_area);
        debug!("    - total volume: {}", stats.total_nodes_volume);
        debug!("    - leaf nodes histogram: {}", stats.format_histogram());

        let triangles: Vec<Triangle> = order.iter().map(|&i| source_triangles[i as usize]).collect();
        let vertex_indices = order.iter().map(|&i| source_indices[i as usize]).collect();
        let material_indices = desc
            .material_indices
            .as_ref()
            .map(|materials| order.iter().map(|&i| materials[i as usize]).collect());

        let surface_area = triangles.iter().map(|t| t.surface_area() as f64).sum::<f64>() as f32;

        let name = if desc.name.is_empty() { "unnamed" } else { desc.name.as_str() };
        info!("MeshShape '{name}' created successfully ({num_triangles} triangles)");

        Ok(Self {
            bvh,
            bounding_box,
            surface_area,
            triangles,
            vertex_indices,
            material_indices,
            normals: desc.normals.clone(),
            tangents: desc.tangents.clone(),
            tex_coords: desc.tex_coords.clone(),
        })
    }

    /// The triangle BVH.
    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Triangle `index`, in BVH leaf order.
    pub fn triangle(&self, index: u32) -> &Triangle {
        &self.triangles[index as usize]
    }

    /// Local-space bounding box.
    pub fn bounding_box(&self) -> Aabb {
        self.bounding_box
    }

    /// Total triangle area.
    pub fn surface_area(&self) -> f32 {
        self.surface_area
    }

    /// Closest hit of a standalone ray.
    pub fn intersect(&self, ray: &Ray, context: &mut RenderingContext) -> Option<ShapeIntersection> {
        let mut hit = HitPoint::default();
        let mut ctx = SingleTraversalContext {
            ray,
            hit: &mut hit,
            context,
        };
        traverse_single(&self.bvh, self, &mut ctx, 0);

        hit.is_hit().then_some(ShapeIntersection {
            near_distance: hit.distance,
            far_distance: hit.distance,
            sub_object_id: hit.sub_object_id,
            u: hit.u,
            v: hit.v,
        })
    }

    /// Closest-hit traversal of the mesh BVH.
    pub fn traverse(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32) {
        traverse_single(&self.bvh, self, ctx, object_id);
    }

    /// Any-hit traversal of the mesh BVH.
    pub fn traverse_shadow(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32) -> bool {
        lumen_bvh::traverse_shadow(&self.bvh, self, ctx, object_id)
    }

    /// Packet traversal of the mesh BVH using the rays of slot `SLOT`.
    pub fn traverse_packet<const SLOT: usize>(
        &self,
        ctx: &mut PacketTraversalContext<'_>,
        object_id: u32,
        num_active_groups: usize,
    ) {
        traverse_packet::<SLOT, _>(&self.bvh, self, ctx, object_id, num_active_groups);
    }

    /// Interpolated shading attributes of a hit on this mesh.
    pub fn evaluate_intersection(&self, hit: &HitPoint) -> LocalSurface {
        let triangle_index = hit.sub_object_id as usize;
        let [i0, i1, i2] = self.vertex_indices[triangle_index].map(|i| i as usize);

        let (u, v) = (hit.u, hit.v);
        let w = 1.0 - (u + v);

        let normal = match &self.normals {
            Some(n) => (n[i1] * u + n[i2] * v + n[i0] * w).normalize(),
            None => self.triangles[triangle_index].normal().normalize(),
        };

        let tangent = match &self.tangents {
            Some(t) => (t[i1] * u + t[i2] * v + t[i0] * w).normalize(),
            None => orthogonal_tangent(&normal),
        };

        let tex_coord = match &self.tex_coords {
            Some(t) => t[i1] * u + t[i2] * v + t[i0] * w,
            None => Vec2::new(u, v),
        };

        LocalSurface {
            normal,
            tangent,
            tex_coord,
            material_index: self.material_indices.as_ref().map(|m| m[triangle_index]),
        }
    }
}

impl LeafProvider for MeshShape {
    fn traverse_leaf(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32, leaf: &Node) {
        ctx.context.local_counters.num_ray_object_tests += leaf.num_leaves() as u64;

        for triangle_index in leaf.leaf_range() {
            // skip the surface the ray starts on
            if triangle_index == ctx.hit.sub_object_id && object_id == ctx.hit.object_id {
                continue;
            }

            if let Some(hit) = self.triangles[triangle_index as usize].intersect_ray(ctx.ray) {
                if hit.distance < ctx.hit.distance {
                    ctx.hit.set(hit.distance, object_id, triangle_index, hit.u, hit.v);
                    ctx.context.local_counters.num_passed_ray_object_tests += 1;
                }
            }
        }
    }

    fn traverse_leaf_shadow(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32, leaf: &Node) -> bool {
        ctx.context.local_counters.num_ray_object_tests += leaf.num_leaves() as u64;

        for triangle_index in leaf.leaf_range() {
            if triangle_index == ctx.hit.sub_object_id && object_id == ctx.hit.object_id {
                continue;
            }

            if let Some(hit) = self.triangles[triangle_index as usize].intersect_ray(ctx.ray) {
                if hit.distance < ctx.hit.distance {
                    ctx.hit.distance = hit.distance;
                    ctx.context.local_counters.num_passed_ray_object_tests += 1;
                    return true;
                }
            }
        }

        false
    }
}

impl PacketLeafProvider for MeshShape {
    fn traverse_leaf_packet<const SLOT: usize>(
        &self,
        ctx: &mut PacketTraversalContext<'_>,
        object_id: u32,
        leaf: &Node,
        num_active_groups: usize,
    ) {
        ctx.context.local_counters.num_ray_object_tests +=
            (LANES * leaf.num_leaves() as usize * num_active_groups) as u64;

        for triangle_index in leaf.leaf_range() {
            let triangle = &self.triangles[triangle_index as usize];

            for i in 0..num_active_groups {
                let group = ctx.packet.active_group_mut(i);
                let (mask, hit) = group.rays[SLOT].intersect_triangle(triangle, &group.max_distances);
                let stored = group.store_intersection(
                    ctx.hits,
                    mask & group.active_mask,
                    &hit.distance,
                    &hit.u,
                    &hit.v,
                    object_id,
                    triangle_index,
                );
                ctx.context.local_counters.num_passed_ray_object_tests += stored as u64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Two triangles forming the unit square in the z = 0 plane.
    fn quad() -> MeshDesc {
        MeshDesc {
            name: "quad".into(),
            positions: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            material_indices: Some(vec![7, 9]),
            ..MeshDesc::default()
        }
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let desc = MeshDesc::default();
        assert!(matches!(MeshShape::new(&desc), Err(SceneError::EmptyMesh)));
    }

    #[test]
    fn test_bad_indices_rejected() {
        let mut desc = quad();
        desc.indices.push(1);
        assert!(matches!(MeshShape::new(&desc), Err(SceneError::InvalidMesh(_))));

        let mut desc = quad();
        desc.indices[4] = 4;
        assert!(matches!(MeshShape::new(&desc), Err(SceneError::InvalidMesh(_))));

        let mut desc = quad();
        desc.normals = Some(vec![Vec3::z(); 3]);
        assert!(matches!(MeshShape::new(&desc), Err(SceneError::InvalidMesh(_))));
    }

    #[test]
    fn test_intersect_quad() {
        let mesh = MeshShape::new(&quad()).unwrap();
        assert_eq!(mesh.num_triangles(), 2);
        assert_relative_eq!(mesh.surface_area(), 1.0, epsilon = 1e-6);

        let mut context = RenderingContext::new();
        let ray = Ray::new(Vec3::new(0.7, 0.2, 2.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = mesh.intersect(&ray, &mut context).unwrap();
        assert_relative_eq!(hit.near_distance, 2.0, epsilon = 1e-6);

        // the hit triangle is the lower-right one, wherever the BVH put it
        let surface = mesh.evaluate_intersection(&HitPoint {
            distance: hit.near_distance,
            object_id: 0,
            sub_object_id: hit.sub_object_id,
            u: hit.u,
            v: hit.v,
        });
        assert_eq!(surface.material_index, Some(7));
        assert_relative_eq!(surface.normal, Vec3::z(), epsilon = 1e-6);

        let miss = Ray::new(Vec3::new(1.5, 0.2, 2.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(mesh.intersect(&miss, &mut context).is_none());
    }

    #[test]
    fn test_self_intersection_skipped() {
        let mesh = MeshShape::new(&quad()).unwrap();
        let ray = Ray::new(Vec3::new(0.7, 0.2, 2.0), Vec3::new(0.0, 0.0, -1.0));
        let mut context = RenderingContext::new();
        let first = mesh.intersect(&ray, &mut context).unwrap();

        // a ray leaving the hit triangle must not hit it again
        let mut hit = HitPoint {
            distance: f32::INFINITY,
            object_id: 3,
            sub_object_id: first.sub_object_id,
            u: 0.0,
            v: 0.0,
        };
        let origin = Vec3::new(0.7, 0.2, 0.0);
        let secondary = Ray::new(origin, Vec3::new(0.01, 0.02, -1.0));
        let mut ctx = SingleTraversalContext {
            ray: &secondary,
            hit: &mut hit,
            context: &mut context,
        };
        mesh.traverse(&mut ctx, 3);
        assert_eq!(hit.sub_object_id, first.sub_object_id);
        assert_eq!(hit.distance, f32::INFINITY);
    }

    #[test]
    fn test_interpolated_attributes() {
        let mut desc = quad();
        desc.tex_coords = Some(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]);
        let mesh = MeshShape::new(&desc).unwrap();

        let mut context = RenderingContext::new();
        let ray = Ray::new(Vec3::new(0.25, 0.75, 1.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = mesh.intersect(&ray, &mut context).unwrap();
        let surface = mesh.evaluate_intersection(&HitPoint {
            distance: hit.near_distance,
            object_id: 0,
            sub_object_id: hit.sub_object_id,
            u: hit.u,
            v: hit.v,
        });

        // planar mapping: texture coordinates equal the hit position
        assert_relative_eq!(surface.tex_coord.x, 0.25, epsilon = 1e-5);
        assert_relative_eq!(surface.tex_coord.y, 0.75, epsilon = 1e-5);
        assert_eq!(surface.material_index, Some(9));
    }
}
