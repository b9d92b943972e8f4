//! Generic BVH traversal.
//!
//! The traversal routines walk the tree and hand each reached leaf to a
//! provider that knows what the leaf's primitives are: objects of a scene,
//! triangles of a mesh, or anything else stored in leaf order.

mod packet;
mod single;

pub use packet::traverse_packet;
pub use single::{traverse_shadow, traverse_single};

use lumen_math::Ray;

use crate::bvh::Node;
use crate::context::RenderingContext;
use crate::hit::HitPoint;
use crate::packet::RayPacket;

/// State of one single-ray query.
pub struct SingleTraversalContext<'a> {
    /// The ray, in the space of the tree being traversed.
    pub ray: &'a Ray,
    /// Closest hit so far; its distance bounds the query.
    pub hit: &'a mut HitPoint,
    /// Per-thread scratch and counters.
    pub context: &'a mut RenderingContext,
}

/// State of one packet query.
pub struct PacketTraversalContext<'a> {
    /// The rays.
    pub packet: &'a mut RayPacket,
    /// Hit records indexed by ray index.
    pub hits: &'a mut [HitPoint],
    /// Per-thread scratch and counters.
    pub context: &'a mut RenderingContext,
}

/// Intersects single rays with the primitives of a leaf.
pub trait LeafProvider {
    /// Closest-hit test of `ctx.ray` against every primitive of `leaf`,
    /// updating `ctx.hit` when a strictly closer hit is found.
    ///
    /// `object_id` is the id of the object owning the tree, recorded in hit
    /// points by providers whose primitives are sub-objects.
    fn traverse_leaf(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32, leaf: &Node);

    /// Any-hit test: whether some primitive of `leaf` is hit closer than
    /// `ctx.hit.distance`.
    fn traverse_leaf_shadow(&self, ctx: &mut SingleTraversalContext<'_>, object_id: u32, leaf: &Node) -> bool;
}

/// Intersects ray packets with the primitives of a leaf.
pub trait PacketLeafProvider {
    /// Closest-hit test of the first `num_active_groups` active groups
    /// against every primitive of `leaf`, using the rays of slot `SLOT`.
    fn traverse_leaf_packet<const SLOT: usize>(
        &self,
        ctx: &mut PacketTraversalContext<'_>,
        object_id: u32,
        leaf: &Node,
        num_active_groups: usize,
    );
}
