//! Stack-based single-ray traversal.

use super::{LeafProvider, SingleTraversalContext};
use crate::bvh::{Bvh, Node, MAX_DEPTH};

/// Slab test of the context ray against `node`, clipped to the current
/// closest hit. Returns the entry distance.
#[inline]
fn test_node(ctx: &mut SingleTraversalContext<'_>, node: &Node) -> Option<f32> {
    let counters = &mut ctx.context.local_counters;
    counters.num_ray_box_tests += 1;
    let entry = ctx.ray.intersect_box(&node.bounding_box(), ctx.hit.distance);
    if entry.is_some() {
        counters.num_passed_ray_box_tests += 1;
    }
    entry
}

/// Pick the child the ray reaches first along the parent's split axis.
#[inline]
fn order_children(ctx: &SingleTraversalContext<'_>, parent: &Node) -> (usize, usize) {
    let first = parent.child_index() as usize;
    if ctx.ray.is_negative(parent.split_axis()) {
        (first + 1, first)
    } else {
        (first, first + 1)
    }
}

/// Find the closest hit of `ctx.ray` among the primitives of `bvh`.
///
/// Only hits closer than `ctx.hit.distance` are accepted; `ctx.hit` is
/// updated in place.
pub fn traverse_single<P: LeafProvider + ?Sized>(
    bvh: &Bvh,
    provider: &P,
    ctx: &mut SingleTraversalContext<'_>,
    object_id: u32,
) {
    let nodes = bvh.nodes();
    let Some(root) = nodes.first() else {
        return;
    };
    if test_node(ctx, root).is_none() {
        return;
    }

    // pending far children with their entry distances
    let mut stack = [(0u32, 0.0f32); MAX_DEPTH + 1];
    let mut stack_size = 0;
    let mut current = root;

    loop {
        if current.is_leaf() {
            provider.traverse_leaf(ctx, object_id, current);
        } else {
            let (near, far) = order_children(ctx, current);
            let near_entry = test_node(ctx, &nodes[near]);
            let far_entry = test_node(ctx, &nodes[far]);

            match (near_entry, far_entry) {
                (Some(_), Some(entry)) => {
                    stack[stack_size] = (far as u32, entry);
                    stack_size += 1;
                    current = &nodes[near];
                    continue;
                }
                (Some(_), None) => {
                    current = &nodes[near];
                    continue;
                }
                (None, Some(_)) => {
                    current = &nodes[far];
                    continue;
                }
                (None, None) => {}
            }
        }

        // pop the next pending node that is still closer than the best hit
        loop {
            if stack_size == 0 {
                return;
            }
            stack_size -= 1;
            let (index, entry) = stack[stack_size];
            if entry <= ctx.hit.distance {
                current = &nodes[index as usize];
                break;
            }
        }
    }
}

/// Whether any primitive of `bvh` is hit closer than `ctx.hit.distance`.
///
/// Stops at the first hit found.
pub fn traverse_shadow<P: LeafProvider + ?Sized>(
    bvh: &Bvh,
    provider: &P,
    ctx: &mut SingleTraversalContext<'_>,
    object_id: u32,
) -> bool {
    let nodes = bvh.nodes();
    let Some(root) = nodes.first() else {
        return false;
    };
    if test_node(ctx, root).is_none() {
        return false;
    }

    let mut stack = [0u32; MAX_DEPTH + 1];
    let mut stack_size = 0;
    let mut current = root;

    loop {
        if current.is_leaf() {
            if provider.traverse_leaf_shadow(ctx, object_id, current) {
                return true;
            }
        } else {
            let (near, far) = order_children(ctx, current);
            let near_hit = test_node(ctx, &nodes[near]).is_some();
            let far_hit = test_node(ctx, &nodes[far]).is_some();

            match (near_hit, far_hit) {
                (true, true) => {
                    stack[stack_size] = far as u32;
                    stack_size += 1;
                    current = &nodes[near];
                    continue;
                }
                (true, false) => {
                    current = &nodes[near];
                    continue;
                }
                (false, true) => {
                    current = &nodes[far];
                    continue;
                }
                (false, false) => {}
            }
        }

        if stack_size == 0 {
            return false;
        }
        stack_size -= 1;
        current = &nodes[stack[stack_size] as usize];
    }
}
