//! Packet traversal with active-group compaction.

use lumen_math::LANES;

use super::{PacketLeafProvider, PacketTraversalContext};
use crate::bvh::{Bvh, MAX_DEPTH};

#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    node: u32,
    num_active_groups: u32,
}

/// Trace the first `num_active_groups` active groups of `ctx.packet`
/// through `bvh`, using the rays stored in slot `SLOT`.
///
/// Each popped node is tested against the groups of its frame. Groups with
/// no lane left are moved out of the active prefix, and when fewer than a
/// quarter of the remaining lanes are active the rays are packed into fewer
/// groups.
pub fn traverse_packet<const SLOT: usize, P: PacketLeafProvider>(
    bvh: &Bvh,
    provider: &P,
    ctx: &mut PacketTraversalContext<'_>,
    object_id: u32,
    num_active_groups: usize,
) {
    let nodes = bvh.nodes();
    if nodes.is_empty() || num_active_groups == 0 {
        return;
    }

    let mut stack = [Frame::default(); MAX_DEPTH + 2];
    stack[0] = Frame {
        node: 0,
        num_active_groups: num_active_groups as u32,
    };
    let mut stack_size = 1;

    while stack_size > 0 {
        stack_size -= 1;
        let frame = stack[stack_size];
        let node = &nodes[frame.node as usize];
        let mut num_groups = frame.num_active_groups as usize;

        let aabb = node.bounding_box();
        let mut num_rays = 0u32;
        for i in 0..num_groups {
            let group = ctx.packet.active_group_mut(i);
            group.active_mask = group.rays[SLOT].intersect_box(&aabb, &group.max_distances);
            num_rays += group.active_mask.count_ones();
        }

        let counters = &mut ctx.context.local_counters;
        counters.num_ray_box_tests += (num_groups * LANES) as u64;
        counters.num_passed_ray_box_tests += num_rays as u64;

        if num_rays == 0 {
            continue;
        }

        num_groups = ctx.packet.remove_missed_groups(num_groups);
        if num_groups > 1 && (num_rays as usize) < num_groups * LANES / 4 {
            let (packed, moved) = ctx.packet.reorder_rays(num_groups);
            num_groups = packed;
            ctx.context.local_counters.num_reordered_lanes += moved as u64;
        }

        if node.is_leaf() {
            provider.traverse_leaf_packet::<SLOT>(ctx, object_id, node, num_groups);
            continue;
        }

        // order children by the direction of the first active lane
        let lead = ctx.packet.active_group(0);
        let lane = lead.active_mask.trailing_zeros() as usize;
        let dir = lead.rays[SLOT].dir.component(node.split_axis())[lane];

        let first = node.child_index();
        let (near, far) = if dir < 0.0 {
            (first + 1, first)
        } else {
            (first, first + 1)
        };

        stack[stack_size] = Frame {
            node: far,
            num_active_groups: num_groups as u32,
        };
        stack[stack_size + 1] = Frame {
            node: near,
            num_active_groups: num_groups as u32,
        };
        stack_size += 2;
    }
}
