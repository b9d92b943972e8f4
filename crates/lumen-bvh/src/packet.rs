//! Ray packets.
//!
//! A packet holds up to [`MAX_RAY_PACKET_SIZE`] rays, eight to a
//! [`RayGroup`]. Each group carries two ray slots: slot
//! [`WORLD_SLOT`] keeps the rays as pushed, slot [`OBJECT_SLOT`] receives
//! them transformed into the local space of the object being traversed.
//!
//! During traversal the packet keeps a list of active groups. Removing
//! missed groups and reordering rays only permute that list and move lanes
//! between groups of its current prefix, so any longer prefix still holds
//! the same rays.

use lumen_math::{Ray, RayX8, Transform, LANES};

use crate::hit::HitPoint;

/// Maximum number of rays in one packet.
pub const MAX_RAY_PACKET_SIZE: usize = 1024;

/// Maximum number of groups in one packet.
pub const MAX_RAY_GROUPS: usize = MAX_RAY_PACKET_SIZE / LANES;

/// Slot holding the rays as pushed.
pub const WORLD_SLOT: usize = 0;

/// Slot holding the rays in the local space of the current object.
pub const OBJECT_SLOT: usize = 1;

/// Ray index of lanes that hold no ray.
pub const PADDING_RAY_INDEX: u32 = u32::MAX;

/// Iterate over the lane indices set in `mask`.
#[inline]
pub fn set_lanes(mask: u8) -> impl Iterator<Item = usize> {
    (0..LANES).filter(move |lane| mask & (1 << lane) != 0)
}

/// Eight rays traced together.
#[derive(Debug, Clone, Copy)]
pub struct RayGroup {
    /// World-space and object-space rays.
    pub rays: [RayX8; 2],
    /// Per-lane distance limit, lowered as hits are found.
    pub max_distances: [f32; LANES],
    /// Index of each lane's ray in the packet's hit array.
    pub ray_indices: [u32; LANES],
    /// Lanes that hit the last tested node.
    pub active_mask: u8,
}

impl Default for RayGroup {
    fn default() -> Self {
        // padding lanes reject every box and primitive
        Self {
            rays: [RayX8::default(); 2],
            max_distances: [f32::NEG_INFINITY; LANES],
            ray_indices: [PADDING_RAY_INDEX; LANES],
            active_mask: 0,
        }
    }
}

impl RayGroup {
    /// Lanes holding a real ray.
    pub fn valid_mask(&self) -> u8 {
        let mut mask = 0u8;
        for (lane, &index) in self.ray_indices.iter().enumerate() {
            if index != PADDING_RAY_INDEX {
                mask |= 1 << lane;
            }
        }
        mask
    }

    /// Exchange lane `lane` of this group with lane `other_lane` of `other`.
    ///
    /// Moves both ray slots, the distance limit, the ray index and the
    /// active bit.
    pub fn swap_lane_with(&mut self, lane: usize, other: &mut RayGroup, other_lane: usize) {
        for slot in 0..2 {
            self.rays[slot].swap_lane(lane, &mut other.rays[slot], other_lane);
        }
        std::mem::swap(&mut self.max_distances[lane], &mut other.max_distances[other_lane]);
        std::mem::swap(&mut self.ray_indices[lane], &mut other.ray_indices[other_lane]);

        let bit = (self.active_mask >> lane) & 1;
        let other_bit = (other.active_mask >> other_lane) & 1;
        self.active_mask = (self.active_mask & !(1 << lane)) | (other_bit << lane);
        other.active_mask = (other.active_mask & !(1 << other_lane)) | (bit << other_lane);
    }

    /// Exchange two lanes of this group.
    pub fn swap_lanes(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for slot in 0..2 {
            self.rays[slot].swap_lanes(a, b);
        }
        self.max_distances.swap(a, b);
        self.ray_indices.swap(a, b);

        let bit_a = (self.active_mask >> a) & 1;
        let bit_b = (self.active_mask >> b) & 1;
        self.active_mask &= !((1 << a) | (1 << b));
        self.active_mask |= (bit_a << b) | (bit_b << a);
    }

    /// Record hits for the lanes in `mask` that are closer than the lane's
    /// current limit. Returns the number of hits recorded.
    #[allow(clippy::too_many_arguments)]
    pub fn store_intersection(
        &mut self,
        hits: &mut [HitPoint],
        mask: u8,
        distance: &[f32; LANES],
        u: &[f32; LANES],
        v: &[f32; LANES],
        object_id: u32,
        sub_object_id: u32,
    ) -> u32 {
        let mut stored = 0;
        for lane in set_lanes(mask) {
            if distance[lane] < self.max_distances[lane] {
                self.max_distances[lane] = distance[lane];
                let hit = &mut hits[self.ray_indices[lane] as usize];
                hit.set(distance[lane], object_id, sub_object_id, u[lane], v[lane]);
                stored += 1;
            }
        }
        stored
    }
}

/// A batch of rays traced together through a BVH.
#[derive(Debug, Clone)]
pub struct RayPacket {
    groups: Vec<RayGroup>,
    active_group_indices: Vec<u16>,
    num_rays: usize,
}

impl Default for RayPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl RayPacket {
    /// An empty packet.
    pub fn new() -> Self {
        Self {
            groups: Vec::with_capacity(MAX_RAY_GROUPS),
            active_group_indices: Vec::with_capacity(MAX_RAY_GROUPS),
            num_rays: 0,
        }
    }

    /// Remove all rays.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.active_group_indices.clear();
        self.num_rays = 0;
    }

    /// Number of rays pushed.
    pub fn num_rays(&self) -> usize {
        self.num_rays
    }

    /// Number of groups in use.
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Whether no ray was pushed.
    pub fn is_empty(&self) -> bool {
        self.num_rays == 0
    }

    /// Whether the packet cannot take more rays.
    pub fn is_full(&self) -> bool {
        self.num_rays >= MAX_RAY_PACKET_SIZE
    }

    /// Append a ray accepting hits closer than `max_distance`.
    ///
    /// Returns the ray's index in the hit array, or `None` when the packet
    /// is full.
    pub fn push_ray(&mut self, ray: &Ray, max_distance: f32) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let index = self.num_rays;
        let lane = index % LANES;
        if lane == 0 {
            self.active_group_indices.push(self.groups.len() as u16);
            self.groups.push(RayGroup::default());
        }

        let group = self.groups.last_mut()?;
        group.rays[WORLD_SLOT].set_lane(lane, ray);
        group.rays[OBJECT_SLOT].set_lane(lane, ray);
        group.max_distances[lane] = max_distance;
        group.ray_indices[lane] = index as u32;
        group.active_mask |= 1 << lane;

        self.num_rays += 1;
        Some(index as u32)
    }

    /// All groups, in storage order.
    pub fn groups(&self) -> &[RayGroup] {
        &self.groups
    }

    /// Mutable access to one group by storage index.
    pub fn group_mut(&mut self, index: usize) -> &mut RayGroup {
        &mut self.groups[index]
    }

    /// Storage index of the `i`-th active group.
    #[inline]
    pub fn active_group_index(&self, i: usize) -> usize {
        self.active_group_indices[i] as usize
    }

    /// The `i`-th active group.
    #[inline]
    pub fn active_group(&self, i: usize) -> &RayGroup {
        &self.groups[self.active_group_index(i)]
    }

    /// The `i`-th active group, mutably.
    #[inline]
    pub fn active_group_mut(&mut self, i: usize) -> &mut RayGroup {
        let index = self.active_group_index(i);
        &mut self.groups[index]
    }

    /// Make every group active with all of its real lanes set.
    pub fn reset_traversal(&mut self) {
        self.active_group_indices.clear();
        self.active_group_indices
            .extend((0..self.groups.len()).map(|i| i as u16));
        for group in &mut self.groups {
            group.active_mask = group.valid_mask();
        }
    }

    /// Fill the object slot of the first `num_active_groups` active groups
    /// with the world rays mapped through `transform`.
    pub fn transform_active_groups(&mut self, transform: &Transform, num_active_groups: usize) {
        for i in 0..num_active_groups {
            let group = self.active_group_mut(i);
            group.rays[OBJECT_SLOT] = group.rays[WORLD_SLOT].transformed(transform);
        }
    }

    /// Exchange lane `lane_a` of group `group_a` with lane `lane_b` of
    /// group `group_b` (storage indices).
    pub fn swap_lanes(&mut self, group_a: usize, lane_a: usize, group_b: usize, lane_b: usize) {
        if group_a == group_b {
            self.groups[group_a].swap_lanes(lane_a, lane_b);
            return;
        }

        let (a, b) = if group_a < group_b {
            let (head, tail) = self.groups.split_at_mut(group_b);
            (&mut head[group_a], &mut tail[0])
        } else {
            let (head, tail) = self.groups.split_at_mut(group_a);
            (&mut tail[0], &mut head[group_b])
        };
        a.swap_lane_with(lane_a, b, lane_b);
    }

    /// Move groups with no active lane behind the first `num_active_groups`
    /// entries of the active list. Returns the number of groups left.
    ///
    /// Unstable two-pointer partition of the active list.
    pub fn remove_missed_groups(&mut self, num_active_groups: usize) -> usize {
        let mut i = 0;
        let mut end = num_active_groups;
        while i < end {
            if self.active_group(i).active_mask == 0 {
                end -= 1;
                self.active_group_indices.swap(i, end);
            } else {
                i += 1;
            }
        }
        end
    }

    /// Pack the active lanes of the first `num_active_groups` active groups
    /// into as few groups as possible.
    ///
    /// Active lanes from the back of the list fill inactive lanes at the
    /// front. Returns the new number of active groups and the number of
    /// lanes moved. Which ray hits what is unaffected.
    pub fn reorder_rays(&mut self, num_active_groups: usize) -> (usize, u32) {
        if num_active_groups < 2 {
            return (num_active_groups, 0);
        }

        let mut front = 0;
        let mut back = num_active_groups - 1;
        let mut moved = 0;

        while front < back {
            let front_group = self.active_group_index(front);
            let free = !self.groups[front_group].active_mask;
            if free == 0 {
                front += 1;
                continue;
            }

            let back_group = self.active_group_index(back);
            let used = self.groups[back_group].active_mask;
            if used == 0 {
                back -= 1;
                continue;
            }

            let dst = free.trailing_zeros() as usize;
            let src = used.trailing_zeros() as usize;
            self.swap_lanes(front_group, dst, back_group, src);
            moved += 1;
        }

        let partial = self.active_group(front).active_mask != 0;
        (front + partial as usize, moved)
    }

    /// Stable-sort the rays by direction octant so that groups are
    /// direction-coherent. Call before tracing.
    pub fn sort_by_octant(&mut self) {
        let mut lanes: Vec<(Ray, f32, u32)> = (0..self.num_rays)
            .map(|i| {
                let group = &self.groups[i / LANES];
                let lane = i % LANES;
                (
                    group.rays[WORLD_SLOT].lane(lane),
                    group.max_distances[lane],
                    group.ray_indices[lane],
                )
            })
            .collect();
        lanes.sort_by_key(|(ray, _, _)| ray.octant());

        for (i, (ray, max_distance, index)) in lanes.iter().enumerate() {
            let group = &mut self.groups[i / LANES];
            let lane = i % LANES;
            group.rays[WORLD_SLOT].set_lane(lane, ray);
            group.rays[OBJECT_SLOT].set_lane(lane, ray);
            group.max_distances[lane] = *max_distance;
            group.ray_indices[lane] = *index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_math::Vec3;

    fn ray_towards(x: f32, y: f32) -> Ray {
        Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::new(x, y, 1.0))
    }

    fn filled_packet(n: usize) -> RayPacket {
        let mut packet = RayPacket::new();
        for i in 0..n {
            let f = i as f32 * 0.01;
            packet.push_ray(&ray_towards(f, -f), f32::INFINITY).unwrap();
        }
        packet.reset_traversal();
        packet
    }

    fn active_indices(packet: &RayPacket, num_active_groups: usize) -> Vec<u32> {
        let mut indices: Vec<u32> = (0..num_active_groups)
            .flat_map(|i| {
                let group = packet.active_group(i);
                set_lanes(group.active_mask).map(move |lane| group.ray_indices[lane])
            })
            .collect();
        indices.sort_unstable();
        indices
    }

    #[test]
    fn test_push_and_padding() {
        let packet = filled_packet(11);
        assert_eq!(packet.num_rays(), 11);
        assert_eq!(packet.num_groups(), 2);

        let last = &packet.groups()[1];
        assert_eq!(last.valid_mask(), 0b0000_0111);
        assert_eq!(last.ray_indices[3], PADDING_RAY_INDEX);
        assert_eq!(last.max_distances[3], f32::NEG_INFINITY);
    }

    #[test]
    fn test_push_until_full() {
        let mut packet = RayPacket::new();
        for _ in 0..MAX_RAY_PACKET_SIZE {
            assert!(packet.push_ray(&ray_towards(0.1, 0.2), 1.0).is_some());
        }
        assert!(packet.is_full());
        assert_eq!(packet.push_ray(&ray_towards(0.1, 0.2), 1.0), None);
        assert_eq!(packet.num_groups(), MAX_RAY_GROUPS);
    }

    #[test]
    fn test_padding_lanes_miss_boxes() {
        let packet = filled_packet(3);
        let group = &packet.groups()[0];
        let aabb = lumen_math::Aabb::new(Vec3::repeat(-100.0), Vec3::repeat(100.0));
        let mask = group.rays[WORLD_SLOT].intersect_box(&aabb, &group.max_distances);
        assert_eq!(mask, 0b111);
    }

    #[test]
    fn test_remove_missed_groups() {
        let mut packet = filled_packet(32);
        packet.group_mut(0).active_mask = 0;
        packet.group_mut(2).active_mask = 0;

        let remaining = packet.remove_missed_groups(4);
        assert_eq!(remaining, 2);
        let mut kept: Vec<usize> = (0..remaining).map(|i| packet.active_group_index(i)).collect();
        kept.sort_unstable();
        assert_eq!(kept, vec![1, 3]);

        // the full prefix still names every group exactly once
        let mut all: Vec<usize> = (0..4).map(|i| packet.active_group_index(i)).collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_reorder_rays_compacts_lanes() {
        let mut packet = filled_packet(32);
        // keep one lane alive per group
        for g in 0..4 {
            packet.group_mut(g).active_mask = 1 << (g * 2);
        }
        let before = active_indices(&packet, 4);

        let (groups, moved) = packet.reorder_rays(4);
        assert_eq!(groups, 1);
        assert_eq!(moved, 3);
        assert_eq!(packet.active_group(0).active_mask.count_ones(), 4);
        assert_eq!(active_indices(&packet, groups), before);

        // every ray is still somewhere in the packet, with its own data
        let mut all: Vec<u32> = packet
            .groups()
            .iter()
            .flat_map(|g| g.ray_indices.to_vec())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..32).collect::<Vec<u32>>());
    }

    #[test]
    fn test_reorder_moves_ray_data_with_index() {
        let mut packet = filled_packet(16);
        let original: Vec<Ray> = (0..16)
            .map(|i| packet.groups()[i / LANES].rays[WORLD_SLOT].lane(i % LANES))
            .collect();

        packet.group_mut(0).active_mask = 0b0000_0001;
        packet.group_mut(1).active_mask = 0b1000_0000;
        packet.reorder_rays(2);

        for group in packet.groups() {
            for lane in 0..LANES {
                let index = group.ray_indices[lane] as usize;
                assert_eq!(group.rays[WORLD_SLOT].lane(lane), original[index]);
            }
        }
    }

    #[test]
    fn test_swap_lanes_same_group() {
        let mut packet = filled_packet(8);
        packet.group_mut(0).active_mask = 0b0000_0010;
        packet.swap_lanes(0, 1, 0, 6);
        let group = &packet.groups()[0];
        assert_eq!(group.ray_indices[6], 1);
        assert_eq!(group.ray_indices[1], 6);
        assert_eq!(group.active_mask, 0b0100_0000);
    }

    #[test]
    fn test_sort_by_octant() {
        let mut packet = RayPacket::new();
        let dirs = [(1.0, 1.0), (-1.0, 1.0), (1.0, -1.0), (-1.0, -1.0), (0.5, 0.5)];
        for (x, y) in dirs {
            packet.push_ray(&ray_towards(x, y), f32::INFINITY);
        }
        packet.sort_by_octant();

        let group = &packet.groups()[0];
        let octants: Vec<u8> = (0..5).map(|l| group.rays[WORLD_SLOT].lane(l).octant()).collect();
        let mut sorted = octants.clone();
        sorted.sort_unstable();
        assert_eq!(octants, sorted);
        // stable: the two +x+y rays keep their order
        assert_eq!(group.ray_indices[0], 0);
        assert_eq!(group.ray_indices[1], 4);
    }

    #[test]
    fn test_store_intersection_keeps_closest() {
        let mut packet = filled_packet(8);
        let mut hits = vec![HitPoint::default(); 8];
        let group = packet.group_mut(0);

        let far = [5.0; LANES];
        let near = [2.0; LANES];
        let uv = [0.25; LANES];
        assert_eq!(group.store_intersection(&mut hits, 0b11, &far, &uv, &uv, 1, 10), 2);
        assert_eq!(group.store_intersection(&mut hits, 0b01, &near, &uv, &uv, 2, 20), 1);
        assert_eq!(group.store_intersection(&mut hits, 0b01, &far, &uv, &uv, 3, 30), 0);

        assert_eq!(hits[0].object_id, 2);
        assert_eq!(hits[0].distance, 2.0);
        assert_eq!(hits[1].object_id, 1);
        assert!(!hits[2].is_hit());
        assert_eq!(group.max_distances[0], 2.0);
    }
}
