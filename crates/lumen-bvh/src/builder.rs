//! Surface area heuristic BVH construction.
//!
//! The builder recursively splits the primitive set along the axis and
//! position with the lowest heuristic cost. Primitive indices are kept
//! sorted by box center on all three axes; a split partitions the three
//! orders stably, so children never re-sort.
//!
//! Large subtrees are built in parallel with `rayon::join`. Node slots and
//! leaf-order slots are reserved through atomic counters, so concurrent
//! subtrees write disjoint regions. Once every subtree is finished the tree
//! is renumbered depth-first, making the result independent of scheduling.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use bytemuck::Zeroable;
use log::{info, warn};
use lumen_math::{Aabb, Vec3, NUM_AXES};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bvh::{Bvh, Node, MAX_DEPTH};
use crate::error::{BvhError, Result};

/// Input size above which the initial per-axis sorts run in parallel.
const PARALLEL_SORT_THRESHOLD: usize = 10_000;

/// Cost model used to rank candidate splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    /// Surface area of the child boxes (ray queries).
    #[default]
    SurfaceArea,
    /// Volume of the child boxes (point queries).
    Volume,
}

impl Heuristic {
    /// Size measure of one box under this heuristic.
    #[inline]
    pub fn metric(self, aabb: &Aabb) -> f32 {
        match self {
            Heuristic::SurfaceArea => aabb.surface_area(),
            Heuristic::Volume => aabb.volume(),
        }
    }

    /// Cost of splitting into `left` holding `left_count` primitives and
    /// `right` holding `right_count`.
    #[inline]
    pub fn split_cost(self, left: &Aabb, left_count: usize, right: &Aabb, right_count: usize) -> f32 {
        self.metric(left) * left_count as f32 + self.metric(right) * right_count as f32
    }
}

/// BVH construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildParams {
    /// Split cost model.
    pub heuristic: Heuristic,
    /// Work sets this small always become a leaf.
    pub max_leaf_node_size: u32,
    /// Work sets at least this large build their two children in parallel.
    pub parallel_threshold: usize,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            heuristic: Heuristic::SurfaceArea,
            max_leaf_node_size: 2,
            parallel_threshold: 2000,
        }
    }
}

impl BuildParams {
    /// Default parameters with a different heuristic.
    pub fn with_heuristic(heuristic: Heuristic) -> Self {
        Self {
            heuristic,
            ..Self::default()
        }
    }
}

/// Builds [`Bvh`]s from primitive bounding boxes.
#[derive(Debug, Clone, Default)]
pub struct BvhBuilder {
    params: BuildParams,
}

impl BvhBuilder {
    /// Create a builder with the given parameters.
    pub fn new(params: BuildParams) -> Self {
        Self { params }
    }

    /// Parameters used by this builder.
    pub fn params(&self) -> &BuildParams {
        &self.params
    }

    /// Build a tree over `boxes`.
    ///
    /// Returns the tree and the leaf order: `leaves_order[slot]` is the index
    /// in `boxes` of the primitive stored at leaf slot `slot`. Leaf ranges in
    /// the tree index the reordered array, so callers must permute their own
    /// per-primitive data with it.
    ///
    /// Fails only when the node or leaf-order arrays cannot be allocated.
    pub fn build(&self, boxes: &[Aabb]) -> Result<(Bvh, Vec<u32>)> {
        let num_leaves = boxes.len();
        if num_leaves == 0 {
            info!("Skipped empty BVH generation");
            return Ok((Bvh::new(), Vec::new()));
        }

        let overall = boxes.iter().fold(Aabb::empty(), |acc, b| Aabb::union(&acc, b));
        info!(
            "BVH statistics: num leaves = {}, overall box = [{}, {}, {}], [{}, {}, {}]",
            num_leaves,
            overall.min.x,
            overall.min.y,
            overall.min.z,
            overall.max.x,
            overall.max.y,
            overall.max.z
        );

        let start = Instant::now();

        let state = BuildState {
            boxes,
            centers: boxes.iter().map(Aabb::center).collect(),
            params: &self.params,
            nodes: try_alloc(2 * num_leaves - 1, "BVH nodes", OnceLock::new)?,
            leaves_order: try_alloc(num_leaves, "leaf order entries", || AtomicU32::new(0))?,
            num_generated_nodes: AtomicU32::new(1),
            num_generated_leaves: AtomicU32::new(0),
        };

        let root = WorkSet {
            bounds: overall,
            sorted: state.sort_all_axes(num_leaves),
            depth: 0,
        };
        state.build_node(root, 0, &mut Scratch::default());

        debug_assert_eq!(
            state.num_generated_leaves.load(Ordering::Relaxed) as usize,
            num_leaves
        );

        let result = state.into_canonical()?;

        info!(
            "Finished BVH generation in {:.3} ms (num nodes = {})",
            start.elapsed().as_secs_f64() * 1000.0,
            result.0.num_nodes()
        );

        Ok(result)
    }
}

impl Bvh {
    /// Build a tree over `boxes` with `params`.
    ///
    /// See [`BvhBuilder::build`].
    pub fn build(boxes: &[Aabb], params: &BuildParams) -> Result<(Bvh, Vec<u32>)> {
        BvhBuilder::new(params.clone()).build(boxes)
    }
}

fn try_alloc<T>(n: usize, what: &'static str, fill: impl FnMut() -> T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(n)
        .map_err(|_| BvhError::Allocation { requested: n, what })?;
    v.resize_with(n, fill);
    Ok(v)
}

/// Primitives assigned to one subtree, sorted by box center on every axis.
struct WorkSet {
    bounds: Aabb,
    sorted: [Vec<u32>; NUM_AXES],
    depth: usize,
}

impl WorkSet {
    fn len(&self) -> usize {
        self.sorted[0].len()
    }
}

/// Prefix and suffix union caches, reused across the splits of one task.
#[derive(Default)]
struct Scratch {
    left_boxes: Vec<Aabb>,
    right_boxes: Vec<Aabb>,
}

struct Split {
    axis: usize,
    // index (in the split axis order) of the last primitive going left
    pos: usize,
    cost: f32,
    median_distance: usize,
    left: Aabb,
    right: Aabb,
}

struct BuildState<'a> {
    boxes: &'a [Aabb],
    centers: Vec<Vec3>,
    params: &'a BuildParams,
    nodes: Vec<OnceLock<Node>>,
    leaves_order: Vec<AtomicU32>,
    num_generated_nodes: AtomicU32,
    num_generated_leaves: AtomicU32,
}

impl BuildState<'_> {
    /// Total order on primitives along `axis`: box center, then index.
    #[inline]
    fn compare(&self, axis: usize, a: u32, b: u32) -> CmpOrdering {
        let ca = self.centers[a as usize][axis];
        let cb = self.centers[b as usize][axis];
        ca.total_cmp(&cb).then(a.cmp(&b))
    }

    fn sort_axis(&self, axis: usize, n: usize) -> Vec<u32> {
        let mut indices: Vec<u32> = (0..n as u32).collect();
        if n > PARALLEL_SORT_THRESHOLD {
            indices.par_sort_unstable_by(|&a, &b| self.compare(axis, a, b));
        } else {
            indices.sort_unstable_by(|&a, &b| self.compare(axis, a, b));
        }
        indices
    }

    fn sort_all_axes(&self, n: usize) -> [Vec<u32>; NUM_AXES] {
        let (x, (y, z)) = rayon::join(
            || self.sort_axis(0, n),
            || rayon::join(|| self.sort_axis(1, n), || self.sort_axis(2, n)),
        );
        [x, y, z]
    }

    fn set_node(&self, slot: u32, node: Node) {
        let written = self.nodes[slot as usize].set(node);
        debug_assert!(written.is_ok(), "BVH node {slot} written twice");
    }

    fn generate_leaf(&self, work: &WorkSet, slot: u32) {
        let count = work.len() as u32;
        let first = self.num_generated_leaves.fetch_add(count, Ordering::Relaxed);
        for (i, &index) in work.sorted[0].iter().enumerate() {
            self.leaves_order[first as usize + i].store(index, Ordering::Relaxed);
        }
        self.set_node(slot, Node::leaf(&work.bounds, first, count));
    }

    fn is_degenerate(&self, work: &WorkSet) -> bool {
        work.sorted[0]
            .iter()
            .all(|&i| self.boxes[i as usize] == work.bounds)
    }

    fn build_node(&self, work: WorkSet, slot: u32, scratch: &mut Scratch) {
        let count = work.len();

        if count <= self.params.max_leaf_node_size as usize {
            self.generate_leaf(&work, slot);
            return;
        }

        if work.depth + 1 >= MAX_DEPTH {
            warn!("BVH depth limit reached, forcing a leaf with {count} primitives");
            self.generate_leaf(&work, slot);
            return;
        }

        if self.is_degenerate(&work) {
            warn!("{count} coincident boxes cannot be split, forcing a leaf");
            self.generate_leaf(&work, slot);
            return;
        }

        let Some(split) = self.find_split(&work, scratch) else {
            self.generate_leaf(&work, slot);
            return;
        };

        let first_child = self.num_generated_nodes.fetch_add(2, Ordering::Relaxed);
        self.set_node(slot, Node::internal(&work.bounds, first_child, split.axis));

        let (left, right) = self.partition(work, &split);

        if count >= self.params.parallel_threshold {
            rayon::join(
                || self.build_node(left, first_child, scratch),
                || self.build_node(right, first_child + 1, &mut Scratch::default()),
            );
        } else {
            self.build_node(left, first_child, scratch);
            self.build_node(right, first_child + 1, scratch);
        }
    }

    /// Sweep every split position on every axis and keep the cheapest.
    ///
    /// Equal costs prefer the position closest to the median.
    fn find_split(&self, work: &WorkSet, scratch: &mut Scratch) -> Option<Split> {
        let n = work.len();
        if n < 2 {
            return None;
        }

        if scratch.left_boxes.len() < n {
            scratch.left_boxes.resize(n, Aabb::empty());
            scratch.right_boxes.resize(n, Aabb::empty());
        }

        let half = n / 2;
        let heuristic = self.params.heuristic;
        let mut best: Option<Split> = None;

        for axis in 0..NUM_AXES {
            let sorted = &work.sorted[axis];

            let mut accumulated = Aabb::empty();
            for (i, &index) in sorted.iter().enumerate() {
                accumulated.include_box(&self.boxes[index as usize]);
                scratch.left_boxes[i] = accumulated;
            }

            accumulated = Aabb::empty();
            for i in (0..n).rev() {
                accumulated.include_box(&self.boxes[sorted[i] as usize]);
                scratch.right_boxes[i] = accumulated;
            }

            for pos in 0..n - 1 {
                let left = &scratch.left_boxes[pos];
                let right = &scratch.right_boxes[pos + 1];
                let left_count = pos + 1;
                let cost = heuristic.split_cost(left, left_count, right, n - left_count);
                let median_distance = left_count.abs_diff(half);

                let better = match &best {
                    None => true,
                    Some(b) => {
                        cost < b.cost || (cost == b.cost && median_distance < b.median_distance)
                    }
                };

                if better {
                    best = Some(Split {
                        axis,
                        pos,
                        cost,
                        median_distance,
                        left: *left,
                        right: *right,
                    });
                }
            }
        }

        best
    }

    /// Split a work set in two, keeping all three axis orders sorted.
    fn partition(&self, work: WorkSet, split: &Split) -> (WorkSet, WorkSet) {
        let pivot = work.sorted[split.axis][split.pos];
        let goes_left = |index: u32| self.compare(split.axis, index, pivot) != CmpOrdering::Greater;

        let [x, y, z] = work.sorted;
        let (lx, rx): (Vec<u32>, Vec<u32>) = x.into_iter().partition(|&i| goes_left(i));
        let (ly, ry): (Vec<u32>, Vec<u32>) = y.into_iter().partition(|&i| goes_left(i));
        let (lz, rz): (Vec<u32>, Vec<u32>) = z.into_iter().partition(|&i| goes_left(i));

        debug_assert_eq!(lx.len(), split.pos + 1);
        debug_assert!(lx.len() == ly.len() && ly.len() == lz.len());

        let left = WorkSet {
            bounds: split.left,
            sorted: [lx, ly, lz],
            depth: work.depth + 1,
        };
        let right = WorkSet {
            bounds: split.right,
            sorted: [rx, ry, rz],
            depth: work.depth + 1,
        };
        (left, right)
    }

    fn node(&self, index: u32) -> Result<&Node> {
        self.nodes[index as usize]
            .get()
            .ok_or_else(|| BvhError::InvalidCache(format!("BVH node {index} was never written")))
    }

    /// Renumber nodes depth-first (left child first, siblings adjacent) and
    /// rewrite the leaf order to match.
    fn into_canonical(self) -> Result<(Bvh, Vec<u32>)> {
        let num_nodes = self.num_generated_nodes.load(Ordering::Relaxed) as usize;
        let num_leaves = self.leaves_order.len();

        let mut bvh = Bvh::new();
        bvh.allocate_nodes(num_nodes)?;

        let mut order = Vec::new();
        order
            .try_reserve_exact(num_leaves)
            .map_err(|_| BvhError::Allocation {
                requested: num_leaves,
                what: "leaf order entries",
            })?;

        bvh.push_node(Node::zeroed());
        self.emit_canonical(0, 0, &mut bvh, &mut order)?;

        debug_assert_eq!(bvh.num_nodes(), num_nodes);
        debug_assert_eq!(order.len(), num_leaves);
        Ok((bvh, order))
    }

    fn emit_canonical(&self, source: u32, target: u32, bvh: &mut Bvh, order: &mut Vec<u32>) -> Result<()> {
        let node = *self.node(source)?;

        if node.is_leaf() {
            let first = order.len() as u32;
            for i in node.leaf_range() {
                order.push(self.leaves_order[i as usize].load(Ordering::Relaxed));
            }
            *bvh.node_mut(target) = node.relocated(first);
        } else {
            let first_child = bvh.push_node(Node::zeroed());
            bvh.push_node(Node::zeroed());
            *bvh.node_mut(target) = node.relocated(first_child);

            self.emit_canonical(node.child_index(), first_child, bvh, order)?;
            self.emit_canonical(node.child_index() + 1, first_child + 1, bvh, order)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(center: Vec3, half: f32) -> Aabb {
        Aabb::from_center(center, Vec3::repeat(half))
    }

    fn grid_boxes(n: usize) -> Vec<Aabb> {
        (0..n)
            .map(|i| {
                let f = i as f32;
                cube(Vec3::new(f % 7.0, (f * 0.37) % 5.0, (f * 1.91) % 11.0), 0.25)
            })
            .collect()
    }

    fn leaf_slots(bvh: &Bvh) -> Vec<u32> {
        let mut slots: Vec<u32> = bvh
            .nodes()
            .iter()
            .filter(|n| n.is_leaf())
            .flat_map(|n| n.leaf_range())
            .collect();
        slots.sort_unstable();
        slots
    }

    #[test]
    fn test_two_boxes_single_leaf() {
        let boxes = [
            Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0)),
            Aabb::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(7.0, 7.0, 7.0)),
        ];
        let (bvh, order) = Bvh::build(&boxes, &BuildParams::default()).unwrap();

        assert_eq!(bvh.num_nodes(), 1);
        let root = &bvh.nodes()[0];
        assert!(root.is_leaf());
        assert_eq!(root.num_leaves(), 2);
        assert_eq!(root.bounding_box(), Aabb::union(&boxes[0], &boxes[1]));

        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1]);
    }

    #[test]
    fn test_empty_input() {
        let (bvh, order) = Bvh::build(&[], &BuildParams::default()).unwrap();
        assert!(bvh.is_empty());
        assert!(order.is_empty());
    }

    #[test]
    fn test_single_box() {
        let boxes = [cube(Vec3::zeros(), 1.0)];
        let (bvh, order) = Bvh::build(&boxes, &BuildParams::default()).unwrap();
        assert_eq!(bvh.num_nodes(), 1);
        assert_eq!(order, vec![0]);
    }

    #[test]
    fn test_leaf_coverage_and_permutation() {
        for n in [3, 4, 17, 100, 257] {
            let boxes = grid_boxes(n);
            let (bvh, order) = Bvh::build(&boxes, &BuildParams::default()).unwrap();

            let expected: Vec<u32> = (0..n as u32).collect();
            assert_eq!(leaf_slots(&bvh), expected);

            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, expected);

            assert!(bvh.num_nodes() <= 2 * n - 1);
            bvh.validate(Some(n as u32)).unwrap();
        }
    }

    #[test]
    fn test_leaves_respect_max_size() {
        let boxes = grid_boxes(200);
        let params = BuildParams {
            max_leaf_node_size: 4,
            ..BuildParams::default()
        };
        let (bvh, _) = Bvh::build(&boxes, &params).unwrap();
        assert!(bvh
            .nodes()
            .iter()
            .filter(|n| n.is_leaf())
            .all(|n| n.num_leaves() <= 4));
    }

    #[test]
    fn test_leaf_boxes_contain_primitives() {
        let boxes = grid_boxes(64);
        let (bvh, order) = Bvh::build(&boxes, &BuildParams::default()).unwrap();
        for node in bvh.nodes().iter().filter(|n| n.is_leaf()) {
            for slot in node.leaf_range() {
                let original = &boxes[order[slot as usize] as usize];
                assert!(node.bounding_box().contains_box(original));
            }
        }
    }

    #[test]
    fn test_children_inside_parent() {
        let boxes = grid_boxes(150);
        let (bvh, _) = Bvh::build(&boxes, &BuildParams::default()).unwrap();
        for node in bvh.nodes().iter().filter(|n| !n.is_leaf()) {
            let parent = node.bounding_box();
            for child in [node.child_index(), node.child_index() + 1] {
                assert!(parent.contains_box(&bvh.nodes()[child as usize].bounding_box()));
            }
        }
    }

    #[test]
    fn test_coincident_boxes_force_leaf() {
        let boxes = vec![cube(Vec3::new(1.0, 2.0, 3.0), 0.5); 50];
        let (bvh, order) = Bvh::build(&boxes, &BuildParams::default()).unwrap();
        assert_eq!(bvh.num_nodes(), 1);
        assert_eq!(bvh.nodes()[0].num_leaves(), 50);
        assert_eq!(order.len(), 50);
    }

    #[test]
    fn test_coincident_centers_stay_balanced() {
        // same center, growing sizes: splittable but every cost ties on position
        let boxes: Vec<Aabb> = (0..64).map(|i| cube(Vec3::zeros(), 1.0 + i as f32)).collect();
        let (bvh, _) = Bvh::build(&boxes, &BuildParams::default()).unwrap();
        assert!(bvh.calculate_stats().max_depth as usize <= MAX_DEPTH);
    }

    #[test]
    fn test_parallel_build_matches_sequential() {
        let boxes = grid_boxes(3000);
        let sequential = BuildParams {
            parallel_threshold: usize::MAX,
            ..BuildParams::default()
        };
        let parallel = BuildParams {
            parallel_threshold: 16,
            ..BuildParams::default()
        };

        let (a, order_a) = Bvh::build(&boxes, &sequential).unwrap();
        let (b, order_b) = Bvh::build(&boxes, &parallel).unwrap();
        assert_eq!(a, b);
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn test_volume_heuristic() {
        let boxes = grid_boxes(40);
        let params = BuildParams::with_heuristic(Heuristic::Volume);
        let (bvh, _) = Bvh::build(&boxes, &params).unwrap();
        assert_eq!(leaf_slots(&bvh), (0..40).collect::<Vec<u32>>());
    }

    #[test]
    fn test_default_params() {
        let params = BuildParams::default();
        assert_eq!(params.heuristic, Heuristic::SurfaceArea);
        assert_eq!(params.max_leaf_node_size, 2);
        assert_eq!(params.parallel_threshold, 2000);
    }
}
