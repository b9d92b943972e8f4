//! Flat BVH node storage.
//!
//! Nodes live in one array and reference each other by index. The two
//! children of an internal node are always adjacent, so a node only stores
//! the index of the first one. Leaves reference a contiguous run of
//! primitives in the leaf order returned by the builder.

use bytemuck::{Pod, Zeroable};
use log::debug;
use lumen_math::{Aabb, Vec3};

use crate::error::{BvhError, Result};

/// Maximum number of levels a tree may have.
///
/// Traversal stacks are sized from this value; the builder never produces a
/// deeper tree and loaded trees are rejected when they exceed it.
pub const MAX_DEPTH: usize = 128;

const NUM_LEAVES_MASK: u32 = (1 << 30) - 1;
const SPLIT_AXIS_SHIFT: u32 = 30;

/// A BVH node, 32 bytes, laid out for direct serialization.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Node {
    min: [f32; 3],
    child_index: u32,
    max: [f32; 3],
    // low 30 bits: leaf count (0 for internal nodes), high 2 bits: split axis
    leaves_and_axis: u32,
}

impl Node {
    /// A leaf referencing `num_leaves` primitives starting at `first_leaf`.
    pub fn leaf(aabb: &Aabb, first_leaf: u32, num_leaves: u32) -> Self {
        debug_assert!(num_leaves > 0 && num_leaves <= NUM_LEAVES_MASK);
        Self {
            min: aabb.min.into(),
            child_index: first_leaf,
            max: aabb.max.into(),
            leaves_and_axis: num_leaves & NUM_LEAVES_MASK,
        }
    }

    /// An internal node whose children are `first_child` and `first_child + 1`.
    pub fn internal(aabb: &Aabb, first_child: u32, split_axis: usize) -> Self {
        debug_assert!(split_axis < 3);
        Self {
            min: aabb.min.into(),
            child_index: first_child,
            max: aabb.max.into(),
            leaves_and_axis: (split_axis as u32) << SPLIT_AXIS_SHIFT,
        }
    }

    /// Node bounding box.
    #[inline]
    pub fn bounding_box(&self) -> Aabb {
        Aabb::new(Vec3::from(self.min), Vec3::from(self.max))
    }

    /// Whether the node references primitives rather than children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.num_leaves() != 0
    }

    /// Number of primitives in a leaf, zero for internal nodes.
    #[inline]
    pub fn num_leaves(&self) -> u32 {
        self.leaves_and_axis & NUM_LEAVES_MASK
    }

    /// First child node (internal) or first primitive (leaf).
    #[inline]
    pub fn child_index(&self) -> u32 {
        self.child_index
    }

    /// Axis the children were split along.
    #[inline]
    pub fn split_axis(&self) -> usize {
        (self.leaves_and_axis >> SPLIT_AXIS_SHIFT) as usize
    }

    /// Range of primitive indices covered by a leaf.
    #[inline]
    pub fn leaf_range(&self) -> std::ops::Range<u32> {
        self.child_index..self.child_index + self.num_leaves()
    }

    /// Same node pointing at a different child or primitive run.
    pub(crate) fn relocated(&self, child_index: u32) -> Node {
        Node {
            child_index,
            ..*self
        }
    }
}

/// Diagnostic statistics gathered by [`Bvh::calculate_stats`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BvhStats {
    /// Number of levels (a single leaf tree has depth 1).
    pub max_depth: u32,
    /// Sum of the surface areas of all nodes.
    pub total_nodes_area: f64,
    /// Sum of the volumes of all nodes.
    pub total_nodes_volume: f64,
    /// `leaves_count_histogram[k]` is the number of leaves holding `k` primitives.
    pub leaves_count_histogram: Vec<u32>,
}

impl BvhStats {
    /// Number of leaf nodes.
    pub fn num_leaf_nodes(&self) -> u32 {
        self.leaves_count_histogram.iter().sum()
    }

    /// Histogram formatted as `count (nodes), ...` for log output.
    pub fn format_histogram(&self) -> String {
        self.leaves_count_histogram
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n > 0)
            .map(|(count, n)| format!("{count} ({n})"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A built bounding volume hierarchy.
///
/// Empty until populated by [`crate::BvhBuilder`] or loaded from a cache,
/// immutable afterwards. The root is node 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bvh {
    nodes: Vec<Node>,
}

impl Bvh {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing node array after validating its structure.
    ///
    /// `num_leaves`, when given, bounds the primitive indices leaves may
    /// reference.
    pub fn from_nodes(nodes: Vec<Node>, num_leaves: Option<u32>) -> Result<Self> {
        let bvh = Self { nodes };
        bvh.validate(num_leaves)?;
        Ok(bvh)
    }

    /// Reserve exactly `n` node slots, dropping any previous content.
    pub fn allocate_nodes(&mut self, n: usize) -> Result<()> {
        let mut nodes = Vec::new();
        nodes
            .try_reserve_exact(n)
            .map_err(|_| BvhError::Allocation {
                requested: n,
                what: "BVH nodes",
            })?;
        self.nodes = nodes;
        Ok(())
    }

    pub(crate) fn push_node(&mut self, node: Node) -> u32 {
        let index = self.nodes.len() as u32;
        self.nodes.push(node);
        index
    }

    pub(crate) fn node_mut(&mut self, index: u32) -> &mut Node {
        &mut self.nodes[index as usize]
    }

    /// All nodes; the root is at index 0.
    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bounding box of the whole tree (empty for an empty tree).
    pub fn bounding_box(&self) -> Aabb {
        self.nodes
            .first()
            .map(Node::bounding_box)
            .unwrap_or_else(Aabb::empty)
    }

    /// Walk the tree and gather depth, area, volume and leaf-size statistics.
    pub fn calculate_stats(&self) -> BvhStats {
        let mut stats = BvhStats::default();
        if !self.nodes.is_empty() {
            self.calculate_stats_node(0, 1, &mut stats);
        }
        stats
    }

    fn calculate_stats_node(&self, index: u32, depth: u32, stats: &mut BvhStats) {
        let node = &self.nodes[index as usize];
        let aabb = node.bounding_box();

        stats.max_depth = stats.max_depth.max(depth);
        stats.total_nodes_area += aabb.surface_area() as f64;
        stats.total_nodes_volume += aabb.volume() as f64;

        if node.is_leaf() {
            let count = node.num_leaves() as usize;
            if stats.leaves_count_histogram.len() <= count {
                stats.leaves_count_histogram.resize(count + 1, 0);
            }
            stats.leaves_count_histogram[count] += 1;
        } else {
            self.calculate_stats_node(node.child_index, depth + 1, stats);
            self.calculate_stats_node(node.child_index + 1, depth + 1, stats);
        }
    }

    /// Check the structural invariants traversal relies on.
    ///
    /// Every node must be reachable from the root exactly once, children
    /// must be in range, internal nodes must carry an axis below 3 and the
    /// tree must not exceed [`MAX_DEPTH`] levels. Leaf ranges must fit in a
    /// `u32` and, when `num_leaves` is given, stay inside `[0, num_leaves)`.
    pub fn validate(&self, num_leaves: Option<u32>) -> Result<()> {
        let len = self.nodes.len();
        if len == 0 {
            return Ok(());
        }

        let mut visited = vec![false; len];
        let mut stack = vec![(0u32, 1usize)];
        let mut num_visited = 0;

        while let Some((index, depth)) = stack.pop() {
            if depth > MAX_DEPTH {
                return Err(BvhError::TooDeep { depth });
            }

            let slot = &mut visited[index as usize];
            if *slot {
                return Err(BvhError::InvalidCache(format!(
                    "node {index} is referenced more than once"
                )));
            }
            *slot = true;
            num_visited += 1;

            let node = &self.nodes[index as usize];
            if node.is_leaf() {
                let end = node.child_index as u64 + node.num_leaves() as u64;
                if end > u32::MAX as u64 {
                    return Err(BvhError::InvalidCache(format!(
                        "leaf {index} primitive range overflows ({end})"
                    )));
                }
                if let Some(limit) = num_leaves {
                    if end > limit as u64 {
                        return Err(BvhError::InvalidCache(format!(
                            "leaf {index} references primitives up to {end}, only {limit} exist"
                        )));
                    }
                }
            } else {
                if node.split_axis() > 2 {
                    return Err(BvhError::InvalidCache(format!(
                        "node {index} has invalid split axis {}",
                        node.split_axis()
                    )));
                }
                let first = node.child_index as usize;
                if first == 0 || first + 1 >= len {
                    return Err(BvhError::InvalidCache(format!(
                        "node {index} has children out of range ({first})"
                    )));
                }
                stack.push((node.child_index, depth + 1));
                stack.push((node.child_index + 1, depth + 1));
            }
        }

        if num_visited != len {
            debug!("BVH has {} unreachable nodes", len - num_visited);
            return Err(BvhError::InvalidCache(format!(
                "{} of {len} nodes are unreachable",
                len - num_visited
            )));
        }

        Ok(())
    }
}
