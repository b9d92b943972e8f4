#![warn(missing_docs)]

//! Bounding volume hierarchy for the lumen raytracer.
//!
//! Builds a binary BVH over axis-aligned boxes with the surface area
//! heuristic, in parallel for large inputs, and traverses it with single
//! rays or with packets of up to 1024 rays processed eight at a time.
//!
//! The tree does not know what its primitives are. Leaves hold ranges into
//! a leaf-order array produced by the builder, and traversal hands each
//! reached leaf to a [`LeafProvider`] or [`PacketLeafProvider`].
//!
//! # Example
//!
//! ```
//! use lumen_bvh::{BuildParams, Bvh};
//! use lumen_math::{Aabb, Vec3};
//!
//! let boxes: Vec<Aabb> = (0..16)
//!     .map(|i| Aabb::from_center(Vec3::new(i as f32, 0.0, 0.0), Vec3::repeat(0.25)))
//!     .collect();
//! let (bvh, leaf_order) = Bvh::build(&boxes, &BuildParams::default()).unwrap();
//! assert_eq!(leaf_order.len(), 16);
//! assert!(bvh.num_nodes() <= 31);
//! ```

pub mod builder;
pub mod bvh;
pub mod context;
pub mod error;
pub mod hit;
pub mod io;
pub mod packet;
pub mod traversal;

pub use builder::{BuildParams, BvhBuilder, Heuristic};
pub use bvh::{Bvh, BvhStats, Node, MAX_DEPTH};
pub use context::{RayCounters, RenderingContext};
pub use error::{BvhError, Result};
pub use hit::{HitPoint, INVALID_OBJECT};
pub use packet::{
    set_lanes, RayGroup, RayPacket, MAX_RAY_GROUPS, MAX_RAY_PACKET_SIZE, OBJECT_SLOT,
    PADDING_RAY_INDEX, WORLD_SLOT,
};
pub use traversal::{
    traverse_packet, traverse_shadow, traverse_single, LeafProvider, PacketLeafProvider,
    PacketTraversalContext, SingleTraversalContext,
};
