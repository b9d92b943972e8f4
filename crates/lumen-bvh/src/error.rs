//! Error types for BVH construction and persistence.

use thiserror::Error;

use crate::MAX_DEPTH;

/// Errors that can occur while building, saving or loading a BVH.
#[derive(Error, Debug)]
pub enum BvhError {
    /// Reserving the node array or the leaf-order array failed.
    #[error("failed to allocate {requested} {what}")]
    Allocation {
        /// Number of elements requested.
        requested: usize,
        /// What was being allocated.
        what: &'static str,
    },

    /// Reading or writing a cache file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache file is malformed or describes an inconsistent tree.
    #[error("invalid BVH cache: {0}")]
    InvalidCache(String),

    /// A tree is deeper than the traversal stacks can hold.
    #[error("BVH depth {depth} exceeds the maximum of {max}", max = MAX_DEPTH)]
    TooDeep {
        /// Depth of the offending tree (number of levels).
        depth: usize,
    },
}

/// Result type for BVH operations.
pub type Result<T> = std::result::Result<T, BvhError>;
