//! Error types for scene construction.

use lumen_bvh::BvhError;
use thiserror::Error;

/// Errors that can occur while building shapes and scenes.
#[derive(Error, Debug)]
pub enum SceneError {
    /// Building an acceleration structure failed.
    #[error(transparent)]
    Bvh(#[from] BvhError),

    /// A mesh was created without triangles.
    #[error("mesh has no triangles")]
    EmptyMesh,

    /// Mesh buffers are inconsistent.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// An object's placement cannot be inverted.
    #[error("object transform is not invertible")]
    SingularTransform,
}

/// Result type for scene operations.
pub type Result<T> = std::result::Result<T, SceneError>;
