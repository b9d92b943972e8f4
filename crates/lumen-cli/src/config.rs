//! Render configuration loaded from TOML.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use lumen_bvh::{BuildParams, MAX_RAY_PACKET_SIZE};
use serde::{Deserialize, Serialize};

/// Settings of a generated scene and its render.
///
/// Every field is optional in the file; missing ones keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Seed of the scene generator.
    pub seed: u64,
    /// Number of spheres.
    pub num_spheres: u32,
    /// Number of boxes.
    pub num_boxes: u32,
    /// Number of meshes.
    pub num_meshes: u32,
    /// Quads per side of each generated mesh.
    pub mesh_resolution: u32,
    /// Number of decals.
    pub num_decals: u32,
    /// Rays traced together in packet mode.
    pub packet_size: usize,
    /// Image rows rendered by one worker at a time.
    pub tile_rows: u32,
    /// World BVH construction.
    pub build: BuildParams,
    /// Depth image written by `render`.
    pub output: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            seed: 1,
            num_spheres: 200,
            num_boxes: 200,
            num_meshes: 20,
            mesh_resolution: 32,
            num_decals: 8,
            packet_size: 256,
            tile_rows: 8,
            build: BuildParams::default(),
            output: PathBuf::from("depth.png"),
        }
    }
}

impl RenderConfig {
    /// Read a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: RenderConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("image size must be non-zero, got {}x{}", self.width, self.height);
        }
        if self.packet_size == 0 || self.packet_size > MAX_RAY_PACKET_SIZE {
            bail!(
                "packet size must be in 1..={MAX_RAY_PACKET_SIZE}, got {}",
                self.packet_size
            );
        }
        if self.tile_rows == 0 {
            bail!("tile_rows must be non-zero");
        }
        if self.mesh_resolution == 0 && self.num_meshes > 0 {
            bail!("mesh_resolution must be non-zero when meshes are generated");
        }
        if self.build.max_leaf_node_size == 0 {
            bail!("build.max_leaf_node_size must be non-zero");
        }
        Ok(())
    }
}
