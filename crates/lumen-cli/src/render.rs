//! Tiled depth rendering in single-ray or packet mode.
//!
//! The image is split into bands of `tile_rows` rows rendered in parallel.
//! Every band owns its [`RenderingContext`]; the counters are summed at
//! the end.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::ValueEnum;
use image::{GrayImage, Luma};
use lumen_bvh::{HitPoint, RayCounters, RayPacket, RenderingContext, SingleTraversalContext};
use lumen_math::Ray;
use lumen_scene::Scene;
use rayon::prelude::*;

use crate::config::RenderConfig;
use crate::generate::Camera;

/// How primary rays are traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceMode {
    /// One ray at a time.
    Single,
    /// Packets of `packet_size` rays sorted by direction octant.
    Packet,
}

/// Hit distance per pixel, infinite for misses.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major distances.
    pub depths: Vec<f32>,
}

/// A finished render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// The depth image.
    pub image: DepthImage,
    /// Counters summed over all tiles.
    pub counters: RayCounters,
    /// Wall-clock time of the render.
    pub elapsed: Duration,
}

struct Frame<'a> {
    scene: &'a Scene,
    camera: &'a Camera,
    config: &'a RenderConfig,
}

impl Frame<'_> {
    fn pixel_ray(&self, index: usize) -> Ray {
        let width = self.config.width as usize;
        let x = (index % width) as u32;
        let y = (index / width) as u32;
        self.camera.primary_ray(x, y, self.config.width, self.config.height)
    }

    fn render_tile_single(&self, first_pixel: usize, pixels: &mut [f32], context: &mut RenderingContext) {
        for (i, depth) in pixels.iter_mut().enumerate() {
            let ray = self.pixel_ray(first_pixel + i);
            let mut hit = HitPoint::default();
            self.scene.traverse(&mut SingleTraversalContext {
                ray: &ray,
                hit: &mut hit,
                context: &mut *context,
            });
            *depth = hit_depth(&hit);
        }
    }

    fn render_tile_packet(&self, first_pixel: usize, pixels: &mut [f32], context: &mut RenderingContext) {
        let packet_size = self.config.packet_size;
        let mut packet = RayPacket::new();
        let mut hits = vec![HitPoint::default(); packet_size];

        for (chunk_index, chunk) in pixels.chunks_mut(packet_size).enumerate() {
            let first = first_pixel + chunk_index * packet_size;
            packet.clear();
            for i in 0..chunk.len() {
                let pushed = packet.push_ray(&self.pixel_ray(first + i), f32::INFINITY);
                debug_assert!(pushed.is_some());
            }
            packet.sort_by_octant();

            self.scene.traverse_packet(&mut packet, &mut hits, context);

            for (depth, hit) in chunk.iter_mut().zip(&hits) {
                *depth = hit_depth(hit);
            }
        }
    }
}

fn hit_depth(hit: &HitPoint) -> f32 {
    if hit.is_hit() {
        hit.distance
    } else {
        f32::INFINITY
    }
}

/// Render the depth of every pixel.
pub fn render(scene: &Scene, camera: &Camera, config: &RenderConfig, mode: TraceMode) -> RenderOutput {
    let frame = Frame { scene, camera, config };
    let tile_len = config.width as usize * config.tile_rows as usize;
    let mut depths = vec![f32::INFINITY; config.width as usize * config.height as usize];

    let start = Instant::now();
    let counters = depths
        .par_chunks_mut(tile_len)
        .enumerate()
        .map(|(tile, pixels)| {
            let mut context = RenderingContext::new();
            let first_pixel = tile * tile_len;
            match mode {
                TraceMode::Single => frame.render_tile_single(first_pixel, pixels, &mut context),
                TraceMode::Packet => frame.render_tile_packet(first_pixel, pixels, &mut context),
            }
            context.counters
        })
        .reduce(RayCounters::default, |mut total, tile| {
            total.append(&tile);
            total
        });

    RenderOutput {
        image: DepthImage {
            width: config.width,
            height: config.height,
            depths,
        },
        counters,
        elapsed: start.elapsed(),
    }
}

impl DepthImage {
    /// Number of pixels whose hit state differs or whose distances differ
    /// by more than `tolerance` relative to the distance.
    pub fn count_mismatches(&self, other: &DepthImage, tolerance: f32) -> usize {
        self.depths
            .iter()
            .zip(&other.depths)
            .filter(|(a, b)| match (a.is_finite(), b.is_finite()) {
                (true, true) => (*a - *b).abs() > tolerance * a.abs().max(1.0),
                (false, false) => false,
                _ => true,
            })
            .count()
    }

    /// Fraction of pixels that hit something.
    pub fn coverage(&self) -> f32 {
        let hits = self.depths.iter().filter(|d| d.is_finite()).count();
        hits as f32 / self.depths.len().max(1) as f32
    }

    /// Write a grayscale PNG, near surfaces bright and misses black.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let (near, far) = self
            .depths
            .iter()
            .filter(|d| d.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &d| (lo.min(d), hi.max(d)));
        let range = (far - near).max(1e-6);

        let image = GrayImage::from_fn(self.width, self.height, |x, y| {
            let depth = self.depths[(y * self.width + x) as usize];
            if !depth.is_finite() {
                return Luma([0]);
            }
            let t = (depth - near) / range;
            Luma([(255.0 - t * 215.0) as u8])
        });
        image
            .save(path)
            .with_context(|| format!("writing {}", path.display()))
    }
}
