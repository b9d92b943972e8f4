//! lumen CLI - BVH caches and depth renders of generated scenes
//!
//! Builds the world BVH of a procedurally generated scene, inspects BVH
//! cache files and renders depth images with single rays or ray packets.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use lumen_bvh::{Bvh, RayCounters};

mod config;
mod generate;
mod render;

use config::RenderConfig;
use generate::{generate_scene, Camera};
use render::{render, TraceMode};

#[derive(Parser)]
#[command(name = "lumen")]
#[command(about = "BVH construction and ray traversal driver", long_about = None)]
struct Cli {
    /// TOML file with render settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the world BVH of the generated scene and save it
    Build {
        /// Output cache file
        output: PathBuf,
        /// Scene seed (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Load a BVH cache and print its statistics
    Info {
        /// Cache file
        file: PathBuf,
        /// Number of primitives the tree indexes, checked on load
        #[arg(long)]
        leaves: Option<u32>,
    },
    /// Render a depth image of the generated scene
    Render {
        /// Traversal mode
        #[arg(short, long, value_enum, default_value_t = TraceMode::Packet)]
        mode: TraceMode,
        /// Also render with the other mode and compare the images
        #[arg(long)]
        verify: bool,
        /// Image width (overrides the config file)
        #[arg(long)]
        width: Option<u32>,
        /// Image height (overrides the config file)
        #[arg(long)]
        height: Option<u32>,
        /// Scene seed (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,
        /// Rays per packet (overrides the config file)
        #[arg(long)]
        packet_size: Option<usize>,
        /// Output PNG (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => RenderConfig::load(path)?,
        None => RenderConfig::default(),
    };

    match cli.command {
        Commands::Build { output, seed } => {
            if let Some(seed) = seed {
                config.seed = seed;
            }
            build_cache(&config, &output)?;
        }
        Commands::Info { file, leaves } => {
            show_info(&file, leaves)?;
        }
        Commands::Render {
            mode,
            verify,
            width,
            height,
            seed,
            packet_size,
            output,
        } => {
            config.width = width.unwrap_or(config.width);
            config.height = height.unwrap_or(config.height);
            config.seed = seed.unwrap_or(config.seed);
            config.packet_size = packet_size.unwrap_or(config.packet_size);
            if let Some(output) = output {
                config.output = output;
            }
            config.validate()?;
            render_depth(&config, mode, verify)?;
        }
    }

    Ok(())
}

fn build_cache(config: &RenderConfig, output: &Path) -> Result<()> {
    let scene = generate_scene(config)?;
    let bvh = scene.bvh();
    bvh.save_to_file(output)?;

    let stats = bvh.calculate_stats();
    println!("Saved BVH to {}", output.display());
    println!("  Traceable objects: {}", scene.num_traceable_objects());
    println!("  Nodes: {}", bvh.num_nodes());
    println!("  Max depth: {}", stats.max_depth);
    Ok(())
}

fn show_info(file: &Path, leaves: Option<u32>) -> Result<()> {
    let bvh = Bvh::load_from_file(file, leaves)?;
    let stats = bvh.calculate_stats();

    println!("BVH cache: {}", file.display());
    println!("  Nodes: {}", bvh.num_nodes());
    println!("  Leaf nodes: {}", stats.num_leaf_nodes());
    println!("  Max depth: {}", stats.max_depth);
    if !bvh.is_empty() {
        let bbox = bvh.bounding_box();
        println!(
            "  Bounds: [{:.3}, {:.3}, {:.3}] - [{:.3}, {:.3}, {:.3}]",
            bbox.min.x, bbox.min.y, bbox.min.z, bbox.max.x, bbox.max.y, bbox.max.z
        );
    }
    println!("  Total node area: {:.3}", stats.total_nodes_area);
    println!("  Total node volume: {:.3}", stats.total_nodes_volume);
    println!("  Leaf sizes: {}", stats.format_histogram());
    Ok(())
}

fn render_depth(config: &RenderConfig, mode: TraceMode, verify: bool) -> Result<()> {
    let scene = generate_scene(config)?;
    let camera = Camera::for_generated_scene();

    let output = render(&scene, &camera, config, mode);
    info!(
        "Rendered {}x{} in {:.1} ms ({:?} mode)",
        config.width,
        config.height,
        output.elapsed.as_secs_f64() * 1000.0,
        mode
    );
    print_counters(&output.counters);

    if verify {
        let other_mode = match mode {
            TraceMode::Single => TraceMode::Packet,
            TraceMode::Packet => TraceMode::Single,
        };
        let other = render(&scene, &camera, config, other_mode);
        let mismatches = output.image.count_mismatches(&other.image, 1e-4);
        if mismatches > 0 {
            bail!("{mismatches} pixels differ between {mode:?} and {other_mode:?} traversal");
        }
        info!(
            "{:?} traversal agrees on all pixels ({:.1} ms)",
            other_mode,
            other.elapsed.as_secs_f64() * 1000.0
        );
    }

    if output.image.coverage() == 0.0 {
        warn!("No pixel hit the scene");
    }
    output.image.save_png(&config.output)?;
    println!("Wrote depth image to {}", config.output.display());
    Ok(())
}

fn print_counters(counters: &RayCounters) {
    println!("Ray counters:");
    println!("  Rays: {}", counters.num_rays);
    println!(
        "  Ray-box tests: {} ({} passed)",
        counters.num_ray_box_tests, counters.num_passed_ray_box_tests
    );
    println!(
        "  Ray-object tests: {} ({} passed)",
        counters.num_ray_object_tests, counters.num_passed_ray_object_tests
    );
    println!("  Reordered lanes: {}", counters.num_reordered_lanes);
}
