//! Downsample a synthetic point cloud and print a JSON report.
//!
//! Run with: cargo run --release --bin ndt_sample
//!
//! Usage:
//!   ndt_sample                          200k-point cube down to ~10k voxels
//!   ndt_sample --points 1m --desired 50k --prune 20k
//!   ndt_sample --shape half-cubic --sizing search
//!
//! For phase timing, build with: cargo run --release --features profiling --bin ndt_sample
//! Set RUST_LOG=ndt_sampler=debug to see per-phase events.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ndt_sampler::test_utils::{make_half_cubic_pcd, make_uniform_cube};
use ndt_sampler::{DivergenceMode, GridSizing, NdtSampler, PointPlacement, SamplerTiming};
use serde::Serialize;
use tracing::info;

fn parse_count(s: &str) -> Result<usize, String> {
    let s = s.to_lowercase();
    let (num_str, multiplier) = if let Some(num) = s.strip_suffix('m') {
        (num, 1_000_000)
    } else if let Some(num) = s.strip_suffix('k') {
        (num, 1_000)
    } else {
        (s.as_str(), 1)
    };

    num_str
        .parse::<f64>()
        .map(|n| (n * multiplier as f64) as usize)
        .map_err(|e| format!("Invalid number '{s}': {e}"))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Shape {
    /// Points uniformly filling a cube
    Cube,
    /// Three orthogonal planes
    HalfCubic,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Sizing {
    Volumetric,
    Search,
}

#[derive(Parser, Debug)]
#[command(name = "ndt_sample")]
#[command(about = "NDT downsampling of a synthetic point cloud")]
struct Args {
    /// Synthetic cloud shape
    #[arg(long, value_enum, default_value_t = Shape::Cube)]
    shape: Shape,

    /// Number of points for the cube shape (e.g., 200k, 1m)
    #[arg(long, value_parser = parse_count, default_value = "200k")]
    points: usize,

    /// Cube side length, or plane length for the half-cubic shape
    #[arg(long, default_value_t = 20.0)]
    side: f32,

    /// Random seed
    #[arg(short, long, default_value_t = 12345)]
    seed: u64,

    /// Desired number of occupied voxels
    #[arg(long, value_parser = parse_count, default_value = "10k")]
    desired: usize,

    /// Prune to exactly this many points after downsampling
    #[arg(long, value_parser = parse_count)]
    prune: Option<usize>,

    /// Voxel sizing policy
    #[arg(long, value_enum, default_value_t = Sizing::Volumetric)]
    sizing: Sizing,

    /// Use one-directional KL instead of the symmetric sum
    #[arg(long)]
    forward: bool,

    /// Emit voxel centres instead of distribution means
    #[arg(long)]
    voxel_centers: bool,

    /// Worker threads (0 = all cores)
    #[arg(short = 'j', long, default_value_t = 0)]
    workers: usize,
}

#[derive(Debug, Serialize)]
struct Report {
    input_points: usize,
    desired: usize,
    voxel_size: f64,
    grid_dims: [usize; 3],
    downsampled_points: usize,
    downsample_timing: SamplerTiming,
    pruned_points: Option<usize>,
    prune_timing: Option<SamplerTiming>,
}

fn generate_points(args: &Args) -> Vec<[f32; 3]> {
    match args.shape {
        Shape::Cube => make_uniform_cube(args.points, args.side, args.seed),
        Shape::HalfCubic => make_half_cubic_pcd(args.side, 0.1),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let sizing = match args.sizing {
        Sizing::Volumetric => GridSizing::Volumetric,
        Sizing::Search => GridSizing::Search {
            upper_tolerance: 0.1,
            max_iterations: 32,
        },
    };
    let divergence = if args.forward {
        DivergenceMode::Forward
    } else {
        DivergenceMode::Symmetric
    };
    let placement = if args.voxel_centers {
        PointPlacement::VoxelCenter
    } else {
        PointPlacement::Mean
    };

    let mut sampler = NdtSampler::builder()
        .num_workers(args.workers)
        .sizing(sizing)
        .divergence(divergence)
        .placement(placement)
        .build()
        .context("Failed to create sampler")?;

    let points = generate_points(&args);
    info!(num_points = points.len(), shape = ?args.shape, "Generated synthetic cloud");

    let downsampled = sampler
        .downsample(&points, None, 0, args.desired)
        .context("Downsampling failed")?;
    let grid = sampler.grid()?;

    let mut report = Report {
        input_points: points.len(),
        desired: args.desired,
        voxel_size: grid.voxel_size(),
        grid_dims: grid.dims(),
        downsampled_points: downsampled.len(),
        downsample_timing: sampler.timing().clone(),
        pruned_points: None,
        prune_timing: None,
    };

    if let Some(target) = args.prune {
        let pruned = sampler
            .prune(target)
            .with_context(|| format!("Pruning to {target} points failed"))?;
        report.pruned_points = Some(pruned.len());
        report.prune_timing = Some(sampler.timing().clone());
    }

    sampler.release()?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
