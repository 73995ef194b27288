//! # Stipple CLI
//!
//! Command-line interface for the Stipple point cloud pipeline.
//!
//! ## Commands
//! - `inspect` - Decode a PCD file and summarise it
//! - `convert` - Re-encode a PCD file
//! - `octree` - Build an octree and report its shape
//! - `chunks` - Build LOD chunk tiers and report them
//! - `simulate` - Run the viewer headless with an orbiting camera

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glam::{Mat4, Vec3};
use serde::Serialize;

use stipple_core::{Bounds, PointCloudDataset, StageTimings};
use stipple_lod::{ChunkSet, Octree, OctreeStats, build_chunk_set};
use stipple_pcd::{DataEncoding, DecodeOptions, PcdDecoder, PcdHeader};
use stipple_viewer::{PartitionStrategy, RecordingBackend, Viewer, ViewerConfig};

/// Stipple point cloud CLI
#[derive(Parser)]
#[command(name = "stipple")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Viewer configuration (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print reports as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Partitioning strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Octree,
    Chunked,
}

impl From<StrategyArg> for PartitionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Octree => PartitionStrategy::Octree,
            StrategyArg::Chunked => PartitionStrategy::Chunked,
        }
    }
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Decode a PCD file and summarise it
    Inspect {
        /// Input PCD file
        input: PathBuf,
    },

    /// Re-encode a PCD file
    Convert {
        /// Input PCD file
        input: PathBuf,

        /// Output PCD file
        output: PathBuf,

        /// Output encoding: ascii, binary or binary_compressed
        #[arg(short, long, default_value = "binary_compressed")]
        encoding: DataEncoding,
    },

    /// Build an octree and report its shape
    Octree {
        /// Input PCD file
        input: PathBuf,

        /// Leaf capacity
        #[arg(long)]
        max_points_per_node: Option<usize>,

        /// Maximum tree depth
        #[arg(long)]
        max_depth: Option<u32>,
    },

    /// Build LOD chunk tiers and report them
    Chunks {
        /// Input PCD file
        input: PathBuf,

        /// Points per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Run the viewer headless with an orbiting camera
    Simulate {
        /// Input PCD file
        input: PathBuf,

        /// Frames to run
        #[arg(short, long, default_value = "120")]
        frames: u32,

        /// Point budget
        #[arg(short, long)]
        budget: Option<usize>,

        /// Partitioning strategy
        #[arg(short, long)]
        strategy: Option<StrategyArg>,
    },
}

/// A command result that can be logged or printed as JSON
pub trait Report: Serialize {
    /// Write the report to the log
    fn log(&self);
}

/// Summary of a decoded file
#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub version: String,
    pub fields: Vec<String>,
    pub encoding: String,
    pub declared_points: usize,
    pub points: usize,
    pub skipped_points: usize,
    pub has_colors: bool,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
    pub decode_ms: f64,
}

impl Report for InspectReport {
    fn log(&self) {
        log::info!("PCD {} ({})", self.version, self.encoding);
        log::info!("  Fields: {}", self.fields.join(" "));
        log::info!("  Points: {} of {} declared", self.points, self.declared_points);
        if self.skipped_points > 0 {
            log::info!("  Skipped: {}", self.skipped_points);
        }
        log::info!("  Colors: {}", if self.has_colors { "yes" } else { "no" });
        log::info!("  Bounds: {:?} .. {:?}", self.bounds_min, self.bounds_max);
        log::info!("  Decoded in {:.1} ms", self.decode_ms);
    }
}

/// Result of a conversion
#[derive(Debug, Serialize)]
pub struct ConvertReport {
    pub points: usize,
    pub encoding: String,
    pub bytes: usize,
}

impl Report for ConvertReport {
    fn log(&self) {
        log::info!("Wrote {} points as {} ({} bytes)", self.points, self.encoding, self.bytes);
    }
}

/// One LOD tier of a chunk set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierReport {
    pub lod: usize,
    pub chunks: usize,
    pub points: usize,
}

/// Shape of a chunk set
#[derive(Debug, Serialize)]
pub struct ChunksReport {
    pub source_points: usize,
    pub chunks: usize,
    pub tiers: Vec<TierReport>,
}

impl ChunksReport {
    fn from_set(set: &ChunkSet) -> Self {
        Self {
            source_points: set.source_points(),
            chunks: set.len(),
            tiers: (0..set.tier_count())
                .map(|lod| TierReport {
                    lod,
                    chunks: set.tier_indices(lod).len(),
                    points: set.tier_points(lod),
                })
                .collect(),
        }
    }
}

impl Report for ChunksReport {
    fn log(&self) {
        log::info!("{} chunks from {} points", self.chunks, self.source_points);
        for tier in &self.tiers {
            log::info!("  LOD {}: {} chunks, {} points", tier.lod, tier.chunks, tier.points);
        }
    }
}

/// Shape of an octree
#[derive(Debug, Serialize)]
pub struct OctreeReport {
    pub stats: OctreeStats,
    /// Node count per level, root first
    pub nodes_per_level: Vec<usize>,
    pub chunks: ChunksReport,
}

impl Report for OctreeReport {
    fn log(&self) {
        log::info!(
            "Octree: {} nodes, {} leaves, depth {}, {} points",
            self.stats.node_count,
            self.stats.leaf_count,
            self.stats.depth,
            self.stats.point_count
        );
        for (level, count) in self.nodes_per_level.iter().enumerate() {
            log::info!("  Level {}: {} nodes", level, count);
        }
        self.chunks.log();
    }
}

/// Outcome of a headless viewer run
#[derive(Debug, Serialize)]
pub struct SimulateReport {
    pub frames: u32,
    pub total_points: usize,
    pub peak_rendered_points: usize,
    pub final_rendered_points: usize,
    pub uploads: usize,
    pub average_frame_ms: f64,
    pub peak_frame_ms: f64,
    /// Milliseconds per load stage
    pub load: StageTimings,
}

impl Report for SimulateReport {
    fn log(&self) {
        log::info!("Simulated {} frames over {} points", self.frames, self.total_points);
        log::info!("  Rendered: {} peak, {} final", self.peak_rendered_points, self.final_rendered_points);
        log::info!("  Uploads: {}", self.uploads);
        log::info!("  Frame time: {:.3} ms average, {:.3} ms peak", self.average_frame_ms, self.peak_frame_ms);
        for (stage, ms) in self.load.iter() {
            log::info!("  Load {}: {:.1} ms", stage, ms);
        }
    }
}

/// Initialise logging; `info` by default, `debug` when verbose
pub fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).try_init();
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ViewerConfig::load(path).with_context(|| format!("reading {}", path.display()))?,
        None => ViewerConfig::default(),
    };

    match cli.command {
        Commands::Inspect { input } => emit(cli.json, &inspect(&input, &config.decode)?),

        Commands::Convert { input, output, encoding } => {
            emit(cli.json, &convert(&input, &output, encoding, &config.decode)?)
        }

        Commands::Octree {
            input,
            max_points_per_node,
            max_depth,
        } => {
            let mut octree = config.partition.octree.clone();
            if let Some(max_points) = max_points_per_node {
                octree.max_points_per_node = max_points;
            }
            if let Some(depth) = max_depth {
                octree.max_depth = depth;
            }
            let dataset = read_dataset(&input, &config.decode)?;
            emit(cli.json, &octree_report(&Octree::from_dataset(&dataset, &octree)))
        }

        Commands::Chunks { input, chunk_size } => {
            let mut chunking = config.partition.chunking.clone();
            if let Some(size) = chunk_size {
                chunking.chunk_size = size;
            }
            let dataset = read_dataset(&input, &config.decode)?;
            emit(cli.json, &ChunksReport::from_set(&build_chunk_set(&dataset, &chunking)))
        }

        Commands::Simulate {
            input,
            frames,
            budget,
            strategy,
        } => {
            let mut config = config;
            if let Some(budget) = budget {
                config.scheduler.point_budget = budget;
            }
            if let Some(strategy) = strategy {
                config.partition.strategy = strategy.into();
            }
            emit(cli.json, &simulate(&input, config, frames)?)
        }
    }
}

fn emit(json: bool, report: &impl Report) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        report.log();
    }
    Ok(())
}

fn read_dataset(path: &Path, options: &DecodeOptions) -> Result<PointCloudDataset> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let dataset = PcdDecoder::new(options.clone())
        .decode(&bytes)
        .with_context(|| format!("decoding {}", path.display()))?;
    log::debug!("Decoded {} points from {}", dataset.len(), path.display());
    Ok(dataset)
}

/// Decode a file and summarise its header and contents
pub fn inspect(path: &Path, options: &DecodeOptions) -> Result<InspectReport> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (header, _) = PcdHeader::parse(&bytes).with_context(|| format!("parsing header of {}", path.display()))?;

    let start = Instant::now();
    let dataset = PcdDecoder::new(options.clone())
        .decode(&bytes)
        .with_context(|| format!("decoding {}", path.display()))?;
    let decode_ms = start.elapsed().as_secs_f64() * 1000.0;

    let bounds = dataset.bounds();
    Ok(InspectReport {
        version: header.version,
        fields: header.fields,
        encoding: header.data.to_string(),
        declared_points: header.points,
        points: dataset.len(),
        skipped_points: dataset.skipped_points(),
        has_colors: dataset.has_colors(),
        bounds_min: bounds.min.to_array(),
        bounds_max: bounds.max.to_array(),
        decode_ms,
    })
}

/// Decode a file and write it back with another encoding
pub fn convert(input: &Path, output: &Path, encoding: DataEncoding, options: &DecodeOptions) -> Result<ConvertReport> {
    let dataset = read_dataset(input, options)?;
    let bytes = stipple_pcd::encode(&dataset, encoding).with_context(|| format!("encoding {}", input.display()))?;
    std::fs::write(output, &bytes).with_context(|| format!("writing {}", output.display()))?;
    Ok(ConvertReport {
        points: dataset.len(),
        encoding: encoding.to_string(),
        bytes: bytes.len(),
    })
}

/// Summarise a built octree
pub fn octree_report(octree: &Octree) -> OctreeReport {
    let stats = octree.stats();
    OctreeReport {
        stats,
        nodes_per_level: (0..=stats.depth).map(|level| octree.nodes_at_level(level).len()).collect(),
        chunks: ChunksReport::from_set(&octree.to_chunk_set()),
    }
}

/// Camera circling the bounds once over `frames` frames
pub fn orbit_camera(bounds: &Bounds, frame: u32, frames: u32) -> Mat4 {
    let radius = (bounds.max_dimension() * 1.5).max(1.0);
    let angle = frame as f32 / frames.max(1) as f32 * std::f32::consts::TAU;
    let center = bounds.center();
    let eye = center + Vec3::new(angle.cos() * radius, radius * 0.5, angle.sin() * radius);

    let projection = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, radius * 0.001, radius * 10.0);
    projection * Mat4::look_at_rh(eye, center, Vec3::Y)
}

/// Load a file into a headless viewer and run `frames` frames
pub fn simulate(path: &Path, config: ViewerConfig, frames: u32) -> Result<SimulateReport> {
    let mut viewer = Viewer::new(config, RecordingBackend::new())?;
    viewer.on_progress(|pct, msg| log::debug!("{:>5.1}% {}", pct, msg));
    viewer.load_file(path)?;
    viewer.wait_for_load()?;

    let (bounds, load) = match viewer.scene() {
        Some(scene) => (*scene.chunks.bounds(), scene.timings.clone()),
        None => anyhow::bail!("{} produced no scene", path.display()),
    };

    let mut report = SimulateReport {
        frames,
        total_points: 0,
        peak_rendered_points: 0,
        final_rendered_points: 0,
        uploads: 0,
        average_frame_ms: 0.0,
        peak_frame_ms: 0.0,
        load,
    };
    for frame in 0..frames {
        let stats = viewer.frame(orbit_camera(&bounds, frame, frames))?;
        log::debug!(
            "Frame {}: {} of {} points, {} chunks, {} pending",
            frame,
            stats.rendered_points,
            stats.total_points,
            stats.visible_chunks,
            stats.pending_uploads
        );
        report.total_points = stats.total_points;
        report.peak_rendered_points = report.peak_rendered_points.max(stats.rendered_points);
        report.final_rendered_points = stats.rendered_points;
    }

    report.uploads = viewer.backend().uploads();
    report.average_frame_ms = viewer.average_frame_time_ms();
    report.peak_frame_ms = viewer.peak_frame_time_ms();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use stipple_core::Color;

    fn write_cloud(name: &str, n: usize, encoding: DataEncoding) -> PathBuf {
        let points = (0..n)
            .map(|i| Vec3::new((i % 20) as f32, (i / 20 % 20) as f32, (i / 400) as f32))
            .collect();
        let colors = (0..n).map(|i| Color::from_rgb8(i as u8, 128, 0)).collect();
        let dataset = PointCloudDataset::new(points, colors).unwrap();

        let path = std::env::temp_dir().join(format!("stipple-cli-{}-{}.pcd", std::process::id(), name));
        std::fs::write(&path, stipple_pcd::encode(&dataset, encoding).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from(["stipple", "convert", "in.pcd", "out.pcd", "-e", "ascii", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Convert { encoding, output, .. } => {
                assert_eq!(encoding, DataEncoding::Ascii);
                assert_eq!(output, PathBuf::from("out.pcd"));
            }
            _ => panic!("expected convert"),
        }

        assert!(Cli::try_parse_from(["stipple", "convert", "a", "b", "-e", "zip"]).is_err());
    }

    #[test]
    fn test_parse_simulate_defaults() {
        let cli = Cli::try_parse_from(["stipple", "simulate", "in.pcd", "--strategy", "chunked"]).unwrap();
        match cli.command {
            Commands::Simulate {
                frames,
                budget,
                strategy,
                ..
            } => {
                assert_eq!(frames, 120);
                assert_eq!(budget, None);
                assert_eq!(strategy.map(PartitionStrategy::from), Some(PartitionStrategy::Chunked));
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_inspect() {
        let path = write_cloud("inspect", 1_000, DataEncoding::Binary);
        let report = inspect(&path, &DecodeOptions::default()).unwrap();

        assert_eq!(report.encoding, "binary");
        assert_eq!(report.declared_points, 1_000);
        assert_eq!(report.points, 1_000);
        assert!(report.has_colors);
        assert_eq!(report.bounds_min, [0.0, 0.0, 0.0]);
        assert_eq!(report.bounds_max, [19.0, 19.0, 2.0]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_convert_round_trip() {
        let input = write_cloud("convert-in", 500, DataEncoding::Ascii);
        let output = input.with_extension("out.pcd");

        let report = convert(&input, &output, DataEncoding::BinaryCompressed, &DecodeOptions::default()).unwrap();
        assert_eq!(report.points, 500);
        assert_eq!(report.encoding, "binary_compressed");

        let back = inspect(&output, &DecodeOptions::default()).unwrap();
        assert_eq!(back.encoding, "binary_compressed");
        assert_eq!(back.points, 500);
        let _ = std::fs::remove_file(input);
        let _ = std::fs::remove_file(output);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = std::env::temp_dir().join("stipple-cli-does-not-exist.pcd");
        assert!(inspect(&missing, &DecodeOptions::default()).is_err());
    }

    #[test]
    fn test_octree_report() {
        let points = (0..2_000).map(|i| Vec3::new(i as f32, (i % 7) as f32, 0.0)).collect();
        let octree = Octree::build(
            points,
            Vec::new(),
            &stipple_lod::OctreeConfig {
                max_points_per_node: 100,
                ..Default::default()
            },
        );
        let report = octree_report(&octree);

        assert_eq!(report.nodes_per_level[0], 1);
        assert_eq!(report.nodes_per_level.len() as u32, report.stats.depth + 1);
        assert_eq!(report.nodes_per_level.iter().sum::<usize>(), report.stats.node_count);
        assert_eq!(report.chunks.source_points, 2_000);
    }

    #[test]
    fn test_orbit_camera_sees_center() {
        let bounds = Bounds::new(Vec3::ZERO, Vec3::splat(10.0));
        for frame in [0, 7, 19] {
            let clip = orbit_camera(&bounds, frame, 20) * bounds.center().extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(clip.w > 0.0);
            assert!(ndc.x.abs() < 1e-3 && ndc.y.abs() < 1e-3);
        }
    }

    #[test]
    fn test_simulate() {
        let path = write_cloud("simulate", 2_000, DataEncoding::BinaryCompressed);
        let mut config = ViewerConfig::default();
        config.worker_threads = 2;
        config.partition.strategy = PartitionStrategy::Chunked;
        config.partition.chunking.chunk_size = 256;

        let report = simulate(&path, config, 8).unwrap();
        assert_eq!(report.frames, 8);
        assert_eq!(report.total_points, 2_000);
        assert!(report.peak_rendered_points > 0);
        assert!(report.uploads > 0);
        assert!(report.peak_frame_ms >= report.average_frame_ms);
        assert!(report.load.get("decode").is_some());
        assert!(report.load.get("partition").is_some());
        let _ = std::fs::remove_file(path);
    }
}
