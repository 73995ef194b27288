//! Chunks and LOD tiers
//!
//! A [`ChunkSet`] is the immutable output of partitioning: every chunk of
//! one load, grouped into LOD tiers (0 = full detail, higher = coarser).

use std::fmt;

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stipple_core::{Bounds, Color, PointCloudDataset};

use crate::voxel::voxel_downsample;

/// Unique identifier of a chunk within its set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub u32);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk#{}", self.0)
    }
}

/// A slice of a point cloud at one LOD level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointChunk {
    id: ChunkId,
    lod: u32,
    points: Vec<Vec3>,
    colors: Vec<Color>,
    bounds: Bounds,
}

impl PointChunk {
    /// Create a chunk; `colors` is empty or parallel to `points`
    pub fn new(id: ChunkId, lod: u32, points: Vec<Vec3>, colors: Vec<Color>) -> Self {
        debug_assert!(colors.is_empty() || colors.len() == points.len());
        let bounds = Bounds::from_points(&points);
        Self {
            id,
            lod,
            points,
            colors,
            bounds,
        }
    }

    /// Get the chunk id
    pub fn id(&self) -> ChunkId {
        self.id
    }

    /// Get the LOD level (0 = finest)
    pub fn lod(&self) -> u32 {
        self.lod
    }

    /// Get the point positions
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Get the point colours (empty if uncoloured)
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    /// Number of points in the chunk
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Get the exact bounds of the chunk's points
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }
}

/// All chunks of one load, indexed by LOD tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkSet {
    chunks: Vec<PointChunk>,
    tiers: Vec<Vec<usize>>,
    bounds: Bounds,
    source_points: usize,
}

impl ChunkSet {
    /// Group chunks by LOD level
    pub fn new(chunks: Vec<PointChunk>, bounds: Bounds, source_points: usize) -> Self {
        let tier_count = chunks.iter().map(|c| c.lod as usize + 1).max().unwrap_or(0);
        let mut tiers = vec![Vec::new(); tier_count];
        for (index, chunk) in chunks.iter().enumerate() {
            tiers[chunk.lod as usize].push(index);
        }
        Self {
            chunks,
            tiers,
            bounds,
            source_points,
        }
    }

    /// Get all chunks in id order
    pub fn chunks(&self) -> &[PointChunk] {
        &self.chunks
    }

    /// Look up a chunk by id
    pub fn chunk(&self, id: ChunkId) -> Option<&PointChunk> {
        // Builders assign ids sequentially from zero
        match self.chunks.get(id.0 as usize) {
            Some(chunk) if chunk.id == id => Some(chunk),
            _ => self.chunks.iter().find(|c| c.id == id),
        }
    }

    /// Number of chunks across all tiers
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if the set has no chunks
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Bounds of the source dataset
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Points in the dataset the set was built from
    pub fn source_points(&self) -> usize {
        self.source_points
    }

    /// Number of LOD tiers (highest level + 1)
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Indices into [`chunks`](Self::chunks) of one tier
    pub fn tier_indices(&self, lod: usize) -> &[usize] {
        self.tiers.get(lod).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate the chunks of one tier
    pub fn tier(&self, lod: usize) -> impl Iterator<Item = &PointChunk> {
        self.tier_indices(lod).iter().map(|&i| &self.chunks[i])
    }

    /// Sum of point counts in one tier
    pub fn tier_points(&self, lod: usize) -> usize {
        self.tier(lod).map(PointChunk::point_count).sum()
    }

    /// Sum of point counts over every chunk
    pub fn total_points(&self) -> usize {
        self.chunks.iter().map(PointChunk::point_count).sum()
    }
}

/// Settings for flat chunking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Points per chunk
    pub chunk_size: usize,
    /// Target ratio per tier; tier 0 should be 1.0 (full data)
    pub lod_ratios: Vec<f32>,
    /// Scale from `max_dimension * (1 - ratio)` to a voxel size
    pub voxel_factor: f32,
    /// Datasets above this size are downsampled before chunking
    pub max_points: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50_000,
            lod_ratios: vec![1.0, 0.5, 0.25],
            voxel_factor: 0.01,
            max_points: 10_000_000,
        }
    }
}

impl ChunkingConfig {
    /// Voxel size used to build a tier
    pub fn tier_voxel_size(&self, max_dimension: f32, ratio: f32) -> f32 {
        max_dimension * (1.0 - ratio) * self.voxel_factor
    }
}

/// Downsample until at most `max_points` remain.
///
/// The voxel starts at `max_dimension / cbrt(max_points)` and doubles each
/// round. Returns the input unchanged if it is already small enough.
pub fn safety_downsample(
    points: &[Vec3],
    colors: &[Color],
    bounds: &Bounds,
    max_points: usize,
) -> (Vec<Vec3>, Vec<Color>) {
    const MAX_ROUNDS: usize = 32;

    if points.len() <= max_points || max_points == 0 {
        return (points.to_vec(), colors.to_vec());
    }

    let max_dimension = bounds.max_dimension();
    let mut voxel = if max_dimension > 0.0 {
        max_dimension / (max_points as f32).cbrt()
    } else {
        1.0
    };

    let mut result = voxel_downsample(points, colors, voxel);
    for _ in 0..MAX_ROUNDS {
        if result.0.len() <= max_points {
            break;
        }
        voxel *= 2.0;
        result = voxel_downsample(points, colors, voxel);
    }

    log::info!(
        "Safety downsample: {} -> {} points (voxel {})",
        points.len(),
        result.0.len(),
        voxel
    );
    result
}

/// Split a dataset into fixed-size chunks for each LOD tier
pub fn build_chunk_set(dataset: &PointCloudDataset, config: &ChunkingConfig) -> ChunkSet {
    let bounds = dataset.bounds();
    if dataset.is_empty() {
        return ChunkSet::new(Vec::new(), bounds, 0);
    }

    let (points, colors) = safety_downsample(dataset.points(), dataset.colors(), &bounds, config.max_points);
    let max_dimension = bounds.max_dimension();

    let tiers: Vec<(Vec<Vec3>, Vec<Color>)> = config
        .lod_ratios
        .par_iter()
        .map(|&ratio| {
            let voxel = config.tier_voxel_size(max_dimension, ratio);
            voxel_downsample(&points, &colors, voxel)
        })
        .collect();

    let chunk_size = config.chunk_size.max(1);
    let mut chunks = Vec::new();
    for (lod, (points, colors)) in tiers.into_iter().enumerate() {
        for (i, slice) in points.chunks(chunk_size).enumerate() {
            let start = i * chunk_size;
            let slice_colors = if colors.is_empty() {
                Vec::new()
            } else {
                colors[start..start + slice.len()].to_vec()
            };
            let id = ChunkId(chunks.len() as u32);
            chunks.push(PointChunk::new(id, lod as u32, slice.to_vec(), slice_colors));
        }
    }

    let set = ChunkSet::new(chunks, bounds, dataset.len());
    log::info!(
        "Built {} chunks over {} tiers ({} points in tier 0)",
        set.len(),
        set.tier_count(),
        set.tier_points(0)
    );
    set
}
