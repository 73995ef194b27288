//! Viewer configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stipple_core::PointCloudDataset;
use stipple_lod::{ChunkSet, ChunkingConfig, Octree, OctreeConfig, SchedulerConfig, build_chunk_set};
use stipple_pcd::DecodeOptions;

use crate::ViewerResult;

/// How a dataset is split into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Adaptive octree; leaves are full detail, branches coarse tiers
    #[default]
    Octree,
    /// Fixed-size chunks per LOD ratio
    Chunked,
}

/// Partitioning settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub strategy: PartitionStrategy,
    pub octree: OctreeConfig,
    pub chunking: ChunkingConfig,
}

impl PartitionConfig {
    /// Partition a dataset with the configured strategy
    pub fn partition(&self, dataset: &PointCloudDataset) -> ChunkSet {
        match self.strategy {
            PartitionStrategy::Octree => Octree::from_dataset(dataset, &self.octree).to_chunk_set(),
            PartitionStrategy::Chunked => build_chunk_set(dataset, &self.chunking),
        }
    }

    /// Key component distinguishing chunk sets built with different settings
    pub fn cache_salt(&self) -> String {
        format!("{:?}", self)
    }
}

/// Viewer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub decode: DecodeOptions,
    pub partition: PartitionConfig,
    pub scheduler: SchedulerConfig,
    /// Points converted per upload step
    pub upload_batch_size: usize,
    /// Upload steps allowed per frame
    pub upload_batches_per_frame: usize,
    /// Background workers (0 = one per core)
    pub worker_threads: usize,
    /// Persist decoded data here; in-memory cache when unset
    pub cache_dir: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            decode: DecodeOptions::default(),
            partition: PartitionConfig::default(),
            scheduler: SchedulerConfig::default(),
            upload_batch_size: 100_000,
            upload_batches_per_frame: 4,
            worker_threads: 0,
            cache_dir: None,
        }
    }
}

impl ViewerConfig {
    /// Parse a JSON configuration; missing keys take their defaults
    pub fn from_json(json: &str) -> ViewerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> ViewerResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded viewer config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> ViewerResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
