//! # Stipple Core
//!
//! Shared foundation for the Stipple point-cloud pipeline.
//!
//! This crate provides:
//! - **Math**: Bounds, planes and view frustum culling on top of glam
//! - **Dataset**: Column-oriented point/colour storage produced by decoders
//! - **Tasks**: Thread pool for off-render-thread work with typed results
//! - **Cache**: Content-hash keyed byte store for decoded datasets and chunk sets
//! - **Timing**: Load stage spans and frame-time windows

pub mod cache;
pub mod dataset;
pub mod job;
pub mod math;
pub mod timer;

pub use cache::{ByteStore, ContentCache, ContentHash, DirByteStore, MemoryByteStore};
pub use dataset::{Color, PointCloudDataset};
pub use job::{TaskHandle, TaskLost, TaskPool};
pub use math::{Bounds, Frustum, Plane};
pub use timer::{FrameWindow, StageSpan, StageTimings};

use thiserror::Error;

/// Core errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Color count {colors} does not match point count {points}")]
    ColorCountMismatch { points: usize, colors: usize },

    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Cache I/O error: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
