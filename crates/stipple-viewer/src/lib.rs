//! # Stipple Viewer
//!
//! Ties decoding, partitioning and scheduling to a rendering backend.
//!
//! This crate provides:
//! - **Config**: JSON viewer configuration
//! - **Loader**: Cached, off-thread decode and partition of PCD files
//! - **Render**: Backend trait for GPU buffer lifetime and a recording backend
//! - **Viewer**: The per-frame update loop and frame statistics

pub mod config;
pub mod loader;
pub mod render;
pub mod viewer;

pub use config::{PartitionConfig, PartitionStrategy, ViewerConfig};
pub use loader::{LoadedScene, Loader};
pub use render::{BufferHandle, RecordingBackend, RenderBackend, ResidentBuffer};
pub use viewer::{FrameStats, Viewer};

use stipple_core::{CoreError, TaskLost};
use stipple_pcd::DecodeError;
use thiserror::Error;

/// Viewer errors
#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Background task lost: {0}")]
    TaskLost(#[from] TaskLost),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Render backend error: {0}")]
    Render(String),
}

/// Result type for viewer operations
pub type ViewerResult<T> = Result<T, ViewerError>;
