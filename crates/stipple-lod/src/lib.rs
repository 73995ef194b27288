//! # Stipple LOD
//!
//! Spatial level-of-detail structures and per-frame chunk selection.
//!
//! This crate provides:
//! - **Octree**: Recursive adaptive partitioning with coarse representatives
//! - **Voxel**: Grid downsampling for LOD tiers and oversized datasets
//! - **Chunk**: Fixed-size chunking into LOD tiers
//! - **Scheduler**: Frustum culling and point budgeting every frame
//! - **Handoff**: Flat renderer buffers built in batches

pub mod chunk;
pub mod handoff;
pub mod octree;
pub mod scheduler;
pub mod voxel;

pub use chunk::{ChunkId, ChunkSet, ChunkingConfig, PointChunk, build_chunk_set, safety_downsample};
pub use handoff::{BufferUpload, RenderBuffers};
pub use octree::{NodeContent, Octree, OctreeConfig, OctreeNode, OctreeStats};
pub use scheduler::{ChunkScheduler, SchedulerConfig, VisibilityStats};
pub use voxel::{voxel_cell, voxel_downsample};
