//! Renderer hand-off buffers
//!
//! Converts a chunk into flat `f32` positions and `u8` RGB colours. Large
//! chunks are converted in batches so the work can be spread over frames.

use crate::chunk::{ChunkId, PointChunk};

/// Flat buffers for one chunk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderBuffers {
    /// xyz per point
    pub positions: Vec<f32>,
    /// rgb per point, white for uncoloured chunks
    pub colors: Vec<u8>,
    pub count: usize,
}

impl RenderBuffers {
    /// Convert a whole chunk at once
    pub fn from_chunk(chunk: &PointChunk) -> Self {
        let mut upload = BufferUpload::new(chunk, usize::MAX);
        upload.step(chunk);
        upload.into_buffers()
    }

    fn with_capacity(points: usize) -> Self {
        Self {
            positions: Vec::with_capacity(points * 3),
            colors: Vec::with_capacity(points * 3),
            count: 0,
        }
    }
}

/// Incremental conversion of one chunk
#[derive(Debug)]
pub struct BufferUpload {
    chunk: ChunkId,
    total: usize,
    batch_size: usize,
    buffers: RenderBuffers,
}

impl BufferUpload {
    /// Start converting a chunk, `batch_size` points per step
    pub fn new(chunk: &PointChunk, batch_size: usize) -> Self {
        Self {
            chunk: chunk.id(),
            total: chunk.point_count(),
            batch_size: batch_size.max(1),
            buffers: RenderBuffers::with_capacity(chunk.point_count()),
        }
    }

    /// Get the chunk being converted
    pub fn chunk_id(&self) -> ChunkId {
        self.chunk
    }

    /// Convert the next batch; returns true once the chunk is complete
    pub fn step(&mut self, chunk: &PointChunk) -> bool {
        debug_assert_eq!(chunk.id(), self.chunk);
        let start = self.buffers.count;
        let end = start.saturating_add(self.batch_size).min(self.total);

        for point in &chunk.points()[start..end] {
            self.buffers.positions.extend_from_slice(&[point.x, point.y, point.z]);
        }
        if chunk.colors().is_empty() {
            self.buffers.colors.resize(end * 3, u8::MAX);
        } else {
            for color in &chunk.colors()[start..end] {
                self.buffers.colors.extend_from_slice(&color.to_rgb8());
            }
        }

        self.buffers.count = end;
        self.is_complete()
    }

    /// Check if every point has been converted
    pub fn is_complete(&self) -> bool {
        self.buffers.count >= self.total
    }

    /// Fraction converted, 0 to 1
    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        self.buffers.count as f32 / self.total as f32
    }

    /// Take the converted buffers
    pub fn into_buffers(self) -> RenderBuffers {
        self.buffers
    }
}
