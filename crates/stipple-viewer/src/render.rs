//! Rendering backend seam
//!
//! The viewer owns chunk data; a backend owns the GPU-side copies. Handles
//! are created when a chunk is first shown and must be released explicitly.

use ahash::AHashMap;
use glam::Mat4;
use stipple_lod::{ChunkId, RenderBuffers};

use crate::{ViewerError, ViewerResult};

/// A renderer that accepts point buffers
pub trait RenderBackend {
    /// Backend resource for one uploaded chunk
    type Handle;

    /// Create GPU buffers for a chunk
    fn upload(&mut self, chunk: ChunkId, buffers: RenderBuffers) -> ViewerResult<Self::Handle>;

    /// Toggle drawing of an uploaded chunk without freeing it
    fn set_visible(&mut self, handle: &Self::Handle, visible: bool);

    /// Free an uploaded chunk
    fn release(&mut self, handle: Self::Handle);

    /// Set the camera for the next draw
    fn set_camera(&mut self, view_projection: Mat4);
}

/// Handle issued by [`RecordingBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

/// A buffer held by [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResidentBuffer {
    pub chunk: ChunkId,
    pub count: usize,
    pub visible: bool,
}

/// Backend that tracks buffers in memory instead of drawing
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_handle: u64,
    buffers: AHashMap<u64, ResidentBuffer>,
    camera: Mat4,
    uploads: usize,
    releases: usize,
}

impl RecordingBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live buffers
    pub fn resident(&self) -> usize {
        self.buffers.len()
    }

    /// Points in live buffers that are currently drawn
    pub fn visible_points(&self) -> usize {
        self.buffers.values().filter(|b| b.visible).map(|b| b.count).sum()
    }

    /// Look up a live buffer
    pub fn buffer(&self, handle: &BufferHandle) -> Option<&ResidentBuffer> {
        self.buffers.get(&handle.0)
    }

    /// Total uploads so far
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    /// Total releases so far
    pub fn releases(&self) -> usize {
        self.releases
    }

    /// Last camera set
    pub fn camera(&self) -> Mat4 {
        self.camera
    }
}

impl RenderBackend for RecordingBackend {
    type Handle = BufferHandle;

    fn upload(&mut self, chunk: ChunkId, buffers: RenderBuffers) -> ViewerResult<BufferHandle> {
        if buffers.positions.len() != buffers.count * 3 || buffers.colors.len() != buffers.count * 3 {
            return Err(ViewerError::Render(format!(
                "{} buffers do not match {} points",
                chunk, buffers.count
            )));
        }

        let handle = BufferHandle(self.next_handle);
        self.next_handle += 1;
        self.uploads += 1;
        self.buffers.insert(
            handle.0,
            ResidentBuffer {
                chunk,
                count: buffers.count,
                visible: false,
            },
        );
        Ok(handle)
    }

    fn set_visible(&mut self, handle: &BufferHandle, visible: bool) {
        if let Some(buffer) = self.buffers.get_mut(&handle.0) {
            buffer.visible = visible;
        }
    }

    fn release(&mut self, handle: BufferHandle) {
        if self.buffers.remove(&handle.0).is_some() {
            self.releases += 1;
        }
    }

    fn set_camera(&mut self, view_projection: Mat4) {
        self.camera = view_projection;
    }
}
