//! Viewer context
//!
//! Owns the loader, the scheduler and the current chunk set, and keeps a
//! rendering backend in step with them. Call [`Viewer::frame`] once per
//! display frame.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use glam::Mat4;
use stipple_core::{ByteStore, ContentCache, DirByteStore, FrameWindow, MemoryByteStore, TaskPool};
use stipple_lod::{BufferUpload, ChunkId, ChunkScheduler, VisibilityStats};

use crate::config::ViewerConfig;
use crate::loader::{LoadedScene, Loader};
use crate::render::RenderBackend;
use crate::ViewerResult;

/// Per-frame statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Points in visible, uploaded chunks
    pub rendered_points: usize,
    /// Points in the loaded dataset
    pub total_points: usize,
    pub visible_chunks: usize,
    /// CPU time spent in this frame update
    pub frame_time_ms: f64,
    /// Chunks selected but not yet uploaded
    pub pending_uploads: usize,
}

type ProgressCallback = Box<dyn FnMut(f32, &str) + Send>;

/// Interactive point cloud viewer
pub struct Viewer<B: RenderBackend> {
    config: ViewerConfig,
    backend: B,
    loader: Loader,
    scheduler: ChunkScheduler,
    scene: Option<LoadedScene>,
    handles: AHashMap<ChunkId, B::Handle>,
    uploads: VecDeque<BufferUpload>,
    frame_times: FrameWindow,
    progress: ProgressCallback,
}

impl<B: RenderBackend> Viewer<B> {
    /// Create a viewer drawing through `backend`
    pub fn new(config: ViewerConfig, backend: B) -> ViewerResult<Self> {
        let pool = if config.worker_threads == 0 {
            TaskPool::with_cores()?
        } else {
            TaskPool::new(config.worker_threads)?
        };
        let workers = pool.num_workers();

        let store: Arc<dyn ByteStore> = match &config.cache_dir {
            Some(dir) => Arc::new(DirByteStore::open(dir)?),
            None => Arc::new(MemoryByteStore::new()),
        };
        let loader = Loader::new(
            Arc::new(pool),
            config.decode.clone(),
            config.partition.clone(),
            Some(Arc::new(ContentCache::new(store))),
        );

        log::info!(
            "Viewer ready: {:?} partitioning, budget {} points, {} workers",
            config.partition.strategy,
            config.scheduler.point_budget,
            workers
        );

        Ok(Self {
            scheduler: ChunkScheduler::new(config.scheduler.clone()),
            config,
            backend,
            loader,
            scene: None,
            handles: AHashMap::new(),
            uploads: VecDeque::new(),
            frame_times: FrameWindow::default(),
            progress: Box::new(|pct, msg| log::debug!("Load {:.0}%: {}", pct, msg)),
        })
    }

    /// Set the load progress callback
    pub fn on_progress(&mut self, callback: impl FnMut(f32, &str) + Send + 'static) {
        self.progress = Box::new(callback);
    }

    /// Start loading PCD bytes; the current scene stays up until it is replaced
    pub fn load(&mut self, bytes: Vec<u8>) -> u64 {
        self.loader.load(bytes)
    }

    /// Start loading a PCD file from disk
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ViewerResult<u64> {
        let bytes = std::fs::read(path.as_ref())?;
        log::info!("Loading {} ({} bytes)", path.as_ref().display(), bytes.len());
        Ok(self.load(bytes))
    }

    /// Block until the load in flight is installed
    pub fn wait_for_load(&mut self) -> ViewerResult<bool> {
        match self.loader.wait(&mut *self.progress)? {
            Some(scene) => {
                self.install(scene);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Check if a load is in flight
    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    /// Get the current scene
    pub fn scene(&self) -> Option<&LoadedScene> {
        self.scene.as_ref()
    }

    /// Get the backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get the configuration
    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Average frame update time over recent frames
    pub fn average_frame_time_ms(&self) -> f64 {
        self.frame_times.average_ms()
    }

    /// Slowest recent frame update since the scene was installed
    pub fn peak_frame_time_ms(&self) -> f64 {
        self.frame_times.peak_ms()
    }

    /// Drop the current scene and free every backend buffer
    pub fn unload(&mut self) {
        for (_, handle) in self.handles.drain() {
            self.backend.release(handle);
        }
        self.uploads.clear();
        self.scheduler.reset();
        if let Some(scene) = self.scene.take() {
            log::info!("Unloaded scene {} ({} chunks)", scene.hash, scene.chunks.len());
        }
    }

    fn install(&mut self, scene: LoadedScene) {
        self.unload();
        log::info!(
            "Installed scene {}: {} chunks, {} tiers, {} points{}",
            scene.hash,
            scene.chunks.len(),
            scene.chunks.tier_count(),
            scene.chunks.source_points(),
            if scene.from_cache { " (cached)" } else { "" }
        );
        for (stage, ms) in scene.timings.iter() {
            log::debug!("  {}: {:.1} ms", stage, ms);
        }
        self.frame_times.clear();
        self.scene = Some(scene);
    }

    /// Run one frame: advance loading, select chunks, upload and toggle buffers
    pub fn frame(&mut self, view_projection: Mat4) -> ViewerResult<FrameStats> {
        let start = Instant::now();

        if let Some(scene) = self.loader.poll(&mut *self.progress)? {
            self.install(scene);
        }
        self.backend.set_camera(view_projection);

        let mut stats = FrameStats::default();
        if let Some(scene) = self.scene.take() {
            let selection = self.scheduler.update_visibility(&scene.chunks, view_projection);
            let applied = self.apply_visibility(&scene, &selection);
            stats.total_points = scene.chunks.source_points();
            self.scene = Some(scene);
            applied?;
        }

        stats.visible_chunks = self.scheduler.stats().visible_chunks;
        stats.pending_uploads = self.uploads.len();
        stats.rendered_points = self
            .handles
            .keys()
            .filter(|id| self.scheduler.is_visible(**id))
            .filter_map(|id| self.scene.as_ref().and_then(|s| s.chunks.chunk(*id)))
            .map(|chunk| chunk.point_count())
            .sum();

        let elapsed = start.elapsed();
        self.frame_times.push(elapsed);
        stats.frame_time_ms = elapsed.as_secs_f64() * 1000.0;
        Ok(stats)
    }

    fn apply_visibility(&mut self, scene: &LoadedScene, selection: &VisibilityStats) -> ViewerResult<()> {
        log::trace!(
            "{} chunks visible, {} culled, {} capped",
            selection.visible_chunks,
            selection.culled_chunks,
            selection.capped_chunks
        );

        for id in self.scheduler.newly_hidden() {
            if let Some(handle) = self.handles.get(id) {
                self.backend.set_visible(handle, false);
            }
        }

        for &id in self.scheduler.newly_shown() {
            if let Some(handle) = self.handles.get(&id) {
                self.backend.set_visible(handle, true);
            } else if !self.uploads.iter().any(|u| u.chunk_id() == id) {
                if let Some(chunk) = scene.chunks.chunk(id) {
                    self.uploads.push_back(BufferUpload::new(chunk, self.config.upload_batch_size));
                }
            }
        }

        let mut allowance = self.config.upload_batches_per_frame.max(1);
        while allowance > 0 {
            let Some(upload) = self.uploads.front_mut() else {
                break;
            };
            let id = upload.chunk_id();
            let Some(chunk) = scene.chunks.chunk(id) else {
                self.uploads.pop_front();
                continue;
            };

            allowance -= 1;
            if !upload.step(chunk) {
                continue;
            }

            if let Some(done) = self.uploads.pop_front() {
                let handle = self.backend.upload(id, done.into_buffers())?;
                self.backend.set_visible(&handle, self.scheduler.is_visible(id));
                self.handles.insert(id, handle);
            }
        }

        Ok(())
    }
}

impl<B: RenderBackend> Drop for Viewer<B> {
    fn drop(&mut self) {
        self.unload();
    }
}
