//! Load pipeline
//!
//! A load runs in three stages: content-hash cache lookup, decode on the
//! [`DecodeService`], then partitioning as a pool task. [`Loader::poll`]
//! advances the current load without blocking. Starting a new load drops
//! the previous one; its result is discarded when it arrives.

use std::sync::Arc;
use std::time::Duration;

use stipple_core::{ByteStore, ContentCache, ContentHash, PointCloudDataset, StageSpan, StageTimings, TaskHandle, TaskPool};
use stipple_lod::ChunkSet;
use stipple_pcd::{DecodeEvent, DecodeOptions, DecodeService, DecodeTicket};

use crate::ViewerResult;
use crate::config::PartitionConfig;

const DATASET_KIND: &str = "dataset";
const CHUNKS_KIND: &str = "chunks";

/// Share of the progress range spent decoding
const DECODE_SHARE: f32 = 0.8;

/// Cache shared between loads
pub type SharedCache = ContentCache<Arc<dyn ByteStore>>;

/// A finished load
#[derive(Debug)]
pub struct LoadedScene {
    pub generation: u64,
    pub hash: ContentHash,
    pub chunks: ChunkSet,
    pub from_cache: bool,
    /// Time spent in each stage that ran
    pub timings: StageTimings,
}

enum Stage {
    Ready(LoadedScene),
    Decoding(DecodeTicket, StageSpan),
    Partitioning(TaskHandle<ChunkSet>, StageSpan),
}

struct PendingLoad {
    generation: u64,
    source: ContentHash,
    key: ContentHash,
    timings: StageTimings,
    stage: Stage,
}

/// Drives loads from raw bytes to chunk sets
pub struct Loader {
    pool: Arc<TaskPool>,
    decoder: DecodeService,
    cache: Option<Arc<SharedCache>>,
    partition: PartitionConfig,
    generation: u64,
    pending: Option<PendingLoad>,
}

impl Loader {
    /// Create a loader on a task pool
    pub fn new(
        pool: Arc<TaskPool>,
        decode: DecodeOptions,
        partition: PartitionConfig,
        cache: Option<Arc<SharedCache>>,
    ) -> Self {
        Self {
            decoder: DecodeService::new(Arc::clone(&pool), decode),
            pool,
            cache,
            partition,
            generation: 0,
            pending: None,
        }
    }

    /// Generation of the most recent load request
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Check if a load is in flight
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Abandon the current load
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            log::info!("Abandoned load {}", pending.generation);
        }
    }

    /// Start loading a file, superseding any load in flight
    pub fn load(&mut self, bytes: Vec<u8>) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        if let Some(previous) = self.pending.take() {
            log::info!("Load {} superseded by {}", previous.generation, generation);
        }

        let lookup = StageSpan::start("cache");
        let source = ContentHash::from_content(&bytes);
        let key = source.with_salt(&self.partition.cache_salt());
        let chunks = self.cached::<ChunkSet>(CHUNKS_KIND, key);
        let dataset = match chunks {
            Some(_) => None,
            None => self.cached::<PointCloudDataset>(DATASET_KIND, source),
        };
        let mut timings = StageTimings::default();
        timings.record(lookup.stage(), lookup.finish());

        let stage = if let Some(chunks) = chunks {
            Stage::Ready(LoadedScene {
                generation,
                hash: source,
                chunks,
                from_cache: true,
                timings: timings.clone(),
            })
        } else if let Some(dataset) = dataset {
            self.spawn_partition(dataset)
        } else {
            log::info!("Decoding {} bytes (load {})", bytes.len(), generation);
            Stage::Decoding(self.decoder.submit(bytes), StageSpan::start("decode"))
        };

        self.pending = Some(PendingLoad {
            generation,
            source,
            key,
            timings,
            stage,
        });
        generation
    }

    /// Advance the current load; returns the scene once it is ready.
    ///
    /// A failed load is reported once and then forgotten.
    pub fn poll(&mut self, progress: &mut dyn FnMut(f32, &str)) -> ViewerResult<Option<LoadedScene>> {
        let Some(mut pending) = self.pending.take() else {
            return Ok(None);
        };

        loop {
            pending.stage = match pending.stage {
                Stage::Ready(scene) => {
                    progress(100.0, "Ready");
                    return Ok(Some(scene));
                }
                Stage::Decoding(mut ticket, span) => match ticket.try_event()? {
                    Some(DecodeEvent::Progress { percentage, message }) => {
                        progress(percentage * DECODE_SHARE, &message);
                        Stage::Decoding(ticket, span)
                    }
                    Some(DecodeEvent::Finished(result)) => {
                        pending.timings.record(span.stage(), span.finish());
                        let dataset = result?;
                        self.store(DATASET_KIND, pending.source, &dataset);
                        progress(DECODE_SHARE * 100.0, "Partitioning");
                        self.spawn_partition(dataset)
                    }
                    None => {
                        pending.stage = Stage::Decoding(ticket, span);
                        self.pending = Some(pending);
                        return Ok(None);
                    }
                },
                Stage::Partitioning(handle, span) => match handle.try_take()? {
                    Some(chunks) => {
                        pending.timings.record(span.stage(), span.finish());
                        self.store(CHUNKS_KIND, pending.key, &chunks);
                        Stage::Ready(LoadedScene {
                            generation: pending.generation,
                            hash: pending.source,
                            chunks,
                            from_cache: false,
                            timings: pending.timings.clone(),
                        })
                    }
                    None => {
                        pending.stage = Stage::Partitioning(handle, span);
                        self.pending = Some(pending);
                        return Ok(None);
                    }
                },
            };
        }
    }

    /// Block until the current load finishes
    pub fn wait(&mut self, progress: &mut dyn FnMut(f32, &str)) -> ViewerResult<Option<LoadedScene>> {
        while self.is_loading() {
            if let Some(scene) = self.poll(progress)? {
                return Ok(Some(scene));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(None)
    }

    fn spawn_partition(&self, dataset: PointCloudDataset) -> Stage {
        let partition = self.partition.clone();
        Stage::Partitioning(
            self.pool.spawn("partition", move || partition.partition(&dataset)),
            StageSpan::start("partition"),
        )
    }

    fn cached<T: serde::de::DeserializeOwned>(&self, kind: &str, hash: ContentHash) -> Option<T> {
        self.cache.as_ref().and_then(|cache| cache.load(kind, hash))
    }

    fn store<T: serde::Serialize>(&self, kind: &str, hash: ContentHash, value: &T) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache.save(kind, hash, value) {
            log::warn!("Failed to cache {}-{}: {}", kind, hash, err);
        }
    }
}
