//! Chunk visibility scheduling
//!
//! Once per frame the scheduler walks the LOD tiers coarsest first and
//! decides which chunks to draw under the view frustum, a soft point budget
//! and a hard per-frame point cap. The scheduler is a long-lived context:
//! create it once, call [`ChunkScheduler::reset`] when the chunk set is
//! replaced. Buffers are reused between frames.

use glam::Mat4;
use serde::{Deserialize, Serialize};
use stipple_core::Frustum;

use crate::chunk::{ChunkId, ChunkSet};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Once this many points are committed, finer tiers are skipped
    pub point_budget: usize,
    /// Visible points never exceed this
    pub max_points_per_frame: usize,
    /// Hide chunks outside the view frustum
    pub frustum_culling: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            point_budget: 2_000_000,
            max_points_per_frame: 5_000_000,
            frustum_culling: true,
        }
    }
}

/// Outcome of one visibility pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityStats {
    pub visible_chunks: usize,
    pub rendered_points: usize,
    /// Chunks outside the frustum
    pub culled_chunks: usize,
    /// Chunks skipped because they would exceed the per-frame cap
    pub capped_chunks: usize,
    /// Finest tier that was visited, if any
    pub finest_tier: Option<usize>,
    pub budget_reached: bool,
}

/// Per-frame chunk selection
pub struct ChunkScheduler {
    config: SchedulerConfig,
    visible: Vec<bool>,
    previous: Vec<bool>,
    shown: Vec<ChunkId>,
    hidden: Vec<ChunkId>,
    stats: VisibilityStats,
}

impl ChunkScheduler {
    /// Create a scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            visible: Vec::new(),
            previous: Vec::new(),
            shown: Vec::new(),
            hidden: Vec::new(),
            stats: VisibilityStats::default(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Replace the configuration; takes effect next frame
    pub fn set_config(&mut self, config: SchedulerConfig) {
        self.config = config;
    }

    /// Forget all per-set state, for use when the chunk set is replaced
    pub fn reset(&mut self) {
        self.visible.clear();
        self.previous.clear();
        self.shown.clear();
        self.hidden.clear();
        self.stats = VisibilityStats::default();
    }

    /// Select the visible chunks for this frame
    pub fn update_visibility(&mut self, set: &ChunkSet, view_projection: Mat4) -> VisibilityStats {
        std::mem::swap(&mut self.visible, &mut self.previous);
        if self.previous.len() != set.len() {
            // Different set without a reset: nothing to diff against
            self.previous.clear();
        }
        self.visible.clear();
        self.visible.resize(set.len(), false);
        self.shown.clear();
        self.hidden.clear();

        let frustum = Frustum::from_matrix(view_projection);
        self.stats = if set.is_empty() || frustum.is_degenerate() {
            VisibilityStats::default()
        } else {
            self.select(set, &frustum)
        };

        for (index, chunk) in set.chunks().iter().enumerate() {
            let was = self.previous.get(index).copied().unwrap_or(false);
            match (was, self.visible[index]) {
                (false, true) => self.shown.push(chunk.id()),
                (true, false) => self.hidden.push(chunk.id()),
                _ => {}
            }
        }

        self.stats
    }

    fn select(&mut self, set: &ChunkSet, frustum: &Frustum) -> VisibilityStats {
        let mut stats = VisibilityStats::default();
        let mut total = 0usize;

        for lod in (0..set.tier_count()).rev() {
            stats.finest_tier = Some(lod);

            for &index in set.tier_indices(lod) {
                let chunk = &set.chunks()[index];
                if self.config.frustum_culling && !frustum.intersects_bounds(chunk.bounds()) {
                    stats.culled_chunks += 1;
                    continue;
                }
                if total + chunk.point_count() > self.config.max_points_per_frame {
                    stats.capped_chunks += 1;
                    continue;
                }
                self.visible[index] = true;
                total += chunk.point_count();
                stats.visible_chunks += 1;
            }

            if total >= self.config.point_budget {
                stats.budget_reached = true;
                break;
            }
        }

        stats.rendered_points = total;
        stats
    }

    /// Check if a chunk was selected this frame
    pub fn is_visible(&self, id: ChunkId) -> bool {
        self.visible.get(id.0 as usize).copied().unwrap_or(false)
    }

    /// Visibility flag per chunk, in chunk-set order
    pub fn visibility(&self) -> &[bool] {
        &self.visible
    }

    /// Chunks that became visible this frame
    pub fn newly_shown(&self) -> &[ChunkId] {
        &self.shown
    }

    /// Chunks that stopped being visible this frame
    pub fn newly_hidden(&self) -> &[ChunkId] {
        &self.hidden
    }

    /// Get the last frame's stats
    pub fn stats(&self) -> VisibilityStats {
        self.stats
    }
}

impl Default for ChunkScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
