//! Timers
//!
//! Spans over load pipeline stages and a sliding window of frame times.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Running span over one pipeline stage.
///
/// Emits a `timing` trace event once, either from [`StageSpan::finish`] or
/// when dropped unfinished.
#[derive(Debug)]
pub struct StageSpan {
    stage: &'static str,
    start: Instant,
    finished: bool,
}

impl StageSpan {
    /// Start timing a stage
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            start: Instant::now(),
            finished: false,
        }
    }

    /// Stage name
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// End the span and return its length
    pub fn finish(mut self) -> Duration {
        let elapsed = self.start.elapsed();
        self.emit(elapsed);
        self.finished = true;
        elapsed
    }

    fn emit(&self, elapsed: Duration) {
        tracing::debug!(
            target: "timing",
            stage = self.stage,
            duration_us = elapsed.as_micros() as u64,
            "Stage completed"
        );
    }
}

impl Drop for StageSpan {
    fn drop(&mut self) {
        if !self.finished {
            self.emit(self.start.elapsed());
        }
    }
}

/// Milliseconds spent per stage of one load, in the order the stages ran
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    stages: Vec<(String, f64)>,
}

impl StageTimings {
    /// Add time to a stage; repeated stages accumulate
    pub fn record(&mut self, stage: &str, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        match self.stages.iter_mut().find(|(name, _)| name == stage) {
            Some((_, total)) => *total += ms,
            None => self.stages.push((stage.to_string(), ms)),
        }
    }

    /// Time spent in a stage
    pub fn get(&self, stage: &str) -> Option<f64> {
        self.stages.iter().find(|(name, _)| name == stage).map(|(_, ms)| *ms)
    }

    /// Stages in order with their times
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.stages.iter().map(|(name, ms)| (name.as_str(), *ms))
    }

    /// Sum over all stages
    pub fn total_ms(&self) -> f64 {
        self.stages.iter().map(|(_, ms)| ms).sum()
    }
}

/// Frame times over the most recent frames
#[derive(Debug, Clone)]
pub struct FrameWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl FrameWindow {
    /// Keep the last `capacity` frames
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a frame, evicting the oldest once full
    pub fn push(&mut self, elapsed: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    /// Mean frame time in the window, 0 when empty
    pub fn average_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Slowest frame in the window, 0 when empty
    pub fn peak_ms(&self) -> f64 {
        self.samples.iter().copied().fold(0.0, f64::max)
    }

    /// Forget all frames
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for FrameWindow {
    fn default() -> Self {
        Self::new(60)
    }
}
