//! Engine configuration and validation.
//!
//! [`EngineConfig`] bundles the stream layout with the worker pool size,
//! the rotation timeout, and the block recycle budget.
//! [`validate()`](EngineConfig::validate) checks them together at
//! registry construction.

use std::time::Duration;

use spate_arena::StreamConfig;

use crate::error::ConfigError;

/// Configuration for an [`EventRegistry`](crate::EventRegistry) and its
/// worker pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Layout of every stream the registry creates.
    pub stream: StreamConfig,
    /// Worker threads for [`WorkerPool`](crate::WorkerPool). `None` = one
    /// worker per lane. Must not exceed `stream.lane_count`.
    pub worker_count: Option<usize>,
    /// Upper bound on how long rotation waits for producers. `None` =
    /// wait indefinitely (an unreported producer then stalls the tick).
    pub rotation_timeout: Option<Duration>,
    /// Released blocks kept for reuse by the block source. Default: 256.
    pub recycle_blocks: usize,
}

impl EngineConfig {
    /// Default recycle budget.
    pub const DEFAULT_RECYCLE_BLOCKS: usize = 256;

    /// Config with `lane_count` lanes and defaults elsewhere.
    pub fn new(lane_count: u16) -> Self {
        Self {
            stream: StreamConfig::new(lane_count),
            worker_count: None,
            rotation_timeout: None,
            recycle_blocks: Self::DEFAULT_RECYCLE_BLOCKS,
        }
    }

    /// Replace the stream layout.
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    /// Set the rotation timeout.
    pub fn with_rotation_timeout(mut self, timeout: Duration) -> Self {
        self.rotation_timeout = Some(timeout);
        self
    }

    /// Resolve the worker count, defaulting to one per lane.
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or(self.stream.lane_count as usize)
    }

    /// Check the config for structural errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.validate()?;
        let workers = self.resolved_worker_count();
        if workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if workers > self.stream.lane_count as usize {
            return Err(ConfigError::WorkersExceedLanes {
                workers,
                lanes: self.stream.lane_count,
            });
        }
        if self.rotation_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            worker_count: None,
            rotation_timeout: None,
            recycle_blocks: Self::DEFAULT_RECYCLE_BLOCKS,
        }
    }
}
