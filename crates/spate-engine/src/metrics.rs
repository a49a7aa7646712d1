//! Per-rotation metrics.
//!
//! [`RotationMetrics`] captures what one rotation moved and how long it
//! took, for one container or summed over the whole registry.

/// Counters and timings collected during a single rotation.
///
/// Durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RotationMetrics {
    /// Streams moved from producers into the new read-set.
    pub streams_published: usize,
    /// Events across the published streams.
    pub events_published: usize,
    /// Blocks held by the published streams.
    pub blocks_published: usize,
    /// Streams of the previous read-set handed to deferred disposal.
    pub streams_disposed: usize,
    /// Consumers whose completion gated the disposal.
    pub consumers_awaited: usize,
    /// Protocol violations recorded.
    pub violations: usize,
    /// Time spent waiting for producers to complete.
    pub join_us: u64,
    /// Wall-clock time for the whole rotation.
    pub total_us: u64,
}

impl RotationMetrics {
    /// Add another rotation's counters and timings into this one.
    pub fn accumulate(&mut self, other: &RotationMetrics) {
        self.streams_published += other.streams_published;
        self.events_published += other.events_published;
        self.blocks_published += other.blocks_published;
        self.streams_disposed += other.streams_disposed;
        self.consumers_awaited += other.consumers_awaited;
        self.violations += other.violations;
        self.join_us += other.join_us;
        self.total_us += other.total_us;
    }
}
