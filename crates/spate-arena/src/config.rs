//! Stream configuration parameters.

use crate::error::ArenaError;

/// Configuration for event streams and their block allocation.
///
/// Controls block sizing, the per-block header reserve, the number of
/// lanes, and an optional block budget. Validated with
/// [`StreamConfig::validate`]; all values are immutable once a stream
/// has been created from them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Size of each block in bytes, header included.
    ///
    /// Default: 4096. Must be a power of two and at least 64.
    pub block_size: u32,

    /// Bytes reserved at the start of every block.
    ///
    /// Default: 8, the width of the link slot in a pointer-chained block.
    /// Payload starts after the reserve, so the largest single record is
    /// `block_size - header_reserve` bytes.
    pub header_reserve: u32,

    /// Number of lanes per stream.
    ///
    /// Default: available parallelism, clamped to `[1, 128]`. Writers on
    /// worker `n` append to lane `n`.
    pub lane_count: u16,

    /// Maximum number of live blocks across every stream drawing from
    /// the same block source. `None` = unbounded.
    pub max_blocks: Option<usize>,
}

impl StreamConfig {
    /// Default block size: 4 KiB.
    pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

    /// Default header reserve.
    pub const DEFAULT_HEADER_RESERVE: u32 = 8;

    /// Smallest accepted block size.
    pub const MIN_BLOCK_SIZE: u32 = 64;

    /// Upper clamp for the auto-detected lane count.
    pub const MAX_AUTO_LANES: u16 = 128;

    /// Create a config with the given lane count and default block sizing.
    pub fn new(lane_count: u16) -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            header_reserve: Self::DEFAULT_HEADER_RESERVE,
            lane_count,
            max_blocks: None,
        }
    }

    /// Set the block size in bytes.
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the block budget.
    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = Some(max_blocks);
        self
    }

    /// Largest payload a single write may request, in bytes.
    pub fn payload_capacity(&self) -> usize {
        self.block_size.saturating_sub(self.header_reserve) as usize
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if !self.block_size.is_power_of_two() || self.block_size < Self::MIN_BLOCK_SIZE {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "block_size must be a power of two and >= {} (got {})",
                    Self::MIN_BLOCK_SIZE,
                    self.block_size,
                ),
            });
        }
        if self.header_reserve >= self.block_size {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "header_reserve ({}) leaves no payload in a {}-byte block",
                    self.header_reserve, self.block_size,
                ),
            });
        }
        if self.lane_count == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "lane_count must be >= 1".into(),
            });
        }
        if self.max_blocks == Some(0) {
            return Err(ArenaError::InvalidConfig {
                reason: "max_blocks must be >= 1 when set".into(),
            });
        }
        Ok(())
    }

    fn auto_lane_count() -> u16 {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        n.clamp(1, Self::MAX_AUTO_LANES as usize) as u16
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(Self::auto_lane_count())
    }
}
