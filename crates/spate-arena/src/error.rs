//! Arena and stream error types.

use std::error::Error;
use std::fmt;

use spate_core::LaneId;

/// Errors from block allocation and stream writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// A single write is larger than one block's payload capacity.
    ///
    /// Unrecoverable for that call: split the payload or raise
    /// `block_size`.
    CapacityExceeded {
        /// Number of bytes requested.
        requested: usize,
        /// Payload capacity of one block.
        capacity: usize,
    },
    /// The block source's budget is spent. Never retried.
    Exhausted {
        /// Blocks currently live.
        live_blocks: usize,
        /// Configured budget.
        max_blocks: usize,
    },
    /// Lane index is not below the stream's lane count.
    LaneOutOfRange {
        /// Requested lane.
        lane: LaneId,
        /// Lanes in the stream.
        lane_count: u16,
    },
    /// A block id that does not belong to the lane chain it was used with.
    UnknownBlock {
        /// Lane whose chain was addressed.
        lane: LaneId,
        /// Raw block index.
        block: u32,
    },
    /// Structurally invalid configuration.
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded {
                requested,
                capacity,
            } => {
                write!(
                    f,
                    "block capacity exceeded: requested {requested} bytes, capacity {capacity} bytes"
                )
            }
            Self::Exhausted {
                live_blocks,
                max_blocks,
            } => {
                write!(
                    f,
                    "block source exhausted: {live_blocks} live of {max_blocks} allowed"
                )
            }
            Self::LaneOutOfRange { lane, lane_count } => {
                write!(f, "lane {lane} out of range (stream has {lane_count} lanes)")
            }
            Self::UnknownBlock { lane, block } => {
                write!(f, "block {block} is not part of lane {lane}'s chain")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid stream config: {reason}"),
        }
    }
}

impl Error for ArenaError {}

/// Errors from reading a stream.
///
/// Variants marked *validated* are only produced with the `checks`
/// feature; without it the reader trusts the caller's item accounting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamError {
    /// Lane index is not below the stream's lane count.
    LaneOutOfRange {
        /// Requested lane.
        lane: LaneId,
        /// Lanes in the stream.
        lane_count: u16,
    },
    /// A read was attempted without a preceding `begin_lane`.
    NoLaneActive,
    /// Every element of the lane has already been read (*validated*).
    NoItemsRemaining {
        /// Lane being read.
        lane: LaneId,
    },
    /// The read would run past the last written byte of the lane.
    ReadPastEnd {
        /// Lane being read.
        lane: LaneId,
        /// Bytes requested.
        requested: usize,
    },
    /// A peek would cross into a block that does not exist.
    PeekPastEnd {
        /// Lane being read.
        lane: LaneId,
        /// Bytes requested.
        requested: usize,
    },
    /// `end_lane` called with elements still unread (*validated*).
    LaneNotDrained {
        /// Lane being read.
        lane: LaneId,
        /// Elements left.
        remaining: usize,
    },
    /// `end_lane` called with the cursor short of the written data
    /// (*validated*). Signals reads whose sizes differ from the writes.
    LaneDataRemaining {
        /// Lane being read.
        lane: LaneId,
        /// Bytes between the cursor and the end of written data.
        unread_bytes: usize,
    },
    /// Read size is larger than one block's payload capacity.
    CapacityExceeded {
        /// Bytes requested.
        requested: usize,
        /// Payload capacity of one block.
        capacity: usize,
    },
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LaneOutOfRange { lane, lane_count } => {
                write!(f, "lane {lane} out of range (stream has {lane_count} lanes)")
            }
            Self::NoLaneActive => write!(f, "no lane active: call begin_lane first"),
            Self::NoItemsRemaining { lane } => {
                write!(f, "lane {lane}: no items left to read")
            }
            Self::ReadPastEnd { lane, requested } => {
                write!(f, "lane {lane}: reading {requested} bytes runs past written data")
            }
            Self::PeekPastEnd { lane, requested } => {
                write!(f, "lane {lane}: peeking {requested} bytes runs past written data")
            }
            Self::LaneNotDrained { lane, remaining } => {
                write!(f, "lane {lane} not drained: {remaining} items unread")
            }
            Self::LaneDataRemaining { lane, unread_bytes } => {
                write!(f, "lane {lane} not drained: {unread_bytes} bytes unread")
            }
            Self::CapacityExceeded {
                requested,
                capacity,
            } => {
                write!(
                    f,
                    "read of {requested} bytes exceeds block capacity of {capacity} bytes"
                )
            }
        }
    }
}

impl Error for StreamError {}
