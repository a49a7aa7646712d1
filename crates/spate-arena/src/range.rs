//! Per-lane range metadata shared by the writer and reader views.

use spate_core::LaneId;

use crate::block::{BlockId, LaneChain};

/// Everything one lane knows about its data.
///
/// The persistent part (head, first offset, counts, last used size) is
/// what readers seed from. The write cursor (`current`, `cursor`,
/// `block_end`) is only meaningful while a writer holds the lane, but it
/// survives between write sessions so a reopened writer keeps appending.
pub(crate) struct LaneRange {
    pub(crate) chain: LaneChain,
    /// Byte offset of the first element within the head block.
    pub(crate) first_offset: usize,
    /// Elements written to this lane since stream creation.
    pub(crate) element_count: usize,
    /// Blocks linked into this lane.
    pub(crate) block_count: usize,
    /// One past the last byte written in the last block.
    pub(crate) last_offset: usize,
    /// Block the writer is filling.
    pub(crate) current: Option<BlockId>,
    /// Next free byte in `current`.
    pub(crate) cursor: usize,
    /// Exclusive end of usable bytes in `current`.
    pub(crate) block_end: usize,
}

impl LaneRange {
    pub(crate) fn new(lane: LaneId) -> Self {
        Self {
            chain: LaneChain::new(lane),
            first_offset: 0,
            element_count: 0,
            block_count: 0,
            last_offset: 0,
            current: None,
            cursor: 0,
            block_end: 0,
        }
    }

    pub(crate) fn head(&self) -> Option<BlockId> {
        self.chain.head()
    }
}
