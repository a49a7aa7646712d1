//! Fixed-capacity blocks and per-lane block chains.
//!
//! A [`Block`] is one buffer from a [`BlockSource`] plus a link to the
//! next block of the same lane. Links are [`BlockId`] indices into the
//! owning [`LaneChain`], never pointers: the chain keeps its blocks in a
//! `Vec` in allocation order and the links define read order.

use std::fmt;

use spate_core::LaneId;
use tracing::trace;

use crate::error::ArenaError;
use crate::source::BlockSource;

/// Index of a block within its lane chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// Position in the chain's allocation order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block#{}", self.0)
    }
}

/// A fixed-capacity buffer linked to its successor in the lane.
pub struct Block {
    data: Box<[u8]>,
    next: Option<BlockId>,
}

impl Block {
    /// The following block in chain order, if one has been linked.
    pub fn next(&self) -> Option<BlockId> {
        self.next
    }

    /// Full block contents, header reserve included.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// The chain of blocks owned by one lane of one stream.
///
/// Exclusively owned by its stream; blocks go back to the source only
/// when the stream is disposed.
pub struct LaneChain {
    lane: LaneId,
    blocks: Vec<Block>,
    head: Option<BlockId>,
}

impl LaneChain {
    /// Create an empty chain for `lane`.
    pub fn new(lane: LaneId) -> Self {
        Self {
            lane,
            blocks: Vec::new(),
            head: None,
        }
    }

    /// Allocate a block from `source` and link it into the chain.
    ///
    /// With no predecessor the new block becomes the chain head (and the
    /// old head, if any, follows it). Otherwise it is linked directly
    /// after `predecessor`. Source exhaustion propagates unchanged.
    pub fn allocate(
        &mut self,
        source: &dyn BlockSource,
        predecessor: Option<BlockId>,
    ) -> Result<BlockId, ArenaError> {
        if let Some(pred) = predecessor {
            if pred.index() >= self.blocks.len() {
                return Err(ArenaError::UnknownBlock {
                    lane: self.lane,
                    block: pred.0,
                });
            }
        }

        let data = source.acquire()?;
        let id = BlockId(self.blocks.len() as u32);
        let next = match predecessor {
            None => self.head.replace(id),
            Some(pred) => self.blocks[pred.index()].next.replace(id),
        };
        self.blocks.push(Block { data, next });

        trace!(lane = %self.lane, block = id.0, "linked new block");
        Ok(id)
    }

    /// First block in read order.
    pub fn head(&self) -> Option<BlockId> {
        self.head
    }

    /// Look up a block by id.
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    /// Mutable block contents.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this chain.
    pub(crate) fn block_data_mut(&mut self, id: BlockId) -> &mut [u8] {
        self.blocks[id.index()].data_mut()
    }

    /// Number of blocks in the chain.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no block has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in chain (read) order, following links from the head.
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter {
            chain: self,
            next: self.head,
        }
    }

    /// Bytes of block memory held by the chain.
    pub fn memory_bytes(&self) -> usize {
        self.blocks.iter().map(|b| b.data.len()).sum()
    }

    /// Hand every block back to `source`, leaving the chain empty.
    pub(crate) fn release_all(&mut self, source: &dyn BlockSource) {
        for block in self.blocks.drain(..) {
            source.release(block.data);
        }
        self.head = None;
    }
}

/// Iterator over a [`LaneChain`] in link order.
pub struct ChainIter<'a> {
    chain: &'a LaneChain,
    next: Option<BlockId>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = (BlockId, &'a Block);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let block = self.chain.get(id)?;
        self.next = block.next;
        Some((id, block))
    }
}
