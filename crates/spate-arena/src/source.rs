//! Block sources: the arena that backs every stream's blocks.
//!
//! A [`BlockSource`] hands out fixed-size, zeroed byte buffers and takes
//! them back when a stream is disposed. [`HeapBlockSource`] is the stock
//! implementation: heap allocation with an optional live-block budget
//! and a bounded recycle list so steady-state ticks stop hitting the
//! global allocator.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::config::StreamConfig;
use crate::error::ArenaError;

/// Supplier of fixed-size block buffers.
///
/// Shared by every stream created against it, across threads: writers
/// on different lanes acquire blocks concurrently.
pub trait BlockSource: Send + Sync {
    /// Size in bytes of every buffer this source hands out.
    fn block_size(&self) -> usize;

    /// Acquire one zeroed buffer of [`block_size`](Self::block_size) bytes.
    ///
    /// Exhaustion is fatal for the calling write and is never retried.
    fn acquire(&self) -> Result<Box<[u8]>, ArenaError>;

    /// Return a buffer previously obtained from [`acquire`](Self::acquire).
    fn release(&self, block: Box<[u8]>);

    /// Number of buffers acquired and not yet released.
    fn live_blocks(&self) -> usize;
}

/// Shared handle to a block source.
pub type SharedBlockSource = Arc<dyn BlockSource>;

/// Heap-backed [`BlockSource`] with an optional budget and recycling.
pub struct HeapBlockSource {
    block_size: usize,
    max_blocks: Option<usize>,
    live: AtomicUsize,
    /// Total `acquire` calls that succeeded, recycled or fresh.
    acquired: AtomicU64,
    /// Total `acquire` calls served from the recycle list.
    recycled: AtomicU64,
    recycle_tx: Sender<Box<[u8]>>,
    recycle_rx: Receiver<Box<[u8]>>,
}

// Compile-time assertion: HeapBlockSource must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<HeapBlockSource>();
};

impl HeapBlockSource {
    /// Create a source for `config`'s block size and budget, keeping up
    /// to `recycle_capacity` released blocks for reuse.
    pub fn new(config: &StreamConfig, recycle_capacity: usize) -> Result<Self, ArenaError> {
        config.validate()?;
        let (recycle_tx, recycle_rx) = crossbeam_channel::bounded(recycle_capacity);
        Ok(Self {
            block_size: config.block_size as usize,
            max_blocks: config.max_blocks,
            live: AtomicUsize::new(0),
            acquired: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
            recycle_tx,
            recycle_rx,
        })
    }

    /// Create a source wrapped in an `Arc`, ready to share between streams.
    pub fn shared(config: &StreamConfig, recycle_capacity: usize) -> Result<SharedBlockSource, ArenaError> {
        Ok(Arc::new(Self::new(config, recycle_capacity)?))
    }

    /// Total successful acquisitions since creation.
    pub fn acquired_total(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Acquisitions served from the recycle list since creation.
    pub fn recycled_total(&self) -> u64 {
        self.recycled.load(Ordering::Relaxed)
    }

    /// Released blocks currently waiting for reuse.
    pub fn pooled_blocks(&self) -> usize {
        self.recycle_rx.len()
    }

    fn reserve(&self) -> Result<(), ArenaError> {
        let Some(max_blocks) = self.max_blocks else {
            self.live.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        };
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max_blocks).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|live_blocks| ArenaError::Exhausted {
                live_blocks,
                max_blocks,
            })
    }
}

impl BlockSource for HeapBlockSource {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn acquire(&self) -> Result<Box<[u8]>, ArenaError> {
        self.reserve()?;
        self.acquired.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut block) = self.recycle_rx.try_recv() {
            self.recycled.fetch_add(1, Ordering::Relaxed);
            block.fill(0);
            return Ok(block);
        }
        Ok(vec![0u8; self.block_size].into_boxed_slice())
    }

    fn release(&self, block: Box<[u8]>) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        if block.len() == self.block_size {
            // Recycle list full: let the buffer go back to the allocator.
            let _ = self.recycle_tx.try_send(block);
        }
    }

    fn live_blocks(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StreamConfig {
        StreamConfig::new(2).with_block_size(256)
    }

    #[test]
    fn acquire_returns_zeroed_block_of_configured_size() {
        let source = HeapBlockSource::new(&config(), 0).unwrap();
        let block = source.acquire().unwrap();
        assert_eq!(block.len(), 256);
        assert!(block.iter().all(|&b| b == 0));
        assert_eq!(source.live_blocks(), 1);
    }

    #[test]
    fn release_decrements_live_count() {
        let source = HeapBlockSource::new(&config(), 0).unwrap();
        let a = source.acquire().unwrap();
        let b = source.acquire().unwrap();
        assert_eq!(source.live_blocks(), 2);
        source.release(a);
        source.release(b);
        assert_eq!(source.live_blocks(), 0);
    }

    #[test]
    fn budget_exhaustion_is_an_error() {
        let source = HeapBlockSource::new(&config().with_max_blocks(2), 0).unwrap();
        let _a = source.acquire().unwrap();
        let _b = source.acquire().unwrap();
        assert_eq!(
            source.acquire(),
            Err(ArenaError::Exhausted {
                live_blocks: 2,
                max_blocks: 2,
            })
        );
    }

    #[test]
    fn released_blocks_are_recycled_and_rezeroed() {
        let source = HeapBlockSource::new(&config(), 4).unwrap();
        let mut block = source.acquire().unwrap();
        block[10] = 0xAB;
        source.release(block);
        assert_eq!(source.pooled_blocks(), 1);

        let block = source.acquire().unwrap();
        assert_eq!(block[10], 0);
        assert_eq!(source.recycled_total(), 1);
        assert_eq!(source.acquired_total(), 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = StreamConfig::new(1).with_block_size(100);
        assert!(HeapBlockSource::new(&bad, 0).is_err());
    }
}
