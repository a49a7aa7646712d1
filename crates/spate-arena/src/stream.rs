//! The lane-segmented, append-only event stream.

use std::fmt;

use bytemuck::Pod;
use spate_core::LaneId;

use crate::block::LaneChain;
use crate::config::StreamConfig;
use crate::error::{ArenaError, StreamError};
use crate::range::LaneRange;
use crate::read::StreamReader;
use crate::source::SharedBlockSource;
use crate::write::StreamWriter;

/// One producer's events for one tick, split into per-lane block chains.
///
/// Append-only while a [`StreamWriter`] is borrowed from it; read-only
/// once shared (the engine publishes streams behind `Arc`). Dropping the
/// stream returns every block to its source.
pub struct EventStream {
    config: StreamConfig,
    source: SharedBlockSource,
    lanes: Box<[LaneRange]>,
}

// Compile-time assertion: published streams are shared across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<EventStream>();
};

impl EventStream {
    /// Create an empty stream with `config.lane_count` lanes.
    ///
    /// Fails if the config is invalid or the source's block size does
    /// not match `config.block_size`.
    pub fn new(config: &StreamConfig, source: SharedBlockSource) -> Result<Self, ArenaError> {
        config.validate()?;
        if source.block_size() != config.block_size as usize {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "block source hands out {}-byte blocks, config expects {}",
                    source.block_size(),
                    config.block_size,
                ),
            });
        }
        let lanes = (0..config.lane_count)
            .map(|i| LaneRange::new(LaneId(i)))
            .collect();
        Ok(Self {
            config: config.clone(),
            source,
            lanes,
        })
    }

    /// The config this stream was created with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Number of lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Total elements across all lanes. O(lane count).
    pub fn count(&self) -> usize {
        self.lanes.iter().map(|r| r.element_count).sum()
    }

    /// Elements in one lane, or `None` if the lane is out of range.
    pub fn lane_len(&self, lane: LaneId) -> Option<usize> {
        self.lanes.get(lane.index()).map(|r| r.element_count)
    }

    /// Whether no lane holds any element.
    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(|r| r.element_count == 0)
    }

    /// Blocks held across all lanes.
    pub fn block_count(&self) -> usize {
        self.lanes.iter().map(|r| r.block_count).sum()
    }

    /// Bytes of block memory held across all lanes.
    pub fn memory_bytes(&self) -> usize {
        self.lanes.iter().map(|r| r.chain.memory_bytes()).sum()
    }

    /// The block chain of one lane.
    pub fn lane_chain(&self, lane: LaneId) -> Option<&LaneChain> {
        self.lanes.get(lane.index()).map(|r| &r.chain)
    }

    /// Borrow the stream for appending.
    pub fn writer(&mut self) -> StreamWriter<'_> {
        StreamWriter::new(&mut self.lanes, &*self.source, &self.config)
    }

    /// A sequential reader positioned before any lane.
    pub fn reader(&self) -> StreamReader<'_> {
        StreamReader::new(self)
    }

    /// Copy every element into a `Vec`, lane 0 first, then lane 1, and so on.
    ///
    /// Every element must be a `T`; a size mismatch surfaces as a read
    /// or drained-lane error.
    pub fn to_vec<T: Pod>(&self) -> Result<Vec<T>, StreamError> {
        let mut out = Vec::with_capacity(self.count());
        let mut reader = self.reader();
        for lane in 0..self.lanes.len() {
            let n = reader.begin_lane(LaneId(lane as u16))?;
            for _ in 0..n {
                out.push(reader.read::<T>()?);
            }
            reader.end_lane()?;
        }
        Ok(out)
    }

    /// Dispose of the stream now, returning its blocks to the source.
    pub fn dispose(self) {
        drop(self);
    }

    pub(crate) fn lane_range(&self, lane: LaneId) -> Option<&LaneRange> {
        self.lanes.get(lane.index())
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        let source = &*self.source;
        for range in self.lanes.iter_mut() {
            range.chain.release_all(source);
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("lanes", &self.lanes.len())
            .field("count", &self.count())
            .field("blocks", &self.block_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::HeapBlockSource;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn make(lanes: u16, block_size: u32) -> (EventStream, SharedBlockSource) {
        let config = StreamConfig::new(lanes).with_block_size(block_size);
        let source = HeapBlockSource::shared(&config, 0).unwrap();
        (EventStream::new(&config, Arc::clone(&source)).unwrap(), source)
    }

    #[test]
    fn new_stream_is_empty() {
        let (stream, source) = make(4, 256);
        assert!(stream.is_empty());
        assert_eq!(stream.count(), 0);
        assert_eq!(stream.lane_count(), 4);
        assert_eq!(stream.block_count(), 0);
        assert_eq!(source.live_blocks(), 0);
    }

    #[test]
    fn mismatched_source_is_rejected() {
        let small = StreamConfig::new(1).with_block_size(64);
        let source = HeapBlockSource::shared(&small, 0).unwrap();
        let big = StreamConfig::new(1).with_block_size(128);
        assert!(matches!(
            EventStream::new(&big, source),
            Err(ArenaError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn lanes_in_order_then_count() {
        let (mut stream, _source) = make(2, 256);
        {
            let mut w = stream.writer();
            for v in [1u32, 2, 3] {
                w.write(LaneId(0), v).unwrap();
            }
            for v in [10u32, 20] {
                w.write(LaneId(1), v).unwrap();
            }
        }
        assert_eq!(stream.to_vec::<u32>().unwrap(), vec![1, 2, 3, 10, 20]);
        assert_eq!(stream.count(), 5);
        assert_eq!(stream.lane_len(LaneId(1)), Some(2));
        assert!(!stream.is_empty());
    }

    #[test]
    fn drop_returns_blocks() {
        let (mut stream, source) = make(2, 64);
        {
            let mut w = stream.writer();
            for i in 0..100u64 {
                w.write(LaneId((i % 2) as u16), i).unwrap();
            }
        }
        assert!(source.live_blocks() > 2);
        assert_eq!(source.live_blocks(), stream.block_count());
        stream.dispose();
        assert_eq!(source.live_blocks(), 0);
    }

    #[test]
    fn out_of_range_lane_write_fails() {
        let (mut stream, _source) = make(2, 64);
        let err = stream.writer().write(LaneId(2), 1u8).unwrap_err();
        assert_eq!(
            err,
            ArenaError::LaneOutOfRange {
                lane: LaneId(2),
                lane_count: 2
            }
        );
    }

    #[test]
    fn parallel_lane_writers() {
        let (mut stream, _source) = make(4, 128);
        let writer = stream.writer();
        std::thread::scope(|s| {
            for mut lane in writer.into_lanes() {
                s.spawn(move || {
                    let base = lane.lane().0 as u32 * 1000;
                    for i in 0..200u32 {
                        lane.write(base + i).unwrap();
                    }
                });
            }
        });
        assert_eq!(stream.count(), 800);
        let all = stream.to_vec::<u32>().unwrap();
        for lane in 0..4u32 {
            let chunk = &all[(lane as usize * 200)..(lane as usize + 1) * 200];
            let expected: Vec<u32> = (0..200).map(|i| lane * 1000 + i).collect();
            assert_eq!(chunk, expected.as_slice());
        }
    }

    proptest! {
        #[test]
        fn count_matches_writes_for_any_distribution(
            lanes in prop::collection::vec(0u16..4, 0..300),
        ) {
            let (mut stream, _source) = make(4, 64);
            {
                let mut w = stream.writer();
                for (i, lane) in lanes.iter().enumerate() {
                    w.write(LaneId(*lane), i as u32).unwrap();
                }
            }
            prop_assert_eq!(stream.count(), lanes.len());
            for lane in 0..4u16 {
                let expected = lanes.iter().filter(|&&l| l == lane).count();
                prop_assert_eq!(stream.lane_len(LaneId(lane)), Some(expected));
            }
        }
    }
}
