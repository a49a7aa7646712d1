//! Sequential, lane-by-lane reading of a finished stream.
//!
//! A [`StreamReader`] walks one lane at a time: [`begin_lane`] seeds it
//! from the lane's recorded head, counts and offsets, reads consume
//! elements in write order, and [`end_lane`] checks that the lane was
//! drained exactly. Block crossings follow the writer's rule, so an
//! element that did not fit at the end of a block is read from the start
//! of the next one.
//!
//! [`begin_lane`]: StreamReader::begin_lane
//! [`end_lane`]: StreamReader::end_lane

use bytemuck::Pod;
use spate_core::LaneId;

use crate::block::BlockId;
use crate::error::StreamError;
use crate::range::LaneRange;
use crate::stream::EventStream;

/// Cursor over one lane of a stream.
pub struct StreamReader<'a> {
    stream: &'a EventStream,
    lane: Option<LaneId>,
    block: Option<BlockId>,
    cursor: usize,
    block_end: usize,
    remaining: usize,
    remaining_blocks: usize,
}

/// Where the next element of a given size lives.
struct Position<'a> {
    block: BlockId,
    data: &'a [u8],
    start: usize,
    block_end: usize,
    remaining_blocks: usize,
}

impl<'a> StreamReader<'a> {
    pub(crate) fn new(stream: &'a EventStream) -> Self {
        Self {
            stream,
            lane: None,
            block: None,
            cursor: 0,
            block_end: 0,
            remaining: 0,
            remaining_blocks: 0,
        }
    }

    /// Number of lanes in the underlying stream.
    pub fn lane_count(&self) -> usize {
        self.stream.lane_count()
    }

    /// Total elements in the underlying stream.
    pub fn count(&self) -> usize {
        self.stream.count()
    }

    /// The lane currently being read.
    pub fn active_lane(&self) -> Option<LaneId> {
        self.lane
    }

    /// Elements left in the active lane (0 if none is active).
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Start reading `lane` and return its element count.
    ///
    /// Begins a fresh pass over the lane even if another lane (or this
    /// one) was left mid-read.
    pub fn begin_lane(&mut self, lane: LaneId) -> Result<usize, StreamError> {
        let range = self.range(lane)?;
        let block_size = self.stream.config().block_size as usize;

        self.lane = Some(lane);
        self.block = range.head();
        self.remaining = range.element_count;
        self.remaining_blocks = range.block_count.saturating_sub(1);
        if range.block_count == 0 {
            self.cursor = 0;
            self.block_end = 0;
        } else {
            self.cursor = range.first_offset;
            self.block_end = if range.block_count == 1 {
                range.last_offset
            } else {
                block_size
            };
        }
        Ok(range.element_count)
    }

    /// Consume the next element as `size` raw bytes.
    pub fn read_bytes(&mut self, size: usize) -> Result<&'a [u8], StreamError> {
        let lane = self.lane.ok_or(StreamError::NoLaneActive)?;
        #[cfg(feature = "checks")]
        if self.remaining == 0 {
            return Err(StreamError::NoItemsRemaining { lane });
        }

        let pos = self
            .locate(lane, size)
            .ok_or(StreamError::ReadPastEnd {
                lane,
                requested: size,
            })?;
        let bytes = &pos.data[pos.start..pos.start + size];

        self.block = Some(pos.block);
        self.cursor = pos.start + size;
        self.block_end = pos.block_end;
        self.remaining_blocks = pos.remaining_blocks;
        self.remaining = self.remaining.saturating_sub(1);
        Ok(bytes)
    }

    /// Consume the next element as a `T`.
    pub fn read<T: Pod>(&mut self) -> Result<T, StreamError> {
        let bytes = self.read_bytes(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Return the next element as a `T` without consuming it.
    pub fn peek<T: Pod>(&self) -> Result<T, StreamError> {
        let size = std::mem::size_of::<T>();
        let lane = self.lane.ok_or(StreamError::NoLaneActive)?;
        #[cfg(feature = "checks")]
        if self.remaining == 0 {
            return Err(StreamError::NoItemsRemaining { lane });
        }

        let pos = self.locate(lane, size).ok_or(StreamError::PeekPastEnd {
            lane,
            requested: size,
        })?;
        Ok(bytemuck::pod_read_unaligned(
            &pos.data[pos.start..pos.start + size],
        ))
    }

    /// Finish the active lane.
    ///
    /// With the `checks` feature, fails if elements or bytes were left
    /// unread, which catches size mismatches between writer and reader.
    pub fn end_lane(&mut self) -> Result<(), StreamError> {
        let lane = self.lane.take().ok_or(StreamError::NoLaneActive)?;
        let remaining = self.remaining;
        let unread_bytes = self.block_end.saturating_sub(self.cursor);
        self.block = None;
        self.cursor = 0;
        self.block_end = 0;
        self.remaining = 0;
        self.remaining_blocks = 0;

        #[cfg(feature = "checks")]
        {
            if remaining != 0 {
                return Err(StreamError::LaneNotDrained { lane, remaining });
            }
            if unread_bytes != 0 {
                return Err(StreamError::LaneDataRemaining { lane, unread_bytes });
            }
        }
        #[cfg(not(feature = "checks"))]
        let _ = (lane, remaining, unread_bytes);
        Ok(())
    }

    fn range(&self, lane: LaneId) -> Result<&'a LaneRange, StreamError> {
        let stream: &'a EventStream = self.stream;
        stream
            .lane_range(lane)
            .ok_or(StreamError::LaneOutOfRange {
                lane,
                lane_count: stream.lane_count() as u16,
            })
    }

    fn locate(&self, lane: LaneId, size: usize) -> Option<Position<'a>> {
        let stream: &'a EventStream = self.stream;
        let range = stream.lane_range(lane)?;
        let block = self.block?;
        let current = range.chain.get(block)?;
        if self.cursor + size <= self.block_end {
            return Some(Position {
                block,
                data: current.data(),
                start: self.cursor,
                block_end: self.block_end,
                remaining_blocks: self.remaining_blocks,
            });
        }
        if self.remaining_blocks == 0 {
            return None;
        }

        let next = current.next()?;
        let config = stream.config();
        let remaining_blocks = self.remaining_blocks - 1;
        let block_end = if remaining_blocks == 0 {
            range.last_offset
        } else {
            config.block_size as usize
        };
        let start = config.header_reserve as usize;
        if start + size > block_end {
            return None;
        }
        Some(Position {
            block: next,
            data: range.chain.get(next)?.data(),
            start,
            block_end,
            remaining_blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::source::{HeapBlockSource, SharedBlockSource};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn make(lanes: u16, block_size: u32) -> (EventStream, SharedBlockSource) {
        let config = StreamConfig::new(lanes).with_block_size(block_size);
        let source = HeapBlockSource::shared(&config, 0).unwrap();
        (EventStream::new(&config, Arc::clone(&source)).unwrap(), source)
    }

    #[test]
    fn empty_lane_begins_and_ends_cleanly() {
        let (stream, _s) = make(2, 64);
        let mut r = stream.reader();
        assert_eq!(r.begin_lane(LaneId(1)).unwrap(), 0);
        assert_eq!(r.remaining(), 0);
        r.end_lane().unwrap();
    }

    #[test]
    fn reads_without_lane_fail() {
        let (stream, _s) = make(1, 64);
        let mut r = stream.reader();
        assert_eq!(r.read::<u32>(), Err(StreamError::NoLaneActive));
        assert_eq!(r.end_lane(), Err(StreamError::NoLaneActive));
    }

    #[test]
    fn begin_out_of_range_lane_fails() {
        let (stream, _s) = make(2, 64);
        assert_eq!(
            stream.reader().begin_lane(LaneId(5)),
            Err(StreamError::LaneOutOfRange {
                lane: LaneId(5),
                lane_count: 2
            })
        );
    }

    #[test]
    fn elements_cross_blocks_in_write_order() {
        // 64-byte blocks, 8-byte header: 7 u64s per block.
        let (mut stream, _s) = make(1, 64);
        {
            let mut w = stream.writer();
            for i in 0..20u64 {
                w.write(LaneId(0), i).unwrap();
            }
        }
        assert_eq!(stream.block_count(), 3);
        let mut r = stream.reader();
        assert_eq!(r.begin_lane(LaneId(0)).unwrap(), 20);
        for i in 0..20u64 {
            assert_eq!(r.read::<u64>().unwrap(), i);
        }
        r.end_lane().unwrap();
    }

    #[test]
    fn element_that_does_not_fit_starts_next_block() {
        // 56-byte payload; two 24-byte records leave 8 bytes, so the
        // third must begin the next block.
        let (mut stream, _s) = make(1, 64);
        {
            let mut w = stream.writer();
            for i in 0..3u8 {
                w.write(LaneId(0), [i; 24]).unwrap();
            }
        }
        let chain = stream.lane_chain(LaneId(0)).unwrap();
        let blocks: Vec<_> = chain.iter().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(&blocks[1].1.data()[8..32], &[2u8; 24]);

        let mut r = stream.reader();
        r.begin_lane(LaneId(0)).unwrap();
        for i in 0..3u8 {
            assert_eq!(r.read::<[u8; 24]>().unwrap(), [i; 24]);
        }
        r.end_lane().unwrap();
    }

    #[test]
    fn peek_does_not_consume() {
        let (mut stream, _s) = make(1, 64);
        stream.writer().write(LaneId(0), 7u32).unwrap();
        let mut r = stream.reader();
        r.begin_lane(LaneId(0)).unwrap();
        assert_eq!(r.peek::<u32>().unwrap(), 7);
        assert_eq!(r.remaining(), 1);
        assert_eq!(r.read::<u32>().unwrap(), 7);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn peek_past_written_data_fails() {
        let (mut stream, _s) = make(1, 64);
        stream.writer().write(LaneId(0), 7u16).unwrap();
        let mut r = stream.reader();
        r.begin_lane(LaneId(0)).unwrap();
        assert_eq!(
            r.peek::<u64>(),
            Err(StreamError::PeekPastEnd {
                lane: LaneId(0),
                requested: 8
            })
        );
    }

    #[test]
    fn peek_follows_link_into_next_block() {
        let (mut stream, _s) = make(1, 64);
        {
            let mut w = stream.writer();
            for i in 0..3u8 {
                w.write(LaneId(0), [i; 24]).unwrap();
            }
        }
        assert_eq!(stream.block_count(), 2);

        let mut r = stream.reader();
        r.begin_lane(LaneId(0)).unwrap();
        r.read::<[u8; 24]>().unwrap();
        r.read::<[u8; 24]>().unwrap();
        assert_eq!(r.peek::<[u8; 24]>().unwrap(), [2; 24]);
        assert_eq!(r.read::<[u8; 24]>().unwrap(), [2; 24]);

        // End of the last block: there is no successor to follow.
        #[cfg(feature = "checks")]
        let expected = StreamError::NoItemsRemaining { lane: LaneId(0) };
        #[cfg(not(feature = "checks"))]
        let expected = StreamError::PeekPastEnd {
            lane: LaneId(0),
            requested: 24,
        };
        assert_eq!(r.peek::<[u8; 24]>(), Err(expected));
        r.end_lane().unwrap();
    }

    #[test]
    fn mixed_size_records_round_through_one_lane() {
        let (mut stream, _s) = make(1, 64);
        {
            let mut w = stream.writer();
            let mut lane = w.lane(LaneId(0)).unwrap();
            lane.write(1u8).unwrap();
            lane.write(2u64).unwrap();
            lane.write_bytes(b"spate").unwrap();
            lane.write(3u32).unwrap();
        }
        let mut r = stream.reader();
        assert_eq!(r.begin_lane(LaneId(0)).unwrap(), 4);
        assert_eq!(r.read::<u8>().unwrap(), 1);
        assert_eq!(r.read::<u64>().unwrap(), 2);
        assert_eq!(r.read_bytes(5).unwrap(), b"spate");
        assert_eq!(r.read::<u32>().unwrap(), 3);
        r.end_lane().unwrap();
    }

    #[test]
    fn rebeginning_a_lane_restarts_it() {
        let (mut stream, _s) = make(1, 64);
        {
            let mut w = stream.writer();
            w.write(LaneId(0), 1u32).unwrap();
            w.write(LaneId(0), 2u32).unwrap();
        }
        let mut r = stream.reader();
        r.begin_lane(LaneId(0)).unwrap();
        assert_eq!(r.read::<u32>().unwrap(), 1);
        r.begin_lane(LaneId(0)).unwrap();
        assert_eq!(r.read::<u32>().unwrap(), 1);
        assert_eq!(r.read::<u32>().unwrap(), 2);
        r.end_lane().unwrap();
    }

    #[test]
    fn reading_past_the_last_element_fails() {
        let (mut stream, _s) = make(1, 64);
        stream.writer().write(LaneId(0), 1u32).unwrap();
        let mut r = stream.reader();
        r.begin_lane(LaneId(0)).unwrap();
        r.read::<u32>().unwrap();
        let err = r.read::<u32>().unwrap_err();
        #[cfg(feature = "checks")]
        assert_eq!(err, StreamError::NoItemsRemaining { lane: LaneId(0) });
        #[cfg(not(feature = "checks"))]
        assert_eq!(
            err,
            StreamError::ReadPastEnd {
                lane: LaneId(0),
                requested: 4
            }
        );
    }

    #[cfg(feature = "checks")]
    #[test]
    fn ending_an_undrained_lane_is_reported() {
        let (mut stream, _s) = make(1, 64);
        {
            let mut w = stream.writer();
            w.write(LaneId(0), 1u32).unwrap();
            w.write(LaneId(0), 2u32).unwrap();
        }
        let mut r = stream.reader();
        r.begin_lane(LaneId(0)).unwrap();
        r.read::<u32>().unwrap();
        assert_eq!(
            r.end_lane(),
            Err(StreamError::LaneNotDrained {
                lane: LaneId(0),
                remaining: 1
            })
        );
    }

    #[cfg(feature = "checks")]
    #[test]
    fn reading_smaller_than_written_leaves_bytes() {
        let (mut stream, _s) = make(1, 64);
        stream.writer().write(LaneId(0), 1u64).unwrap();
        let mut r = stream.reader();
        r.begin_lane(LaneId(0)).unwrap();
        r.read::<u32>().unwrap();
        assert_eq!(
            r.end_lane(),
            Err(StreamError::LaneDataRemaining {
                lane: LaneId(0),
                unread_bytes: 4
            })
        );
    }

    #[test]
    fn to_vec_visits_lanes_in_order() {
        let (mut stream, _s) = make(3, 64);
        {
            let mut w = stream.writer();
            w.write(LaneId(2), 30u32).unwrap();
            w.write(LaneId(0), 10u32).unwrap();
            w.write(LaneId(1), 20u32).unwrap();
            w.write(LaneId(0), 11u32).unwrap();
        }
        assert_eq!(stream.to_vec::<u32>().unwrap(), vec![10, 11, 20, 30]);
    }

    proptest! {
        #[test]
        fn per_lane_order_is_preserved(
            writes in prop::collection::vec((0u16..3, any::<u32>()), 0..400),
        ) {
            let (mut stream, _s) = make(3, 64);
            {
                let mut w = stream.writer();
                for (lane, v) in &writes {
                    w.write(LaneId(*lane), *v).unwrap();
                }
            }
            let mut r = stream.reader();
            for lane in 0..3u16 {
                let expected: Vec<u32> = writes
                    .iter()
                    .filter(|(l, _)| *l == lane)
                    .map(|(_, v)| *v)
                    .collect();
                prop_assert_eq!(r.begin_lane(LaneId(lane)).unwrap(), expected.len());
                for v in expected {
                    prop_assert_eq!(r.read::<u32>().unwrap(), v);
                }
                prop_assert!(r.end_lane().is_ok());
            }
        }

        #[test]
        fn variable_sized_records_survive_block_boundaries(
            sizes in prop::collection::vec(1usize..=56, 1..200),
        ) {
            let (mut stream, _s) = make(1, 64);
            {
                let mut w = stream.writer();
                let mut lane = w.lane(LaneId(0)).unwrap();
                for (i, size) in sizes.iter().enumerate() {
                    lane.allocate(*size).unwrap().fill(i as u8);
                }
            }
            let mut r = stream.reader();
            prop_assert_eq!(r.begin_lane(LaneId(0)).unwrap(), sizes.len());
            for (i, size) in sizes.iter().enumerate() {
                let bytes = r.read_bytes(*size).unwrap();
                prop_assert!(bytes.iter().all(|&b| b == i as u8));
            }
            prop_assert!(r.end_lane().is_ok());
        }
    }
}
