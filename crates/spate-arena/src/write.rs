//! Write-side views of an event stream.
//!
//! [`StreamWriter`] borrows a stream mutably and hands out one
//! [`LaneWriter`] per lane. Lane writers borrow disjoint lane ranges, so
//! they can be moved to different threads (e.g. with
//! `std::thread::scope`) and append concurrently with no locking: each
//! one is a bump allocator over its own block chain.

use bytemuck::Pod;
use spate_core::LaneId;

use crate::config::StreamConfig;
use crate::error::ArenaError;
use crate::range::LaneRange;
use crate::source::BlockSource;

/// Mutable access to every lane of one stream.
pub struct StreamWriter<'a> {
    lanes: &'a mut [LaneRange],
    source: &'a dyn BlockSource,
    config: &'a StreamConfig,
}

impl<'a> StreamWriter<'a> {
    pub(crate) fn new(
        lanes: &'a mut [LaneRange],
        source: &'a dyn BlockSource,
        config: &'a StreamConfig,
    ) -> Self {
        Self {
            lanes,
            source,
            config,
        }
    }

    /// Number of lanes in the stream.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Writer for a single lane.
    pub fn lane(&mut self, lane: LaneId) -> Result<LaneWriter<'_>, ArenaError> {
        let lane_count = self.lanes.len() as u16;
        let range = self
            .lanes
            .get_mut(lane.index())
            .ok_or(ArenaError::LaneOutOfRange { lane, lane_count })?;
        Ok(LaneWriter::new(lane, range, self.source, self.config))
    }

    /// Split into one writer per lane, in lane order.
    ///
    /// The writers borrow disjoint lanes and may be sent to separate
    /// threads.
    pub fn into_lanes(self) -> impl Iterator<Item = LaneWriter<'a>> {
        let source = self.source;
        let config = self.config;
        self.lanes
            .iter_mut()
            .enumerate()
            .map(move |(i, range)| LaneWriter::new(LaneId(i as u16), range, source, config))
    }

    /// Append `value` to `lane`.
    pub fn write<T: Pod>(&mut self, lane: LaneId, value: T) -> Result<(), ArenaError> {
        self.lane(lane)?.write(value)
    }
}

/// Bump-allocating writer for one lane.
pub struct LaneWriter<'a> {
    lane: LaneId,
    range: &'a mut LaneRange,
    source: &'a dyn BlockSource,
    block_size: usize,
    header_reserve: usize,
}

// Compile-time assertion: lane writers move to worker threads.
const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<LaneWriter<'static>>();
};

impl<'a> LaneWriter<'a> {
    fn new(
        lane: LaneId,
        range: &'a mut LaneRange,
        source: &'a dyn BlockSource,
        config: &StreamConfig,
    ) -> Self {
        Self {
            lane,
            range,
            source,
            block_size: config.block_size as usize,
            header_reserve: config.header_reserve as usize,
        }
    }

    /// The lane this writer appends to.
    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// Elements written to this lane so far, across all sessions.
    pub fn len(&self) -> usize {
        self.range.element_count
    }

    /// Whether nothing has been written to this lane.
    pub fn is_empty(&self) -> bool {
        self.range.element_count == 0
    }

    /// Reserve `size` bytes for one element and return them for filling.
    ///
    /// If the element does not fit in the current block, a new block is
    /// linked after it and the element starts at that block's payload.
    /// Element count and last used size are updated on success.
    pub fn allocate(&mut self, size: usize) -> Result<&mut [u8], ArenaError> {
        let capacity = self.block_size - self.header_reserve;
        if size > capacity {
            return Err(ArenaError::CapacityExceeded {
                requested: size,
                capacity,
            });
        }

        let range = &mut *self.range;
        let current = match range.current {
            Some(id) if range.cursor + size <= range.block_end => id,
            predecessor => {
                let id = range.chain.allocate(self.source, predecessor)?;
                if range.block_count == 0 {
                    range.first_offset = self.header_reserve;
                }
                range.block_count += 1;
                range.current = Some(id);
                range.cursor = self.header_reserve;
                range.block_end = self.block_size;
                id
            }
        };

        let start = range.cursor;
        range.cursor += size;
        range.element_count += 1;
        range.last_offset = range.cursor;

        Ok(&mut range.chain.block_data_mut(current)[start..start + size])
    }

    /// Append a plain-old-data value.
    pub fn write<T: Pod>(&mut self, value: T) -> Result<(), ArenaError> {
        let bytes = bytemuck::bytes_of(&value);
        self.allocate(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Append a raw byte payload as one element.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ArenaError> {
        self.allocate(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }
}
