//! Reusable event and config fixtures.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use spate_arena::{EventStream, HeapBlockSource, SharedBlockSource, StreamConfig};
use spate_core::LaneId;
use spate_engine::EngineConfig;

/// A mixed-field event record with no padding (32 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Impact {
    pub entity: u32,
    pub kind: u16,
    pub flags: u16,
    pub position: [f32; 3],
    pub magnitude: f32,
    pub tick: u64,
}

impl Impact {
    /// A distinguishable record derived from `n`.
    pub fn sample(n: u32) -> Self {
        Self {
            entity: n,
            kind: (n % 7) as u16,
            flags: 0xA5A5 ^ (n as u16),
            position: [n as f32, -(n as f32), 0.5],
            magnitude: n as f32 * 0.25,
            tick: (u64::from(n) << 32) | 0xDEAD,
        }
    }
}

/// 64-byte blocks (56-byte payload): boundaries are crossed after a few
/// records.
pub fn small_stream_config(lanes: u16) -> StreamConfig {
    StreamConfig::new(lanes).with_block_size(64)
}

/// Engine config over [`small_stream_config`] with one worker per lane.
pub fn engine_config(lanes: u16) -> EngineConfig {
    EngineConfig::new(lanes).with_stream(small_stream_config(lanes))
}

/// A stream and its source for `config`.
pub fn stream(config: &StreamConfig) -> (EventStream, SharedBlockSource) {
    let source = HeapBlockSource::shared(config, 0).expect("valid fixture config");
    let stream = EventStream::new(config, Arc::clone(&source)).expect("matching block source");
    (stream, source)
}

/// Append `values` to `lane` of `stream`.
pub fn fill_lane<T: Pod>(stream: &mut EventStream, lane: LaneId, values: &[T]) {
    let mut writer = stream.writer();
    let mut lane = writer.lane(lane).expect("lane in range");
    for v in values {
        lane.write(*v).expect("record fits in a block");
    }
}
