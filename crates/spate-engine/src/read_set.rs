//! Snapshot of a consumer's read-set.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use spate_arena::{EventStream, StreamError, StreamReader};
use spate_core::{Event, LaneId};

/// The streams published for one event type in the previous tick.
///
/// Returned by [`EventConsumer::get_readers`](crate::EventConsumer::get_readers).
/// Cheap to clone; clones share the streams. Streams are read-only here,
/// and the blocks behind them stay alive until the last `ReadArray`
/// holding them and the registry's deferred disposal have both let go.
pub struct ReadArray<E: Event> {
    streams: Arc<[Arc<EventStream>]>,
    _event: PhantomData<fn() -> E>,
}

impl<E: Event> ReadArray<E> {
    pub(crate) fn new(streams: &[Arc<EventStream>]) -> Self {
        Self {
            streams: streams.iter().cloned().collect(),
            _event: PhantomData,
        }
    }

    /// Number of streams (one per publishing producer).
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether no producer published last tick.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Stream at `index`.
    pub fn get(&self, index: usize) -> Option<&EventStream> {
        self.streams.get(index).map(|s| &**s)
    }

    /// Streams in publication order.
    pub fn iter(&self) -> impl Iterator<Item = &EventStream> + '_ {
        self.streams.iter().map(|s| &**s)
    }

    /// A reader over the stream at `index`.
    pub fn reader(&self, index: usize) -> Option<StreamReader<'_>> {
        self.get(index).map(EventStream::reader)
    }

    /// Total events across every stream.
    pub fn event_count(&self) -> usize {
        self.iter().map(EventStream::count).sum()
    }

    /// Read every event of one lane of every stream, in stream order.
    ///
    /// Intended for a consumer task running on worker `lane`.
    pub fn read_lane(&self, lane: LaneId) -> Result<Vec<E>, StreamError> {
        let mut out = Vec::new();
        for stream in self.iter() {
            let mut reader = stream.reader();
            let n = reader.begin_lane(lane)?;
            out.reserve(n);
            for _ in 0..n {
                out.push(reader.read::<E>()?);
            }
            reader.end_lane()?;
        }
        Ok(out)
    }

    /// Every event, stream by stream and lane by lane within each stream.
    pub fn to_vec(&self) -> Result<Vec<E>, StreamError> {
        let mut out = Vec::with_capacity(self.event_count());
        for stream in self.iter() {
            out.extend(stream.to_vec::<E>()?);
        }
        Ok(out)
    }
}

impl<E: Event> Clone for ReadArray<E> {
    fn clone(&self) -> Self {
        Self {
            streams: Arc::clone(&self.streams),
            _event: PhantomData,
        }
    }
}

impl<E: Event> fmt::Debug for ReadArray<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadArray")
            .field("streams", &self.streams.len())
            .field("events", &self.event_count())
            .finish()
    }
}
