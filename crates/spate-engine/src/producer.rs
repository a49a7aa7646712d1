//! Producer handles and write sessions.
//!
//! An [`EventProducer`] owns one slot in its event type's container. Per
//! tick the slot moves Idle → Writing → Published and is reset to Idle
//! by rotation. A [`WriteSession`] checks the slot's stream out while it
//! writes and returns it on close or drop; rotation only ever publishes
//! a stream that is back in its slot.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use spate_arena::{ArenaError, EventStream, StreamWriter};
use spate_core::{CompletionToken, Event, HandleId, LaneId};
use tracing::warn;

use crate::container::StreamFactory;
use crate::error::ProtocolError;

/// Per-tick state of a producer handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProducerState {
    /// No stream this tick.
    Idle,
    /// A stream exists and at least one session is unreported or still
    /// checked out.
    Writing,
    /// Every session closed and reported; ready for rotation.
    Published,
}

/// Producer bookkeeping shared between the handle, its sessions, and
/// the container.
pub(crate) struct ProducerSlot {
    pub(crate) stream: Option<EventStream>,
    pub(crate) checked_out: bool,
    pub(crate) completion: CompletionToken,
    pub(crate) opened: u32,
    pub(crate) reported: u32,
    /// Bumped by every rotation; sessions from an older generation
    /// dispose their stream instead of returning it.
    pub(crate) generation: u64,
    pub(crate) registered: bool,
}

impl ProducerSlot {
    pub(crate) fn new() -> Self {
        Self {
            stream: None,
            checked_out: false,
            completion: CompletionToken::completed(),
            opened: 0,
            reported: 0,
            generation: 0,
            registered: true,
        }
    }

    pub(crate) fn state(&self) -> ProducerState {
        if self.stream.is_none() && !self.checked_out {
            ProducerState::Idle
        } else if self.checked_out || self.opened != self.reported {
            ProducerState::Writing
        } else {
            ProducerState::Published
        }
    }

    /// Whether this slot has anything for rotation to publish.
    pub(crate) fn has_stream(&self) -> bool {
        self.stream.is_some() || self.checked_out
    }

    /// Return to Idle for the next tick.
    pub(crate) fn reset(&mut self) -> Option<EventStream> {
        self.checked_out = false;
        self.completion = CompletionToken::completed();
        self.opened = 0;
        self.reported = 0;
        self.generation += 1;
        self.stream.take()
    }
}

pub(crate) type SharedProducerSlot = Arc<Mutex<ProducerSlot>>;

pub(crate) fn lock_slot<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle through which a system writes events of type `E`.
///
/// Obtained from [`EventRegistry::register_producer`](crate::EventRegistry::register_producer).
pub struct EventProducer<E: Event> {
    id: HandleId,
    slot: SharedProducerSlot,
    factory: Arc<StreamFactory>,
    _event: PhantomData<fn() -> E>,
}

impl<E: Event> EventProducer<E> {
    pub(crate) fn new(id: HandleId, slot: SharedProducerSlot, factory: Arc<StreamFactory>) -> Self {
        Self {
            id,
            slot,
            factory,
            _event: PhantomData,
        }
    }

    /// This handle's id within its container.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Current per-tick state.
    pub fn state(&self) -> ProducerState {
        lock_slot(&self.slot).state()
    }

    /// Open the single write session for this tick on a fresh stream.
    ///
    /// Fails with [`ProtocolError::WriterAlreadyOpen`] if this producer
    /// already has a stream this tick.
    pub fn open_writer(&self) -> Result<WriteSession<E>, ProtocolError> {
        let mut slot = lock_slot(&self.slot);
        self.ensure_registered(&slot)?;
        if slot.has_stream() {
            return Err(ProtocolError::WriterAlreadyOpen { handle: self.id });
        }
        let stream = self.factory.create()?;
        slot.checked_out = true;
        slot.opened += 1;
        let generation = slot.generation;
        drop(slot);

        Ok(WriteSession::new(
            self.id,
            Arc::clone(&self.slot),
            stream,
            generation,
        ))
    }

    /// Open a write session that may run in a later sub-phase.
    ///
    /// `dependency` is folded into the producer's running completion and
    /// the combined token is returned: the task that writes through the
    /// lease must depend on it. Repeated calls within a tick append to
    /// the same stream. Each call must be balanced by exactly one
    /// [`report_completion`](Self::report_completion).
    pub fn open_writer_after(
        &self,
        dependency: &CompletionToken,
    ) -> Result<(WriteLease<E>, CompletionToken), ProtocolError> {
        let mut slot = lock_slot(&self.slot);
        self.ensure_registered(&slot)?;
        if cfg!(feature = "checks") && slot.opened != slot.reported {
            return Err(ProtocolError::UnbalancedCompletion {
                handle: self.id,
                opened: slot.opened,
                reported: slot.reported,
            });
        }
        if !slot.has_stream() {
            slot.stream = Some(self.factory.create()?);
        }
        slot.completion = slot.completion.and(dependency);
        slot.opened += 1;
        let lease = WriteLease {
            id: self.id,
            slot: Arc::clone(&self.slot),
            generation: slot.generation,
            _event: PhantomData,
        };
        Ok((lease, slot.completion.clone()))
    }

    /// Record the token of the task that ran the session just opened.
    pub fn report_completion(&self, token: CompletionToken) -> Result<(), ProtocolError> {
        let mut slot = lock_slot(&self.slot);
        self.ensure_registered(&slot)?;
        if cfg!(feature = "checks") && slot.reported >= slot.opened {
            return Err(ProtocolError::UnbalancedCompletion {
                handle: self.id,
                opened: slot.opened,
                reported: slot.reported,
            });
        }
        slot.reported += 1;
        slot.completion = token;
        Ok(())
    }

    fn ensure_registered(&self, slot: &ProducerSlot) -> Result<(), ProtocolError> {
        if slot.registered {
            Ok(())
        } else {
            Err(ProtocolError::HandleNotRegistered { handle: self.id })
        }
    }
}

impl<E: Event> fmt::Debug for EventProducer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventProducer")
            .field("id", &self.id)
            .field("event", &std::any::type_name::<E>())
            .field("state", &self.state())
            .finish()
    }
}

/// An open write session holding the producer's stream.
///
/// Writes go straight into the stream's lanes with no locking. Closing
/// or dropping the session returns the stream to its producer.
pub struct WriteSession<E: Event> {
    id: HandleId,
    slot: SharedProducerSlot,
    stream: Option<EventStream>,
    generation: u64,
    _event: PhantomData<fn(E)>,
}

// Compile-time assertion: sessions move into scheduled tasks.
const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<WriteSession<u64>>();
};

impl<E: Event> WriteSession<E> {
    fn new(id: HandleId, slot: SharedProducerSlot, stream: EventStream, generation: u64) -> Self {
        Self {
            id,
            slot,
            stream: Some(stream),
            generation,
            _event: PhantomData,
        }
    }

    /// The producer this session writes for.
    pub fn producer(&self) -> HandleId {
        self.id
    }

    /// Append `event` to `lane`.
    pub fn write(&mut self, lane: LaneId, event: E) -> Result<(), ArenaError> {
        self.writer().write(lane, event)
    }

    /// Raw lane writers for mixed-type or byte payloads, or for splitting
    /// the lanes across threads.
    pub fn writer(&mut self) -> StreamWriter<'_> {
        match self.stream.as_mut() {
            Some(stream) => stream.writer(),
            // `stream` is only taken in Drop.
            None => unreachable!("write session used after release"),
        }
    }

    /// Elements written so far across every session this tick.
    pub fn count(&self) -> usize {
        self.stream.as_ref().map_or(0, EventStream::count)
    }

    /// Close the session and return the stream to the producer.
    pub fn close(self) {
        drop(self);
    }
}

impl<E: Event> Drop for WriteSession<E> {
    fn drop(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        let mut slot = lock_slot(&self.slot);
        if slot.generation != self.generation || !slot.registered {
            warn!(
                producer = %self.id,
                events = stream.count(),
                "write session outlived its tick; discarding stream"
            );
            return;
        }
        slot.stream = Some(stream);
        slot.checked_out = false;
    }
}

impl<E: Event> fmt::Debug for WriteSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSession")
            .field("producer", &self.id)
            .field("count", &self.count())
            .finish()
    }
}

/// A write session to be started later, from inside the task that
/// depends on the token returned by
/// [`EventProducer::open_writer_after`].
pub struct WriteLease<E: Event> {
    id: HandleId,
    slot: SharedProducerSlot,
    generation: u64,
    _event: PhantomData<fn(E)>,
}

impl<E: Event> WriteLease<E> {
    /// Check the producer's stream out and start writing.
    ///
    /// Fails with [`ProtocolError::WriterCheckedOut`] if an earlier
    /// session still holds the stream, which means the task did not
    /// wait on the lease's dependency.
    pub fn begin(self) -> Result<WriteSession<E>, ProtocolError> {
        let mut slot = lock_slot(&self.slot);
        if !slot.registered || slot.generation != self.generation {
            return Err(ProtocolError::HandleNotRegistered { handle: self.id });
        }
        let stream = match slot.stream.take() {
            Some(stream) if !slot.checked_out => stream,
            other => {
                slot.stream = other;
                return Err(ProtocolError::WriterCheckedOut { handle: self.id });
            }
        };
        slot.checked_out = true;
        drop(slot);
        Ok(WriteSession::new(
            self.id,
            Arc::clone(&self.slot),
            stream,
            self.generation,
        ))
    }
}

impl<E: Event> fmt::Debug for WriteLease<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteLease").field("producer", &self.id).finish()
    }
}
