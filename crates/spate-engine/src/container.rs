//! Per-event-type container and the rotation state machine.
//!
//! Rotation runs once per tick, single-threaded, between the producer
//! and consumer phases:
//!
//! 1. combine the completions of producers that published this tick;
//! 2. combine the completions of consumers that read the previous
//!    read-set;
//! 3. schedule disposal of the previous read-set behind step 2;
//! 4. move each producer's stream into the new read-set, reset the
//!    producers to Idle;
//! 5. hand every consumer the new read-set with step 1 as its input
//!    dependency, reset the consumers to Idle.
//!
//! Rotation waits for step 1 (a producer's stream is only back in its
//! slot once its session closed) but never for consumers: disposal is
//! deferred behind their token instead.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use spate_arena::{ArenaError, EventStream, SharedBlockSource, StreamConfig};
use spate_core::{CompletionToken, Event, HandleId, TickId};
use tracing::{debug, error, warn};

use crate::consumer::{ConsumerSlot, EventConsumer, SharedConsumerSlot};
use crate::error::RegistryError;
use crate::metrics::RotationMetrics;
use crate::producer::{lock_slot, EventProducer, ProducerSlot, SharedProducerSlot};
use crate::scheduler::Scheduler;

/// Creates the streams producers write into.
pub(crate) struct StreamFactory {
    config: StreamConfig,
    source: SharedBlockSource,
}

impl StreamFactory {
    pub(crate) fn new(config: StreamConfig, source: SharedBlockSource) -> Self {
        Self { config, source }
    }

    pub(crate) fn create(&self) -> Result<EventStream, ArenaError> {
        EventStream::new(&self.config, Arc::clone(&self.source))
    }
}

/// Handle misuse found during rotation. Reported, never fatal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// A producer published a stream without balancing every opened
    /// session with a completion report.
    ProducerUnbalanced {
        /// Event type name.
        event_type: &'static str,
        /// The producer.
        handle: HandleId,
        /// Sessions opened this tick.
        opened: u32,
        /// Completions reported this tick.
        reported: u32,
    },
    /// A write session still held the producer's stream after the
    /// producers completed. The stream is discarded when the session
    /// ends.
    WriterNotReturned {
        /// Event type name.
        event_type: &'static str,
        /// The producer.
        handle: HandleId,
    },
    /// A consumer's read requests and completion reports diverged. The
    /// streams it read are disposed once every token handed to it by
    /// `get_readers` completes.
    ConsumerUnbalanced {
        /// Event type name.
        event_type: &'static str,
        /// The consumer.
        handle: HandleId,
        /// Read sessions requested this tick.
        requested: u32,
        /// Completions reported this tick.
        reported: u32,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProducerUnbalanced {
                event_type,
                handle,
                opened,
                reported,
            } => write!(
                f,
                "producer {handle} of {event_type}: {opened} writers opened, {reported} completions reported"
            ),
            Self::WriterNotReturned { event_type, handle } => write!(
                f,
                "producer {handle} of {event_type}: write session still open at rotation"
            ),
            Self::ConsumerUnbalanced {
                event_type,
                handle,
                requested,
                reported,
            } => write!(
                f,
                "consumer {handle} of {event_type}: {requested} readers requested, {reported} completions reported"
            ),
        }
    }
}

/// Outcome of one rotation.
#[derive(Clone, Debug)]
pub struct RotationReport {
    /// The tick that was rotated.
    pub tick: TickId,
    /// Counters and timings.
    pub metrics: RotationMetrics,
    /// Misuse detected, in container then handle order.
    pub violations: Vec<Violation>,
    /// Completes once the previous read-set has been disposed.
    pub disposal: CompletionToken,
}

impl RotationReport {
    pub(crate) fn new(tick: TickId) -> Self {
        Self {
            tick,
            metrics: RotationMetrics::default(),
            violations: Vec::new(),
            disposal: CompletionToken::completed(),
        }
    }

    /// Whether no violation was recorded.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub(crate) fn merge(&mut self, other: RotationReport) {
        self.metrics.accumulate(&other.metrics);
        self.violations.extend(other.violations);
        self.disposal = self.disposal.and(&other.disposal);
    }
}

/// Drop `streams` once `after` completes, on `scheduler`.
///
/// Returns the token that completes after disposal. If `after` has
/// already completed the streams are dropped on the calling thread.
/// The blocks go back to their source when the last reference is gone;
/// a consumer still holding a [`ReadArray`](crate::ReadArray) past its
/// reported completion keeps them alive until it lets go.
pub fn dispose_after(
    streams: Vec<Arc<EventStream>>,
    after: &CompletionToken,
    scheduler: &dyn Scheduler,
) -> CompletionToken {
    if streams.is_empty() {
        return CompletionToken::completed();
    }
    if after.is_complete() {
        drop(streams);
        return CompletionToken::completed();
    }
    scheduler.schedule(after, Box::new(move |_| drop(streams)))
}

/// Wait for `token`, bounded by `timeout`. Returns the time waited in
/// microseconds.
pub(crate) fn join_producers(
    token: &CompletionToken,
    tick: TickId,
    timeout: Option<Duration>,
) -> Result<u64, RegistryError> {
    let start = Instant::now();
    match timeout {
        Some(limit) => {
            if !token.wait_timeout(limit) {
                error!(tick = %tick, waited_ms = limit.as_millis() as u64, "rotation stalled on producers");
                return Err(RegistryError::RotationStalled {
                    tick,
                    waited: limit,
                });
            }
        }
        None => token.wait(),
    }
    Ok(start.elapsed().as_micros() as u64)
}

/// Producers, consumers, and the current read-set for one event type.
pub struct EventContainer {
    event_type: &'static str,
    factory: Arc<StreamFactory>,
    producers: Vec<(HandleId, SharedProducerSlot)>,
    consumers: Vec<(HandleId, SharedConsumerSlot)>,
    read_set: Vec<Arc<EventStream>>,
    disposals: Vec<CompletionToken>,
}

impl EventContainer {
    pub(crate) fn new(event_type: &'static str, factory: Arc<StreamFactory>) -> Self {
        debug!(event_type, "created event container");
        Self {
            event_type,
            factory,
            producers: Vec::new(),
            consumers: Vec::new(),
            read_set: Vec::new(),
            disposals: Vec::new(),
        }
    }

    /// Name of the event type this container serves.
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// Registered producers.
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Streams in the current read-set.
    pub fn read_set_len(&self) -> usize {
        self.read_set.len()
    }

    /// Deferred disposals not yet complete.
    pub fn pending_disposals(&self) -> usize {
        self.disposals.iter().filter(|t| !t.is_complete()).count()
    }

    pub(crate) fn create_producer<E: Event>(&mut self, id: HandleId) -> EventProducer<E> {
        let slot = Arc::new(Mutex::new(ProducerSlot::new()));
        self.producers.push((id, Arc::clone(&slot)));
        EventProducer::new(id, slot, Arc::clone(&self.factory))
    }

    pub(crate) fn create_consumer<E: Event>(&mut self, id: HandleId) -> EventConsumer<E> {
        let mut slot = ConsumerSlot::new();
        slot.streams.extend(self.read_set.iter().cloned());
        let slot = Arc::new(Mutex::new(slot));
        self.consumers.push((id, Arc::clone(&slot)));
        EventConsumer::new(id, slot)
    }

    /// Unregister a producer, discarding any stream it has not published.
    pub(crate) fn remove_producer(&mut self, id: HandleId) -> bool {
        let Some(pos) = self.producers.iter().position(|(h, _)| *h == id) else {
            return false;
        };
        let (_, slot) = self.producers.swap_remove(pos);
        let mut slot = lock_slot(&slot);
        slot.registered = false;
        drop(slot.reset());
        true
    }

    /// Unregister a consumer, dropping its read-set references.
    pub(crate) fn remove_consumer(&mut self, id: HandleId) -> bool {
        let Some(pos) = self.consumers.iter().position(|(h, _)| *h == id) else {
            return false;
        };
        let (_, slot) = self.consumers.swap_remove(pos);
        let mut slot = lock_slot(&slot);
        slot.registered = false;
        slot.streams.clear();
        true
    }

    /// Combined completion of every producer holding a stream this tick.
    pub fn producer_completion(&self) -> CompletionToken {
        CompletionToken::combine(self.producers.iter().filter_map(|(_, slot)| {
            let slot = lock_slot(slot);
            if slot.has_stream() {
                Some(slot.completion.clone())
            } else {
                None
            }
        }))
    }

    /// Rotate this container for `tick`.
    ///
    /// Waits for the producers (bounded by `timeout`), then runs the five
    /// rotation steps. On [`RegistryError::RotationStalled`] nothing has
    /// changed and the call may be retried.
    pub fn rotate(
        &mut self,
        tick: TickId,
        scheduler: &dyn Scheduler,
        timeout: Option<Duration>,
    ) -> Result<RotationReport, RegistryError> {
        let start = Instant::now();
        let join_us = join_producers(&self.producer_completion(), tick, timeout)?;
        let mut report = self.rotate_joined(tick, scheduler);
        report.metrics.join_us = join_us;
        report.metrics.total_us = start.elapsed().as_micros() as u64;
        Ok(report)
    }

    /// Run the rotation steps after the caller has joined the producers.
    ///
    /// Never blocks. A session that finished after the join is still
    /// published; the new read-set is gated on the completions of the
    /// streams actually published rather than on the joined token.
    pub(crate) fn rotate_joined(
        &mut self,
        tick: TickId,
        scheduler: &dyn Scheduler,
    ) -> RotationReport {
        let start = Instant::now();
        let mut report = RotationReport::new(tick);

        // 1. producers: joined by the caller

        // 2. consumers of the previous read-set
        let mut consumer_tokens = Vec::new();
        for (handle, slot) in &self.consumers {
            let slot = lock_slot(slot);
            if slot.requested == 0 {
                continue;
            }
            if slot.requested == slot.reported {
                consumer_tokens.push(slot.completion.clone());
                continue;
            }
            report.violations.push(Violation::ConsumerUnbalanced {
                event_type: self.event_type,
                handle: *handle,
                requested: slot.requested,
                reported: slot.reported,
            });
            // Unreported reads may still be in flight behind their dependency.
            consumer_tokens.push(slot.completion.and(&slot.handed_out));
        }
        report.metrics.consumers_awaited = consumer_tokens.len();
        let consumer_token = CompletionToken::combine(consumer_tokens);

        // 3. deferred disposal of the previous read-set
        let previous = std::mem::take(&mut self.read_set);
        report.metrics.streams_disposed = previous.len();
        report.disposal = dispose_after(previous, &consumer_token, scheduler);
        self.disposals.retain(|t| !t.is_complete());
        if !report.disposal.is_complete() {
            self.disposals.push(report.disposal.clone());
        }

        // 4. publish
        let mut published = Vec::new();
        for (handle, slot) in &self.producers {
            let mut slot = lock_slot(slot);
            if !slot.has_stream() {
                slot.reset();
                continue;
            }
            if slot.checked_out {
                report.violations.push(Violation::WriterNotReturned {
                    event_type: self.event_type,
                    handle: *handle,
                });
            } else if cfg!(feature = "checks") && slot.opened != slot.reported {
                report.violations.push(Violation::ProducerUnbalanced {
                    event_type: self.event_type,
                    handle: *handle,
                    opened: slot.opened,
                    reported: slot.reported,
                });
            }
            let completion = slot.completion.clone();
            if let Some(stream) = slot.reset() {
                published.push(completion);
                report.metrics.events_published += stream.count();
                report.metrics.blocks_published += stream.block_count();
                self.read_set.push(Arc::new(stream));
            }
        }
        report.metrics.streams_published = self.read_set.len();

        // 5. hand the read-set to consumers
        let written = CompletionToken::combine(published);
        for (_, slot) in &self.consumers {
            lock_slot(slot).reset(&self.read_set, written.clone());
        }

        report.metrics.violations = report.violations.len();
        for violation in &report.violations {
            warn!(tick = %tick, "{violation}");
        }
        report.metrics.total_us = start.elapsed().as_micros() as u64;
        debug!(
            tick = %tick,
            event_type = self.event_type,
            published = report.metrics.streams_published,
            events = report.metrics.events_published,
            disposed = report.metrics.streams_disposed,
            "rotated container"
        );
        report
    }

    /// Detach every handle and hand the current read-set to deferred
    /// disposal. Returns the disposal tokens still outstanding.
    pub(crate) fn teardown(&mut self, scheduler: &dyn Scheduler) -> Vec<CompletionToken> {
        for (_, slot) in self.producers.drain(..) {
            let mut slot = lock_slot(&slot);
            slot.registered = false;
            drop(slot.reset());
        }

        let mut readers_done = Vec::new();
        for (_, slot) in self.consumers.drain(..) {
            let mut slot = lock_slot(&slot);
            slot.registered = false;
            slot.streams.clear();
            readers_done.push(slot.completion.clone());
        }
        let last = dispose_after(
            std::mem::take(&mut self.read_set),
            &CompletionToken::combine(readers_done),
            scheduler,
        );

        self.disposals.push(last);
        self.disposals.retain(|t| !t.is_complete());
        debug!(
            event_type = self.event_type,
            pending = self.disposals.len(),
            "container torn down"
        );
        std::mem::take(&mut self.disposals)
    }
}

impl fmt::Debug for EventContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContainer")
            .field("event_type", &self.event_type)
            .field("producers", &self.producers.len())
            .field("consumers", &self.consumers.len())
            .field("read_set", &self.read_set.len())
            .finish()
    }
}
