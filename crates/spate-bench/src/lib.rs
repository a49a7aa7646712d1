//! Benchmark profiles and a tick driver for Spate.
//!
//! - [`reference_profile`]: 4 KiB blocks, the common configuration
//! - [`stress_profile`]: 256-byte blocks, so writes cross blocks often
//! - [`TickHarness`]: a registry with N producers and M consumers of
//!   [`Sample`] events, stepped one tick at a time on a worker pool

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use spate_arena::StreamConfig;
use spate_core::{CompletionToken, LaneId};
use spate_engine::{
    EngineConfig, EventConsumer, EventProducer, EventRegistry, RegistryError, RotationReport,
    Scheduler,
};
use tracing::warn;

/// Build the reference profile: default 4 KiB blocks on `lanes` lanes.
pub fn reference_profile(lanes: u16) -> EngineConfig {
    EngineConfig::new(lanes).with_stream(StreamConfig::new(lanes))
}

/// Build the stress profile: 256-byte blocks on `lanes` lanes.
///
/// Ten [`Sample`]s fill a block, so large ticks chain many blocks.
pub fn stress_profile(lanes: u16) -> EngineConfig {
    EngineConfig::new(lanes).with_stream(StreamConfig::new(lanes).with_block_size(256))
}

/// A 24-byte event.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Sample {
    /// Tick the event was written in.
    pub tick: u64,
    /// Lane it was written on.
    pub lane: u32,
    /// Index within the lane.
    pub index: u32,
    /// Deterministic payload.
    pub value: f64,
}

impl Sample {
    /// Deterministic sample for `(tick, lane, index)`.
    pub fn new(tick: u64, lane: u32, index: u32) -> Self {
        let mix = tick
            .wrapping_mul(6364136223846793005)
            .wrapping_add(u64::from(index) * 1442695040888963407);
        Self {
            tick,
            lane,
            index,
            value: (mix >> 11) as f64 / (1u64 << 53) as f64,
        }
    }
}

/// A registry with fixed producers and consumers of [`Sample`].
///
/// Each [`step`](Self::step) schedules one read task per consumer and
/// lane, one write task per producer, then rotates.
pub struct TickHarness {
    registry: EventRegistry,
    producers: Vec<EventProducer<Sample>>,
    consumers: Vec<EventConsumer<Sample>>,
    events_per_task: u32,
    consumed: Arc<AtomicU64>,
}

impl TickHarness {
    /// Build a harness on a worker pool sized by `config`.
    pub fn new(
        config: EngineConfig,
        producers: usize,
        consumers: usize,
        events_per_task: u32,
    ) -> Result<Self, RegistryError> {
        let mut registry = EventRegistry::with_worker_pool(config)?;
        let producers = (0..producers)
            .map(|_| registry.register_producer::<Sample>())
            .collect::<Result<Vec<_>, _>>()?;
        let consumers = (0..consumers)
            .map(|_| registry.register_consumer::<Sample>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            registry,
            producers,
            consumers,
            events_per_task,
            consumed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// The underlying registry.
    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Events read by consumers so far.
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Run one tick and rotate.
    pub fn step(&mut self) -> Result<RotationReport, Box<dyn Error + Send + Sync>> {
        let scheduler = Arc::clone(self.registry.scheduler());
        let lanes = self.registry.config().stream.lane_count;
        let tick = self.registry.tick().0;

        for consumer in &self.consumers {
            let (readers, dep) = consumer.get_readers(&CompletionToken::completed())?;
            let tokens: Vec<_> = (0..lanes)
                .map(|lane| {
                    let readers = readers.clone();
                    let consumed = Arc::clone(&self.consumed);
                    scheduler.schedule(
                        &dep,
                        Box::new(move |_| match readers.read_lane(LaneId(lane)) {
                            Ok(events) => {
                                consumed.fetch_add(events.len() as u64, Ordering::Relaxed);
                            }
                            Err(e) => warn!(lane, error = %e, "read task failed"),
                        }),
                    )
                })
                .collect();
            consumer.report_completion(CompletionToken::combine(tokens))?;
        }

        let count = self.events_per_task;
        for producer in &self.producers {
            let mut session = producer.open_writer()?;
            let token = scheduler.schedule(
                &CompletionToken::completed(),
                Box::new(move |lane| {
                    for i in 0..count {
                        if let Err(e) = session.write(lane, Sample::new(tick, lane.0.into(), i)) {
                            warn!(lane = lane.0, error = %e, "write task failed");
                            return;
                        }
                    }
                }),
            );
            producer.report_completion(token)?;
        }

        Ok(self.registry.rotate()?)
    }

    /// Shut the registry down, waiting for outstanding disposals.
    pub fn finish(mut self) -> Result<u64, RegistryError> {
        self.registry.shutdown()?;
        Ok(self.consumed())
    }
}
