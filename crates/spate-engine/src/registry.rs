//! The event registry: one container per event type.
//!
//! Containers are created lazily on first registration and keyed by the
//! event's `TypeId`. The registry owns the block source every stream
//! draws from and the scheduler deferred disposals run on. The host
//! loop calls [`EventRegistry::rotate`] once per tick, after the
//! producer tasks are scheduled and before the consumer tasks, and
//! [`EventRegistry::shutdown`] once at the end.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use spate_arena::{HeapBlockSource, SharedBlockSource};
use spate_core::{CompletionToken, Event, HandleId, TickId};
use tracing::{debug, error};

use crate::config::EngineConfig;
use crate::consumer::EventConsumer;
use crate::container::{join_producers, EventContainer, RotationReport, StreamFactory};
use crate::error::{ConfigError, ProtocolError, RegistryError};
use crate::metrics::RotationMetrics;
use crate::producer::EventProducer;
use crate::scheduler::{Scheduler, WorkerPool};

/// Mapping from event type to [`EventContainer`].
pub struct EventRegistry {
    config: EngineConfig,
    source: SharedBlockSource,
    factory: Arc<StreamFactory>,
    scheduler: Arc<dyn Scheduler>,
    containers: IndexMap<TypeId, EventContainer>,
    tick: TickId,
    next_handle: u32,
    last_metrics: RotationMetrics,
    shut_down: bool,
}

impl EventRegistry {
    /// Create a registry over a heap block source sized by `config`.
    pub fn new(config: EngineConfig, scheduler: Arc<dyn Scheduler>) -> Result<Self, RegistryError> {
        config.validate()?;
        let source = HeapBlockSource::shared(&config.stream, config.recycle_blocks)?;
        Self::with_block_source(config, scheduler, source)
    }

    /// Create a registry with its own [`WorkerPool`] of
    /// [`resolved_worker_count`](EngineConfig::resolved_worker_count)
    /// threads.
    pub fn with_worker_pool(config: EngineConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        let pool = WorkerPool::new(config.resolved_worker_count())?;
        Self::new(config, Arc::new(pool))
    }

    /// Create a registry over a caller-supplied block source.
    pub fn with_block_source(
        config: EngineConfig,
        scheduler: Arc<dyn Scheduler>,
        source: SharedBlockSource,
    ) -> Result<Self, RegistryError> {
        config.validate()?;
        let lanes = config.stream.lane_count;
        if scheduler.lane_count() > lanes as usize {
            return Err(ConfigError::WorkersExceedLanes {
                workers: scheduler.lane_count(),
                lanes,
            }
            .into());
        }
        let factory = Arc::new(StreamFactory::new(config.stream.clone(), Arc::clone(&source)));
        debug!(
            lanes,
            block_size = config.stream.block_size,
            scheduler_lanes = scheduler.lane_count(),
            "event registry created"
        );
        Ok(Self {
            config,
            source,
            factory,
            scheduler,
            containers: IndexMap::new(),
            tick: TickId::default(),
            next_handle: 0,
            last_metrics: RotationMetrics::default(),
            shut_down: false,
        })
    }

    /// The validated config.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The tick the next [`rotate`](Self::rotate) will close.
    pub fn tick(&self) -> TickId {
        self.tick
    }

    /// The scheduler producer and consumer tasks should run on.
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// The block source backing every stream.
    pub fn block_source(&self) -> &SharedBlockSource {
        &self.source
    }

    /// Metrics of the most recent rotation, summed over containers.
    pub fn last_metrics(&self) -> &RotationMetrics {
        &self.last_metrics
    }

    /// Number of event types with a container.
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// The container for `E`, if any handle for it was registered.
    pub fn container<E: Event>(&self) -> Option<&EventContainer> {
        self.containers.get(&TypeId::of::<E>())
    }

    /// Register a producer of `E`.
    pub fn register_producer<E: Event>(&mut self) -> Result<EventProducer<E>, RegistryError> {
        let id = self.next_handle_id()?;
        let producer = self.container_mut::<E>().create_producer::<E>(id);
        debug!(event_type = type_name::<E>(), handle = %id, "registered producer");
        Ok(producer)
    }

    /// Register a consumer of `E`. It sees the current read-set at once.
    pub fn register_consumer<E: Event>(&mut self) -> Result<EventConsumer<E>, RegistryError> {
        let id = self.next_handle_id()?;
        let consumer = self.container_mut::<E>().create_consumer::<E>(id);
        debug!(event_type = type_name::<E>(), handle = %id, "registered consumer");
        Ok(consumer)
    }

    /// Remove a producer, discarding any stream it has not published.
    pub fn deregister_producer<E: Event>(
        &mut self,
        producer: EventProducer<E>,
    ) -> Result<(), ProtocolError> {
        let handle = producer.id();
        let removed = self
            .containers
            .get_mut(&TypeId::of::<E>())
            .is_some_and(|c| c.remove_producer(handle));
        if !removed {
            return Err(ProtocolError::HandleNotRegistered { handle });
        }
        debug!(event_type = type_name::<E>(), handle = %handle, "deregistered producer");
        Ok(())
    }

    /// Remove a consumer, dropping its read-set references.
    pub fn deregister_consumer<E: Event>(
        &mut self,
        consumer: EventConsumer<E>,
    ) -> Result<(), ProtocolError> {
        let handle = consumer.id();
        let removed = self
            .containers
            .get_mut(&TypeId::of::<E>())
            .is_some_and(|c| c.remove_consumer(handle));
        if !removed {
            return Err(ProtocolError::HandleNotRegistered { handle });
        }
        debug!(event_type = type_name::<E>(), handle = %handle, "deregistered consumer");
        Ok(())
    }

    /// Rotate every container, in registration order.
    ///
    /// Waits for all producers first (bounded by
    /// [`rotation_timeout`](EngineConfig::rotation_timeout)); a stall
    /// leaves every container untouched and the tick unchanged.
    pub fn rotate(&mut self) -> Result<RotationReport, RegistryError> {
        if self.shut_down {
            return Err(RegistryError::ShutDown);
        }
        let start = Instant::now();
        let tick = self.tick;

        let producers = CompletionToken::combine(
            self.containers
                .values()
                .map(EventContainer::producer_completion),
        );
        let join_us = join_producers(&producers, tick, self.config.rotation_timeout)?;

        let mut report = RotationReport::new(tick);
        for container in self.containers.values_mut() {
            report.merge(container.rotate_joined(tick, &*self.scheduler));
        }
        report.metrics.join_us = join_us;
        report.metrics.total_us = start.elapsed().as_micros() as u64;

        debug!(
            tick = %tick,
            containers = self.containers.len(),
            published = report.metrics.streams_published,
            events = report.metrics.events_published,
            disposed = report.metrics.streams_disposed,
            violations = report.metrics.violations,
            "rotation complete"
        );
        self.last_metrics = report.metrics.clone();
        self.tick = tick.next();
        Ok(report)
    }

    /// Tear down every container and wait for all deferred disposals.
    ///
    /// Waiting is bounded by the rotation timeout, if one is configured.
    /// Handles still held by callers report
    /// [`ProtocolError::HandleNotRegistered`] afterwards. Idempotent.
    pub fn shutdown(&mut self) -> Result<(), RegistryError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let mut pending = Vec::new();
        for container in self.containers.values_mut() {
            pending.extend(container.teardown(&*self.scheduler));
        }
        self.containers.clear();
        let count = pending.len();
        let all = CompletionToken::combine(pending);

        match self.config.rotation_timeout {
            Some(limit) if !all.wait_timeout(limit) => {
                error!(pending = count, "deferred disposals did not finish at shutdown");
                return Err(RegistryError::DisposalStalled {
                    pending: count,
                    waited: limit,
                });
            }
            Some(_) => {}
            None => all.wait(),
        }
        debug!(
            live_blocks = self.source.live_blocks(),
            "event registry shut down"
        );
        Ok(())
    }

    fn container_mut<E: Event>(&mut self) -> &mut EventContainer {
        let factory = &self.factory;
        self.containers
            .entry(TypeId::of::<E>())
            .or_insert_with(|| EventContainer::new(type_name::<E>(), Arc::clone(factory)))
    }

    fn next_handle_id(&mut self) -> Result<HandleId, RegistryError> {
        if self.shut_down {
            return Err(RegistryError::ShutDown);
        }
        let id = HandleId(self.next_handle);
        self.next_handle += 1;
        Ok(id)
    }

    /// Time budget rotation allows producers, if bounded.
    pub fn rotation_timeout(&self) -> Option<Duration> {
        self.config.rotation_timeout
    }
}

impl Drop for EventRegistry {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("tick", &self.tick)
            .field("containers", &self.containers.len())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}
