//! Per-event-type registry and tick rotation for Spate event streams.
//!
//! Systems register [`EventProducer`]s and [`EventConsumer`]s for an
//! event type with the [`EventRegistry`]. Each tick, producers write into
//! fresh streams; [`EventRegistry::rotate`] then publishes those streams
//! to every consumer of the type and hands last tick's streams to
//! deferred disposal, which runs only after every consumer that read
//! them reported completion.
//!
//! ```text
//! tick K:   producers write ─┐
//! rotate:                     ├─ streams(K) → read-set, dispose streams(K-1) after consumers(K-1)
//! tick K+1: consumers read ◄──┘  (input dependency = producers(K) completion)
//! ```
//!
//! Scheduling is abstracted behind [`Scheduler`]; [`WorkerPool`] runs
//! tasks on threads with stable lane ids, [`ImmediateScheduler`] inline.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod consumer;
pub mod container;
pub mod error;
pub mod metrics;
pub mod producer;
pub mod read_set;
pub mod registry;
pub mod scheduler;

pub use config::EngineConfig;
pub use consumer::{ConsumerState, EventConsumer};
pub use container::{dispose_after, EventContainer, RotationReport, Violation};
pub use error::{ConfigError, ProtocolError, RegistryError};
pub use metrics::RotationMetrics;
pub use producer::{EventProducer, ProducerState, WriteLease, WriteSession};
pub use read_set::ReadArray;
pub use registry::EventRegistry;
pub use scheduler::{ImmediateScheduler, Scheduler, Task, WorkerPool};
