//! Spate: segmented, lane-parallel event streams for tick-based systems.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Spate sub-crates. For most users, adding `spate` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use spate::prelude::*;
//!
//! let mut registry =
//!     EventRegistry::new(EngineConfig::new(1), Arc::new(ImmediateScheduler)).unwrap();
//! let producer = registry.register_producer::<u32>().unwrap();
//! let consumer = registry.register_consumer::<u32>().unwrap();
//!
//! // Tick 0: write and publish.
//! let mut session = producer.open_writer().unwrap();
//! session.write(LaneId(0), 7).unwrap();
//! session.close();
//! producer.report_completion(CompletionToken::completed()).unwrap();
//! registry.rotate().unwrap();
//!
//! // Tick 1: consumers see what tick 0 published.
//! let (readers, _dep) = consumer.get_readers(&CompletionToken::completed()).unwrap();
//! assert_eq!(readers.to_vec().unwrap(), vec![7]);
//! consumer.report_completion(CompletionToken::completed()).unwrap();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `spate-core` | IDs, completion tokens, the `Event` bound |
//! | [`arena`] | `spate-arena` | Block sources, `EventStream`, lane writers and readers |
//! | [`engine`] | `spate-engine` | Registry, producer/consumer handles, schedulers |
//!
//! # Features
//!
//! `checks` (default) enables session-balance diagnostics and the
//! reader's drained-lane checks.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core IDs, completion tokens, and the event bound (`spate-core`).
pub use spate_core as types;

/// Block-chained event streams (`spate-arena`).
///
/// Use directly when a single stream without tick rotation is enough:
/// [`arena::EventStream`] with an [`arena::HeapBlockSource`].
pub use spate_arena as arena;

/// Registry, handles, and scheduling (`spate-engine`).
///
/// [`engine::EventRegistry`] is the entry point; [`engine::WorkerPool`]
/// is the default [`engine::Scheduler`].
pub use spate_engine as engine;

/// Common imports for typical Spate usage.
///
/// ```rust
/// use spate::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use spate_core::{CompletionToken, Event, HandleId, LaneId, TickId};

    // Streams
    pub use spate_arena::{EventStream, HeapBlockSource, StreamConfig, StreamReader};

    // Errors
    pub use spate_arena::{ArenaError, StreamError};
    pub use spate_engine::{ProtocolError, RegistryError};

    // Engine
    pub use spate_engine::{
        EngineConfig, EventConsumer, EventProducer, EventRegistry, ImmediateScheduler, ReadArray,
        RotationReport, Scheduler, WorkerPool, WriteSession,
    };
}
