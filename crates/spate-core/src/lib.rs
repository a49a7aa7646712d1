//! Core types and traits for Spate event streams.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the arena and the engine: lane and tick
//! identifiers, the [`Event`] marker trait for storable records, and
//! [`CompletionToken`], the composable "task finished" marker that
//! orders producers, consumers, and deferred disposal.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod id;
pub mod token;
pub mod traits;

pub use id::{HandleId, LaneId, TickId};
pub use token::{Completer, CompletionToken};
pub use traits::Event;
