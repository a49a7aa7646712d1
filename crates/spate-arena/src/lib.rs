//! Block allocation and lane-segmented event streams for Spate.
//!
//! An [`EventStream`] holds one producer's events for one tick. It is
//! split into lanes (one per worker), each lane a chain of fixed-size
//! blocks drawn from a shared [`BlockSource`]. Writers append to their
//! own lane without locking; readers walk lanes one at a time in write
//! order.
//!
//! # Architecture
//!
//! ```text
//! EventStream
//! ├── StreamConfig (block size, header reserve, lane count, budget)
//! ├── SharedBlockSource (Arc<dyn BlockSource>, e.g. HeapBlockSource)
//! └── LaneRange × lane_count
//!     └── LaneChain → Block[] (linked by BlockId, payload after header)
//! ```
//!
//! Records are `bytemuck::Pod` values or raw byte slices. Elements
//! never span blocks: one that does not fit starts the next block.
//!
//! # Features
//!
//! - `checks` (default): reader diagnostics for over-reads and lanes
//!   ended with data left. Bounds safety holds either way.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod block;
pub mod config;
pub mod error;
mod range;
pub mod read;
pub mod source;
pub mod stream;
pub mod write;

pub use block::{Block, BlockId, LaneChain};
pub use config::StreamConfig;
pub use error::{ArenaError, StreamError};
pub use read::StreamReader;
pub use source::{BlockSource, HeapBlockSource, SharedBlockSource};
pub use stream::EventStream;
pub use write::{LaneWriter, StreamWriter};
