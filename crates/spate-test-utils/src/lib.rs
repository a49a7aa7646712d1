//! Test fixtures and a step-driven scheduler for Spate development.
//!
//! - [`fixtures`]: a mixed-field [`Impact`] event, small stream and
//!   engine configs, and helpers that fill streams.
//! - [`ManualScheduler`]: queues tasks and runs them only when asked,
//!   so tests control exactly when producers, consumers, and disposals
//!   complete.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
mod manual;

pub use fixtures::{engine_config, small_stream_config, Impact};
pub use manual::ManualScheduler;
