//! Marker trait for records that can be stored in an event stream.

use bytemuck::Pod;

/// A record type that can be appended to and read back from a stream.
///
/// Streams store events as raw bytes inside fixed-size blocks, so an
/// event must be plain old data: no pointers, no padding bytes, and
/// every bit pattern valid. The bound is satisfied by deriving
/// `bytemuck::Pod` and `bytemuck::Zeroable` on a `#[repr(C)]` struct.
///
/// Events are written without alignment guarantees and read back with
/// an unaligned copy, so no alignment requirement is placed on `T`.
pub trait Event: Pod + Send + Sync + 'static {}

impl<T: Pod + Send + Sync + 'static> Event for T {}
