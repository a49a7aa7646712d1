//! Error types for handles, configuration, and the registry.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use spate_arena::ArenaError;
use spate_core::{HandleId, TickId};

/// Misuse of a producer or consumer handle.
///
/// Returned synchronously by the handle call that detected it. The
/// session-balance variants are only produced with the `checks` feature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// `open_writer` called while this producer already has a stream
    /// this tick.
    WriterAlreadyOpen {
        /// The producer handle.
        handle: HandleId,
    },
    /// A deferred write lease was started while another session still
    /// holds the producer's stream.
    WriterCheckedOut {
        /// The producer handle.
        handle: HandleId,
    },
    /// `get_readers` called while a previous read session on this
    /// consumer has not reported completion.
    ReadSessionOpen {
        /// The consumer handle.
        handle: HandleId,
        /// Sessions requested this tick.
        requested: u32,
        /// Completions reported this tick.
        reported: u32,
    },
    /// A session was opened without reporting the previous one, or a
    /// completion was reported with no session open.
    UnbalancedCompletion {
        /// The handle.
        handle: HandleId,
        /// Sessions opened this tick.
        opened: u32,
        /// Completions reported this tick.
        reported: u32,
    },
    /// The handle was deregistered or its registry shut down.
    HandleNotRegistered {
        /// The handle.
        handle: HandleId,
    },
    /// Creating the producer's stream failed.
    Arena(ArenaError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriterAlreadyOpen { handle } => {
                write!(f, "producer {handle} already opened a writer this tick")
            }
            Self::WriterCheckedOut { handle } => {
                write!(f, "producer {handle} stream is held by another write session")
            }
            Self::ReadSessionOpen {
                handle,
                requested,
                reported,
            } => write!(
                f,
                "consumer {handle} has an open read session \
                 ({requested} requested, {reported} reported)"
            ),
            Self::UnbalancedCompletion {
                handle,
                opened,
                reported,
            } => write!(
                f,
                "handle {handle} sessions unbalanced: {opened} opened, {reported} completions reported"
            ),
            Self::HandleNotRegistered { handle } => {
                write!(f, "handle {handle} is not registered")
            }
            Self::Arena(e) => write!(f, "stream creation failed: {e}"),
        }
    }
}

impl Error for ProtocolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for ProtocolError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

/// Errors detected while validating an [`EngineConfig`](crate::EngineConfig)
/// or building the worker pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Stream configuration is invalid.
    Arena(ArenaError),
    /// Zero worker threads requested.
    NoWorkers,
    /// More workers than lanes: two workers would share a lane.
    WorkersExceedLanes {
        /// Configured workers.
        workers: usize,
        /// Lanes per stream.
        lanes: u16,
    },
    /// `rotation_timeout` is zero.
    ZeroTimeout,
    /// A worker thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arena(e) => write!(f, "stream config: {e}"),
            Self::NoWorkers => write!(f, "worker count must be at least 1"),
            Self::WorkersExceedLanes { workers, lanes } => write!(
                f,
                "{workers} workers exceed {lanes} lanes; each worker needs its own lane"
            ),
            Self::ZeroTimeout => write!(f, "rotation timeout must be non-zero"),
            Self::ThreadSpawnFailed { reason } => {
                write!(f, "failed to spawn worker thread: {reason}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for ConfigError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

/// Errors from registry construction, rotation, and teardown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Producers did not complete within the rotation timeout. Nothing
    /// was rotated; the call may be retried.
    RotationStalled {
        /// Tick that failed to rotate.
        tick: TickId,
        /// How long rotation waited.
        waited: Duration,
    },
    /// Deferred disposals did not finish within the timeout at teardown.
    DisposalStalled {
        /// Disposal tokens still pending.
        pending: usize,
        /// How long teardown waited.
        waited: Duration,
    },
    /// The registry has been shut down.
    ShutDown,
    /// Invalid configuration.
    Config(ConfigError),
    /// Block source construction failed.
    Arena(ArenaError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RotationStalled { tick, waited } => write!(
                f,
                "rotation of tick {tick} stalled: producers incomplete after {waited:?}"
            ),
            Self::DisposalStalled { pending, waited } => write!(
                f,
                "{pending} deferred disposals still pending after {waited:?}"
            ),
            Self::ShutDown => write!(f, "registry has been shut down"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Arena(e) => write!(f, "arena: {e}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for RegistryError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ArenaError> for RegistryError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}
