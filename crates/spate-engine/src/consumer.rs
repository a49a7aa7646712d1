//! Consumer handles.
//!
//! An [`EventConsumer`] sees the streams published in the previous
//! tick. Per tick it moves Idle → ReadRequested → Settled; rotation
//! gathers its completion into the disposal dependency of the streams
//! it read, then resets it to Idle with the new read-set.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use spate_arena::EventStream;
use spate_core::{CompletionToken, Event, HandleId};

use crate::error::ProtocolError;
use crate::producer::lock_slot;
use crate::read_set::ReadArray;

/// Per-tick state of a consumer handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    /// No read session this tick.
    Idle,
    /// A read session is open and has not reported completion.
    ReadRequested,
    /// Every read session reported completion.
    Settled,
}

/// Consumer bookkeeping shared between the handle and the container.
pub(crate) struct ConsumerSlot {
    pub(crate) streams: Vec<Arc<EventStream>>,
    /// Combined completion of last tick's producers.
    pub(crate) input: CompletionToken,
    pub(crate) completion: CompletionToken,
    /// Tokens handed out by `get_readers` this tick, combined.
    pub(crate) handed_out: CompletionToken,
    pub(crate) requested: u32,
    pub(crate) reported: u32,
    pub(crate) registered: bool,
}

impl ConsumerSlot {
    pub(crate) fn new() -> Self {
        Self {
            streams: Vec::new(),
            input: CompletionToken::completed(),
            completion: CompletionToken::completed(),
            handed_out: CompletionToken::completed(),
            requested: 0,
            reported: 0,
            registered: true,
        }
    }

    pub(crate) fn state(&self) -> ConsumerState {
        if self.requested == 0 {
            ConsumerState::Idle
        } else if self.requested > self.reported {
            ConsumerState::ReadRequested
        } else {
            ConsumerState::Settled
        }
    }

    /// Install the new read-set and return to Idle.
    pub(crate) fn reset(&mut self, read_set: &[Arc<EventStream>], input: CompletionToken) {
        self.streams.clear();
        self.streams.extend(read_set.iter().cloned());
        self.input = input;
        self.completion = CompletionToken::completed();
        self.handed_out = CompletionToken::completed();
        self.requested = 0;
        self.reported = 0;
    }
}

pub(crate) type SharedConsumerSlot = Arc<Mutex<ConsumerSlot>>;

/// Handle through which a system reads events of type `E`.
///
/// Obtained from [`EventRegistry::register_consumer`](crate::EventRegistry::register_consumer).
pub struct EventConsumer<E: Event> {
    id: HandleId,
    slot: SharedConsumerSlot,
    _event: PhantomData<fn() -> E>,
}

impl<E: Event> EventConsumer<E> {
    pub(crate) fn new(id: HandleId, slot: SharedConsumerSlot) -> Self {
        Self {
            id,
            slot,
            _event: PhantomData,
        }
    }

    /// This handle's id within its container.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Current per-tick state.
    pub fn state(&self) -> ConsumerState {
        lock_slot(&self.slot).state()
    }

    /// Number of streams in the current read-set.
    pub fn readers_count(&self) -> usize {
        lock_slot(&self.slot).streams.len()
    }

    /// Whether any producer published last tick.
    pub fn has_readers(&self) -> bool {
        self.readers_count() > 0
    }

    /// Snapshot the read-set and open a read session.
    ///
    /// Returns the streams plus `dependency` combined with the
    /// producers' completion; reading tasks must depend on that token.
    /// With the `checks` feature, a second call before
    /// [`report_completion`](Self::report_completion) fails with
    /// [`ProtocolError::ReadSessionOpen`].
    pub fn get_readers(
        &self,
        dependency: &CompletionToken,
    ) -> Result<(ReadArray<E>, CompletionToken), ProtocolError> {
        let mut slot = lock_slot(&self.slot);
        if !slot.registered {
            return Err(ProtocolError::HandleNotRegistered { handle: self.id });
        }
        if cfg!(feature = "checks") && slot.requested > slot.reported {
            return Err(ProtocolError::ReadSessionOpen {
                handle: self.id,
                requested: slot.requested,
                reported: slot.reported,
            });
        }
        slot.requested += 1;
        let readers = ReadArray::new(&slot.streams);
        let ready = dependency.and(&slot.input);
        slot.handed_out = slot.handed_out.and(&ready);
        Ok((readers, ready))
    }

    /// Record the token of the task that ran the open read session.
    ///
    /// The streams read are disposed only after this token completes.
    pub fn report_completion(&self, token: CompletionToken) -> Result<(), ProtocolError> {
        let mut slot = lock_slot(&self.slot);
        if !slot.registered {
            return Err(ProtocolError::HandleNotRegistered { handle: self.id });
        }
        if cfg!(feature = "checks") && slot.reported >= slot.requested {
            return Err(ProtocolError::UnbalancedCompletion {
                handle: self.id,
                opened: slot.requested,
                reported: slot.reported,
            });
        }
        slot.reported += 1;
        slot.completion = slot.completion.and(&token);
        Ok(())
    }
}

impl<E: Event> fmt::Debug for EventConsumer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventConsumer")
            .field("id", &self.id)
            .field("event", &std::any::type_name::<E>())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer() -> EventConsumer<u32> {
        EventConsumer::new(HandleId(7), Arc::new(Mutex::new(ConsumerSlot::new())))
    }

    #[test]
    fn fresh_consumer_has_no_readers() {
        let c = consumer();
        assert_eq!(c.state(), ConsumerState::Idle);
        assert!(!c.has_readers());
        let (readers, dep) = c.get_readers(&CompletionToken::completed()).unwrap();
        assert!(readers.is_empty());
        assert!(dep.is_complete());
        assert_eq!(c.state(), ConsumerState::ReadRequested);
    }

    #[test]
    fn reported_session_settles() {
        let c = consumer();
        let _ = c.get_readers(&CompletionToken::completed()).unwrap();
        c.report_completion(CompletionToken::completed()).unwrap();
        assert_eq!(c.state(), ConsumerState::Settled);
        // A settled consumer may read again in the same tick.
        assert!(c.get_readers(&CompletionToken::completed()).is_ok());
    }

    #[test]
    fn readers_dependency_includes_input() {
        let c = consumer();
        let (input, completer) = CompletionToken::pending();
        lock_slot(&c.slot).input = input;
        let (_, dep) = c.get_readers(&CompletionToken::completed()).unwrap();
        assert!(!dep.is_complete());
        completer.complete();
        assert!(dep.is_complete());
    }

    #[cfg(feature = "checks")]
    #[test]
    fn overlapping_read_sessions_are_rejected() {
        let c = consumer();
        let _ = c.get_readers(&CompletionToken::completed()).unwrap();
        assert_eq!(
            c.get_readers(&CompletionToken::completed()).unwrap_err(),
            ProtocolError::ReadSessionOpen {
                handle: HandleId(7),
                requested: 1,
                reported: 0
            }
        );
    }

    #[cfg(feature = "checks")]
    #[test]
    fn completion_without_session_is_unbalanced() {
        let c = consumer();
        assert_eq!(
            c.report_completion(CompletionToken::completed()).unwrap_err(),
            ProtocolError::UnbalancedCompletion {
                handle: HandleId(7),
                opened: 0,
                reported: 0
            }
        );
    }

    #[test]
    fn deregistered_consumer_is_rejected() {
        let c = consumer();
        lock_slot(&c.slot).registered = false;
        assert!(matches!(
            c.get_readers(&CompletionToken::completed()),
            Err(ProtocolError::HandleNotRegistered { .. })
        ));
    }
}
