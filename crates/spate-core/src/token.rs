//! Completion tokens: composable markers that an asynchronous task finished.
//!
//! A [`CompletionToken`] is the only synchronisation edge between
//! producers, consumers, and stream disposal. "Task A's writes become
//! visible to task B" is expressed by making B depend on A's token; no
//! lock or atomic is ever taken inside a stream.
//!
//! Tokens are created pending together with a [`Completer`], the linear
//! half that fires them. Tokens compose with [`CompletionToken::combine`]:
//! the combined token completes once every input has completed.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use smallvec::SmallVec;

type Callback = Box<dyn FnOnce() + Send>;

struct TokenState {
    done: bool,
    callbacks: SmallVec<[Callback; 2]>,
}

struct TokenInner {
    state: Mutex<TokenState>,
    cond: Condvar,
}

impl TokenInner {
    fn new() -> Self {
        Self {
            state: Mutex::new(TokenState {
                done: false,
                callbacks: SmallVec::new(),
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark complete, wake waiters, then run callbacks outside the lock.
    /// Idempotent.
    fn fire(&self) {
        let callbacks = {
            let mut state = self.lock();
            if state.done {
                return;
            }
            state.done = true;
            std::mem::take(&mut state.callbacks)
        };
        self.cond.notify_all();
        for callback in callbacks {
            callback();
        }
    }
}

/// Opaque marker that an asynchronous task has finished.
///
/// Cheap to clone; all clones observe the same completion. The default
/// token is already complete, which is what an idle producer or consumer
/// contributes to a combined dependency.
#[derive(Clone, Default)]
pub struct CompletionToken {
    /// `None` means complete without ever having been pending.
    inner: Option<Arc<TokenInner>>,
}

// Compile-time assertion: tokens cross task boundaries.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<CompletionToken>();
    assert::<Completer>();
};

impl CompletionToken {
    /// A token that is already complete.
    pub fn completed() -> Self {
        Self { inner: None }
    }

    /// Create a pending token and the [`Completer`] that fires it.
    pub fn pending() -> (Self, Completer) {
        let inner = Arc::new(TokenInner::new());
        (
            Self {
                inner: Some(Arc::clone(&inner)),
            },
            Completer { inner },
        )
    }

    /// Whether the task behind this token has finished.
    pub fn is_complete(&self) -> bool {
        match &self.inner {
            None => true,
            Some(inner) => inner.lock().done,
        }
    }

    /// Block the calling thread until the token completes.
    pub fn wait(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        let mut state = inner.lock();
        while !state.done {
            state = inner
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the token completes or `timeout` elapses.
    ///
    /// Returns `true` if the token completed in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(inner) = &self.inner else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        let mut state = inner.lock();
        while !state.done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = inner
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Run `f` once this token completes.
    ///
    /// If the token is already complete, `f` runs immediately on the
    /// calling thread. Otherwise it runs on whichever thread fires the
    /// token.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(inner) = &self.inner {
            let mut state = inner.lock();
            if !state.done {
                state.callbacks.push(Box::new(f));
                return;
            }
        }
        f();
    }

    /// Combine tokens into one that completes after all of them.
    ///
    /// Already-complete inputs are skipped; a single pending input is
    /// returned as-is without allocating.
    pub fn combine<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = CompletionToken>,
    {
        let pending: SmallVec<[CompletionToken; 4]> =
            tokens.into_iter().filter(|t| !t.is_complete()).collect();

        match pending.len() {
            0 => Self::completed(),
            1 => pending.into_iter().next().unwrap_or_default(),
            n => {
                let inner = Arc::new(TokenInner::new());
                let remaining = Arc::new(AtomicUsize::new(n));
                for token in &pending {
                    let inner = Arc::clone(&inner);
                    let remaining = Arc::clone(&remaining);
                    token.on_complete(move || {
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            inner.fire();
                        }
                    });
                }
                Self { inner: Some(inner) }
            }
        }
    }

    /// Shorthand for combining two tokens.
    pub fn and(&self, other: &CompletionToken) -> Self {
        Self::combine([self.clone(), other.clone()])
    }
}

impl fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionToken")
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// The firing half of a pending [`CompletionToken`].
///
/// Consumed by [`Completer::complete`]. Dropping a completer also fires
/// its token, so a task that panics or returns early never strands its
/// dependents.
#[must_use = "the paired token completes when this completer is consumed or dropped"]
pub struct Completer {
    inner: Arc<TokenInner>,
}

impl Completer {
    /// Fire the paired token, waking waiters and running callbacks.
    pub fn complete(self) {
        self.inner.fire();
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        self.inner.fire();
    }
}

impl fmt::Debug for Completer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("complete", &self.inner.lock().done)
            .finish()
    }
}
