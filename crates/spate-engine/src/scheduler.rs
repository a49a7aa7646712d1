//! Task scheduling seam.
//!
//! The registry never executes work itself: it hands deferred tasks
//! (stream disposal) to a [`Scheduler`] together with the tokens they
//! depend on. Producer and consumer tasks go through the same trait so
//! they run on stable per-worker lanes.
//!
//! [`WorkerPool`] is the stock implementation: N threads pulling jobs
//! from a crossbeam channel, worker `i` always passing `LaneId(i)` to
//! its tasks. [`ImmediateScheduler`] runs each task on whichever thread
//! completes its dependencies, for single-threaded hosts and tests.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendError, Sender};
use spate_core::{Completer, CompletionToken, LaneId};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// A unit of work. Receives the lane of the worker running it.
pub type Task = Box<dyn FnOnce(LaneId) + Send + 'static>;

/// Executes tasks once their dependencies complete.
pub trait Scheduler: Send + Sync {
    /// Number of distinct lanes tasks may be handed. Every lane passed
    /// to a task is below this.
    fn lane_count(&self) -> usize;

    /// Run `task` after `deps` completes. The returned token completes
    /// once the task has run (or panicked).
    fn schedule(&self, deps: &CompletionToken, task: Task) -> CompletionToken;
}

/// A queued task and the completer that reports it finished.
struct Job {
    task: Task,
    completer: Completer,
}

impl Job {
    fn run(self, lane: LaneId) {
        let Job { task, completer } = self;
        if panic::catch_unwind(AssertUnwindSafe(|| task(lane))).is_err() {
            warn!(lane = %lane, "scheduled task panicked");
        }
        completer.complete();
    }
}

enum Message {
    Run(Job),
    Shutdown,
}

/// Fixed-size pool of worker threads with stable lane ids.
///
/// Jobs are submitted to the channel the moment their dependencies
/// complete, so the pool never polls. Shutdown (explicit or on drop)
/// lets queued jobs finish, then joins every worker.
pub struct WorkerPool {
    sender: Option<Sender<Message>>,
    workers: Vec<JoinHandle<()>>,
    lanes: usize,
}

// Compile-time assertion: the pool is shared behind Arc<dyn Scheduler>.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<WorkerPool>();
};

impl WorkerPool {
    /// Spawn `worker_count` threads named `spate-worker-{i}`.
    pub fn new(worker_count: usize) -> Result<Self, ConfigError> {
        if worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        let lane_count =
            u16::try_from(worker_count).map_err(|_| ConfigError::WorkersExceedLanes {
                workers: worker_count,
                lanes: u16::MAX,
            })?;
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(worker_count),
            lanes: worker_count,
        };
        for i in 0..lane_count {
            let rx = receiver.clone();
            let lane = LaneId(i);
            let spawned = thread::Builder::new()
                .name(format!("spate-worker-{i}"))
                .spawn(move || worker_loop(rx, lane));
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    // Dropping `pool` joins the workers already running.
                    return Err(ConfigError::ThreadSpawnFailed {
                        reason: format!("spate-worker-{i}: {e}"),
                    });
                }
            }
        }
        debug!(workers = worker_count, "worker pool started");
        Ok(pool)
    }

    /// Number of worker threads (and lanes).
    pub fn worker_count(&self) -> usize {
        self.lanes
    }

    /// Stop accepting work, drain queued jobs, and join all workers.
    ///
    /// Returns the number of workers joined cleanly. Tasks whose
    /// dependencies complete after shutdown run inline on the completing
    /// thread with lane 0. Idempotent.
    pub fn shutdown(&mut self) -> usize {
        let Some(sender) = self.sender.take() else {
            return 0;
        };
        for _ in 0..self.workers.len() {
            let _ = sender.send(Message::Shutdown);
        }
        drop(sender);

        let mut joined = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        debug!(joined, "worker pool shut down");
        joined
    }
}

fn worker_loop(rx: Receiver<Message>, lane: LaneId) {
    while let Ok(Message::Run(job)) = rx.recv() {
        job.run(lane);
    }
}

impl Scheduler for WorkerPool {
    fn lane_count(&self) -> usize {
        self.lanes
    }

    fn schedule(&self, deps: &CompletionToken, task: Task) -> CompletionToken {
        let (token, completer) = CompletionToken::pending();
        let job = Job { task, completer };
        match &self.sender {
            Some(sender) => {
                let sender = sender.clone();
                deps.on_complete(move || {
                    if let Err(SendError(Message::Run(job))) = sender.send(Message::Run(job)) {
                        job.run(LaneId(0));
                    }
                });
            }
            None => deps.on_complete(move || job.run(LaneId(0))),
        }
        token
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs every task inline, on the thread that completes its
/// dependencies (or the scheduling thread, if already complete).
///
/// Single lane. Panics inside tasks propagate to that thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn lane_count(&self) -> usize {
        1
    }

    fn schedule(&self, deps: &CompletionToken, task: Task) -> CompletionToken {
        let (token, completer) = CompletionToken::pending();
        deps.on_complete(move || {
            task(LaneId(0));
            completer.complete();
        });
        token
    }
}
