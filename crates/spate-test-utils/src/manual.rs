//! A scheduler that runs tasks only when the test says so.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use spate_core::{Completer, CompletionToken, LaneId};
use spate_engine::{Scheduler, Task};

struct Queued {
    deps: CompletionToken,
    task: Task,
    completer: Completer,
}

/// Queues every scheduled task until [`run_ready`](Self::run_ready).
///
/// Tasks get lanes round-robin in scheduling order.
pub struct ManualScheduler {
    lanes: usize,
    queue: Mutex<Vec<(LaneId, Queued)>>,
    next_lane: AtomicUsize,
    ran: AtomicUsize,
}

impl ManualScheduler {
    pub fn new(lanes: usize) -> Self {
        Self {
            lanes: lanes.max(1),
            queue: Mutex::new(Vec::new()),
            next_lane: AtomicUsize::new(0),
            ran: AtomicUsize::new(0),
        }
    }

    /// Tasks scheduled and not yet run.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Tasks run since creation.
    pub fn ran(&self) -> usize {
        self.ran.load(Ordering::SeqCst)
    }

    /// Run every queued task whose dependencies are complete, repeating
    /// until none is ready. Returns how many ran.
    pub fn run_ready(&self) -> usize {
        let mut count = 0;
        loop {
            let ready: Vec<(LaneId, Queued)> = {
                let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
                let (ready, waiting) = std::mem::take(&mut *queue)
                    .into_iter()
                    .partition(|(_, q)| q.deps.is_complete());
                *queue = waiting;
                ready
            };
            if ready.is_empty() {
                return count;
            }
            for (lane, queued) in ready {
                (queued.task)(lane);
                queued.completer.complete();
                self.ran.fetch_add(1, Ordering::SeqCst);
                count += 1;
            }
        }
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Scheduler for ManualScheduler {
    fn lane_count(&self) -> usize {
        self.lanes
    }

    fn schedule(&self, deps: &CompletionToken, task: Task) -> CompletionToken {
        let (token, completer) = CompletionToken::pending();
        let lane = LaneId((self.next_lane.fetch_add(1, Ordering::SeqCst) % self.lanes) as u16);
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((
                lane,
                Queued {
                    deps: deps.clone(),
                    task,
                    completer,
                },
            ));
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn tasks_wait_for_run_ready() {
        let sched = ManualScheduler::new(2);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let token = sched.schedule(
            &CompletionToken::completed(),
            Box::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(!token.is_complete());
        assert_eq!(sched.pending(), 1);
        assert_eq!(sched.run_ready(), 1);
        assert!(token.is_complete());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chained_tasks_run_in_one_call() {
        let sched = ManualScheduler::new(1);
        let first = sched.schedule(&CompletionToken::completed(), Box::new(|_| {}));
        let second = sched.schedule(&first, Box::new(|_| {}));
        assert_eq!(sched.run_ready(), 2);
        assert!(second.is_complete());
    }

    #[test]
    fn blocked_tasks_stay_queued() {
        let sched = ManualScheduler::new(1);
        let (dep, completer) = CompletionToken::pending();
        sched.schedule(&dep, Box::new(|_| {}));
        assert_eq!(sched.run_ready(), 0);
        completer.complete();
        assert_eq!(sched.run_ready(), 1);
        assert_eq!(sched.ran(), 1);
    }
}
