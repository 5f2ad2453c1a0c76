//! Bounded worker pool: a fixed number of threads pull closures off a
//! shared queue. `wait_all` blocks (with an optional timeout) until every
//! submitted task has finished, which is what the batch command uses to
//! know when a directory walk is done without joining threads mid-run.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::{ImageToolError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<State>,
    work_available: Condvar,
    work_done: Condvar,
}

struct State {
    jobs: VecDeque<Job>,
    pending: usize,
    shutdown: bool,
}

pub struct Pool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Spawns `threads` workers (clamped to at least 1).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(State {
                jobs: VecDeque::new(),
                pending: 0,
                shutdown: false,
            }),
            work_available: Condvar::new(),
            work_done: Condvar::new(),
        });

        let workers = (0..threads)
            .map(|id| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("pixie-worker-{id}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Enqueue a job. Increments the pending count under the same lock
    /// that guards the queue, so a concurrent `wait_all` never observes a
    /// job in the queue without it being counted as pending.
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.queue.lock().unwrap();
        state.jobs.push_back(Box::new(job));
        state.pending += 1;
        drop(state);
        self.shared.work_available.notify_one();
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().unwrap().pending
    }

    /// Block until every enqueued job has completed, or until `timeout`
    /// elapses.
    pub fn wait_all(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let state = self.shared.queue.lock().unwrap();
        let (state, result) = self
            .shared
            .work_done
            .wait_timeout_while(state, timeout, |s| s.pending > 0)
            .unwrap();

        if state.pending > 0 || result.timed_out() {
            let remaining = state.pending;
            let _ = deadline; // documents intent; wait_timeout_while already enforces it
            return Err(ImageToolError::PoolTimeout(remaining));
        }
        Ok(())
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut state = shared.queue.lock().unwrap();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break Some(job);
                }
                if state.shutdown {
                    break None;
                }
                state = shared.work_available.wait(state).unwrap();
            }
        };

        let Some(job) = job else { break };

        job();

        let mut state = shared.queue.lock().unwrap();
        state.pending -= 1;
        let done = state.pending == 0;
        drop(state);
        if done {
            shared.work_done.notify_all();
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.queue.lock().unwrap();
            state.shutdown = true;
        }
        self.shared.work_available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_every_enqueued_job() {
        let pool = Pool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..200 {
            let counter = Arc::clone(&counter);
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait_all(Duration::from_secs(5)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn wait_all_returns_immediately_when_idle() {
        let pool = Pool::new(2);
        pool.wait_all(Duration::from_millis(50)).unwrap();
    }

    #[test]
    fn timeout_reports_pending_count() {
        let pool = Pool::new(1);
        pool.enqueue(|| std::thread::sleep(Duration::from_millis(300)));
        pool.enqueue(|| std::thread::sleep(Duration::from_millis(300)));
        let err = pool.wait_all(Duration::from_millis(20)).unwrap_err();
        match err {
            ImageToolError::PoolTimeout(n) => assert!(n >= 1),
            other => panic!("expected PoolTimeout, got {other:?}"),
        }
        // Let the pool actually finish before drop to keep the test tidy.
        pool.wait_all(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn drop_joins_workers_without_losing_queued_work() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = Pool::new(3);
            for _ in 0..50 {
                let counter = Arc::clone(&counter);
                pool.enqueue(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
            pool.wait_all(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }
}
