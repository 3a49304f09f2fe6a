//! Task groups: submit units of fallible work, then join them at a single point.
//!
//! A [`TaskGroup`] accepts tasks through [`append`](TaskGroup::append) and exposes a
//! blocking [`finish`](TaskGroup::finish) that waits until every appended task has
//! completed and reports the first failure, if any.
//!
//! ## Failure Policy
//!
//! Once any task has failed, tasks appended (or dequeued) afterwards are skipped.
//! Tasks already running are allowed to complete; their outcome is discarded.
//! A panicking task is recorded as a failure rather than leaving `finish` waiting.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tabula_common::{Result, error::Error};

use crate::thread_pool::ThreadPool;

/// A unit of work submitted to a [`TaskGroup`].
pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Scheduling capability shared by the serial and threaded task groups.
pub trait TaskGroup: Send + Sync {
    /// Submits a task. Never blocks waiting for other tasks.
    fn append(&self, task: Task);

    /// Waits for all submitted tasks to complete and returns the first failure.
    ///
    /// Once a task has failed, every later call returns that same failure.
    fn finish(&self) -> Result<()>;

    /// Returns `true` if no task has failed so far.
    fn ok(&self) -> bool;

    /// The first failure recorded so far, if any.
    fn failure(&self) -> Option<Error>;

    /// Returns `true` if the group has been joined and nothing was appended since.
    fn is_finished(&self) -> bool;

    /// Maximum number of tasks that may execute concurrently.
    fn parallelism(&self) -> usize;
}

/// Creates a task group that runs every task inline on the caller's thread.
pub fn make_serial() -> Arc<dyn TaskGroup> {
    Arc::new(SerialTaskGroup::new())
}

/// Creates a task group that dispatches tasks to the given pool.
pub fn make_threaded(pool: ThreadPool) -> Arc<dyn TaskGroup> {
    Arc::new(ThreadedTaskGroup::new(pool))
}

#[derive(Default)]
struct Progress {
    pending: usize,
    /// The first failure; kept for the lifetime of the group.
    first_error: Option<Error>,
    finished: bool,
}

impl Progress {
    fn ok(&self) -> bool {
        self.first_error.is_none()
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            if self.first_error.is_none() {
                log::debug!("task failed: {e}");
                self.first_error = Some(e);
            } else {
                log::debug!("discarding failure of a concurrent task: {e}");
            }
        }
    }

    fn start(&mut self) -> bool {
        if !self.ok() {
            log::warn!("skipping task appended after an earlier failure");
            return false;
        }
        self.finished = false;
        true
    }

    fn join(&mut self) -> Result<()> {
        debug_assert_eq!(self.pending, 0);
        self.finished = true;
        match &self.first_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

fn lock(progress: &Mutex<Progress>) -> MutexGuard<'_, Progress> {
    progress.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs each task to completion inside [`append`](TaskGroup::append).
#[derive(Default)]
pub struct SerialTaskGroup {
    progress: Mutex<Progress>,
}

impl SerialTaskGroup {
    pub fn new() -> SerialTaskGroup {
        SerialTaskGroup::default()
    }
}

impl TaskGroup for SerialTaskGroup {
    fn append(&self, task: Task) {
        if !lock(&self.progress).start() {
            return;
        }
        // The lock is released while the task runs: tasks may append more work.
        let result = task();
        lock(&self.progress).record(result);
    }

    fn finish(&self) -> Result<()> {
        lock(&self.progress).join()
    }

    fn ok(&self) -> bool {
        lock(&self.progress).ok()
    }

    fn failure(&self) -> Option<Error> {
        lock(&self.progress).first_error.clone()
    }

    fn is_finished(&self) -> bool {
        lock(&self.progress).finished
    }

    fn parallelism(&self) -> usize {
        1
    }
}

struct Shared {
    progress: Mutex<Progress>,
    all_done: Condvar,
}

/// Dispatches tasks to a [`ThreadPool`]; [`finish`](TaskGroup::finish) blocks on a
/// condition variable until the pending count drops to zero.
pub struct ThreadedTaskGroup {
    pool: ThreadPool,
    shared: Arc<Shared>,
}

impl ThreadedTaskGroup {
    pub fn new(pool: ThreadPool) -> ThreadedTaskGroup {
        ThreadedTaskGroup {
            pool,
            shared: Arc::new(Shared {
                progress: Mutex::new(Progress::default()),
                all_done: Condvar::new(),
            }),
        }
    }
}

impl TaskGroup for ThreadedTaskGroup {
    fn append(&self, task: Task) {
        {
            let mut progress = lock(&self.shared.progress);
            if !progress.start() {
                return;
            }
            progress.pending += 1;
        }

        let shared = self.shared.clone();
        self.pool.spawn_detached(move || {
            let mut completion = Completion {
                shared,
                result: None,
            };
            if lock(&completion.shared.progress).ok() {
                completion.result = Some(task());
            } else {
                completion.result = Some(Ok(()));
            }
        });
    }

    fn finish(&self) -> Result<()> {
        let mut progress = lock(&self.shared.progress);
        while progress.pending > 0 {
            progress = self
                .shared
                .all_done
                .wait(progress)
                .unwrap_or_else(PoisonError::into_inner);
        }
        progress.join()
    }

    fn ok(&self) -> bool {
        lock(&self.shared.progress).ok()
    }

    fn failure(&self) -> Option<Error> {
        lock(&self.shared.progress).first_error.clone()
    }

    fn is_finished(&self) -> bool {
        let progress = lock(&self.shared.progress);
        progress.finished && progress.pending == 0
    }

    fn parallelism(&self) -> usize {
        self.pool.num_threads()
    }
}

/// Settles one pending task on drop, including when the task panicked.
struct Completion {
    shared: Arc<Shared>,
    result: Option<Result<()>>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let result = self
            .result
            .take()
            .unwrap_or_else(|| Err(Error::invalid_state("task panicked")));
        let mut progress = lock(&self.shared.progress);
        progress.record(result);
        progress.pending -= 1;
        if progress.pending == 0 {
            self.shared.all_done.notify_all();
        }
    }
}
