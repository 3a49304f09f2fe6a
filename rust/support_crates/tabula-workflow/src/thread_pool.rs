//! Thread pool for concurrent task execution.
//!
//! This module provides a cloneable handle to a pool of worker threads. Work items are
//! submitted in a fire-and-forget manner; callers that need to observe completion do so
//! through a higher-level primitive such as [`crate::task_group::ThreadedTaskGroup`].

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicUsize, Ordering},
};

/// A thread pool for executing concurrent tasks.
///
/// `ThreadPool` manages a fixed set of worker threads backed by a `rayon` pool.
///
/// ## Cloning
///
/// `ThreadPool` implements [`Clone`] and all clones share the same underlying
/// worker threads. This allows multiple task groups to submit work to one pool.
///
/// ## Thread Safety
///
/// All methods on `ThreadPool` are thread-safe and can be called concurrently
/// from multiple threads, including from tasks running on the pool itself.
#[derive(Clone)]
pub struct ThreadPool(Arc<rayon::ThreadPool>);

impl ThreadPool {
    /// Creates a new `ThreadPool` with the specified number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0 or if the worker threads cannot be spawned.
    pub fn new(num_threads: usize) -> Self {
        Self::with_thread_name(num_threads, |i| format!("tabula-worker-{i}"))
    }

    /// Creates a new `ThreadPool` with the specified number of worker threads and custom
    /// thread names.
    ///
    /// The provided `thread_name` function is called for each thread with its 0-based
    /// index. Thread names show up in debuggers, profilers and panic messages.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0 or if the worker threads cannot be spawned.
    pub fn with_thread_name(
        num_threads: usize,
        thread_name: impl FnMut(usize) -> String + 'static,
    ) -> Self {
        assert_ne!(num_threads, 0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(thread_name)
            .panic_handler(|_| log::error!("task panicked on a worker thread"))
            .build()
            .expect("spawn worker threads");
        ThreadPool(Arc::new(pool))
    }

    /// Configures the size of the global `ThreadPool`.
    ///
    /// Must be called before the first call to [`global()`](Self::global) to take
    /// effect. Values less than 1 are clamped to 1.
    pub fn configure_global_pool_size(pool_size: usize) {
        let pool_size = pool_size.max(1);
        GLOBAL_POOL_SIZE.store(pool_size, Ordering::SeqCst);
    }

    /// Returns a reference to the global `ThreadPool` instance.
    ///
    /// The global pool is lazily initialized on the first call. Its size is either the
    /// value set via [`configure_global_pool_size()`](Self::configure_global_pool_size),
    /// or `available_parallelism * 1.5` (rounded up), or 8 if the CPU count cannot be
    /// determined.
    pub fn global() -> &'static ThreadPool {
        static POOL: OnceLock<ThreadPool> = OnceLock::new();
        POOL.get_or_init(|| ThreadPool::new(Self::get_global_pool_size()))
    }

    /// Creates a new `ThreadPool` with one worker per logical CPU (8 if unknown).
    pub fn with_default_threads() -> Self {
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8);
        Self::new(num_threads)
    }

    /// Number of worker threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.0.current_num_threads()
    }

    /// Spawns a task on the thread pool without waiting for the result.
    ///
    /// The provided function `f` will be executed on one of the worker threads.
    /// A panic inside `f` is logged and does not take down the worker.
    pub fn spawn_detached<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.0.spawn(f);
    }

    fn get_global_pool_size() -> usize {
        let size = GLOBAL_POOL_SIZE.load(Ordering::SeqCst);
        if size == 0 {
            std::thread::available_parallelism()
                .map(|n| (n.get() * 3).div_ceil(2))
                .unwrap_or(8)
        } else {
            size
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::with_default_threads()
    }
}

/// Configured size for the global pool; 0 means "derive from CPU count".
static GLOBAL_POOL_SIZE: AtomicUsize = AtomicUsize::new(0);
