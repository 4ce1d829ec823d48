//! Implementation of the worker pools themselves.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use once_cell::sync::Lazy;

use crate::{
    error::NilTaskError,
    queue::SharedQueue,
    worker::{Consume, ConsumeWithState, Listener, StateHook, StatefulWorker, Worker},
};

#[cfg(target_has_atomic = "64")]
type AtomicCounter = std::sync::atomic::AtomicU64;

#[cfg(not(target_has_atomic = "64"))]
type AtomicCounter = std::sync::atomic::AtomicU32;

static CORE_COUNT: Lazy<usize> = Lazy::new(|| num_cpus::get().max(1));

/// A builder for constructing a customized worker pool.
///
/// # Examples
///
/// ```
/// let pool = workqueue::builder()
///     .name("my-pool")
///     .workers(2)
///     .build(|task: u32| {
///         let _ = task;
///     });
/// # pool.shutdown();
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    name: Option<String>,
    workers: Option<usize>,
    stack_size: Option<usize>,
}

impl Builder {
    /// Set a custom name prefix for the threads spawned by the pool.
    ///
    /// Each worker thread is named `"{prefix}-{index}"`, where the index is
    /// the worker's fixed identity in `0..workers`.
    ///
    /// # Panics
    ///
    /// Panics if the name contains null bytes (`\0`).
    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        let name = name.into();

        if name.as_bytes().contains(&0) {
            panic!("worker thread name must not contain null bytes");
        }

        self.name = Some(name);
        self
    }

    /// Set the number of worker threads in the pool.
    ///
    /// The count is fixed for the life of the pool; workers are spawned
    /// eagerly when the pool is built and never added or removed afterwards.
    /// If not set, one worker per available CPU core is used.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn workers(mut self, count: usize) -> Self {
        if count == 0 {
            panic!("worker count must be non-zero");
        }

        self.workers = Some(count);
        self
    }

    /// Set the size of the stack (in bytes) for the worker threads.
    ///
    /// If not specified, worker threads get the default stack size for new
    /// Rust threads.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Bind an isolated state object to every worker in the pool.
    ///
    /// The factory is invoked once per worker on the constructing thread,
    /// before that worker's thread starts, and the produced state is moved
    /// into the worker. For its entire lifetime the worker is the only thread
    /// that can observe the state, so the callbacks receive it as `&mut S`
    /// with no locking.
    ///
    /// # Examples
    ///
    /// ```
    /// let pool = workqueue::builder()
    ///     .workers(2)
    ///     .with_state(Vec::<u32>::new)
    ///     .build(|seen, task| seen.push(task));
    ///
    /// pool.enqueue(1).unwrap();
    /// pool.shutdown();
    /// ```
    pub fn with_state<S, F>(self, factory: F) -> StatefulBuilder<S>
    where
        F: FnMut() -> S + 'static,
    {
        StatefulBuilder {
            inner: self,
            factory: Box::new(factory),
            on_worker_start: None,
            on_worker_stop: None,
        }
    }

    /// Create a pool according to this configuration, spawning all of its
    /// worker threads immediately.
    ///
    /// The callback is invoked once per enqueued task, from whichever worker
    /// claims the task, with callbacks on different workers running fully
    /// concurrently. This call does not block.
    pub fn build<T, F>(self, on_consume: F) -> WorkQueue<T>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let count = self.workers.unwrap_or(*CORE_COUNT);
        let queue = Arc::new(SharedQueue::new());
        let shared = Arc::new(Shared::default());
        let on_consume: Consume<T> = Arc::new(on_consume);
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let worker = Worker::new(
                queue.clone(),
                on_consume.clone(),
                WorkerMonitor::new(index, &shared),
            );

            workers.push(
                self.thread_builder(index)
                    .spawn(move || worker.run())
                    .expect("failed to spawn worker thread"),
            );
        }

        WorkQueue {
            core: Core {
                queue,
                shared,
                workers,
            },
        }
    }

    fn thread_builder(&self, index: usize) -> thread::Builder {
        let prefix = self.name.as_deref().unwrap_or("worker");
        let mut builder = thread::Builder::new().name(format!("{}-{}", prefix, index));

        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        builder
    }
}

/// A builder for a pool whose workers each carry their own isolated state.
///
/// Created with [`Builder::with_state`].
pub struct StatefulBuilder<S> {
    inner: Builder,
    factory: Box<dyn FnMut() -> S>,
    on_worker_start: Option<StateHook<S>>,
    on_worker_stop: Option<StateHook<S>>,
}

impl<S: Send + 'static> StatefulBuilder<S> {
    /// Set a hook invoked exactly once per worker with the worker's state,
    /// after its thread starts and before its first task is consumed.
    pub fn on_worker_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut S) + Send + Sync + 'static,
    {
        self.on_worker_start = Some(Arc::new(hook));
        self
    }

    /// Set a hook invoked exactly once per worker with the worker's state,
    /// after its last task and just before its thread terminates.
    ///
    /// The hook is guaranteed to run even if the start hook or the consume
    /// callback panicked on that worker; it is the place to publish the final
    /// value of the state, which is otherwise unobservable from outside.
    pub fn on_worker_stop<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut S) + Send + Sync + 'static,
    {
        self.on_worker_stop = Some(Arc::new(hook));
        self
    }

    /// Create a pool according to this configuration, spawning all of its
    /// worker threads immediately.
    ///
    /// Each worker's state is produced by the factory before the worker
    /// thread starts, so the start hook always observes a fully constructed
    /// state. This call does not block.
    pub fn build<T, F>(mut self, on_consume: F) -> StatefulWorkQueue<T>
    where
        T: Send + 'static,
        F: Fn(&mut S, T) + Send + Sync + 'static,
    {
        let count = self.inner.workers.unwrap_or(*CORE_COUNT);
        let queue = Arc::new(SharedQueue::new());
        let shared = Arc::new(Shared::default());
        let on_consume: ConsumeWithState<S, T> = Arc::new(on_consume);
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let state = (self.factory)();
            let worker = StatefulWorker::new(
                queue.clone(),
                state,
                on_consume.clone(),
                self.on_worker_start.clone(),
                self.on_worker_stop.clone(),
                WorkerMonitor::new(index, &shared),
            );

            workers.push(
                self.inner
                    .thread_builder(index)
                    .spawn(move || worker.run())
                    .expect("failed to spawn worker thread"),
            );
        }

        StatefulWorkQueue {
            core: Core {
                queue,
                shared,
                workers,
            },
        }
    }
}

impl<S> fmt::Debug for StatefulBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatefulBuilder")
            .field("inner", &self.inner)
            .finish()
    }
}

/// A fixed-size pool of worker threads draining tasks from a shared FIFO
/// queue.
///
/// Tasks are opaque values handed to a single consume callback supplied when
/// the pool is built. Tasks leave the queue in exactly the order they were
/// enqueued, but there is no guarantee about which worker claims which task,
/// nor about the relative completion order of callbacks across workers.
///
/// # Shutdown
///
/// [`shutdown`](WorkQueue::shutdown) pushes one internal shutdown signal per
/// worker onto the tail of the queue and then blocks until every worker has
/// terminated, so all tasks enqueued before the call are consumed first.
/// Dropping the pool performs the same handshake.
///
/// # Panics in callbacks
///
/// A panicking consume callback kills the worker that invoked it. The panic
/// is not caught and no task is retried; the pool keeps running with one less
/// worker, which is observable through [`workers`](WorkQueue::workers) and
/// logged at error level.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// let sum = Arc::new(AtomicU32::new(0));
/// let pool = {
///     let sum = sum.clone();
///     workqueue::builder()
///         .workers(2)
///         .build(move |task: u32| {
///             sum.fetch_add(task, Ordering::Relaxed);
///         })
/// };
///
/// for task in 1..=4 {
///     pool.enqueue(task).unwrap();
/// }
///
/// pool.shutdown();
/// assert_eq!(sum.load(Ordering::Relaxed), 10);
/// ```
pub struct WorkQueue<T: Send + 'static> {
    core: Core<T>,
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Create a pool with the given number of workers and consume callback,
    /// using the default configuration for everything else.
    ///
    /// # Panics
    ///
    /// Panics if `workers` is zero.
    pub fn new<F>(workers: usize, on_consume: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::builder().workers(workers).build(on_consume)
    }

    /// Get a builder for creating a customized pool.
    ///
    /// Equivalent to [`builder`](crate::builder). Since `WorkQueue` is
    /// generic over the task type, this form needs the type spelled out
    /// (`WorkQueue::<u32>::builder()`); the crate-root function infers it
    /// from the consume callback instead.
    #[inline]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Append a task to the tail of the shared queue.
    ///
    /// Never blocks; the queue is unbounded. At least one idle worker is
    /// woken per call. Accepts anything convertible into `Option<T>`, so
    /// plain tasks can be passed directly; `None` is the reserved shutdown
    /// value and is rejected with the queue left unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// let pool = workqueue::WorkQueue::new(1, |_task: u32| {});
    ///
    /// assert!(pool.enqueue(1).is_ok());
    /// assert!(pool.enqueue(None).is_err());
    /// # pool.shutdown();
    /// ```
    pub fn enqueue<U: Into<Option<T>>>(&self, task: U) -> Result<(), NilTaskError> {
        self.core.queue.enqueue(task.into())
    }

    /// Get the number of workers currently alive in the pool.
    ///
    /// This starts out equal to the configured worker count and only ever
    /// decreases, when a worker is killed by a panicking callback.
    pub fn workers(&self) -> usize {
        self.core.shared.live_workers.load(Ordering::Relaxed)
    }

    /// Get the number of tasks enqueued but not yet claimed by a worker.
    ///
    /// Note that the number returned may become immediately outdated after
    /// invocation.
    pub fn queued_tasks(&self) -> usize {
        self.core.queue.len()
    }

    /// Get the number of tasks consumed by this pool since it was created.
    #[allow(clippy::useless_conversion)]
    pub fn completed_tasks(&self) -> u64 {
        self.core.shared.completed_tasks.load(Ordering::Relaxed).into()
    }

    /// Shut down this pool and block until all workers have terminated.
    ///
    /// Exactly one shutdown signal per worker is appended to the queue, so
    /// every task enqueued before this call is consumed before the workers
    /// stop. Taking the pool by value makes a double shutdown
    /// unrepresentable; dropping the pool without calling this performs the
    /// same handshake.
    pub fn shutdown(mut self) {
        self.core.shutdown();
    }
}

impl<T: Send + 'static> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("workers", &self.workers())
            .field("queued_tasks", &self.queued_tasks())
            .field("completed_tasks", &self.completed_tasks())
            .finish()
    }
}

/// A fixed-size pool of worker threads, each carrying its own isolated state,
/// draining tasks from a shared FIFO queue.
///
/// Built with [`Builder::with_state`]. Behaves like [`WorkQueue`] except that
/// the consume callback additionally receives the claiming worker's state,
/// and per-worker start/stop hooks can be registered. The state type does not
/// appear in this handle: each state object lives and dies inside its worker
/// thread, and its final value is only observable if the stop hook publishes
/// it.
///
/// # Panics in callbacks
///
/// As with [`WorkQueue`], a panicking callback kills its worker and the panic
/// is not caught. Unlike the stateless pool, the worker's stop hook is still
/// guaranteed to run with the state before the thread dies.
///
/// # Examples
///
/// ```
/// use crossbeam_channel::unbounded;
///
/// let (tx, rx) = unbounded();
/// let pool = workqueue::builder()
///     .workers(2)
///     .with_state(Vec::<u32>::new)
///     .on_worker_stop(move |seen| {
///         tx.send(seen.len()).unwrap();
///     })
///     .build(|seen, task| seen.push(task));
///
/// for task in 1..=10 {
///     pool.enqueue(task).unwrap();
/// }
///
/// pool.shutdown();
/// assert_eq!(rx.iter().take(2).sum::<usize>(), 10);
/// ```
pub struct StatefulWorkQueue<T: Send + 'static> {
    core: Core<T>,
}

impl<T: Send + 'static> StatefulWorkQueue<T> {
    /// Append a task to the tail of the shared queue.
    ///
    /// Identical to [`WorkQueue::enqueue`]: never blocks, wakes at least one
    /// idle worker, and rejects `None` with the queue left unchanged.
    pub fn enqueue<U: Into<Option<T>>>(&self, task: U) -> Result<(), NilTaskError> {
        self.core.queue.enqueue(task.into())
    }

    /// Get the number of workers currently alive in the pool.
    pub fn workers(&self) -> usize {
        self.core.shared.live_workers.load(Ordering::Relaxed)
    }

    /// Get the number of tasks enqueued but not yet claimed by a worker.
    pub fn queued_tasks(&self) -> usize {
        self.core.queue.len()
    }

    /// Get the number of tasks consumed by this pool since it was created.
    #[allow(clippy::useless_conversion)]
    pub fn completed_tasks(&self) -> u64 {
        self.core.shared.completed_tasks.load(Ordering::Relaxed).into()
    }

    /// Shut down this pool and block until all workers have terminated.
    ///
    /// Identical to [`WorkQueue::shutdown`], with each worker's stop hook
    /// firing before its thread exits.
    pub fn shutdown(mut self) {
        self.core.shutdown();
    }
}

impl<T: Send + 'static> fmt::Debug for StatefulWorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatefulWorkQueue")
            .field("workers", &self.workers())
            .field("queued_tasks", &self.queued_tasks())
            .field("completed_tasks", &self.completed_tasks())
            .finish()
    }
}

/// Machinery common to both pool flavors: the queue, the shared counters, and
/// the worker join handles.
struct Core<T: Send + 'static> {
    queue: Arc<SharedQueue<T>>,
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl<T: Send + 'static> Core<T> {
    fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        log::debug!("shutting down, signalling {} workers", self.workers.len());

        // One signal per constructed worker, even if some were killed by
        // panicking callbacks; a dead worker's signal is simply never
        // consumed and its join returns immediately.
        for _ in 0..self.workers.len() {
            self.queue.terminate_one();
        }

        for handle in self.workers.drain(..) {
            // A panicked worker already reported itself through its monitor.
            let _ = handle.join();
        }
    }
}

impl<T: Send + 'static> Drop for Core<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Counters shared by a pool handle and its worker monitors.
#[derive(Default)]
struct Shared {
    live_workers: AtomicUsize,
    completed_tasks: AtomicCounter,
}

/// Pool-side observer for a single worker thread.
///
/// Dropped when its worker's run ends for any reason, which is what keeps the
/// live worker count honest even when a callback panic kills the thread.
struct WorkerMonitor {
    index: usize,
    shared: Arc<Shared>,
}

impl WorkerMonitor {
    fn new(index: usize, shared: &Arc<Shared>) -> Self {
        shared.live_workers.fetch_add(1, Ordering::Relaxed);

        Self {
            index,
            shared: shared.clone(),
        }
    }
}

impl Listener for WorkerMonitor {
    fn on_started(&mut self) {
        log::trace!("worker {} started", self.index);
    }

    fn on_task_completed(&mut self) {
        self.shared.completed_tasks.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for WorkerMonitor {
    fn drop(&mut self) {
        self.shared.live_workers.fetch_sub(1, Ordering::Relaxed);

        if thread::panicking() {
            // The pool does not replace the worker; capacity stays reduced
            // until shutdown.
            log::error!("worker {} killed by a panicking callback", self.index);
        } else {
            log::trace!("worker {} stopped", self.index);
        }
    }
}
