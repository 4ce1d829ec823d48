//! Worker loops that drain the shared queue and feed the consume callback.

use std::sync::Arc;

use crate::queue::{Message, SharedQueue};

/// Consume callback shared by all workers of a stateless pool.
pub(crate) type Consume<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Consume callback shared by all workers of a stateful pool. The `&mut S`
/// is always the calling worker's own state.
pub(crate) type ConsumeWithState<S, T> = Arc<dyn Fn(&mut S, T) + Send + Sync>;

/// Lifecycle hook invoked with a worker's own state.
pub(crate) type StateHook<S> = Arc<dyn Fn(&mut S) + Send + Sync>;

/// A type which receives notifications from a worker.
///
/// The pool's implementation carries a `Drop` impl, which is how worker
/// termination is observed regardless of whether the worker drained normally
/// or was killed by a panicking callback.
pub(crate) trait Listener {
    fn on_started(&mut self) {}

    fn on_task_completed(&mut self) {}
}

/// A worker thread which belongs to a pool and processes dequeued tasks.
///
/// If the consume callback panics, the panic is not caught: the worker thread
/// dies, no further tasks are dequeued by it, and only the listener's drop
/// runs on the way out.
pub(crate) struct Worker<T, L: Listener> {
    queue: Arc<SharedQueue<T>>,
    on_consume: Consume<T>,
    listener: L,
}

impl<T, L: Listener> Worker<T, L> {
    pub(crate) fn new(queue: Arc<SharedQueue<T>>, on_consume: Consume<T>, listener: L) -> Self {
        Self {
            queue,
            on_consume,
            listener,
        }
    }

    /// Run the worker loop until a shutdown signal is dequeued.
    pub(crate) fn run(mut self) {
        self.listener.on_started();

        loop {
            match self.queue.dequeue_blocking() {
                Message::Task(task) => {
                    (self.on_consume)(task);
                    self.listener.on_task_completed();
                }
                Message::Terminate => break,
            }
        }
    }
}

/// A worker thread bound to its own mutable state for its entire lifetime.
///
/// No other worker can ever observe the state, so the callbacks receive it
/// directly with no locking involved.
pub(crate) struct StatefulWorker<S, T, L: Listener> {
    queue: Arc<SharedQueue<T>>,
    state: S,
    on_consume: ConsumeWithState<S, T>,
    on_worker_start: Option<StateHook<S>>,
    on_worker_stop: Option<StateHook<S>>,
    listener: L,
}

impl<S, T, L: Listener> StatefulWorker<S, T, L> {
    pub(crate) fn new(
        queue: Arc<SharedQueue<T>>,
        state: S,
        on_consume: ConsumeWithState<S, T>,
        on_worker_start: Option<StateHook<S>>,
        on_worker_stop: Option<StateHook<S>>,
        listener: L,
    ) -> Self {
        Self {
            queue,
            state,
            on_consume,
            on_worker_start,
            on_worker_stop,
            listener,
        }
    }

    /// Run the worker loop until a shutdown signal is dequeued.
    ///
    /// The stop hook observes the state exactly once on the way out, even
    /// when the start hook or the consume callback panics.
    pub(crate) fn run(mut self) {
        // Moving the state into the guard up front makes the stop hook part
        // of thread teardown rather than normal control flow.
        let mut guard = StopGuard {
            state: self.state,
            hook: self.on_worker_stop,
        };

        self.listener.on_started();

        if let Some(hook) = self.on_worker_start.take() {
            hook(&mut guard.state);
        }

        loop {
            match self.queue.dequeue_blocking() {
                Message::Task(task) => {
                    (self.on_consume)(&mut guard.state, task);
                    self.listener.on_task_completed();
                }
                Message::Terminate => break,
            }
        }
    }
}

struct StopGuard<S> {
    state: S,
    hook: Option<StateHook<S>>,
}

impl<S> Drop for StopGuard<S> {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook(&mut self.state);
        }
    }
}
