//! The shared FIFO queue that all workers of a pool drain.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

use crate::error::NilTaskError;

/// A value delivered to a worker through the queue.
pub(crate) enum Message<T> {
    /// A task to be handed to the consume callback.
    Task(T),
    /// Tells exactly one worker to stop dequeuing and shut down.
    Terminate,
}

/// An unbounded FIFO queue shared by all producers and all workers of a pool.
///
/// A single mutex guards the queue contents and a single condition variable
/// signals availability. This is the only synchronization between workers;
/// everything else a worker touches is owned by that worker alone.
pub(crate) struct SharedQueue<T> {
    items: Mutex<VecDeque<Message<T>>>,
    available: Condvar,
}

impl<T> SharedQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Append a task to the tail of the queue and wake blocked workers.
    ///
    /// The empty value is rejected without touching the queue; it is reserved
    /// for [`terminate_one`](Self::terminate_one). Never blocks the caller.
    pub(crate) fn enqueue(&self, task: Option<T>) -> Result<(), NilTaskError> {
        match task {
            Some(task) => {
                self.push(Message::Task(task));
                Ok(())
            }
            None => Err(NilTaskError::new()),
        }
    }

    /// Append a single shutdown signal, stopping exactly one worker once the
    /// signal reaches the head of the queue.
    pub(crate) fn terminate_one(&self) {
        self.push(Message::Terminate);
    }

    /// Remove and return the head of the queue, blocking while it is empty.
    ///
    /// Several workers may race here after a wake. The wait predicate is
    /// re-checked under the lock, so only one of them claims the head and
    /// the rest go back to sleep.
    pub(crate) fn dequeue_blocking(&self) -> Message<T> {
        let mut items = self.items.lock().unwrap();

        loop {
            match items.pop_front() {
                Some(message) => return message,
                None => items = self.available.wait(items).unwrap(),
            }
        }
    }

    /// Get the number of messages currently waiting in the queue.
    pub(crate) fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    fn push(&self, message: Message<T>) {
        let mut items = self.items.lock().unwrap();
        items.push_back(message);

        // Broadcast wake: every blocked worker re-checks the predicate.
        self.available.notify_all();
    }
}
