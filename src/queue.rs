use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::domain::Task;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Task>,
    enqueued: usize,
    done: usize,
    closed: bool,
    abandoned: Vec<Task>,
}

impl QueueState {
    fn all_done(&self) -> bool {
        self.done >= self.enqueued
    }
}

/// FIFO of pending tasks with completion tracking.
///
/// A batch is seeded up front, then closed. Once closed, `dequeue` hands out
/// the remaining tasks and returns `None` when none are left, while
/// `await_all_done` keeps waiting until every handed-out task is marked done.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    changed: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(tasks: impl IntoIterator<Item = Task>) -> Self {
        let queue = Self::new();
        for task in tasks {
            queue.enqueue(task);
        }
        queue.close();
        queue
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, task: Task) {
        let mut state = self.lock();
        state.pending.push_back(task);
        state.enqueued += 1;
        self.changed.notify_one();
    }

    /// No more tasks will be enqueued. Idle `dequeue` callers wake up and
    /// drain what is left.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.changed.notify_all();
    }

    pub fn try_dequeue(&self) -> Option<Task> {
        self.lock().pending.pop_front()
    }

    /// Blocks until a task is available or the queue is closed and empty.
    pub fn dequeue(&self) -> Option<Task> {
        let mut state = self.lock();
        loop {
            if let Some(task) = state.pending.pop_front() {
                return Some(task);
            }
            if state.closed {
                return None;
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Dequeues a task wrapped in a guard that marks it done when dropped,
    /// panics included.
    pub fn claim(&self) -> Option<Claim<'_>> {
        self.dequeue().map(|task| Claim { task, queue: self })
    }

    pub fn mark_done(&self) {
        let mut state = self.lock();
        state.done += 1;
        if state.all_done() {
            self.changed.notify_all();
        }
    }

    pub fn await_all_done(&self) {
        let state = self.lock();
        let _state = self
            .changed
            .wait_while(state, |state| !state.all_done())
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Like `await_all_done` but gives up after `timeout`. Returns whether
    /// the batch is finished.
    pub fn await_all_done_timeout(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |state| !state.all_done())
            .unwrap_or_else(PoisonError::into_inner);
        state.all_done()
    }

    /// Tasks nobody has claimed yet.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Tasks whose claim was dropped by a panicking thread.
    pub fn take_abandoned(&self) -> Vec<Task> {
        std::mem::take(&mut self.lock().abandoned)
    }

    /// Tasks enqueued but not yet marked done, in flight ones included.
    pub fn unfinished(&self) -> usize {
        let state = self.lock();
        state.enqueued.saturating_sub(state.done)
    }

    pub fn enqueued(&self) -> usize {
        self.lock().enqueued
    }

    pub fn completed(&self) -> usize {
        self.lock().done
    }
}

pub struct Claim<'a> {
    task: Task,
    queue: &'a WorkQueue,
}

impl Deref for Claim<'_> {
    type Target = Task;

    fn deref(&self) -> &Task {
        &self.task
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.queue.lock().abandoned.push(self.task.clone());
        }
        self.queue.mark_done();
    }
}
