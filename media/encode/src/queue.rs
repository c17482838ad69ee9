use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct WorkQueueInner<T> {
    items: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

/**
    Bounded blocking queue between an encoder and its worker thread.

    `push` blocks while the queue is full, `pop` blocks while it is empty.
    After `close` both return immediately; `pop` still hands out whatever was
    queued before closing.
*/
pub(crate) struct WorkQueue<T> {
    inner: Mutex<WorkQueueInner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(WorkQueueInner {
                items: VecDeque::with_capacity(capacity.min(64)),
                capacity,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /**
        Returns false if the queue was closed and the item was dropped.
    */
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();

        while inner.items.len() >= inner.capacity && !inner.closed {
            self.not_full.wait(&mut inner);
        }

        if inner.closed {
            return false;
        }

        inner.items.push_back(item);
        self.not_empty.notify_one();
        true
    }

    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();

        while inner.items.is_empty() && !inner.closed {
            self.not_empty.wait(&mut inner);
        }

        let item = inner.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let item = inner.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }
}
