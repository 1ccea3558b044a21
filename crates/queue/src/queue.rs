// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A bounded queue with a fixed per-operation timeout and blocking /
//! non-blocking push and pop.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

pub struct Queue<T> {
    capacity: usize,
    timeout: Duration,
    items: Mutex<VecDeque<T>>,
    item_available: Notify,
    slot_available: Notify,
}

impl<T: Clone> Queue<T> {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            capacity,
            timeout,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            item_available: Notify::new(),
            slot_available: Notify::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_push(&self, item: T) -> bool {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return false;
        }
        items.push_back(item);
        true
    }

    fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Non-blocking peek used by `MultiPoper` to test readiness without
    /// consuming.
    pub(crate) fn has_ready(&self) -> bool {
        !self.items.lock().is_empty()
    }

    /// A future that resolves the next time an item is pushed, used by
    /// `MultiPoper` to fan in across several queues without busy-polling.
    pub(crate) fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.item_available.notified()
    }

    /// Pushes `item`. When `blocking` is true, waits up to this queue's
    /// timeout for a free slot; when false, fails immediately on a full
    /// queue.
    pub async fn push(&self, item: T, blocking: bool) -> bool {
        if self.try_push(item.clone()) {
            self.item_available.notify_waiters();
            return true;
        }
        if !blocking {
            return false;
        }
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let notified = self.slot_available.notified();
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return false;
            }
            if self.try_push(item.clone()) {
                self.item_available.notify_waiters();
                return true;
            }
        }
    }

    /// Pops the next item. When `blocking` is true, waits up to this
    /// queue's timeout for an item; when false, returns immediately.
    pub async fn pop(&self, blocking: bool) -> (Option<T>, bool) {
        if let Some(item) = self.try_pop() {
            self.slot_available.notify_waiters();
            return (Some(item), true);
        }
        if !blocking {
            return (None, false);
        }
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return (None, false);
            }
            let notified = self.item_available.notified();
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return (None, false);
            }
            if let Some(item) = self.try_pop() {
                self.slot_available.notify_waiters();
                return (Some(item), true);
            }
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
