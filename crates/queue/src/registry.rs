// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process-wide named-queue registry. Missing queues are
//! auto-created on first reference; `resolve_many` additionally holds a
//! builder mutex across the whole batch so two concurrent callers
//! resolving an overlapping set of names never create duplicate queues
//! for the same name.

use crate::queue::Queue;
use mb_core::Msg;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct QueueRegistry {
    default_capacity: usize,
    default_timeout: Duration,
    queues: Mutex<HashMap<String, Arc<Queue<Msg>>>>,
    builder: Mutex<()>,
}

impl QueueRegistry {
    pub fn new(default_capacity: usize, default_timeout: Duration) -> Self {
        Self {
            default_capacity,
            default_timeout,
            queues: Mutex::new(HashMap::new()),
            builder: Mutex::new(()),
        }
    }

    /// Returns the queue registered under `name`, creating it with the
    /// registry's default capacity/timeout if absent.
    pub fn get_or_create(&self, name: &str) -> Arc<Queue<Msg>> {
        if let Some(q) = self.queues.lock().get(name) {
            return q.clone();
        }
        let _guard = self.builder.lock();
        self.queues
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Queue::new(self.default_capacity, self.default_timeout)))
            .clone()
    }

    /// Resolves every name in `names` under a single hold of the builder
    /// mutex, so a batch of new queues for one `reg` call can never race
    /// with another batch that shares some of the same names.
    pub fn resolve_many(&self, names: &[String]) -> Vec<(String, Arc<Queue<Msg>>)> {
        let _guard = self.builder.lock();
        names
            .iter()
            .map(|name| {
                let q = self
                    .queues
                    .lock()
                    .entry(name.clone())
                    .or_insert_with(|| Arc::new(Queue::new(self.default_capacity, self.default_timeout)))
                    .clone();
                (name.clone(), q)
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Queue<Msg>>> {
        self.queues.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) {
        self.queues.lock().remove(name);
    }
}
