// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-in reader over a fixed list of named queues. Readiness among the
//! ready subset is chosen uniformly at random, never by construction
//! order, with a single timeout covering the whole wait.

use crate::queue::Queue;
use crate::registry::QueueRegistry;
use futures::future::select_all;
use mb_core::Msg;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct MultiPoper {
    queues: Vec<(String, Arc<Queue<Msg>>)>,
    timeout: Duration,
}

impl MultiPoper {
    /// Resolves `names` against `registry` (auto-creating any missing
    /// queue) and builds a poper over them.
    pub fn new(registry: &QueueRegistry, names: &[String], timeout: Duration) -> Self {
        Self { queues: registry.resolve_many(names), timeout }
    }

    pub fn names(&self) -> Vec<&str> {
        self.queues.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Waits up to this poper's timeout for any one of its queues to
    /// yield a message, picking uniformly at random among whichever
    /// queues are ready at the moment of the check.
    pub async fn pop(&self) -> (Option<Msg>, bool) {
        let deadline = Instant::now() + self.timeout;
        loop {
            let mut ready: Vec<usize> =
                (0..self.queues.len()).filter(|&i| self.queues[i].1.has_ready()).collect();
            if !ready.is_empty() {
                ready.shuffle(&mut rand::thread_rng());
                for idx in ready {
                    let (popped, ok) = self.queues[idx].1.pop(false).await;
                    if ok {
                        return (popped, true);
                    }
                    // Lost the race to another poper sharing this queue; try the next candidate.
                }
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return (None, false);
            }
            if self.queues.is_empty() {
                tokio::time::sleep(remaining).await;
                return (None, false);
            }

            let waiters: Vec<_> = self.queues.iter().map(|(_, q)| Box::pin(q.notified())).collect();
            if tokio::time::timeout(remaining, select_all(waiters)).await.is_err() {
                return (None, false);
            }
            // Something changed on one of the queues; loop back and re-check readiness.
        }
    }
}

#[cfg(test)]
#[path = "multi_tests.rs"]
mod tests;
