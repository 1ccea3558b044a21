// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ClearWorker`: two independent periodic sweeps gated on wall-clock
//! time rather than tick count, so they stay on schedule regardless of
//! `WrkPauseSecs`.
//!
//! - Every 30s: scan the local KV store for `inbox:[1-9]*` keys (a
//!   per-client-process reply mailbox named by pid) and `DEL` any whose
//!   pid is no longer alive on this host.
//! - Every 120s: `PING` every address this broker currently holds a KV
//!   connection for, to keep those connections warm.

use crate::proc;
use mb_adapters::KvPoolProvider;
use mb_core::{Callback, Clock, Event, Fsm};
use parking_lot::Mutex as SyncMutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const GC_INTERVAL_SECS: u64 = 30;
const PING_INTERVAL_SECS: u64 = 120;
const INBOX_GLOB: &str = "inbox:[1-9]*";

pub struct ClearWorker {
    id: String,
    kv_pools: Arc<dyn KvPoolProvider>,
    clock: Arc<dyn Clock>,
    pause: Duration,
    shutdown: CancellationToken,
    last_gc: SyncMutex<u64>,
    last_ping: SyncMutex<u64>,
    fsm: SyncMutex<Option<Weak<Fsm>>>,
}

impl ClearWorker {
    pub fn new(
        id: impl Into<String>,
        kv_pools: Arc<dyn KvPoolProvider>,
        clock: Arc<dyn Clock>,
        pause: Duration,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            kv_pools,
            clock,
            pause,
            shutdown,
            last_gc: SyncMutex::new(0),
            last_ping: SyncMutex::new(0),
            fsm: SyncMutex::new(None),
        })
    }

    fn push_tick(&self) {
        if let Some(fsm) = self.fsm.lock().as_ref().and_then(Weak::upgrade) {
            fsm.push(Event::new(crate::worker_common::TICK));
        }
    }

    pub async fn run(self: Arc<Self>) {
        let fsm = crate::worker_common::build_tick_fsm(
            self.id.clone(),
            Arc::new(RunTick(self.clone())) as Arc<dyn Callback>,
        );
        *self.fsm.lock() = Some(Arc::downgrade(&fsm));
        match fsm.serve(self.shutdown.clone()).await {
            Ok(reason) => tracing::debug!(worker = %self.id, ?reason, "clear worker stopped"),
            Err(e) => tracing::warn!(worker = %self.id, error = %e, "clear worker fsm error"),
        }
    }

    async fn tick(&self) {
        let now = self.clock.epoch_secs();
        if now.saturating_sub(*self.last_gc.lock()) >= GC_INTERVAL_SECS {
            self.gc_dead_mailboxes().await;
            *self.last_gc.lock() = now;
        }
        if now.saturating_sub(*self.last_ping.lock()) >= PING_INTERVAL_SECS {
            self.ping_pools().await;
            *self.last_ping.lock() = now;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.pause) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    /// Runs one round of both sweeps unconditionally, for tests that
    /// drive the worker deterministically instead of through `run`.
    #[cfg(test)]
    async fn sweep_once_for_test(&self) {
        self.gc_dead_mailboxes().await;
        self.ping_pools().await;
    }

    async fn gc_dead_mailboxes(&self) {
        let kv = match self.kv_pools.get_or_create("local").await {
            Ok(kv) => kv,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, "clear worker: local kv pool unavailable");
                return;
            }
        };
        let keys = match kv.keys(INBOX_GLOB).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, "clear worker: keys scan failed");
                return;
            }
        };
        for key in keys {
            let Some(pid_str) = key.strip_prefix("inbox:") else { continue };
            let Ok(pid) = pid_str.parse::<u64>() else { continue };
            if !proc::process_exists(pid) {
                if let Err(e) = kv.del(&key).await {
                    tracing::warn!(worker = %self.id, error = %e, key = %key, "clear worker: del failed");
                } else {
                    tracing::debug!(worker = %self.id, key = %key, "clear worker: dropped dead mailbox");
                }
            }
        }
    }

    async fn ping_pools(&self) {
        for addr in self.kv_pools.addrs() {
            let kv = match self.kv_pools.get_or_create(&addr).await {
                Ok(kv) => kv,
                Err(e) => {
                    tracing::warn!(worker = %self.id, error = %e, addr = %addr, "clear worker: pool unavailable for ping");
                    continue;
                }
            };
            if let Err(e) = kv.ping().await {
                tracing::warn!(worker = %self.id, error = %e, addr = %addr, "clear worker: ping failed");
            }
        }
    }
}

struct RunTick(Arc<ClearWorker>);

#[async_trait::async_trait]
impl Callback for RunTick {
    async fn call(&self, _evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.tick().await;
        self.0.push_tick();
        Ok(())
    }
}

#[cfg(test)]
#[path = "worker_clear_tests.rs"]
mod tests;
