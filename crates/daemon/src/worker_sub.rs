// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SubWorker`: the inbound path for one destination IP. Loops
//! `BLPOP outbox:<sub_ip>`, drops anything already dead by the time it
//! arrives, and otherwise re-injects the unpacked message onto the
//! broker's central inbound queue for `CarryWorker` to route onward.

use mb_adapters::KvClient;
use mb_core::{Callback, Clock, Event, Fsm, Msg};
use mb_queue::Queue;
use parking_lot::Mutex as SyncMutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long a single `BLPOP` is allowed to block before the worker loop
/// rechecks shutdown.
const BLPOP_TIMEOUT: Duration = Duration::from_secs(1);

pub struct SubWorker {
    id: String,
    sub_ip: String,
    kv: Arc<dyn KvClient>,
    msg_queue: Arc<Queue<Msg>>,
    clock: Arc<dyn Clock>,
    fsm: SyncMutex<Option<Weak<Fsm>>>,
}

impl SubWorker {
    pub fn new(
        id: impl Into<String>,
        sub_ip: impl Into<String>,
        kv: Arc<dyn KvClient>,
        msg_queue: Arc<Queue<Msg>>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self { id: id.into(), sub_ip: sub_ip.into(), kv, msg_queue, clock, fsm: SyncMutex::new(None) })
    }

    fn push_tick(&self) {
        if let Some(fsm) = self.fsm.lock().as_ref().and_then(Weak::upgrade) {
            fsm.push(Event::new(crate::worker_common::TICK));
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let fsm = crate::worker_common::build_tick_fsm(
            self.id.clone(),
            Arc::new(RunTick(self.clone())) as Arc<dyn Callback>,
        );
        *self.fsm.lock() = Some(Arc::downgrade(&fsm));
        match fsm.serve(shutdown).await {
            Ok(reason) => tracing::debug!(worker = %self.id, ?reason, "sub worker stopped"),
            Err(e) => tracing::warn!(worker = %self.id, error = %e, "sub worker fsm error"),
        }
    }

    async fn tick(&self) {
        let key = format!("outbox:{}", self.sub_ip);
        let bytes = match self.kv.blpop(&key, BLPOP_TIMEOUT).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, key = %key, "sub worker blpop failed");
                return;
            }
        };
        let msg = match mb_wire::unpack(&bytes) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, "sub worker: failed to unpack message");
                return;
            }
        };
        if msg.is_dead(self.clock.epoch_secs()) {
            tracing::debug!(worker = %self.id, topic = %msg.topic, "sub worker: dropping dead message");
            return;
        }
        if !self.msg_queue.push(msg, true).await {
            tracing::warn!(worker = %self.id, "sub worker: central inbound queue full, dropping message");
        }
    }
}

struct RunTick(Arc<SubWorker>);

#[async_trait::async_trait]
impl Callback for RunTick {
    async fn call(&self, _evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.tick().await;
        self.0.push_tick();
        Ok(())
    }
}

#[cfg(test)]
#[path = "worker_sub_tests.rs"]
mod tests;
