// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `CarryWorker`: pops from the broker's central inbound queue and fans
//! each message out by action.
//!
//! - `req`: RPUSH onto the destination's `inbox:<topic>` — a request
//!   mailbox some other service polls; delivery ends here.
//! - `job`: enqueue onto the job server tube named after the message,
//!   then synthesize a `res` reply (`"ok"`, or a `500` carrying the
//!   error) and run it straight back through the `res` path below.
//! - `res`: the RID's `pid` prefix names the terminal the reply belongs
//!   to. When the destination is this broker, deliver directly onto
//!   that terminal's private reply queue; otherwise (a remote broker, not
//!   reachable by the only shipped [`Router`]) RPUSH onto its
//!   `inbox:<pid>` mailbox instead.

use crate::router::Router;
use mb_adapters::{JobPoolProvider, KvPoolProvider};
use mb_core::{Action, Callback, Event, Fsm, Msg};
use mb_queue::{Queue, QueueRegistry};
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

pub struct CarryWorker {
    id: String,
    msg_queue: Arc<Queue<Msg>>,
    registry: Arc<QueueRegistry>,
    kv_pools: Arc<dyn KvPoolProvider>,
    job_pools: Arc<dyn JobPoolProvider>,
    router: Arc<dyn Router>,
    local_id: String,
    fsm: SyncMutex<Option<Weak<Fsm>>>,
}

impl CarryWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        msg_queue: Arc<Queue<Msg>>,
        registry: Arc<QueueRegistry>,
        kv_pools: Arc<dyn KvPoolProvider>,
        job_pools: Arc<dyn JobPoolProvider>,
        router: Arc<dyn Router>,
        local_id: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            msg_queue,
            registry,
            kv_pools,
            job_pools,
            router,
            local_id: local_id.into(),
            fsm: SyncMutex::new(None),
        })
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
            Ok(reason) => tracing::debug!(worker = %self.id, ?reason, "carry worker stopped"),
            Err(e) => tracing::warn!(worker = %self.id, error = %e, "carry worker fsm error"),
        }
    }

    async fn tick(&self) {
        let (msg, ok) = self.msg_queue.pop(true).await;
        if !ok {
            return;
        }
        let Some(msg) = msg else {
            return;
        };
        match msg.action {
            Action::Req => self.carry_req(msg).await,
            Action::Job => self.carry_job(msg).await,
            Action::Res => self.carry_res(msg).await,
        }
    }

    fn destination(&self, msg: &Msg) -> String {
        if msg.channel.is_empty() {
            self.local_id.clone()
        } else {
            msg.channel.clone()
        }
    }

    async fn carry_req(&self, mut msg: Msg) {
        msg.fill_with_req(&self.local_id, &self.local_id);
        let dest = self.destination(&msg);
        let key = format!("inbox:{}", msg.topic);
        let kv = match self.kv_pools.get_or_create(&dest).await {
            Ok(kv) => kv,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, dest = %dest, "carry req: kv pool unavailable");
                return;
            }
        };
        let bytes = match mb_wire::pack(&msg) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, "carry req: pack failed");
                return;
            }
        };
        if let Err(e) = kv.rpush(&key, bytes).await {
            tracing::warn!(worker = %self.id, error = %e, key = %key, "carry req: rpush failed");
        }
    }

    async fn carry_job(&self, mut msg: Msg) {
        msg.fill_with_req(&self.local_id, &self.local_id);
        let (pri, delay, ttr) = msg.job_code();
        let tube = msg.tube_name();
        let dest = self.destination(&msg);
        let bytes = match mb_wire::pack(&msg) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, "carry job: pack failed");
                return;
            }
        };
        let put_result = self.job_pools.put(&dest, &tube, bytes, pri, delay, ttr).await;

        let mut reply = msg.clone_for(Action::Res);
        match put_result {
            Ok(_job_id) => reply.data = Value::String("ok".to_string()),
            Err(e) => {
                reply.code = "500".to_string();
                reply.data = Value::String(e.to_string());
            }
        }
        self.carry_res(reply).await;
    }

    async fn carry_res(&self, msg: Msg) {
        let pid = match msg.pid_of_rid() {
            Ok(pid) => pid.to_string(),
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, "carry res: malformed rid, dropping");
                return;
            }
        };
        let dest = self.destination(&msg);

        if self.router.is_local(&dest) {
            let Some(queue) = self.registry.get(&pid) else {
                tracing::debug!(worker = %self.id, tid = %pid, "carry res: no local terminal registered, dropping");
                return;
            };
            if !queue.push(msg, true).await {
                tracing::warn!(worker = %self.id, tid = %pid, "carry res: terminal reply queue full, dropping");
            }
            return;
        }

        let key = format!("inbox:{pid}");
        let kv = match self.kv_pools.get_or_create(&dest).await {
            Ok(kv) => kv,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, dest = %dest, "carry res: kv pool unavailable");
                return;
            }
        };
        let bytes = match mb_wire::pack(&msg) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, "carry res: pack failed");
                return;
            }
        };
        if let Err(e) = kv.rpush(&key, bytes).await {
            tracing::warn!(worker = %self.id, error = %e, key = %key, "carry res: rpush failed");
        }
    }
}

struct RunTick(Arc<CarryWorker>);

#[async_trait::async_trait]
impl Callback for RunTick {
    async fn call(&self, _evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.tick().await;
        self.0.push_tick();
        Ok(())
    }
}

#[cfg(test)]
#[path = "worker_carry_tests.rs"]
mod tests;
