// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared tick-loop scaffolding for the five background workers
//! (`CarryWorker`, `SubWorker`, `ConfWorker`, `CrontabWorker`,
//! `ClearWorker`). Each is built on [`mb_core::Fsm`] as a single-state
//! loop: `initial` falls straight through to `running`, whose own Enter
//! callback performs one iteration of work and then re-queues itself by
//! calling `Fsm::push` directly rather than chaining through `next`. That
//! distinction matters: `next`-chained events bypass `Fsm::serve`'s
//! shutdown `select!` entirely, which is fine for a terminal's bounded
//! read-process-reply cycle but wrong for an unbounded worker loop —
//! pushing onto the channel instead means every iteration boundary races
//! fairly against the shutdown token.

use mb_core::{evt_next, Callback, CallbackKey, CallbackType, Event, FlowDesc, Fsm, FsmBuilder};
use std::sync::Arc;

pub(crate) const TICK: &str = "Tick";

struct EnterInitial;

#[async_trait::async_trait]
impl Callback for EnterInitial {
    async fn call(&self, evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        evt_next(evt, TICK).map_err(|e| Box::new(e) as _)
    }
}

/// Builds a worker's tick-loop FSM. `on_tick` is the caller's `running`
/// Enter callback; it is responsible for requeuing the next tick itself
/// (see module docs).
pub(crate) fn build_tick_fsm(name: impl Into<String>, on_tick: Arc<dyn Callback>) -> Arc<Fsm> {
    FsmBuilder::new()
        .flow_desc(FlowDesc::new(TICK, vec!["initial".into(), "running".into()], "running"))
        .on(CallbackKey::new("initial", CallbackType::Enter), Arc::new(EnterInitial))
        .on(CallbackKey::new("running", CallbackType::Enter), on_tick)
        .build(name, "initial")
}
