// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic event-driven finite-state-machine engine used to structure
//! every long-running actor (terminal, cron driver, workers).
//!
//! A `Fsm` holds a name, current state, an unbounded FIFO event queue, a
//! flow table `(srcState, eventName) -> dstState`, and a callback map
//! keyed by `(state-or-wildcard, Enter|Leave|Stop)`. `serve` drives the
//! loop; callbacks communicate failure via `Result`, and a genuine Rust
//! panic inside a callback is caught the same way a caught failure would
//! be in the source this engine is modeled on.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const START_FSM: &str = "START-FSM";
pub const STOP_FSM: &str = "STOP-FSM";
const WILDCARD_STATE: &str = "*";

#[derive(Debug, Error)]
pub enum FsmError {
    #[error("callback for state {state:?} ({kind:?}) failed: {source}")]
    Callback { state: String, kind: CallbackType, source: Box<dyn std::error::Error + Send + Sync> },
    #[error("callback for state {state:?} ({kind:?}) panicked")]
    CallbackPanicked { state: String, kind: CallbackType },
    #[error("serve() called more than once on this Fsm")]
    AlreadyServing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackType {
    Enter,
    Leave,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackKey {
    pub state: String,
    pub kind: CallbackType,
}

impl CallbackKey {
    pub fn new(state: impl Into<String>, kind: CallbackType) -> Self {
        Self { state: state.into(), kind }
    }

    pub fn wildcard(kind: CallbackType) -> Self {
        Self::new(WILDCARD_STATE, kind)
    }
}

/// `(Event, SrcStates[], Dst)`: one row of the transition table.
#[derive(Debug, Clone)]
pub struct FlowDesc {
    pub evt: String,
    pub src_list: Vec<String>,
    pub dst: String,
}

impl FlowDesc {
    pub fn new(evt: impl Into<String>, src_list: Vec<String>, dst: impl Into<String>) -> Self {
        Self { evt: evt.into(), src_list, dst: dst.into() }
    }
}

/// A unit of work flowing through the FSM. A callback may populate
/// `next` to cause the engine to synthesize a follow-on event
/// immediately after the current transition commits, ahead of any
/// externally-queued event.
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub name: String,
    pub args: Vec<Value>,
    pub service: String,
    pub next: Option<Box<Event>>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), args: Vec::new(), service: String::new(), next: None }
    }

    pub fn with_args(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self { name: name.into(), args, service: String::new(), next: None }
    }
}

/// Schedules `name` as the event dispatched immediately after the
/// current transition, ahead of anything already queued externally.
/// The standard pattern for an enter-callback to chain a follow-on
/// transition and return "no error".
pub fn evt_next(evt: &mut Event, name: impl Into<String>) -> Result<(), FsmError> {
    evt.next = Some(Box::new(Event::new(name)));
    Ok(())
}

#[async_trait]
pub trait Callback: Send + Sync {
    async fn call(&self, evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Wraps a plain closure as a `Callback` so simple transitions don't need
/// a named struct.
pub struct FnCallback<F>(pub F);

#[async_trait]
impl<F> Callback for FnCallback<F>
where
    F: Fn(&mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync,
{
    async fn call(&self, evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (self.0)(evt)
    }
}

#[derive(Debug)]
pub enum StopReason {
    /// The FSM observed an explicit `STOP-FSM` event.
    StopEvent,
    /// A callback returned `Err` or panicked.
    Failure(FsmError),
    /// The cancellation token fired.
    Shutdown,
    /// The event channel's last sender was dropped.
    ChannelClosed,
}

pub struct FsmBuilder {
    flow: HashMap<(String, String), String>,
    callbacks: HashMap<CallbackKey, Arc<dyn Callback>>,
}

impl Default for FsmBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FsmBuilder {
    pub fn new() -> Self {
        Self { flow: HashMap::new(), callbacks: HashMap::new() }
    }

    pub fn flow_desc(mut self, desc: FlowDesc) -> Self {
        for src in &desc.src_list {
            self.flow.insert((src.clone(), desc.evt.clone()), desc.dst.clone());
        }
        self
    }

    pub fn on(mut self, key: CallbackKey, cb: Arc<dyn Callback>) -> Self {
        self.callbacks.insert(key, cb);
        self
    }

    pub fn build(self, name: impl Into<String>, initial_state: impl Into<String>) -> Arc<Fsm> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Fsm {
            name: name.into(),
            initial_state: initial_state.into(),
            flow: self.flow,
            callbacks: self.callbacks,
            tx,
            rx: parking_lot::Mutex::new(Some(rx)),
            pending_next: parking_lot::Mutex::new(None),
        })
    }
}

pub struct Fsm {
    name: String,
    initial_state: String,
    flow: HashMap<(String, String), String>,
    callbacks: HashMap<CallbackKey, Arc<dyn Callback>>,
    tx: mpsc::UnboundedSender<Event>,
    rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    pending_next: parking_lot::Mutex<Option<Event>>,
}

impl Fsm {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pushes `evt` onto this FSM's event queue.
    pub fn push(&self, evt: Event) {
        // The receiver only goes away once serve() exits, by which point
        // every caller that might still push has itself been torn down;
        // a stray send error is therefore not actionable.
        let _ = self.tx.send(evt);
    }

    async fn invoke(
        self: &Arc<Self>,
        kind: CallbackType,
        state: &str,
        evt: &mut Event,
    ) -> Result<(), FsmError> {
        evt.service = self.name.clone();
        for key in [CallbackKey::wildcard(kind), CallbackKey::new(state, kind)] {
            if let Some(cb) = self.callbacks.get(&key) {
                cb.call(evt).await.map_err(|source| FsmError::Callback {
                    state: state.to_string(),
                    kind,
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Runs `invoke` on a spawned task so a genuine Rust panic inside a
    /// callback is caught as a `JoinError` rather than unwinding into the
    /// serve loop, mirroring this engine's caught-failure-routes-to-stop
    /// guarantee for both of Rust's failure channels.
    async fn invoke_caught(
        self: &Arc<Self>,
        kind: CallbackType,
        state: &str,
        mut evt: Event,
    ) -> (Event, Result<(), FsmError>) {
        let this = self.clone();
        let state_owned = state.to_string();
        let handle = tokio::spawn(async move {
            let result = this.invoke(kind, &state_owned, &mut evt).await;
            (evt, result)
        });
        match handle.await {
            Ok((evt, result)) => (evt, result),
            Err(_join_err) => (
                Event::new(""),
                Err(FsmError::CallbackPanicked { state: state.to_string(), kind }),
            ),
        }
    }

    async fn run_stop_callback(self: &Arc<Self>, state: &str, reason: StopReason) -> StopReason {
        let mut evt = Event::new(STOP_FSM);
        evt.args = match &reason {
            StopReason::Failure(e) => vec![Value::String(e.to_string())],
            StopReason::StopEvent => vec![],
            StopReason::Shutdown => vec![Value::String("shutdown".to_string())],
            StopReason::ChannelClosed => vec![Value::String("channel closed".to_string())],
        };
        let (_evt, _result) = self.invoke_caught(CallbackType::Stop, state, evt).await;
        reason
    }

    /// Drives the serve loop until a stop condition is reached. MUST be
    /// called at most once per `Fsm`.
    pub async fn serve(self: &Arc<Self>, shutdown: CancellationToken) -> Result<StopReason, FsmError> {
        let mut rx = self
            .rx
            .lock()
            .take()
            .ok_or(FsmError::AlreadyServing)?;

        let mut state = self.initial_state.clone();
        let (_evt, result) = self.invoke_caught(CallbackType::Enter, &state, Event::new(START_FSM)).await;
        if let Err(e) = result {
            return Ok(self.run_stop_callback(&state, StopReason::Failure(e)).await);
        }

        loop {
            let next = self.pending_next.lock().take();
            let evt = match next {
                Some(evt) => evt,
                None => {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            return Ok(self.run_stop_callback(&state, StopReason::Shutdown).await);
                        }
                        received = rx.recv() => match received {
                            Some(evt) => evt,
                            None => return Ok(self.run_stop_callback(&state, StopReason::ChannelClosed).await),
                        },
                    }
                }
            };

            if evt.name == STOP_FSM {
                return Ok(self.run_stop_callback(&state, StopReason::StopEvent).await);
            }

            let Some(dst) = self.flow.get(&(state.clone(), evt.name.clone())).cloned() else {
                tracing::debug!(fsm = %self.name, state = %state, event = %evt.name, "no transition for event");
                continue;
            };

            let (evt, leave_result) = self.invoke_caught(CallbackType::Leave, &state, evt).await;
            if let Err(e) = leave_result {
                tracing::warn!(fsm = %self.name, state = %state, error = %e, "leave callback failed, state unchanged");
                continue;
            }

            let (evt, enter_result) = self.invoke_caught(CallbackType::Enter, &dst, evt).await;
            match enter_result {
                Ok(()) => {
                    state = dst;
                    if let Some(next) = evt.next {
                        *self.pending_next.lock() = Some(*next);
                    }
                }
                Err(e) => {
                    tracing::warn!(fsm = %self.name, state = %dst, error = %e, "enter callback failed, state unchanged");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "fsm_tests.rs"]
mod tests;
