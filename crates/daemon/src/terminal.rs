// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-connection actor. Built on [`mb_core::Fsm`]: `initial`
//! registers the terminal's private reply queue and falls through to
//! `receiving`; `receiving` blocks on one framed read and either
//! advances to `processing` or, on a read timeout, to the auxiliary
//! `timeout` state that simply rejoins the receive loop. `processing`
//! dispatches the decoded command and writes the response frame.
//!
//! Any transport failure is pushed onto the FSM as an explicit
//! `STOP-FSM` event from inside the failing callback (rather than
//! returned as a callback `Err`, which this engine treats as "retry
//! the same transition later" — not what a dead socket calls for).

use crate::error::TerminalError;
use crate::router::Router;
use mb_core::{
    evt_next, Action, Callback, CallbackKey, CallbackType, Event, FlowDesc, Fsm, FsmBuilder, Msg,
    START_FSM, STOP_FSM,
};
use mb_queue::{MultiPoper, Queue, QueueRegistry};
use mb_wire::{read_frame, write_frame, Frame};
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex as AsyncMutex;

/// Interval a single framed read is allowed to block for before the
/// terminal falls back to the `timeout` state to recheck shutdown.
const READ_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// How long `req`/`job` blocks waiting for a matching reply on the
/// terminal's private queue.
const RES_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A named, versioned config value the `sync` verb can serve to
/// clients (e.g. the crontab DSL map).
pub type ConfigValues = Arc<RwLock<HashMap<String, (String, serde_json::Value)>>>;

/// Everything a terminal needs that outlives any single callback
/// invocation. Shared into every `Callback` impl as an `Arc`.
pub struct TerminalCtx {
    pub id: String,
    reader: AsyncMutex<BufReader<OwnedReadHalf>>,
    writer: AsyncMutex<OwnedWriteHalf>,
    registry: Arc<QueueRegistry>,
    reply_queue: Arc<Queue<Msg>>,
    pub_queue: Arc<Queue<Msg>>,
    router: Option<Arc<dyn Router>>,
    local_id: String,
    rid_counter: AtomicU64,
    popers: SyncMutex<HashMap<String, MultiPoper>>,
    pending_frame: SyncMutex<Option<Frame>>,
    config_values: ConfigValues,
    fsm: SyncMutex<Option<Weak<Fsm>>>,
}

impl TerminalCtx {
    fn push_stop(&self, reason: &str) {
        if let Some(fsm) = self.fsm.lock().as_ref().and_then(Weak::upgrade) {
            let mut evt = Event::new(STOP_FSM);
            evt.args = vec![serde_json::Value::String(reason.to_string())];
            fsm.push(evt);
        }
    }

    /// `<pid>|<nonce>`, where `pid` is this terminal's own id — the
    /// addressable unit a reply gets routed back to — and `nonce` a
    /// per-terminal monotonic counter.
    fn next_rid(&self) -> String {
        let nonce = self.rid_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}|{nonce}", self.id)
    }
}

/// Builds and spawns a terminal actor over an accepted TCP connection.
/// Returns once the terminal's serve loop has stopped (connection
/// closed or broker shutdown).
#[allow(clippy::too_many_arguments)]
pub async fn run(
    id: String,
    conn: tokio::net::TcpStream,
    registry: Arc<QueueRegistry>,
    pub_queue: Arc<Queue<Msg>>,
    router: Option<Arc<dyn Router>>,
    local_id: String,
    config_values: ConfigValues,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let (read_half, write_half) = conn.into_split();
    let reply_queue = registry.get_or_create(&id);

    let ctx = Arc::new(TerminalCtx {
        id: id.clone(),
        reader: AsyncMutex::new(BufReader::new(read_half)),
        writer: AsyncMutex::new(write_half),
        registry,
        reply_queue,
        pub_queue,
        router,
        local_id,
        rid_counter: AtomicU64::new(0),
        popers: SyncMutex::new(HashMap::new()),
        pending_frame: SyncMutex::new(None),
        config_values,
        fsm: SyncMutex::new(None),
    });

    let fsm = build_fsm(id, ctx.clone());
    *ctx.fsm.lock() = Some(Arc::downgrade(&fsm));

    match fsm.serve(shutdown).await {
        Ok(reason) => tracing::debug!(terminal = %ctx.id, ?reason, "terminal stopped"),
        Err(e) => tracing::warn!(terminal = %ctx.id, error = %e, "terminal fsm error"),
    }
}

fn build_fsm(id: String, ctx: Arc<TerminalCtx>) -> Arc<Fsm> {
    FsmBuilder::new()
        .flow_desc(FlowDesc::new("Ready", vec!["initial".into(), "timeout".into()], "receiving"))
        .flow_desc(FlowDesc::new("Process", vec!["receiving".into()], "processing"))
        .flow_desc(FlowDesc::new("Timeout", vec!["receiving".into()], "timeout"))
        .flow_desc(FlowDesc::new("Success", vec!["processing".into()], "receiving"))
        .on(CallbackKey::new("initial", CallbackType::Enter), Arc::new(EnterInitial(ctx.clone())))
        .on(
            CallbackKey::new("receiving", CallbackType::Enter),
            Arc::new(EnterReceiving(ctx.clone())),
        )
        .on(
            CallbackKey::new("processing", CallbackType::Enter),
            Arc::new(EnterProcessing(ctx.clone())),
        )
        .on(CallbackKey::wildcard(CallbackType::Stop), Arc::new(StopTerminal(ctx)))
        .build(id, "initial")
}

struct EnterInitial(Arc<TerminalCtx>);

#[async_trait::async_trait]
impl Callback for EnterInitial {
    async fn call(&self, evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        debug_assert_eq!(evt.name, START_FSM);
        evt_next(evt, "Ready").map_err(|e| Box::new(e) as _)
    }
}

struct EnterReceiving(Arc<TerminalCtx>);

#[async_trait::async_trait]
impl Callback for EnterReceiving {
    async fn call(&self, evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ctx = &self.0;
        let mut reader = ctx.reader.lock().await;
        match tokio::time::timeout(READ_FRAME_TIMEOUT, read_frame(&mut *reader)).await {
            Ok(Ok(frame)) => {
                *ctx.pending_frame.lock() = Some(frame);
                evt_next(evt, "Process").map_err(|e| Box::new(e) as _)
            }
            Ok(Err(e)) => {
                tracing::debug!(terminal = %ctx.id, error = %e, "terminal read failed, stopping");
                ctx.push_stop(&e.to_string());
                Ok(())
            }
            Err(_elapsed) => evt_next(evt, "Timeout").map_err(|e| Box::new(e) as _),
        }
    }
}

struct EnterProcessing(Arc<TerminalCtx>);

#[async_trait::async_trait]
impl Callback for EnterProcessing {
    async fn call(&self, evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ctx = &self.0;
        let frame = ctx.pending_frame.lock().take();
        let Some(frame) = frame else {
            return evt_next(evt, "Success").map_err(|e| Box::new(e) as _);
        };

        let response = dispatch(ctx, &frame).await;
        let response_frame = match response {
            Ok(frame) => frame,
            Err(e) => Frame::err(e.to_string()),
        };

        let mut writer = ctx.writer.lock().await;
        if let Err(e) = write_frame(&mut *writer, &response_frame).await {
            tracing::debug!(terminal = %ctx.id, error = %e, "terminal write failed, stopping");
            drop(writer);
            ctx.push_stop(&e.to_string());
            return Ok(());
        }
        evt_next(evt, "Success").map_err(|e| Box::new(e) as _)
    }
}

struct StopTerminal(Arc<TerminalCtx>);

#[async_trait::async_trait]
impl Callback for StopTerminal {
    async fn call(&self, _evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ctx = &self.0;
        let _ = ctx.writer.lock().await.shutdown().await;
        ctx.registry.remove(&ctx.id);
        Ok(())
    }
}

/// Computes a stable hash for a `reg` service list, used as the
/// `sub_token` returned to the client and as the `pull` cache key.
fn hash_services(services_str: &str) -> String {
    let mut hasher = DefaultHasher::new();
    services_str.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

async fn dispatch(ctx: &TerminalCtx, frame: &Frame) -> Result<Frame, TerminalError> {
    let verb = frame.verb().unwrap_or_default();
    match verb {
        "reg" => handle_reg(ctx, frame),
        "pull" => handle_pull(ctx, frame).await,
        "req" | "job" => handle_req_or_job(ctx, frame).await,
        "res" => handle_res(ctx, frame).await,
        "sync" => handle_sync(ctx, frame),
        other => Err(TerminalError::WrongCmd(other.to_string())),
    }
}

fn handle_reg(ctx: &TerminalCtx, frame: &Frame) -> Result<Frame, TerminalError> {
    let services_str = frame.cmds.get(1).cloned().unwrap_or_default();
    let hash = hash_services(&services_str);

    let mut popers = ctx.popers.lock();
    if !popers.contains_key(&hash) {
        let names: Vec<String> =
            services_str.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        let poper = MultiPoper::new(&ctx.registry, &names, RES_WAIT_TIMEOUT);
        popers.insert(hash.clone(), poper);
    }
    Ok(Frame::ok(vec![hash]))
}

async fn handle_pull(ctx: &TerminalCtx, frame: &Frame) -> Result<Frame, TerminalError> {
    let hash = frame.cmds.get(1).cloned().unwrap_or_default();
    let poper = ctx.popers.lock().get(&hash).cloned();
    let Some(poper) = poper else {
        return Err(TerminalError::UnregisteredSubToken);
    };
    let (msg, ok) = poper.pop().await;
    match (msg, ok) {
        (Some(msg), true) => {
            let bytes = mb_wire::pack(&msg)?;
            Ok(Frame::new(vec!["ok".to_string()], bytes))
        }
        _ => Ok(Frame::new(vec!["empty".to_string()], Vec::new())),
    }
}

async fn handle_req_or_job(ctx: &TerminalCtx, frame: &Frame) -> Result<Frame, TerminalError> {
    let mut msg = mb_wire::unpack(&frame.data)?;

    let Some(router) = ctx.router.as_ref() else {
        return Err(TerminalError::UnfoundServiceRouter(msg.service_name()));
    };
    // Routing stamps the destination broker ID onto `channel`, which
    // doubles as the `job` tube selector (`TubeName = Topic-Channel`):
    // routing a job would corrupt its tube name. The carry worker this
    // is grounded on never routes jobs for that reason, so only `req`
    // gets a destination stamped in here.
    if msg.action == Action::Req {
        router.route(&mut msg, &[]);
    }

    let rid = ctx.next_rid();
    msg.bid = ctx.local_id.clone();
    msg.tid = ctx.id.clone();
    msg.rid = rid.clone();

    if !ctx.pub_queue.push(msg, true).await {
        return Err(TerminalError::PubQueueFull);
    }

    let deadline = Instant::now() + RES_WAIT_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TerminalError::ResTimeout);
        }
        let popped = tokio::time::timeout(remaining, ctx.reply_queue.pop(true)).await;
        match popped {
            Err(_elapsed) => return Err(TerminalError::ResTimeout),
            Ok((Some(reply), true)) if reply.rid == rid => {
                let bytes = mb_wire::pack(&reply)?;
                return Ok(Frame::new(vec!["ok".to_string()], bytes));
            }
            Ok((Some(_stale), true)) => continue,
            Ok(_) => return Err(TerminalError::ResTimeout),
        }
    }
}

async fn handle_res(ctx: &TerminalCtx, frame: &Frame) -> Result<Frame, TerminalError> {
    let mut msg = mb_wire::unpack(&frame.data)?;
    if msg.bid.is_empty() {
        return Err(TerminalError::MissingResBid);
    }
    msg.channel = msg.bid.clone();
    if !ctx.pub_queue.push(msg, false).await {
        return Err(TerminalError::PubQueueFull);
    }
    Ok(Frame::ok(vec![]))
}

fn handle_sync(ctx: &TerminalCtx, frame: &Frame) -> Result<Frame, TerminalError> {
    let name = frame.cmds.get(1).cloned().unwrap_or_default();
    let given_version = frame.cmds.get(2).cloned().unwrap_or_default();

    let values = ctx.config_values.read();
    match values.get(&name) {
        Some((version, value)) if *version != given_version => {
            let payload = serde_json::to_vec(value)?;
            Ok(Frame::new(vec!["ok".to_string(), version.clone()], payload))
        }
        _ => Ok(Frame::new(vec!["newest".to_string()], Vec::new())),
    }
}

#[cfg(test)]
#[path = "terminal_tests.rs"]
mod tests;
