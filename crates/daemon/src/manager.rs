// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process-wide registry and startup sequencer. One `Manager` is
//! built per `brokerd` process; it owns every long-lived resource
//! (pools, the central inbound queue, the shared config-value map) and
//! the `JoinSet` that every worker task lands in.
//!
//! `connect_redis` treats `ip` as a mesh identity, not a dial target:
//! this broker's own KV connection is always registered under the
//! pool map's `"local"` alias (which `KvPoolMap` resolves to
//! `MB_REDIS_ADDR`), while `ip` only names the `outbox:<ip>` mailbox
//! the spawned `SubWorker`s drain. A remote peer's own redis, reached
//! only through `CarryWorker`'s res-delivery fallback, is dialed by
//! its own IP instead.

use crate::config::Config;
use crate::error::ManagerError;
use crate::router::{LocalRouter, Router};
use crate::terminal::ConfigValues;
use crate::worker_carry::CarryWorker;
use crate::worker_clear::ClearWorker;
use crate::worker_conf::ConfWorker;
use crate::worker_crontab::CrontabWorker;
use crate::worker_sub::SubWorker;
use mb_adapters::{JobPoolMap, KvClient, KvPoolMap, KvPoolProvider};
use mb_core::{Clock, Msg, SystemClock, TidGenerator};
use mb_queue::{Queue, QueueRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Central registry holding every long-lived resource the daemon's
/// workers and terminals share.
pub struct Manager {
    config: Config,
    local_id: String,
    kv_pools: Arc<KvPoolMap>,
    job_pools: Arc<JobPoolMap>,
    msg_queue: Arc<Queue<Msg>>,
    registry: Arc<QueueRegistry>,
    config_values: ConfigValues,
    router: Arc<dyn Router>,
    clock: Arc<dyn Clock>,
    #[allow(dead_code)]
    tid_gen: Arc<TidGenerator>,
    shutdown: CancellationToken,
    tasks: JoinSet<()>,
}

impl Manager {
    pub fn new(config: Config) -> Result<Self, ManagerError> {
        let local_id = crate::local_ip::discover().map_err(ManagerError::LocalIp)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let kv_pools = Arc::new(KvPoolMap::new(config.redis_addr.clone()));
        let job_pools = Arc::new(JobPoolMap::new(config.job_pool_size));
        let msg_queue = Arc::new(Queue::new(config.msg_queue_size, config.msg_queue_timeout));
        let registry = Arc::new(QueueRegistry::new(config.msg_queue_size, config.msg_queue_timeout));
        let config_values: ConfigValues = Arc::new(RwLock::new(HashMap::new()));
        let router: Arc<dyn Router> = Arc::new(LocalRouter::new(local_id.clone()));
        let tid_gen = Arc::new(TidGenerator::new(local_id.clone(), clock.clone()));

        Ok(Self {
            config,
            local_id,
            kv_pools,
            job_pools,
            msg_queue,
            registry,
            config_values,
            router,
            clock,
            tid_gen,
            shutdown: CancellationToken::new(),
            tasks: JoinSet::new(),
        })
    }

    /// Sequences every worker and the terminal server, then blocks
    /// until SIGINT/SIGTERM, at which point it cancels the shutdown
    /// token and waits for every spawned task to finish.
    pub async fn start(mut self) -> Result<(), ManagerError> {
        if let Some(pid_file) = self.config.pid_file.clone() {
            std::fs::write(&pid_file, std::process::id().to_string()).map_err(ManagerError::PidFile)?;
        }

        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|source| ManagerError::Bind { addr: self.config.listen_addr.clone(), source })?;

        self.spawn_conf_worker().await?;
        self.spawn_carry_workers();
        self.spawn_crontab_worker();
        let local_id = self.local_id.clone();
        self.connect_redis(&local_id).await?;
        self.spawn_clear_worker();
        self.spawn_terminal_server(listener);

        tracing::info!(local_id = %self.local_id, listen_addr = %self.config.listen_addr, "broker started");

        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");

        self.shutdown.cancel();
        while self.tasks.join_next().await.is_some() {}

        if let Some(pid_file) = &self.config.pid_file {
            let _ = std::fs::remove_file(pid_file);
        }
        Ok(())
    }

    async fn spawn_conf_worker(&mut self) -> Result<(), ManagerError> {
        let (kv, _created) = self.kv_pools.fetch_or_new("local").await?;
        let worker = ConfWorker::new(
            "conf",
            self.local_id.clone(),
            kv as Arc<dyn KvClient>,
            self.config_values.clone(),
            self.config.worker_pause,
            self.shutdown.clone(),
        );
        self.tasks.spawn(async move { worker.run().await });
        Ok(())
    }

    fn spawn_carry_workers(&mut self) {
        for n in 0..self.config.carry_worker_count {
            let worker = CarryWorker::new(
                format!("carry-{n}"),
                self.msg_queue.clone(),
                self.registry.clone(),
                self.kv_pools.clone() as Arc<dyn KvPoolProvider>,
                self.job_pools.clone() as Arc<dyn mb_adapters::JobPoolProvider>,
                self.router.clone(),
                self.local_id.clone(),
            );
            let shutdown = self.shutdown.clone();
            self.tasks.spawn(async move { worker.run(shutdown).await });
        }
    }

    fn spawn_crontab_worker(&mut self) {
        let worker = CrontabWorker::new(
            "crontab",
            self.local_id.clone(),
            self.job_pools.clone(),
            self.config_values.clone(),
            self.clock.clone(),
            self.shutdown.clone(),
        );
        self.tasks.spawn(async move { worker.run().await });
    }

    /// Idempotently registers a KV pool for `ip`'s mesh identity; only
    /// on first creation does it spawn `SubWrkCount` `SubWorker`s
    /// draining `outbox:<ip>`.
    async fn connect_redis(&mut self, ip: &str) -> Result<(), ManagerError> {
        let pool_key = if ip == self.local_id { "local" } else { ip };
        let (kv, created) = self.kv_pools.fetch_or_new(pool_key).await?;
        if created {
            for n in 0..self.config.sub_worker_count {
                let worker = SubWorker::new(
                    format!("sub-{ip}-{n}"),
                    pool_key,
                    kv.clone() as Arc<dyn KvClient>,
                    self.msg_queue.clone(),
                    self.clock.clone(),
                );
                let shutdown = self.shutdown.clone();
                self.tasks.spawn(async move { worker.run(shutdown).await });
            }
        }
        Ok(())
    }

    fn spawn_clear_worker(&mut self) {
        let worker = ClearWorker::new(
            "clear",
            self.kv_pools.clone() as Arc<dyn KvPoolProvider>,
            self.clock.clone(),
            self.config.worker_pause,
            self.shutdown.clone(),
        );
        self.tasks.spawn(async move { worker.run().await });
    }

    fn spawn_terminal_server(&mut self, listener: TcpListener) {
        let server = crate::terminal_server::TerminalServer::new(
            listener,
            self.registry.clone(),
            self.msg_queue.clone(),
            Some(self.router.clone()),
            self.local_id.clone(),
            self.config_values.clone(),
            self.shutdown.clone(),
        );
        self.tasks.spawn(async move { server.run().await });
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler, waiting on SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
