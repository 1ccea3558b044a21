// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ConfWorker`: polls the `crontab:<ip>` hash in the KV store on an
//! interval. Field `v` carries a version string; when it changes, the
//! worker replaces the broker's in-memory `"crontab"` config entry
//! ([`ConfigValues`], the same map the `sync` terminal verb serves to
//! clients) with the hash's other fields, or clears it if the version is
//! now empty. [`crate::worker_crontab::CrontabWorker`] reads this same
//! entry to know which tubes to drive.

use crate::terminal::ConfigValues;
use mb_adapters::KvClient;
use mb_core::{Callback, Event, Fsm};
use parking_lot::Mutex as SyncMutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct ConfWorker {
    id: String,
    ip: String,
    kv: Arc<dyn KvClient>,
    config_values: ConfigValues,
    pause: Duration,
    shutdown: CancellationToken,
    fsm: SyncMutex<Option<Weak<Fsm>>>,
}

impl ConfWorker {
    pub fn new(
        id: impl Into<String>,
        ip: impl Into<String>,
        kv: Arc<dyn KvClient>,
        config_values: ConfigValues,
        pause: Duration,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            ip: ip.into(),
            kv,
            config_values,
            pause,
            shutdown,
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
            Ok(reason) => tracing::debug!(worker = %self.id, ?reason, "conf worker stopped"),
            Err(e) => tracing::warn!(worker = %self.id, error = %e, "conf worker fsm error"),
        }
    }

    async fn tick(&self) {
        self.poll_crontab_hash().await;
        tokio::select! {
            _ = tokio::time::sleep(self.pause) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    async fn poll_crontab_hash(&self) {
        let key = format!("crontab:{}", self.ip);
        let current_version = match self.kv.hget(&key, "v").await {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, "conf worker: hget failed");
                return;
            }
        };

        let last_version = self.config_values.read().get("crontab").map(|(v, _)| v.clone()).unwrap_or_default();
        if current_version == last_version {
            return;
        }

        if current_version.is_empty() {
            self.config_values.write().remove("crontab");
            tracing::debug!(worker = %self.id, "conf worker: crontab config cleared");
            return;
        }

        let fields = match self.kv.hgetall(&key).await {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, "conf worker: hgetall failed");
                return;
            }
        };
        let mut dsl = serde_json::Map::new();
        for (field, value) in fields {
            if field != "v" {
                dsl.insert(field, serde_json::Value::String(value));
            }
        }
        self.config_values.write().insert("crontab".to_string(), (current_version, serde_json::Value::Object(dsl)));
        tracing::debug!(worker = %self.id, "conf worker: crontab config updated");
    }
}

struct RunTick(Arc<ConfWorker>);

#[async_trait::async_trait]
impl Callback for RunTick {
    async fn call(&self, _evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.tick().await;
        self.0.push_tick();
        Ok(())
    }
}

#[cfg(test)]
#[path = "worker_conf_tests.rs"]
mod tests;
