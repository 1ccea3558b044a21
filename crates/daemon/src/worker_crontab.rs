// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `CrontabWorker`: drives the scheduled-job DSL published by
//! [`crate::worker_conf::ConfWorker`] under the `"crontab"` config
//! entry. Each field of that hash (other than `v`) names a tube and
//! carries a DSL string matching `^(\d+[hms])(\|HH:MM:SS,HH:MM:SS)?$` —
//! an interval, optionally gated to a daily active window. On a
//! 1-second tick the worker checks every due tube for emptiness on the
//! job server (a single outstanding job per tube is enough to keep its
//! consumer busy) and enqueues one job if so.

use mb_adapters::{AdapterError, JobPoolProvider};
use mb_core::{Callback, Clock, Event, Fsm};
use parking_lot::Mutex as SyncMutex;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const SUMMARY_INTERVAL: u64 = 10;

#[derive(Debug, Clone)]
struct CronJob {
    tube: String,
    interval: Duration,
    window: Option<(chrono::NaiveTime, chrono::NaiveTime)>,
    will_work_at: u64,
    put_count: u64,
}

pub struct CrontabWorker {
    id: String,
    local_id: String,
    job_pools: Arc<dyn JobPoolProvider>,
    config_values: crate::terminal::ConfigValues,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    jobs: SyncMutex<Vec<CronJob>>,
    last_version: SyncMutex<String>,
    last_summary: SyncMutex<u64>,
    fsm: SyncMutex<Option<Weak<Fsm>>>,
}

impl CrontabWorker {
    pub fn new(
        id: impl Into<String>,
        local_id: impl Into<String>,
        job_pools: Arc<dyn JobPoolProvider>,
        config_values: crate::terminal::ConfigValues,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            local_id: local_id.into(),
            job_pools,
            config_values,
            clock,
            shutdown,
            jobs: SyncMutex::new(Vec::new()),
            last_version: SyncMutex::new(String::new()),
            last_summary: SyncMutex::new(0),
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
            Ok(reason) => tracing::debug!(worker = %self.id, ?reason, "crontab worker stopped"),
            Err(e) => tracing::warn!(worker = %self.id, error = %e, "crontab worker fsm error"),
        }
    }

    async fn tick(&self) {
        self.rebuild_jobs_if_changed();
        self.process_due_jobs().await;

        tokio::select! {
            _ = tokio::time::sleep(TICK_INTERVAL) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    /// Runs one round of due-job processing without the trailing tick
    /// sleep, for tests that drive the worker deterministically instead
    /// of through `run`.
    #[cfg(test)]
    async fn tick_once_for_test(&self) {
        self.process_due_jobs().await;
    }

    async fn process_due_jobs(&self) {
        let now_secs = self.clock.epoch_secs();
        let now_time = chrono::Local::now().time();

        let due: Vec<usize> = {
            let jobs = self.jobs.lock();
            jobs.iter()
                .enumerate()
                .filter(|(_, j)| {
                    j.will_work_at <= now_secs && j.window.map(|w| window_contains(w, now_time)).unwrap_or(true)
                })
                .map(|(i, _)| i)
                .collect()
        };

        for idx in due {
            let Some((tube, interval)) = self.jobs.lock().get(idx).map(|j| (j.tube.clone(), j.interval)) else {
                continue;
            };

            if self.tube_is_empty(&tube).await {
                match self.job_pools.put(&self.local_id, &tube, Vec::new(), 100, 0, interval.as_secs().max(1) as u32 * 2).await {
                    Ok(_job_id) => {
                        if let Some(j) = self.jobs.lock().get_mut(idx) {
                            j.will_work_at = now_secs + interval.as_secs();
                            j.put_count += 1;
                        }
                    }
                    Err(e) => tracing::warn!(worker = %self.id, error = %e, tube = %tube, "crontab: job put failed"),
                }
            } else if let Some(j) = self.jobs.lock().get_mut(idx) {
                j.will_work_at = now_secs + interval.as_secs();
            }
        }

        self.jobs.lock().sort_by_key(|j| j.will_work_at);
        self.log_summary_if_due(now_secs);
    }

    async fn tube_is_empty(&self, tube: &str) -> bool {
        match self.job_pools.stats(&self.local_id, tube).await {
            Ok(stats) => {
                let ready: u64 = stats.get("current-jobs-ready").and_then(|v| v.parse().ok()).unwrap_or(0);
                let reserved: u64 = stats.get("current-jobs-reserved").and_then(|v| v.parse().ok()).unwrap_or(0);
                ready == 0 && reserved == 0
            }
            Err(AdapterError::TubeNotFound(_)) => true,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, tube = %tube, "crontab: stats failed");
                false
            }
        }
    }

    fn rebuild_jobs_if_changed(&self) {
        let Some((version, dsl)) = self.config_values.read().get("crontab").cloned() else {
            if !self.last_version.lock().is_empty() {
                *self.last_version.lock() = String::new();
                self.jobs.lock().clear();
            }
            return;
        };
        if *self.last_version.lock() == version {
            return;
        }
        let Some(map) = dsl.as_object() else { return };

        let now_secs = self.clock.epoch_secs();
        let jobs: Vec<CronJob> = map
            .iter()
            .filter_map(|(tube, value)| {
                let raw = value.as_str()?;
                let (interval, window) = parse_dsl(raw)?;
                Some(CronJob { tube: tube.clone(), interval, window, will_work_at: now_secs, put_count: 0 })
            })
            .collect();

        tracing::info!(worker = %self.id, version = %version, tubes = jobs.len(), "crontab: config reloaded");
        *self.jobs.lock() = jobs;
        *self.last_version.lock() = version;
    }

    fn log_summary_if_due(&self, now_secs: u64) {
        let mut last = self.last_summary.lock();
        if now_secs.saturating_sub(*last) < SUMMARY_INTERVAL {
            return;
        }
        *last = now_secs;
        let jobs = self.jobs.lock();
        if jobs.is_empty() {
            return;
        }
        let summary: Vec<String> = jobs.iter().map(|j| format!("{}={}", j.tube, j.put_count)).collect();
        tracing::info!(worker = %self.id, tubes = %summary.join(","), "crontab: put summary");
    }
}

fn dsl_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| regex::Regex::new(r"^(\d+)([hms])(?:\|(\d{2}:\d{2}:\d{2}),(\d{2}:\d{2}:\d{2}))?$").unwrap())
}

fn parse_dsl(dsl: &str) -> Option<(Duration, Option<(chrono::NaiveTime, chrono::NaiveTime)>)> {
    let caps = dsl_regex().captures(dsl.trim())?;
    let n: u64 = caps.get(1)?.as_str().parse().ok()?;
    let unit_secs = match caps.get(2)?.as_str() {
        "h" => 3600,
        "m" => 60,
        "s" => 1,
        _ => return None,
    };
    let interval = Duration::from_secs(n.saturating_mul(unit_secs));

    let window = match (caps.get(3), caps.get(4)) {
        (Some(start), Some(end)) => {
            let start = chrono::NaiveTime::parse_from_str(start.as_str(), "%H:%M:%S").ok()?;
            let end = chrono::NaiveTime::parse_from_str(end.as_str(), "%H:%M:%S").ok()?;
            Some((start, end))
        }
        _ => None,
    };

    Some((interval, window))
}

/// Whether `now` falls within `window`, treating `start > end` as a
/// window that wraps past midnight.
fn window_contains(window: (chrono::NaiveTime, chrono::NaiveTime), now: chrono::NaiveTime) -> bool {
    let (start, end) = window;
    if start <= end {
        now >= start && now <= end
    } else {
        now >= start || now <= end
    }
}

struct RunTick(Arc<CrontabWorker>);

#[async_trait::async_trait]
impl Callback for RunTick {
    async fn call(&self, _evt: &mut Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.tick().await;
        self.0.push_tick();
        Ok(())
    }
}

#[cfg(test)]
#[path = "worker_crontab_tests.rs"]
mod tests;
