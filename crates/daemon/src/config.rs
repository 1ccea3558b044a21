// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//! One function per knob, a sane default, a typed error on a malformed
//! value — the same convention used for every environment-sourced
//! setting in this codebase.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

fn env_string(var: &'static str, default: &str) -> String {
    std::env::var(var).ok().filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_opt_string(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

fn env_usize(var: &'static str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(s) if s.is_empty() => Ok(default),
        Ok(s) => s.parse().map_err(|_| ConfigError::Malformed { var, value: s }),
    }
}

fn env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(s) if s.is_empty() => Ok(default),
        Ok(s) => s.parse().map_err(|_| ConfigError::Malformed { var, value: s }),
    }
}

/// Process-wide, environment-sourced configuration. Loaded once at
/// startup via [`Config::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: String,
    pub redis_addr: String,
    pub log_path: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    pub job_pool_size: usize,
    pub msg_queue_size: usize,
    pub msg_queue_timeout: Duration,
    pub sub_worker_count: usize,
    pub carry_worker_count: usize,
    pub worker_pause: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            listen_addr: env_string("MB_LISTEN_ADDR", "127.0.0.1:6636"),
            redis_addr: env_string("MB_REDIS_ADDR", "127.0.0.1:6379"),
            log_path: env_opt_string("MB_LOG_PATH").map(PathBuf::from),
            pid_file: env_opt_string("MB_PID_FILE").map(PathBuf::from),
            job_pool_size: env_usize("MB_JOB_POOL_SIZE", 8)?,
            msg_queue_size: env_usize("MB_MSG_QUEUE_SIZE", 1024)?,
            msg_queue_timeout: Duration::from_millis(env_u64("MB_MSG_QUEUE_TIMEOUT_MS", 3000)?),
            sub_worker_count: env_usize("MB_SUB_WORKER_COUNT", 4)?,
            carry_worker_count: env_usize("MB_CARRY_WORKER_COUNT", 4)?,
            worker_pause: Duration::from_secs(env_u64("MB_WORKER_PAUSE_SECS", 5)?),
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
