// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `brokerd`: the message-routing daemon binary.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod error;
mod ids;
mod local_ip;
mod manager;
mod proc;
mod router;
mod terminal;
mod terminal_server;
mod worker_carry;
mod worker_clear;
mod worker_common;
mod worker_conf;
mod worker_crontab;
mod worker_sub;

use config::Config;
use manager::Manager;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("brokerd: invalid configuration: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let _log_guard = match init_tracing(config.log_path.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("brokerd: failed to open log file: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let manager = match Manager::new(config) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize broker");
            return std::process::ExitCode::FAILURE;
        }
    };

    match manager.start().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "broker exited with error");
            std::process::ExitCode::FAILURE
        }
    }
}

/// Base layer is `tracing_subscriber::fmt` filtered by `RUST_LOG`
/// (default `info`). When `log_path` is set, a second layer writes to
/// a daily-rotated file through a non-blocking writer; the returned
/// guard must be held for the process lifetime to guarantee the writer
/// flushes before exit.
fn init_tracing(
    log_path: Option<&std::path::Path>,
) -> std::io::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_path {
        None => {
            tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
            Ok(None)
        }
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("brokerd.log"));
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
    }
}
