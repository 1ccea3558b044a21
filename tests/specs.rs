// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box tests for the `brokerd` binary's startup path: the
//! config/bind failures a process manager can observe without a live
//! Redis or beanstalkd. Happy-path startup (which spawns workers that
//! dial those services) is covered at the unit level inside
//! `mb-daemon`'s own `#[cfg(test)]` modules instead.

use assert_cmd::Command;
use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;

fn brokerd() -> Command {
    Command::cargo_bin("brokerd").expect("brokerd binary built by the workspace")
}

/// A malformed numeric env var is a `ConfigError`, caught before any
/// socket or pool is touched; the process exits non-zero immediately.
#[test]
#[serial_test::serial]
fn malformed_pool_size_exits_non_zero_without_binding() {
    let assert = brokerd()
        .env("MB_JOB_POOL_SIZE", "not-a-number")
        .env_remove("MB_LISTEN_ADDR")
        .timeout(Duration::from_secs(5))
        .assert();
    let output = assert.get_output();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr was: {stderr}");
}

/// Binding to an address already held by another listener fails before
/// any worker (and therefore any KV/job-server dial) is spawned.
#[test]
#[serial_test::serial]
fn listen_addr_already_in_use_exits_non_zero() {
    let held = TcpListener::bind("127.0.0.1:0").expect("bind a throwaway listener");
    let addr = held.local_addr().expect("local addr");

    let assert = brokerd().env("MB_LISTEN_ADDR", addr.to_string()).timeout(Duration::from_secs(5)).assert();
    let output = assert.get_output();
    assert!(!output.status.success());

    drop(held);
}

/// `MB_PID_FILE`'s parent directory is assumed to exist; a path inside
/// a nonexistent directory surfaces as a startup failure rather than a
/// silent no-op.
#[test]
#[serial_test::serial]
fn pid_file_in_missing_directory_exits_non_zero() {
    let held = TcpListener::bind("127.0.0.1:0").expect("bind a throwaway listener to free the port after");
    let addr = held.local_addr().expect("local addr");
    drop(held);

    let missing_dir = std::env::temp_dir().join("mb-specs-does-not-exist").join("brokerd.pid");

    let assert = brokerd()
        .env("MB_LISTEN_ADDR", addr.to_string())
        .env("MB_PID_FILE", &missing_dir)
        .timeout(Duration::from_secs(5))
        .assert();
    let output = assert.get_output();
    assert!(!output.status.success());
}

/// `MB_LOG_PATH` pointed at a location whose parent cannot be created
/// (a regular file standing where a directory is expected) fails
/// startup with the dedicated log-file error path, distinct from the
/// config and bind failures above.
#[test]
#[serial_test::serial]
fn log_path_parent_not_a_directory_exits_non_zero() {
    let tmp = tempfile::NamedTempFile::new().expect("create placeholder file");
    writeln!(tmp.as_file(), "not a directory").expect("write placeholder");
    let bogus_log_path = tmp.path().join("brokerd.log");

    let assert = brokerd().env("MB_LOG_PATH", &bogus_log_path).timeout(Duration::from_secs(5)).assert();
    let output = assert.get_output();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to open log file"), "stderr was: {stderr}");
}
