// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-concern error enums for the daemon crate, composed with `#[from]`
//! at crate boundaries rather than one catch-all.

use thiserror::Error;

/// Errors surfaced while handling a single frame on a terminal
/// connection. Protocol/resource/semantic failures become `err`
/// responses; transport failures tear the connection down.
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("wire error: {0}")]
    Wire(#[from] mb_wire::WireError),
    #[error("msg decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unknown sub_token")]
    UnregisteredSubToken,
    #[error("unfound service router of {0:?}")]
    UnfoundServiceRouter(String),
    #[error("pub queue is full")]
    PubQueueFull,
    #[error("wait res timeout")]
    ResTimeout,
    #[error("res msg's bid need set")]
    MissingResBid,
    #[error("wrong cmd {0:?}")]
    WrongCmd(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("read timeout")]
    ReadTimeout,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Environment-sourced configuration failures. Fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("malformed value for {var}: {value:?}")]
    Malformed { var: &'static str, value: String },
}

/// Manager lifecycle failures (bind, pool construction, signal setup).
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind listener on {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },
    #[error("pool error: {0}")]
    Adapter(#[from] mb_adapters::AdapterError),
    #[error("pid file error: {0}")]
    PidFile(std::io::Error),
    #[error("local ip discovery failed: {0}")]
    LocalIp(std::io::Error),
}
