// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("kv error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("job server io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("job server protocol error: {0}")]
    Protocol(String),
    #[error("job server tube {0:?} not found")]
    TubeNotFound(String),
    #[error("client marked unhealthy, reconnect required")]
    Unhealthy,
}
