// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The key-value store interface used as inter-broker mailboxes and
//! pub/sub. The only shipped implementation talks to Redis.

use crate::error::AdapterError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// Narrow KV interface this broker actually needs: list-based mailboxes,
/// hash-based cron config, and health keepalive.
#[async_trait]
pub trait KvClient: Send + Sync {
    async fn rpush(&self, key: &str, value: Vec<u8>) -> Result<(), AdapterError>;
    /// `BLPOP key timeout`; returns `None` if the wait times out.
    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>, AdapterError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AdapterError>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, AdapterError>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, AdapterError>;
    async fn del(&self, key: &str) -> Result<(), AdapterError>;
    async fn ping(&self) -> Result<(), AdapterError>;
}

/// Connection-managed Redis client: `ConnectionManager` reconnects
/// transparently, so this adapter never needs to track a sticky
/// unhealthy flag itself the way the job-server client does.
#[derive(Clone)]
pub struct RedisKvClient {
    conn: ConnectionManager,
}

impl RedisKvClient {
    pub async fn connect(addr: &str) -> Result<Self, AdapterError> {
        let client = redis::Client::open(format!("redis://{addr}"))?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvClient for RedisKvClient {
    async fn rpush(&self, key: &str, value: Vec<u8>) -> Result<(), AdapterError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(key, value).await?;
        Ok(())
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>, AdapterError> {
        let mut conn = self.conn.clone();
        let reply: Option<(String, Vec<u8>)> =
            conn.blpop(key, timeout.as_secs_f64()).await?;
        Ok(reply.map(|(_, v)| v))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AdapterError> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(key, field).await?)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, AdapterError> {
        let mut conn = self.conn.clone();
        let map: std::collections::HashMap<String, String> = conn.hgetall(key).await?;
        Ok(map.into_iter().collect())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, AdapterError> {
        let mut conn = self.conn.clone();
        Ok(conn.keys(pattern).await?)
    }

    async fn del(&self, key: &str) -> Result<(), AdapterError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
