// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Addressed connection-pool maps for the KV store and the job server.
//! Both are organized `ip -> pool`, lazily created under a write lock;
//! `fetch` is read-only, `fetch_or_new` creates on a cache miss.

use crate::error::AdapterError;
use crate::job::BeanClient;
use crate::kv::{KvClient, RedisKvClient};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_BEANSTALK_PORT: u16 = 11300;

/// `"local"` resolves to `local_ip` for the KV map, bare IPs get the
/// default Redis port appended, and anything already carrying a port is
/// left untouched.
pub fn normalize_kv_addr(addr: &str, local_ip: &str) -> String {
    normalize(addr, local_ip, DEFAULT_REDIS_PORT)
}

/// `"local"` resolves to `127.0.0.1` for the job map.
pub fn normalize_job_addr(addr: &str) -> String {
    normalize(addr, "127.0.0.1", DEFAULT_BEANSTALK_PORT)
}

fn normalize(addr: &str, local: &str, default_port: u16) -> String {
    if addr == "local" {
        return with_default_port(local, default_port);
    }
    with_default_port(addr, default_port)
}

fn with_default_port(addr: &str, default_port: u16) -> String {
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{addr}:{default_port}")
    }
}

/// A pool of recycled beanstalkd connections to a single address.
pub struct JobPool {
    addr: String,
    idle: Mutex<VecDeque<BeanClient>>,
    max_size: usize,
}

impl JobPool {
    pub fn new(addr: impl Into<String>, max_size: usize) -> Self {
        Self { addr: addr.into(), idle: Mutex::new(VecDeque::new()), max_size }
    }

    /// Returns a recycled healthy client or dials a fresh connection.
    pub async fn get(&self) -> Result<BeanClient, AdapterError> {
        {
            let mut idle = self.idle.lock().await;
            while let Some(client) = idle.pop_front() {
                if client.is_healthy() {
                    return Ok(client);
                }
            }
        }
        BeanClient::connect(&self.addr).await
    }

    /// Returns `client` to the pool, discarding it if unhealthy or if
    /// the idle list is already at capacity.
    pub async fn put(&self, client: BeanClient) {
        if !client.is_healthy() {
            return;
        }
        let mut idle = self.idle.lock().await;
        if idle.len() < self.max_size {
            idle.push_back(client);
        }
    }

    /// Runs `f` against a checked-out client, guaranteeing release on
    /// every exit path (success or error).
    pub async fn with<F, Fut, T>(&self, f: F) -> Result<T, AdapterError>
    where
        F: FnOnce(&mut BeanClient) -> Fut,
        Fut: std::future::Future<Output = Result<T, AdapterError>>,
    {
        let mut client = self.get().await?;
        let result = f(&mut client).await;
        self.put(client).await;
        result
    }
}

pub struct JobPoolMap {
    pools: RwLock<HashMap<String, Arc<JobPool>>>,
    pool_size: usize,
}

impl JobPoolMap {
    pub fn new(pool_size: usize) -> Self {
        Self { pools: RwLock::new(HashMap::new()), pool_size }
    }

    pub fn fetch(&self, ip: &str) -> Option<Arc<JobPool>> {
        self.pools.read().get(&normalize_job_addr(ip)).cloned()
    }

    /// `(pool, is_newly_created)`.
    pub fn fetch_or_new(&self, ip: &str) -> (Arc<JobPool>, bool) {
        let addr = normalize_job_addr(ip);
        if let Some(pool) = self.pools.read().get(&addr) {
            return (pool.clone(), false);
        }
        let mut pools = self.pools.write();
        if let Some(pool) = pools.get(&addr) {
            return (pool.clone(), false);
        }
        let pool = Arc::new(JobPool::new(addr.clone(), self.pool_size));
        pools.insert(addr, pool.clone());
        (pool, true)
    }

    /// Every currently-known `(addr, pool)` pair, for periodic sweeps
    /// like `ClearWorker`'s connection keepalive.
    pub fn all(&self) -> Vec<(String, Arc<JobPool>)> {
        self.pools.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// `RedisKvClient` wraps a `ConnectionManager`, which reconnects
/// transparently, so the KV pool is simply a cache of one cloneable
/// client per address rather than a checkout/return free-list.
pub struct KvPoolMap {
    clients: RwLock<HashMap<String, Arc<RedisKvClient>>>,
    local_ip: String,
}

impl KvPoolMap {
    pub fn new(local_ip: impl Into<String>) -> Self {
        Self { clients: RwLock::new(HashMap::new()), local_ip: local_ip.into() }
    }

    pub fn fetch(&self, ip: &str) -> Option<Arc<RedisKvClient>> {
        self.clients.read().get(&normalize_kv_addr(ip, &self.local_ip)).cloned()
    }

    /// `(client, is_newly_created, err)`.
    pub async fn fetch_or_new(&self, ip: &str) -> Result<(Arc<RedisKvClient>, bool), AdapterError> {
        let addr = normalize_kv_addr(ip, &self.local_ip);
        if let Some(client) = self.clients.read().get(&addr) {
            return Ok((client.clone(), false));
        }
        let client = Arc::new(RedisKvClient::connect(&addr).await?);
        let mut clients = self.clients.write();
        if let Some(existing) = clients.get(&addr) {
            return Ok((existing.clone(), false));
        }
        clients.insert(addr, client.clone());
        Ok((client, true))
    }

    /// Every currently-known `(addr, client)` pair, for periodic sweeps
    /// like `ClearWorker`'s connection keepalive.
    pub fn all(&self) -> Vec<(String, Arc<RedisKvClient>)> {
        self.clients.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Address-keyed access to a KV client, abstracted so the daemon's
/// workers can be driven by a real [`KvPoolMap`] or, in tests, an
/// in-memory fake — without depending on the concrete Redis type.
#[async_trait]
pub trait KvPoolProvider: Send + Sync {
    async fn get_or_create(&self, addr: &str) -> Result<Arc<dyn KvClient>, AdapterError>;

    /// Every address this provider currently holds a connection for, used
    /// by `ClearWorker`'s periodic keepalive sweep.
    fn addrs(&self) -> Vec<String>;
}

#[async_trait]
impl KvPoolProvider for KvPoolMap {
    async fn get_or_create(&self, addr: &str) -> Result<Arc<dyn KvClient>, AdapterError> {
        let (client, _created) = self.fetch_or_new(addr).await?;
        Ok(client as Arc<dyn KvClient>)
    }

    fn addrs(&self) -> Vec<String> {
        self.all().into_iter().map(|(addr, _)| addr).collect()
    }
}

/// Address-keyed job-server dispatch, abstracted the same way as
/// [`KvPoolProvider`] so workers can be tested without a live
/// beanstalkd.
#[async_trait]
pub trait JobPoolProvider: Send + Sync {
    async fn put(
        &self,
        addr: &str,
        tube: &str,
        body: Vec<u8>,
        pri: u32,
        delay: u32,
        ttr: u32,
    ) -> Result<u64, AdapterError>;

    async fn stats(&self, addr: &str, tube: &str) -> Result<HashMap<String, String>, AdapterError>;
}

#[async_trait]
impl JobPoolProvider for JobPoolMap {
    async fn put(
        &self,
        addr: &str,
        tube: &str,
        body: Vec<u8>,
        pri: u32,
        delay: u32,
        ttr: u32,
    ) -> Result<u64, AdapterError> {
        let (pool, _created) = self.fetch_or_new(addr);
        let tube = tube.to_string();
        pool.with(move |c| Box::pin(async move { c.put(&tube, &body, pri, delay, ttr).await })).await
    }

    async fn stats(&self, addr: &str, tube: &str) -> Result<HashMap<String, String>, AdapterError> {
        let (pool, _created) = self.fetch_or_new(addr);
        let tube = tube.to_string();
        pool.with(move |c| Box::pin(async move { c.stats(&tube).await })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        local_resolves_to_intranet_ip = {"local", "10.1.2.3", "10.1.2.3:6379"},
        bare_ip_gets_default_port = {"10.1.2.4", "10.1.2.3", "10.1.2.4:6379"},
        host_port_left_untouched = {"10.1.2.4:7000", "10.1.2.3", "10.1.2.4:7000"},
    )]
    fn kv_address_normalization(addr: &str, local_ip: &str, expected: &str) {
        assert_eq!(normalize_kv_addr(addr, local_ip), expected);
    }

    #[parameterized(
        local_resolves_to_loopback = {"local", "127.0.0.1:11300"},
        bare_ip_gets_default_port = {"10.1.2.4", "10.1.2.4:11300"},
        host_port_left_untouched = {"10.1.2.4:12000", "10.1.2.4:12000"},
    )]
    fn job_address_normalization(addr: &str, expected: &str) {
        assert_eq!(normalize_job_addr(addr), expected);
    }

    #[test]
    fn job_pool_map_fetch_or_new_is_idempotent() {
        let map = JobPoolMap::new(4);
        assert!(map.fetch("local").is_none());
        let (pool1, created1) = map.fetch_or_new("local");
        assert!(created1);
        let (pool2, created2) = map.fetch_or_new("local");
        assert!(!created2);
        assert!(Arc::ptr_eq(&pool1, &pool2));
        assert!(map.fetch("local").is_some());
    }

    #[test]
    fn job_pool_map_all_lists_every_known_address() {
        let map = JobPoolMap::new(4);
        map.fetch_or_new("local");
        map.fetch_or_new("10.1.2.4:9000");
        let addrs: Vec<String> = map.all().into_iter().map(|(addr, _)| addr).collect();
        assert_eq!(addrs.len(), 2);
        assert!(addrs.contains(&"127.0.0.1:11300".to_string()));
        assert!(addrs.contains(&"10.1.2.4:9000".to_string()));
    }
}
