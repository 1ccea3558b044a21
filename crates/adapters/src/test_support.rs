// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `KvClient`/`JobClient` fakes for worker and terminal tests
//! that should not require a live Redis or beanstalkd.

use crate::error::AdapterError;
use crate::job::JobClient;
use crate::kv::KvClient;
use crate::pool::{JobPoolProvider, KvPoolProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Clone, Default)]
pub struct FakeKvClient {
    lists: Arc<Mutex<HashMap<String, VecDeque<Vec<u8>>>>>,
    hashes: Arc<Mutex<HashMap<String, HashMap<String, String>>>>,
    pings: Arc<Mutex<u64>>,
}

impl FakeKvClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hash(&self, key: &str, field: &str, value: &str) {
        self.hashes
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    pub fn list_len(&self, key: &str) -> usize {
        self.lists.lock().get(key).map(|l| l.len()).unwrap_or(0)
    }

    /// Drops an entire hash, as a real `HDEL` of its last field would.
    pub fn clear_hash(&self, key: &str) {
        self.hashes.lock().remove(key);
    }

    pub fn ping_count(&self) -> u64 {
        *self.pings.lock()
    }
}

#[async_trait]
impl KvClient for FakeKvClient {
    async fn rpush(&self, key: &str, value: Vec<u8>) -> Result<(), AdapterError> {
        self.lists.lock().entry(key.to_string()).or_default().push_back(value);
        Ok(())
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>, AdapterError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(v) = self.lists.lock().get_mut(key).and_then(|l| l.pop_front()) {
                return Ok(Some(v));
            }
            if std::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AdapterError> {
        Ok(self.hashes.lock().get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, AdapterError> {
        Ok(self.hashes.lock().get(key).map(|h| h.clone().into_iter().collect()).unwrap_or_default())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, AdapterError> {
        // Only supports the broker's own "inbox:[1-9]*"-style prefix glob.
        let prefix = pattern.trim_end_matches(['*', '[', '1', '-', '9', ']']);
        Ok(self.lists.lock().keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn del(&self, key: &str) -> Result<(), AdapterError> {
        self.lists.lock().remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        *self.pings.lock() += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeJobClient {
    pub puts: Vec<(String, Vec<u8>, u32, u32, u32)>,
    pub stats: HashMap<String, HashMap<String, String>>,
    next_id: u64,
}

impl FakeJobClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stats(&mut self, tube: &str, ready: u32, reserved: u32) {
        let mut m = HashMap::new();
        m.insert("current-jobs-ready".to_string(), ready.to_string());
        m.insert("current-jobs-reserved".to_string(), reserved.to_string());
        self.stats.insert(tube.to_string(), m);
    }
}

#[async_trait]
impl JobClient for FakeJobClient {
    async fn put(
        &mut self,
        tube: &str,
        body: &[u8],
        pri: u32,
        delay: u32,
        ttr: u32,
    ) -> Result<u64, AdapterError> {
        self.next_id += 1;
        self.puts.push((tube.to_string(), body.to_vec(), pri, delay, ttr));
        Ok(self.next_id)
    }

    async fn stats(&mut self, tube: &str) -> Result<HashMap<String, String>, AdapterError> {
        self.stats.get(tube).cloned().ok_or_else(|| AdapterError::TubeNotFound(tube.to_string()))
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

/// An address-keyed [`KvPoolProvider`] backed by [`FakeKvClient`]s, one
/// lazily created per address.
#[derive(Default)]
pub struct FakeKvPoolProvider {
    clients: Mutex<HashMap<String, FakeKvClient>>,
}

impl FakeKvPoolProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access to a given address's fake client, for asserting on
    /// its state (e.g. mailbox contents) from a test.
    pub fn client(&self, addr: &str) -> FakeKvClient {
        self.clients.lock().entry(addr.to_string()).or_insert_with(FakeKvClient::new).clone()
    }
}

#[async_trait]
impl KvPoolProvider for FakeKvPoolProvider {
    async fn get_or_create(&self, addr: &str) -> Result<Arc<dyn KvClient>, AdapterError> {
        Ok(Arc::new(self.client(addr)) as Arc<dyn KvClient>)
    }

    fn addrs(&self) -> Vec<String> {
        self.clients.lock().keys().cloned().collect()
    }
}

/// An address-keyed [`JobPoolProvider`] backed by [`FakeJobClient`]s, one
/// lazily created per address.
#[derive(Default)]
pub struct FakeJobPoolProvider {
    clients: AsyncMutex<HashMap<String, FakeJobClient>>,
}

impl FakeJobPoolProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_stats(&self, addr: &str, tube: &str, ready: u32, reserved: u32) {
        let mut clients = self.clients.lock().await;
        clients.entry(addr.to_string()).or_insert_with(FakeJobClient::new).set_stats(tube, ready, reserved);
    }

    pub async fn puts(&self, addr: &str) -> Vec<(String, Vec<u8>, u32, u32, u32)> {
        self.clients.lock().await.get(addr).map(|c| c.puts.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobPoolProvider for FakeJobPoolProvider {
    async fn put(
        &self,
        addr: &str,
        tube: &str,
        body: Vec<u8>,
        pri: u32,
        delay: u32,
        ttr: u32,
    ) -> Result<u64, AdapterError> {
        let mut clients = self.clients.lock().await;
        let client = clients.entry(addr.to_string()).or_insert_with(FakeJobClient::new);
        client.put(tube, &body, pri, delay, ttr).await
    }

    async fn stats(&self, addr: &str, tube: &str) -> Result<HashMap<String, String>, AdapterError> {
        let mut clients = self.clients.lock().await;
        let client = clients.entry(addr.to_string()).or_insert_with(FakeJobClient::new);
        client.stats(tube).await
    }
}
