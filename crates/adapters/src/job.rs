// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job-server interface. No off-the-shelf async beanstalkd client is
//! assumed to be vendored here, so this is a small hand-rolled client
//! speaking just the subset of the text protocol this broker needs:
//! `use`, `put`, `watch`, `stats-tube`.

use crate::error::AdapterError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[async_trait]
pub trait JobClient: Send + Sync {
    async fn put(&mut self, tube: &str, body: &[u8], pri: u32, delay: u32, ttr: u32) -> Result<u64, AdapterError>;
    async fn stats(&mut self, tube: &str) -> Result<HashMap<String, String>, AdapterError>;
    fn is_healthy(&self) -> bool;
}

pub struct BeanClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
    used_tube: Option<String>,
    watched_tube: Option<String>,
    last_critical: bool,
}

impl BeanClient {
    pub async fn connect(addr: &str) -> Result<Self, AdapterError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            used_tube: None,
            watched_tube: None,
            last_critical: false,
        })
    }

    fn mark_if_critical(&mut self, message: &str) {
        let lower = message.to_lowercase();
        if lower.contains("refused") || lower.contains("eof") {
            self.last_critical = true;
        }
    }

    async fn send_line(&mut self, line: &str) -> Result<(), AdapterError> {
        let result = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.write_all(b"\r\n").await?;
            self.writer.flush().await
        }
        .await;
        if let Err(e) = &result {
            self.mark_if_critical(&e.to_string());
        }
        result.map_err(AdapterError::from)
    }

    async fn read_line(&mut self) -> Result<String, AdapterError> {
        let mut line = String::new();
        let result = self.reader.read_line(&mut line).await;
        match result {
            Ok(0) => {
                self.mark_if_critical("eof");
                Err(AdapterError::Protocol("connection closed by job server (EOF)".to_string()))
            }
            Ok(_) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => {
                self.mark_if_critical(&e.to_string());
                Err(AdapterError::from(e))
            }
        }
    }

    async fn read_exact_body(&mut self, len: usize) -> Result<Vec<u8>, AdapterError> {
        let mut buf = vec![0u8; len + 2]; // + trailing \r\n
        tokio::io::AsyncReadExt::read_exact(&mut self.reader, &mut buf).await?;
        buf.truncate(len);
        Ok(buf)
    }

    async fn ensure_tube_used(&mut self, tube: &str) -> Result<(), AdapterError> {
        if self.used_tube.as_deref() == Some(tube) {
            return Ok(());
        }
        self.send_line(&format!("use {tube}")).await?;
        let reply = self.read_line().await?;
        if !reply.starts_with("USING") {
            return Err(AdapterError::Protocol(format!("unexpected reply to use: {reply}")));
        }
        self.used_tube = Some(tube.to_string());
        Ok(())
    }

    async fn ensure_tube_watched(&mut self, tube: &str) -> Result<(), AdapterError> {
        if self.watched_tube.as_deref() == Some(tube) {
            return Ok(());
        }
        self.send_line(&format!("watch {tube}")).await?;
        let reply = self.read_line().await?;
        if !reply.starts_with("WATCHING") {
            return Err(AdapterError::Protocol(format!("unexpected reply to watch: {reply}")));
        }
        self.watched_tube = Some(tube.to_string());
        Ok(())
    }
}

#[async_trait]
impl JobClient for BeanClient {
    async fn put(
        &mut self,
        tube: &str,
        body: &[u8],
        pri: u32,
        delay: u32,
        ttr: u32,
    ) -> Result<u64, AdapterError> {
        self.ensure_tube_used(tube).await?;
        self.send_line(&format!("put {pri} {delay} {ttr} {}", body.len())).await?;
        self.writer.write_all(body).await.map_err(AdapterError::from)?;
        self.writer.write_all(b"\r\n").await.map_err(AdapterError::from)?;
        self.writer.flush().await.map_err(AdapterError::from)?;
        let reply = self.read_line().await?;
        let mut parts = reply.split_whitespace();
        match parts.next() {
            Some("INSERTED") | Some("BURIED") => {
                let id = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| AdapterError::Protocol(format!("malformed put reply: {reply}")))?;
                Ok(id)
            }
            _ => Err(AdapterError::Protocol(format!("put failed: {reply}"))),
        }
    }

    async fn stats(&mut self, tube: &str) -> Result<HashMap<String, String>, AdapterError> {
        self.ensure_tube_watched(tube).await?;
        self.send_line(&format!("stats-tube {tube}")).await?;
        let reply = self.read_line().await?;
        if reply.starts_with("NOT_FOUND") {
            return Err(AdapterError::TubeNotFound(tube.to_string()));
        }
        let mut parts = reply.split_whitespace();
        if parts.next() != Some("OK") {
            return Err(AdapterError::Protocol(format!("unexpected stats-tube reply: {reply}")));
        }
        let len: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| AdapterError::Protocol(format!("malformed stats-tube reply: {reply}")))?;
        let body = self.read_exact_body(len).await?;
        let text = String::from_utf8_lossy(&body);
        Ok(parse_yaml_map(&text))
    }

    fn is_healthy(&self) -> bool {
        !self.last_critical
    }
}

/// beanstalkd returns stats as a flat YAML map; this parses only the
/// `key: value` lines this broker needs, ignoring the `---` header.
fn parse_yaml_map(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_yaml_map_extracts_job_counts() {
        let text = "---\nname: t1\ncurrent-jobs-ready: 0\ncurrent-jobs-reserved: 1\n";
        let map = parse_yaml_map(text);
        assert_eq!(map.get("current-jobs-ready").map(String::as_str), Some("0"));
        assert_eq!(map.get("current-jobs-reserved").map(String::as_str), Some("1"));
    }
}
