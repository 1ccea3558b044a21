// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned `Msg` pack/unpack. A `PackRegistry` maps the version byte
//! prepended to every packed message onto a codec; only V1 ships today,
//! but unknown versions fail distinctly rather than being guessed at.

use mb_core::{Action, Msg};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("packed message too short: need at least 2 bytes, got {0}")]
    TooShort(usize),
    #[error("unknown protocol version byte {0}")]
    UnknownVersion(u8),
    #[error("msg decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unknown action {0:?} in decoded msg")]
    UnknownAction(String),
    #[error("frame error: {0}")]
    Frame(String),
}

/// The self-describing wire record. Field names MUST stay stable across
/// rewrites: `act, bid, rid, tid, topic, chan, nav, st, dl, data, code`.
#[derive(Debug, Serialize, Deserialize)]
struct WireMsgV1 {
    act: String,
    #[serde(default)]
    bid: String,
    #[serde(default)]
    rid: String,
    #[serde(default)]
    tid: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    chan: String,
    #[serde(default)]
    nav: String,
    st: u64,
    dl: u64,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    code: String,
}

impl From<&Msg> for WireMsgV1 {
    fn from(m: &Msg) -> Self {
        WireMsgV1 {
            act: m.action.to_string(),
            bid: m.bid.clone(),
            rid: m.rid.clone(),
            tid: m.tid.clone(),
            topic: m.topic.clone(),
            chan: m.channel.clone(),
            nav: m.nav.clone(),
            st: m.send_time,
            dl: m.dead_line,
            data: m.data.clone(),
            code: m.code.clone(),
        }
    }
}

impl TryFrom<WireMsgV1> for Msg {
    type Error = WireError;

    fn try_from(w: WireMsgV1) -> Result<Self, Self::Error> {
        let action: Action = w.act.parse().map_err(|_| WireError::UnknownAction(w.act.clone()))?;
        Ok(Msg {
            action,
            bid: w.bid,
            rid: w.rid,
            tid: w.tid,
            topic: w.topic,
            channel: w.chan,
            nav: w.nav,
            send_time: w.st,
            dead_line: w.dl,
            data: w.data,
            code: w.code,
        })
    }
}

trait Codec: Send + Sync {
    fn encode(&self, msg: &Msg) -> Result<Vec<u8>, WireError>;
    fn decode(&self, bytes: &[u8]) -> Result<Msg, WireError>;
}

struct V1Codec;

impl Codec for V1Codec {
    fn encode(&self, msg: &Msg) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(&WireMsgV1::from(msg))?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Msg, WireError> {
        let wire: WireMsgV1 = serde_json::from_slice(bytes)?;
        wire.try_into()
    }
}

/// Maps a version byte to its codec. Only V1 is registered by
/// `PackRegistry::default()`.
pub struct PackRegistry {
    codecs: HashMap<u8, Box<dyn Codec>>,
}

impl Default for PackRegistry {
    fn default() -> Self {
        let mut codecs: HashMap<u8, Box<dyn Codec>> = HashMap::new();
        codecs.insert(mb_core::PROTOCOL_VERSION, Box::new(V1Codec));
        Self { codecs }
    }
}

impl PackRegistry {
    pub fn pack(&self, version: u8, msg: &Msg) -> Result<Vec<u8>, WireError> {
        let codec = self.codecs.get(&version).ok_or(WireError::UnknownVersion(version))?;
        let mut out = vec![version];
        out.extend(codec.encode(msg)?);
        Ok(out)
    }

    pub fn unpack(&self, bytes: &[u8]) -> Result<Msg, WireError> {
        if bytes.len() < 2 {
            return Err(WireError::TooShort(bytes.len()));
        }
        let version = bytes[0];
        let codec = self.codecs.get(&version).ok_or(WireError::UnknownVersion(version))?;
        codec.decode(&bytes[1..])
    }
}

/// Packs with the current default protocol version.
pub fn pack(msg: &Msg) -> Result<Vec<u8>, WireError> {
    PackRegistry::default().pack(mb_core::PROTOCOL_VERSION, msg)
}

/// Unpacks a message of any registered version.
pub fn unpack(bytes: &[u8]) -> Result<Msg, WireError> {
    PackRegistry::default().unpack(bytes)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
