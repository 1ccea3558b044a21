// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sole transport record carried between terminals, workers, and the
//! external KV/job-server media.

use crate::macros::simple_display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Wire protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Req,
    Res,
    Job,
}

simple_display! {
    Action {
        Req => "req",
        Res => "res",
        Job => "job",
    }
}

impl std::str::FromStr for Action {
    type Err = MsgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "req" => Ok(Action::Req),
            "res" => Ok(Action::Res),
            "job" => Ok(Action::Job),
            other => Err(MsgError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MsgError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("rid {0:?} is not of the form <pid>|<nonce>")]
    MalformedRid(String),
}

/// The sole transport record. See field docs for the wire-codec field
/// names, which MUST stay stable (`act, bid, rid, tid, topic, chan, nav,
/// st, dl, data, code`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    pub action: Action,
    #[serde(default)]
    pub bid: String,
    #[serde(default)]
    pub tid: String,
    #[serde(default)]
    pub rid: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub nav: String,
    pub send_time: u64,
    pub dead_line: u64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub code: String,
}

impl Msg {
    pub fn new(action: Action, topic: impl Into<String>, now_secs: u64) -> Self {
        Msg {
            action,
            bid: String::new(),
            tid: String::new(),
            rid: String::new(),
            topic: topic.into(),
            channel: String::new(),
            nav: String::new(),
            send_time: now_secs,
            dead_line: 0,
            data: Value::Null,
            code: String::new(),
        }
    }

    /// `TubeName = Topic` or `Topic-Channel`.
    pub fn tube_name(&self) -> String {
        self.combo_name('-')
    }

    /// `ServiceName = Topic` or `Topic/Channel`.
    pub fn service_name(&self) -> String {
        self.combo_name('/')
    }

    fn combo_name(&self, join: char) -> String {
        if self.channel.is_empty() {
            self.topic.clone()
        } else {
            format!("{}{join}{}", self.topic, self.channel)
        }
    }

    /// `RID` is `<pid>|<nonce>`; returns the pid prefix.
    pub fn pid_of_rid(&self) -> Result<&str, MsgError> {
        let mut parts = self.rid.splitn(2, '|');
        match (parts.next(), parts.next()) {
            (Some(pid), Some(_)) if !pid.is_empty() => Ok(pid),
            _ => Err(MsgError::MalformedRid(self.rid.clone())),
        }
    }

    /// A msg with `dead_line < now` (or `dead_line == 0`) is dead and MUST
    /// be dropped by any consumer.
    pub fn is_dead(&self, now_secs: u64) -> bool {
        self.dead_line == 0 || self.dead_line < now_secs
    }

    /// Fills `bid`/`tid` only if currently empty.
    pub fn fill_with_req(&mut self, bid: &str, tid: &str) {
        if self.bid.is_empty() {
            self.bid = bid.to_string();
        }
        if self.tid.is_empty() {
            self.tid = tid.to_string();
        }
    }

    /// Clones this message into a new message for the given action,
    /// applying the req/res field-carry rules.
    ///
    /// `res` clones strip `topic/channel/nav` and fill `code = "0"` if
    /// empty; `req` clones preserve them and leave `code` empty.
    pub fn clone_for(&self, action: Action) -> Msg {
        let mut m = self.clone();
        m.action = action;
        match action {
            Action::Res => {
                m.topic.clear();
                m.channel.clear();
                m.nav.clear();
                if m.code.is_empty() {
                    m.code = "0".to_string();
                }
            }
            Action::Req => {
                m.code.clear();
            }
            Action::Job => {}
        }
        m
    }

    /// Parses the `job` `Code` triplet `"pri|delay|ttr"`, defaulting to
    /// `(100, 0, 300)` on an empty or malformed code.
    pub fn job_code(&self) -> (u32, u32, u32) {
        const DEFAULT: (u32, u32, u32) = (100, 0, 300);
        if self.code.is_empty() {
            return DEFAULT;
        }
        let mut parts = self.code.splitn(3, '|');
        let pri = parts.next().and_then(|s| s.parse().ok());
        let delay = parts.next().and_then(|s| s.parse().ok());
        let ttr = parts.next().and_then(|s| s.parse().ok());
        match (pri, delay, ttr) {
            (Some(p), Some(d), Some(t)) => (p, d, t),
            _ => DEFAULT,
        }
    }
}

#[cfg(test)]
#[path = "msg_tests.rs"]
mod tests;
