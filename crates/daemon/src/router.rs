// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Destination routing for `req`/`job` messages. `RouteNextDest` and
//! `DestAddr` in the system this is ported from are hardcoded stubs
//! that always resolve to the local broker; this trait keeps that as
//! the only shipped behavior while leaving room for a real
//! cross-broker router to be plugged in later.

use mb_core::Msg;

/// Resolves the destination broker for an outbound `req`/`job` message.
/// The only shipped implementation always answers "local" — remote
/// dispatch is out of scope and its wire format undefined.
pub trait Router: Send + Sync {
    /// Picks a destination broker ID for `msg` out of `brokers_online`,
    /// typically stamping it onto `msg.channel`.
    fn route(&self, msg: &mut Msg, brokers_online: &[String]) -> String;

    /// Whether `addr` names this broker.
    fn is_local(&self, addr: &str) -> bool;
}

/// Always routes to the local broker, regardless of what brokers are
/// reported online.
pub struct LocalRouter {
    local_id: String,
}

impl LocalRouter {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self { local_id: local_id.into() }
    }
}

impl Router for LocalRouter {
    fn route(&self, msg: &mut Msg, _brokers_online: &[String]) -> String {
        msg.channel = self.local_id.clone();
        self.local_id.clone()
    }

    fn is_local(&self, addr: &str) -> bool {
        addr == self.local_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_core::Action;

    #[test]
    fn local_router_always_resolves_local() {
        let router = LocalRouter::new("10.0.0.1");
        let mut msg = Msg::new(Action::Req, "svc", 0);
        let dest = router.route(&mut msg, &["10.0.0.2".to_string(), "10.0.0.3".to_string()]);
        assert_eq!(dest, "10.0.0.1");
        assert_eq!(msg.channel, "10.0.0.1");
        assert!(router.is_local("10.0.0.1"));
        assert!(!router.is_local("10.0.0.2"));
    }
}
