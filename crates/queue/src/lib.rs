// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-process message fabric: bounded typed queues, a named-queue
//! registry, and the multi-queue fan-in selector terminals use for
//! subscriptions.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod multi;
mod queue;
mod registry;

pub use multi::MultiPoper;
pub use queue::Queue;
pub use registry::QueueRegistry;
