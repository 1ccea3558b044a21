// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire framing for the broker: the client-facing TCP frame codec and
//! the versioned `Msg` pack/unpack registry used to move messages
//! through the KV mailboxes and the job server.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod protocol;

pub use frame::{read_frame, write_frame, Frame};
pub use protocol::{pack, unpack, PackRegistry, WireError};
