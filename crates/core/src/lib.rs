// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core data types and the generic finite-state-machine engine shared by
//! every long-running actor in the broker.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod clock;
mod fsm;
mod macros;
mod msg;
mod tid;

pub use clock::{Clock, FakeClock, SystemClock};
pub use fsm::{
    evt_next, Callback, CallbackKey, CallbackType, Event, FlowDesc, FnCallback, Fsm, FsmBuilder,
    FsmError, StopReason, START_FSM, STOP_FSM,
};
pub use msg::{Action, Msg, MsgError};
pub use tid::TidGenerator;
