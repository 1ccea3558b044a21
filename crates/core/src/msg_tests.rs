// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn sample(action: Action) -> Msg {
    let mut m = Msg::new(action, "a", 1000);
    m.channel = "b".to_string();
    m.nav = "nav-hint".to_string();
    m
}

#[test]
fn tube_and_service_name_join_topic_and_channel() {
    let m = sample(Action::Req);
    assert_eq!(m.tube_name(), "a-b");
    assert_eq!(m.service_name(), "a/b");
}

#[test]
fn tube_and_service_name_fall_back_to_topic_only() {
    let mut m = sample(Action::Req);
    m.channel.clear();
    assert_eq!(m.tube_name(), "a");
    assert_eq!(m.service_name(), "a");
}

#[parameterized(
    well_formed = {"123|nonce", Ok("123")},
    empty_pid = {"|nonce", Err(())},
    no_separator = {"123", Err(())},
    empty = {"", Err(())},
)]
fn pid_of_rid_parses_prefix(rid: &str, expected: Result<&str, ()>) {
    let mut m = sample(Action::Req);
    m.rid = rid.to_string();
    match expected {
        Ok(pid) => assert_eq!(m.pid_of_rid().unwrap(), pid),
        Err(()) => assert!(m.pid_of_rid().is_err()),
    }
}

#[test]
fn clone_for_res_strips_routing_fields_and_fills_code() {
    let m = sample(Action::Req);
    let res = m.clone_for(Action::Res);
    assert_eq!(res.action, Action::Res);
    assert!(res.topic.is_empty());
    assert!(res.channel.is_empty());
    assert!(res.nav.is_empty());
    assert_eq!(res.code, "0");
}

#[test]
fn clone_for_res_preserves_existing_code() {
    let mut m = sample(Action::Req);
    m.code = "42".to_string();
    let res = m.clone_for(Action::Res);
    assert_eq!(res.code, "42");
}

#[test]
fn clone_for_req_preserves_routing_fields() {
    let m = sample(Action::Req);
    let req = m.clone_for(Action::Req);
    assert_eq!(req.topic, "a");
    assert_eq!(req.channel, "b");
    assert_eq!(req.nav, "nav-hint");
    assert!(req.code.is_empty());
}

#[test]
fn is_dead_when_deadline_in_past_or_zero() {
    let mut m = sample(Action::Req);
    m.dead_line = 0;
    assert!(m.is_dead(100));
    m.dead_line = 50;
    assert!(m.is_dead(100));
    m.dead_line = 150;
    assert!(!m.is_dead(100));
}

#[test]
fn fill_with_req_only_sets_empty_fields() {
    let mut m = sample(Action::Req);
    m.fill_with_req("10.0.0.1", "#T1");
    assert_eq!(m.bid, "10.0.0.1");
    assert_eq!(m.tid, "#T1");
    m.fill_with_req("10.0.0.2", "#T2");
    assert_eq!(m.bid, "10.0.0.1");
    assert_eq!(m.tid, "#T1");
}

#[test]
fn job_code_defaults_when_empty_or_malformed() {
    let mut m = sample(Action::Job);
    assert_eq!(m.job_code(), (100, 0, 300));
    m.code = "garbage".to_string();
    assert_eq!(m.job_code(), (100, 0, 300));
    m.code = "50|10|60".to_string();
    assert_eq!(m.job_code(), (50, 10, 60));
}

#[test]
fn action_display_matches_wire_literal() {
    assert_eq!(Action::Req.to_string(), "req");
    assert_eq!(Action::Res.to_string(), "res");
    assert_eq!(Action::Job.to_string(), "job");
}

#[test]
fn action_from_str_roundtrips_display() {
    for a in [Action::Req, Action::Res, Action::Job] {
        assert_eq!(a.to_string().parse::<Action>().unwrap(), a);
    }
    assert!("bogus".parse::<Action>().is_err());
}
