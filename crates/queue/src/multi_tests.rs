// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use mb_core::Action;
use std::collections::HashSet;

fn msg(topic: &str) -> Msg {
    Msg::new(Action::Req, topic, 0)
}

#[tokio::test]
async fn fairness_k_ready_queues_yield_k_distinct_messages() {
    let registry = QueueRegistry::new(4, Duration::from_millis(200));
    let names = vec!["s1".to_string(), "s2".to_string(), "s3".to_string()];
    for (i, n) in names.iter().enumerate() {
        let q = registry.get_or_create(n);
        assert!(q.push(msg(&format!("m{i}")), false).await);
    }

    let poper = MultiPoper::new(&registry, &names, Duration::from_millis(200));
    let mut seen = HashSet::new();
    for _ in 0..3 {
        let (popped, ok) = poper.pop().await;
        assert!(ok, "expected a ready message, not a timeout");
        seen.insert(popped.unwrap().topic);
    }
    assert_eq!(seen.len(), 3);
}

#[tokio::test]
async fn pop_times_out_when_nothing_is_ready() {
    let registry = QueueRegistry::new(4, Duration::from_millis(20));
    let names = vec!["s1".to_string()];
    let poper = MultiPoper::new(&registry, &names, Duration::from_millis(20));
    let (popped, ok) = poper.pop().await;
    assert_eq!((popped, ok), (None, false));
}

#[tokio::test]
async fn clone_shares_underlying_queues() {
    let registry = QueueRegistry::new(4, Duration::from_millis(200));
    let names = vec!["s1".to_string()];
    let poper = MultiPoper::new(&registry, &names, Duration::from_millis(200));
    let clone = poper.clone();

    let q = registry.get_or_create("s1");
    assert!(q.push(msg("hi"), false).await);

    let (popped, ok) = clone.pop().await;
    assert!(ok);
    assert_eq!(popped.unwrap().topic, "hi");
}

#[tokio::test]
async fn pop_wakes_up_once_a_queue_becomes_ready() {
    let registry = Arc::new(QueueRegistry::new(4, Duration::from_millis(500)));
    let names = vec!["s1".to_string()];
    let poper = MultiPoper::new(&registry, &names, Duration::from_millis(500));

    let registry2 = registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let q = registry2.get_or_create("s1");
        q.push(msg("late"), true).await;
    });

    let (popped, ok) = poper.pop().await;
    assert!(ok);
    assert_eq!(popped.unwrap().topic, "late");
}
