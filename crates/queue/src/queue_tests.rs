// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn scenario_s1_fifo_and_fullness() {
    let q: Queue<&'static str> = Queue::new(1, Duration::from_millis(1));
    assert!(q.push("0", true).await);
    assert!(!q.push("1", false).await);
    assert_eq!(q.pop(true).await, (Some("0"), true));
    assert_eq!(q.pop(false).await, (None, false));
}

#[tokio::test]
async fn fifo_order_preserved_under_concurrent_push_pop() {
    let q = std::sync::Arc::new(Queue::<u32>::new(8, Duration::from_millis(200)));
    let producer = {
        let q = q.clone();
        tokio::spawn(async move {
            for i in 0..8 {
                assert!(q.push(i, true).await);
            }
        })
    };
    producer.await.unwrap();

    let mut popped = Vec::new();
    for _ in 0..8 {
        let (item, ok) = q.pop(true).await;
        assert!(ok);
        popped.push(item.unwrap());
    }
    assert_eq!(popped, (0..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn blocking_pop_times_out_on_empty_queue() {
    let q = Queue::<u32>::new(1, Duration::from_millis(20));
    let start = std::time::Instant::now();
    let (item, ok) = q.pop(true).await;
    assert_eq!((item, ok), (None, false));
    assert!(start.elapsed() >= Duration::from_millis(15));
}

#[tokio::test]
async fn blocking_push_times_out_on_full_queue() {
    let q = Queue::<u32>::new(1, Duration::from_millis(20));
    assert!(q.push(1, true).await);
    let start = std::time::Instant::now();
    let ok = q.push(2, true).await;
    assert!(!ok);
    assert!(start.elapsed() >= Duration::from_millis(15));
}

#[tokio::test]
async fn blocking_push_succeeds_once_a_slot_frees_up() {
    let q = std::sync::Arc::new(Queue::<u32>::new(1, Duration::from_millis(200)));
    assert!(q.push(1, true).await);

    let q2 = q.clone();
    let popper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        q2.pop(true).await
    });

    assert!(q.push(2, true).await);
    let (popped, ok) = popper.await.unwrap();
    assert!(ok);
    assert_eq!(popped, Some(1));
}
