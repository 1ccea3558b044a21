// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::router::LocalRouter;
use mb_core::Action;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

const LOCAL_ID: &str = "10.0.0.5";

/// Binds a loopback listener, spawns one terminal actor over the first
/// accepted connection, and returns a client stream already connected
/// to it along with the shared registry the terminal registers its
/// queues against.
async fn spawn_terminal() -> (TcpStream, Arc<QueueRegistry>, Arc<Queue<Msg>>, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let registry = Arc::new(QueueRegistry::new(16, Duration::from_millis(200)));
    let pub_queue = Arc::new(Queue::new(16, Duration::from_millis(200)));
    let router: Arc<dyn Router> = Arc::new(LocalRouter::new(LOCAL_ID));
    let shutdown = CancellationToken::new();

    let client = TcpStream::connect(addr).await.expect("connect");
    let (conn, _peer) = listener.accept().await.expect("accept");

    let registry_clone = registry.clone();
    let pub_queue_clone = pub_queue.clone();
    let router_clone = router.clone();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        run(
            "#T1".to_string(),
            conn,
            registry_clone,
            pub_queue_clone,
            Some(router_clone),
            LOCAL_ID.to_string(),
            Arc::new(RwLock::new(HashMap::new())),
            shutdown_clone,
        )
        .await;
    });

    (client, registry, pub_queue, shutdown)
}

/// `reg "s1,s2"` -> `ok <hash>`; `pull <hash>` on an empty subscription
/// -> `empty`; once another producer pushes onto `s1` through the same
/// registry, `pull <hash>` -> `ok <framed msg>`.
#[tokio::test]
async fn reg_then_pull_delivers_a_pushed_message() {
    let (mut client, registry, _pub_queue, _shutdown) = spawn_terminal().await;

    write_frame(&mut client, &Frame::new(vec!["reg".to_string(), "s1,s2".to_string()], Vec::new()))
        .await
        .expect("write reg");
    let reg_reply = read_frame(&mut client).await.expect("read reg reply");
    assert_eq!(reg_reply.verb(), Some("ok"));
    let hash = reg_reply.cmds[1].clone();

    write_frame(&mut client, &Frame::new(vec!["pull".to_string(), hash.clone()], Vec::new()))
        .await
        .expect("write pull");
    let empty_reply = read_frame(&mut client).await.expect("read empty reply");
    assert_eq!(empty_reply.verb(), Some("empty"));

    let mut msg = Msg::new(Action::Req, "billing", 0);
    msg.dead_line = u64::MAX;
    let s1_queue = registry.get_or_create("s1");
    assert!(s1_queue.push(msg.clone(), true).await);

    write_frame(&mut client, &Frame::new(vec!["pull".to_string(), hash], Vec::new()))
        .await
        .expect("write pull");
    let ok_reply = read_frame(&mut client).await.expect("read ok reply");
    assert_eq!(ok_reply.verb(), Some("ok"));
    let delivered = mb_wire::unpack(&ok_reply.data).expect("unpack delivered msg");
    assert_eq!(delivered.topic, "billing");
}

/// `pull` against a `sub_token` that was never `reg`'d errors.
#[tokio::test]
async fn pull_with_unknown_sub_token_errors() {
    let (mut client, _registry, _pub_queue, _shutdown) = spawn_terminal().await;

    write_frame(&mut client, &Frame::new(vec!["pull".to_string(), "deadbeef".to_string()], Vec::new()))
        .await
        .expect("write pull");
    let reply = read_frame(&mut client).await.expect("read reply");
    assert_eq!(reply.verb(), Some("err"));
}

/// `req` publishes onto the shared queue and blocks on the terminal's
/// private reply queue; stale replies bearing an earlier `rid` are
/// discarded, and only the reply matching the current request's `rid`
/// is surfaced as the `ok` response.
#[tokio::test]
async fn req_discards_stale_replies_and_returns_the_matching_one() {
    let (mut client, registry, pub_queue, _shutdown) = spawn_terminal().await;

    let mut req_msg = Msg::new(Action::Req, "billing", 0);
    req_msg.dead_line = u64::MAX;
    let req_bytes = mb_wire::pack(&req_msg).expect("pack req");

    write_frame(&mut client, &Frame::new(vec!["req".to_string()], req_bytes)).await.expect("write req");

    // The terminal publishes onto the shared queue and then blocks on
    // its own reply queue; popping here observes that publish before
    // any replies are pushed back.
    let published = pub_queue.pop(true).await;
    let (published_msg, ok) = published;
    assert!(ok);
    let published_msg = published_msg.expect("a req was published");
    let rid = published_msg.rid.clone();

    let reply_queue = registry.get_or_create("#T1");

    let mut stale_9 = published_msg.clone_for(Action::Res);
    stale_9.rid = format!("{}|9", rid.rsplit_once('|').map(|(pid, _)| pid).unwrap_or(&rid));
    stale_9.data = serde_json::json!("stale-9");
    reply_queue.push(stale_9, true).await;

    let mut current = published_msg.clone_for(Action::Res);
    current.rid = rid.clone();
    current.data = serde_json::json!("current");
    reply_queue.push(current, true).await;

    let mut stale_2 = published_msg.clone_for(Action::Res);
    stale_2.rid = format!("{}|2", rid.rsplit_once('|').map(|(pid, _)| pid).unwrap_or(&rid));
    stale_2.data = serde_json::json!("stale-2");
    reply_queue.push(stale_2, true).await;

    let reply = read_frame(&mut client).await.expect("read req reply");
    assert_eq!(reply.verb(), Some("ok"));
    let delivered = mb_wire::unpack(&reply.data).expect("unpack delivered reply");
    assert_eq!(delivered.data, serde_json::json!("current"));
}

/// `sync` against a config entry whose version matches the client's
/// returns `newest`; a stale version gets the current value back.
#[tokio::test]
async fn sync_reports_newest_or_the_current_value() {
    let (mut client, _registry, _pub_queue, _shutdown) = spawn_terminal().await;

    write_frame(&mut client, &Frame::new(vec!["sync".to_string(), "crontab".to_string(), "".to_string()], Vec::new()))
        .await
        .expect("write sync");
    let reply = read_frame(&mut client).await.expect("read sync reply");
    assert_eq!(reply.verb(), Some("newest"));
}
