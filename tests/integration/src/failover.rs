//! End-to-end failover: primary changes drain old sessions and steer new
//! ones.

use std::time::Duration;

use crate::helpers::{closed_addr, Backend, FakeWitness, TestProxy, POLL};

#[tokio::test]
async fn routes_clients_to_discovered_primary() {
    let a = Backend::start("A").await;
    let witness = FakeWitness::reporting(a.addr).await;
    let proxy = TestProxy::start(&[&witness]).await;

    assert_eq!(proxy.wait_for_primary(a.addr).await, 1);

    let mut client = proxy.connect().await;
    assert_eq!(client.send("hello").await, "A:hello");
    assert_eq!(client.send("again").await, "A:again");
}

#[tokio::test]
async fn failover_drains_old_sessions_and_routes_new_ones() {
    let a = Backend::start("A").await;
    let b = Backend::start("B").await;
    let witness = FakeWitness::reporting(a.addr).await;
    let proxy = TestProxy::start(&[&witness]).await;
    proxy.wait_for_primary(a.addr).await;

    let mut first = proxy.connect().await;
    let mut second = proxy.connect().await;
    assert_eq!(first.send("1").await, "A:1");
    assert_eq!(second.send("2").await, "A:2");

    witness.report(b.addr);
    assert_eq!(proxy.wait_for_primary(b.addr).await, 2);

    // both sessions belonged to generation 1 and are closed
    first.assert_closed().await;
    second.assert_closed().await;

    let mut third = proxy.connect().await;
    assert_eq!(third.send("3").await, "B:3");
}

#[tokio::test]
async fn unchanged_primary_leaves_sessions_open() {
    let a = Backend::start("A").await;
    let witness = FakeWitness::reporting(a.addr).await;
    let proxy = TestProxy::start(&[&witness]).await;
    proxy.wait_for_primary(a.addr).await;

    let mut client = proxy.connect().await;
    assert_eq!(client.send("before").await, "A:before");

    let polls = witness.queries();
    tokio::time::sleep(POLL * 6).await;
    assert!(witness.queries() > polls, "watcher should keep polling");

    assert_eq!(proxy.view.snapshot().generation, 1);
    assert_eq!(client.send("after").await, "A:after");
}

#[tokio::test]
async fn witness_outage_keeps_current_primary() {
    let a = Backend::start("A").await;
    let witness = FakeWitness::reporting(a.addr).await;
    let proxy = TestProxy::start(&[&witness]).await;
    proxy.wait_for_primary(a.addr).await;

    let mut client = proxy.connect().await;
    assert_eq!(client.send("x").await, "A:x");

    witness.set_reply(b"-ERR witness is confused\r\n".to_vec());
    tokio::time::sleep(POLL * 4).await;

    let snapshot = proxy.view.snapshot();
    assert_eq!(snapshot.primary, Some(a.addr));
    assert_eq!(snapshot.generation, 1);
    assert_eq!(client.send("y").await, "A:y");

    let mut fresh = proxy.connect().await;
    assert_eq!(fresh.send("z").await, "A:z");
}

#[tokio::test]
async fn unreachable_candidate_is_not_adopted() {
    let a = Backend::start("A").await;
    let witness = FakeWitness::reporting(a.addr).await;
    let proxy = TestProxy::start(&[&witness]).await;
    proxy.wait_for_primary(a.addr).await;

    let mut client = proxy.connect().await;
    assert_eq!(client.send("x").await, "A:x");

    witness.report(closed_addr().await);
    tokio::time::sleep(POLL * 4).await;

    assert_eq!(proxy.view.primary(), Some(a.addr));
    assert_eq!(client.send("y").await, "A:y");
}

#[tokio::test]
async fn failing_back_is_another_generation() {
    let a = Backend::start("A").await;
    let b = Backend::start("B").await;
    let witness = FakeWitness::reporting(a.addr).await;
    let proxy = TestProxy::start(&[&witness]).await;
    proxy.wait_for_primary(a.addr).await;

    witness.report(b.addr);
    proxy.wait_for_primary(b.addr).await;
    let mut on_b = proxy.connect().await;
    assert_eq!(on_b.send("b").await, "B:b");

    witness.report(a.addr);
    assert_eq!(proxy.wait_for_primary(a.addr).await, 3);
    on_b.assert_closed().await;

    let mut on_a = proxy.connect().await;
    assert_eq!(on_a.send("a").await, "A:a");
}

#[tokio::test]
async fn clients_are_refused_until_a_primary_is_known() {
    let witness = FakeWitness::start(b"*-1\r\n".to_vec()).await;
    let proxy = TestProxy::start(&[&witness]).await;

    let mut early = proxy.connect().await;
    early.assert_closed().await;

    let a = Backend::start("A").await;
    witness.report(a.addr);
    proxy.wait_for_primary(a.addr).await;

    let mut client = proxy.connect().await;
    assert_eq!(client.send("up").await, "A:up");
}

#[tokio::test]
async fn dead_primary_closes_new_clients_without_hanging() {
    let a = Backend::start("A").await;
    let witness = FakeWitness::reporting(a.addr).await;
    let proxy = TestProxy::start(&[&witness]).await;
    proxy.wait_for_primary(a.addr).await;

    // primary dies but no witness has noticed yet
    a.stop();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut client = proxy.connect().await;
    client.assert_closed().await;
}
