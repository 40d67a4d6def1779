//! Witness fallback, malformed replies, credentials, and hostname replies.

use std::net::SocketAddr;

use vigil_proxy::{DiscoveryError, Locator, WitnessEndpoint};

use crate::helpers::{closed_addr, Backend, FakeWitness, TestProxy, DIAL_TIMEOUT, POLL, TIMEOUT};

fn locator(witnesses: &[&FakeWitness]) -> Locator {
    Locator::new(
        witnesses.iter().map(|w| w.endpoint()).collect(),
        "mymaster",
        None,
        DIAL_TIMEOUT,
    )
}

#[tokio::test]
async fn falls_back_to_next_witness_in_order() {
    let a = Backend::start("A").await;
    let b = Backend::start("B").await;
    let first = FakeWitness::reporting(a.addr).await;
    let second = FakeWitness::reporting(b.addr).await;

    // the first reachable witness wins even though a later one disagrees
    let dead_endpoint: WitnessEndpoint = closed_addr().await.to_string().parse().unwrap();
    let locator = Locator::new(
        vec![dead_endpoint, first.endpoint(), second.endpoint()],
        "mymaster",
        None,
        DIAL_TIMEOUT,
    );
    assert_eq!(locator.locate_primary().await.unwrap(), a.addr);
    assert_eq!(first.queries(), 1);
    assert_eq!(second.queries(), 0);
}

#[tokio::test]
async fn malformed_reply_moves_on() {
    let a = Backend::start("A").await;
    let garbled = FakeWitness::start(b"+OK\r\n".to_vec()).await;
    let rejecting = FakeWitness::start(b"-ERR unknown command\r\n".to_vec()).await;
    let good = FakeWitness::reporting(a.addr).await;

    let found = locator(&[&garbled, &rejecting, &good])
        .locate_primary()
        .await
        .unwrap();
    assert_eq!(found, a.addr);
    assert_eq!(garbled.queries(), 1);
    assert_eq!(rejecting.queries(), 1);
}

#[tokio::test]
async fn unreachable_candidate_moves_on() {
    let a = Backend::start("A").await;
    let stale = FakeWitness::reporting(closed_addr().await).await;
    let fresh = FakeWitness::reporting(a.addr).await;

    let found = locator(&[&stale, &fresh]).locate_primary().await.unwrap();
    assert_eq!(found, a.addr);
}

#[tokio::test]
async fn every_witness_failing_is_exhausted() {
    let unknown = FakeWitness::start(b"*-1\r\n".to_vec()).await;
    let stale = FakeWitness::reporting(closed_addr().await).await;

    let err = locator(&[&unknown, &stale]).locate_primary().await.unwrap_err();
    assert_eq!(err, DiscoveryError::Exhausted { attempted: 2 });
}

#[tokio::test]
async fn credential_is_sent_before_each_query() {
    let a = Backend::start("A").await;
    let witness = FakeWitness::reporting(a.addr).await;
    let proxy = TestProxy::start_with(&[&witness], Some("s3cret pass")).await;
    proxy.wait_for_primary(a.addr).await;

    let auths = witness.auths();
    assert!(!auths.is_empty());
    assert!(auths.iter().all(|a| a == "\"s3cret pass\""));
}

#[tokio::test]
async fn hostname_reply_resolves_to_reachable_address() {
    let a = Backend::start("A").await;
    let port = a.addr.port().to_string();
    let reply = format!("*2\r\n$9\r\nlocalhost\r\n${}\r\n{port}\r\n", port.len());
    let witness = FakeWitness::start(reply.into_bytes()).await;

    let found: SocketAddr = locator(&[&witness]).locate_primary().await.unwrap();
    // the backend only listens on the v4 loopback
    assert_eq!(found, a.addr);
}

#[tokio::test]
async fn identical_address_across_witnesses_is_one_generation() {
    let a = Backend::start("A").await;
    let first = FakeWitness::reporting(a.addr).await;
    let second = FakeWitness::reporting(a.addr).await;
    let proxy = TestProxy::start(&[&first, &second]).await;
    proxy.wait_for_primary(a.addr).await;

    // first witness goes bad; the second reports the same primary
    first.set_reply(b"-ERR down\r\n".to_vec());
    let before = second.queries();
    tokio::time::timeout(TIMEOUT, async {
        while second.queries() < before + 3 {
            tokio::time::sleep(POLL / 2).await;
        }
    })
    .await
    .expect("second witness should be polled");
    assert_eq!(proxy.view.primary(), Some(a.addr));
    assert_eq!(proxy.view.snapshot().generation, 1);
}
