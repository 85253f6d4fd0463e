mod support;

use mural_collab::{ConnectionState, MemoryLog, Session, SessionConfig, WebSocketTransport};
use mural_core::{CardDraft, Point};
use std::sync::Arc;
use std::time::{Duration, Instant};
use support::start_relay;

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn open(room: &str, endpoints: Vec<String>) -> Session {
    let transport = WebSocketTransport::new(endpoints, Duration::from_secs(1));
    Session::open(
        SessionConfig::for_testing(room),
        Arc::new(transport),
        Arc::new(MemoryLog::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_sessions_sync_through_relay() {
    let relay = start_relay().await;
    let a = open("ws room", vec![relay.url.clone()]);
    let b = open("ws room", vec![relay.url.clone()]);
    eventually("both connected", || {
        a.connection_state() == ConnectionState::Connected
            && b.connection_state() == ConnectionState::Connected
    })
    .await;

    let card = a.add_card(CardDraft::default().titled("over the wire")).unwrap();
    eventually("card relayed", || b.card(&card.id).is_some()).await;

    b.move_card(&card.id, Point::new(40.0, 80.0)).unwrap();
    eventually("move relayed", || {
        a.card(&card.id).map(|c| c.position) == Some(Point::new(40.0, 80.0))
    })
    .await;

    a.update_presence(Some(Point::new(1.0, 2.0)));
    eventually("cursor relayed", || b.cursors().len() == 1).await;

    a.close().await.unwrap();
    b.close().await.unwrap();
}

#[tokio::test]
async fn test_rooms_are_isolated_on_relay() {
    let relay = start_relay().await;
    let a = open("left", vec![relay.url.clone()]);
    let b = open("right", vec![relay.url.clone()]);
    eventually("both connected", || {
        a.connection_state() == ConnectionState::Connected
            && b.connection_state() == ConnectionState::Connected
    })
    .await;

    a.add_card(CardDraft::default()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(b.cards().is_empty());

    a.close().await.unwrap();
    b.close().await.unwrap();
}

#[tokio::test]
async fn test_falls_back_to_next_endpoint() {
    let relay = start_relay().await;
    let session = open(
        "fallback",
        vec!["ws://127.0.0.1:9".to_string(), relay.url.clone()],
    );
    eventually("connected via second endpoint", || {
        session.connection_state() == ConnectionState::Connected
    })
    .await;
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_relay_keeps_working_offline() {
    let session = open("nowhere", vec!["ws://127.0.0.1:9".to_string()]);
    let card = session.add_card(CardDraft::default()).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_ne!(session.connection_state(), ConnectionState::Connected);
    assert_eq!(session.card(&card.id), Some(card));
    session.close().await.unwrap();
}
