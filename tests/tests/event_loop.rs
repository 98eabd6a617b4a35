//! Event loop tests: bus events and retention ticks over real channels.

use std::time::Duration;

use bridge_core::{RetentionPolicy, SampleValue, SeriesKey, ValueType};
use bytes::Bytes;
use chrono::Utc;
use integration_tests::{fixtures, setup::TestContext};
use mqtt_bus::{BusEvent, ConnectionErrorKind};
use tokio::sync::mpsc;
use worker::{run_event_loop, LoopExit};

fn message(topic: &str, payload: &'static [u8]) -> BusEvent {
    BusEvent::Message {
        topic: topic.into(),
        payload: Bytes::from_static(payload),
    }
}

#[tokio::test]
async fn test_messages_are_processed_until_bus_closes() {
    let mut ctx = TestContext::new(vec![fixtures::raw_entry("a/b", ValueType::Integer, 1)]);
    let (tx, mut rx) = mpsc::channel(16);

    tx.send(BusEvent::Connected).await.unwrap();
    for payload in [&b"1"[..], b"1", b"2", b"2", b"3"] {
        tx.send(message("a/b", payload)).await.unwrap();
    }
    drop(tx);

    let exit = run_event_loop(
        &mut ctx.pipeline,
        &mut rx,
        Duration::from_secs(3600),
        std::future::pending(),
    )
    .await;

    assert_eq!(exit, LoopExit::BusClosed);
    assert_eq!(
        ctx.store.values_for(ValueType::Integer, &SeriesKey::Id(1)),
        vec![
            SampleValue::Integer(1),
            SampleValue::Integer(2),
            SampleValue::Integer(3)
        ]
    );
}

#[tokio::test]
async fn test_fatal_connection_error_stops_loop() {
    let mut ctx = TestContext::new(vec![]);
    let (tx, mut rx) = mpsc::channel(16);

    tx.send(BusEvent::SubscriptionFailed {
        filter: "#".into(),
        reason: "rejected by broker".into(),
    })
    .await
    .unwrap();
    tx.send(BusEvent::ConnectionError {
        kind: ConnectionErrorKind::Transport,
        message: "connection reset".into(),
        fatal: true,
    })
    .await
    .unwrap();
    tx.send(message("after/fatal", b"1")).await.unwrap();

    let exit = run_event_loop(
        &mut ctx.pipeline,
        &mut rx,
        Duration::from_secs(3600),
        std::future::pending(),
    )
    .await;

    match exit {
        LoopExit::Fatal(event) => assert_eq!(event.exit_code, 3),
        other => panic!("unexpected exit: {:?}", other),
    }
    assert!(ctx.store.seen_topics().is_empty());
}

#[tokio::test]
async fn test_shutdown_stops_loop() {
    let mut ctx = TestContext::new(vec![]);
    let (_tx, mut rx) = mpsc::channel::<BusEvent>(16);

    let exit = run_event_loop(
        &mut ctx.pipeline,
        &mut rx,
        Duration::from_secs(3600),
        std::future::ready(()),
    )
    .await;

    assert_eq!(exit, LoopExit::Shutdown);
}

/// The ticker triggers sweeps while the loop waits for messages.
#[tokio::test]
async fn test_retention_ticks_sweep_tables() {
    let mut ctx = TestContext::with_policy(vec![], RetentionPolicy::from_hours(1));
    ctx.store.seed(
        SeriesKey::Id(1),
        SampleValue::Double(1.0),
        Utc::now() - chrono::Duration::hours(3),
    );
    let (_tx, mut rx) = mpsc::channel::<BusEvent>(16);

    let exit = run_event_loop(
        &mut ctx.pipeline,
        &mut rx,
        Duration::from_millis(20),
        tokio::time::sleep(Duration::from_millis(300)),
    )
    .await;

    assert_eq!(exit, LoopExit::Shutdown);
    assert_eq!(ctx.store.row_count(ValueType::Double), 0);
}

/// Sweeps keep running while the bus channel never runs dry.
#[tokio::test]
async fn test_retention_runs_during_message_backlog() {
    const BACKLOG: usize = 20_000;

    let mut ctx = TestContext::with_policy(
        vec![fixtures::raw_entry("a/b", ValueType::Integer, 1)],
        RetentionPolicy::from_hours(1),
    );
    ctx.store.seed(
        SeriesKey::Id(2),
        SampleValue::Double(1.0),
        Utc::now() - chrono::Duration::hours(3),
    );

    let (tx, mut rx) = mpsc::channel(BACKLOG);
    for i in 0..BACKLOG {
        tx.send(BusEvent::Message {
            topic: "a/b".into(),
            payload: Bytes::from((i % 100).to_string()),
        })
        .await
        .unwrap();
    }
    drop(tx);

    let exit = run_event_loop(
        &mut ctx.pipeline,
        &mut rx,
        Duration::from_millis(1),
        std::future::pending(),
    )
    .await;

    assert_eq!(exit, LoopExit::BusClosed);
    assert_eq!(ctx.store.row_count(ValueType::Double), 0);
    assert_eq!(ctx.store.row_count(ValueType::Integer), BACKLOG);
}
