//! Tests for error handling in the message pipeline.
//!
//! A failed message is dropped and logged; the next one is processed
//! normally.

use bridge_core::{Error, FatalErrorCode, SeriesKey, ValueType};
use bytes::Bytes;
use integration_tests::{fixtures, setup::TestContext};
use mqtt_bus::{BusEvent, ConnectionErrorKind};
use serde_json::json;
use worker::MessageOutcome;

#[tokio::test]
async fn test_invalid_json_is_dropped_without_side_effects() {
    let mut ctx = TestContext::new(vec![fixtures::temp1_entry()]);

    let outcomes = ctx.publish("sensors/temp1", b"{not json").await;
    assert!(matches!(
        &outcomes[0],
        MessageOutcome::Dropped {
            error: Error::Payload(_),
            ..
        }
    ));
    assert_eq!(ctx.store.total_rows(), 0);
    assert!(ctx.pipeline.detector().is_empty());
    assert_eq!(ctx.store.lookup_count(), 0);
}

#[tokio::test]
async fn test_query_miss_and_non_scalar_are_dropped() {
    let mut ctx = TestContext::new(vec![fixtures::json_entry("a/b", ValueType::Double, 1)]);

    let outcomes = ctx.publish("a/b", br#"{"other": 1}"#).await;
    assert!(matches!(
        &outcomes[0],
        MessageOutcome::Dropped {
            error: Error::QueryMiss { .. },
            ..
        }
    ));

    let outcomes = ctx.publish("a/b", br#"{"value": null}"#).await;
    assert!(matches!(
        &outcomes[0],
        MessageOutcome::Dropped {
            error: Error::QueryMiss { .. },
            ..
        }
    ));

    let outcomes = ctx.publish("a/b", br#"{"value": {"x": 1}}"#).await;
    assert!(matches!(
        &outcomes[0],
        MessageOutcome::Dropped {
            error: Error::NotScalar { .. },
            ..
        }
    ));

    assert_eq!(ctx.store.total_rows(), 0);
}

#[tokio::test]
async fn test_coercion_failure_does_not_affect_next_message() {
    let mut ctx = TestContext::new(vec![fixtures::json_entry("a/b", ValueType::Integer, 1)]);

    let outcomes = ctx
        .publish("a/b", &fixtures::value_payload(json!("abc")))
        .await;
    assert!(matches!(
        &outcomes[0],
        MessageOutcome::Dropped {
            error: Error::Coercion { .. },
            ..
        }
    ));

    let outcomes = ctx.publish("a/b", &fixtures::value_payload(json!(5))).await;
    assert!(outcomes[0].is_written());
    assert_eq!(ctx.store.row_count(ValueType::Integer), 1);
}

/// A failed insert leaves the cache untouched, so the value is retried
/// with the next identical message.
#[tokio::test]
async fn test_insert_failure_is_not_cached() {
    let mut ctx = TestContext::new(vec![fixtures::raw_entry("a/b", ValueType::String, 1)]);

    ctx.store.set_insert_failure(true);
    let outcomes = ctx.publish("a/b", b"open").await;
    assert!(matches!(
        &outcomes[0],
        MessageOutcome::StorageFailed {
            error: Error::Storage(_),
            ..
        }
    ));
    assert!(ctx.pipeline.detector().is_empty());

    ctx.store.set_insert_failure(false);
    assert!(ctx.publish("a/b", b"open").await[0].is_written());
    assert_eq!(ctx.store.row_count(ValueType::String), 1);
}

#[tokio::test]
async fn test_failed_baseline_lookup_writes_value() {
    let mut ctx = TestContext::new(vec![fixtures::raw_entry("a/b", ValueType::Bool, 1)]);
    ctx.store
        .seed(SeriesKey::Id(1), bridge_core::SampleValue::Bool(true), chrono::Utc::now());

    ctx.store.set_lookup_failure(true);
    assert!(ctx.publish("a/b", b"true").await[0].is_written());
    assert_eq!(ctx.store.row_count(ValueType::Bool), 2);
}

#[tokio::test]
async fn test_discovery_failure_does_not_block_values() {
    let mut ctx = TestContext::new(vec![fixtures::raw_entry("a/b", ValueType::Integer, 1)]);

    ctx.store.set_upsert_failure(true);
    assert!(ctx.publish("a/b", b"12").await[0].is_written());
    assert!(ctx.store.seen_topics().is_empty());
}

#[tokio::test]
async fn test_invalid_utf8_raw_payload_is_dropped() {
    let mut ctx = TestContext::new(vec![fixtures::raw_entry("a/b", ValueType::String, 1)]);

    let outcomes = ctx.publish("a/b", &[0xff, 0xfe, 0x00]).await;
    assert!(matches!(
        &outcomes[0],
        MessageOutcome::Dropped {
            error: Error::PayloadEncoding,
            ..
        }
    ));
}

#[tokio::test]
async fn test_subscription_failure_is_advisory() {
    let mut ctx = TestContext::new(vec![]);

    let event = ctx
        .pipeline
        .handle_event(BusEvent::SubscriptionFailed {
            filter: "a/#".into(),
            reason: "rejected by broker".into(),
        })
        .await
        .expect("error event");
    assert_eq!(event.exit_code, 0);
    assert!(!event.is_fatal());
    assert!(event.message.contains("a/#"));
}

#[tokio::test]
async fn test_connection_errors_map_to_exit_codes() {
    let mut ctx = TestContext::new(vec![]);

    let fatal = ctx
        .pipeline
        .handle_event(BusEvent::ConnectionError {
            kind: ConnectionErrorKind::Refused,
            message: "The client is not authorized to connect.".into(),
            fatal: true,
        })
        .await
        .expect("error event");
    assert_eq!(fatal.exit_code, FatalErrorCode::Transport.exit_code());
    assert_eq!(fatal.exit_code, 3);

    let retried = ctx
        .pipeline
        .handle_event(BusEvent::ConnectionError {
            kind: ConnectionErrorKind::Transport,
            message: "connection reset".into(),
            fatal: false,
        })
        .await
        .expect("error event");
    assert!(!retried.is_fatal());
}

#[tokio::test]
async fn test_lifecycle_events_produce_no_errors() {
    let mut ctx = TestContext::new(vec![fixtures::raw_entry("a/b", ValueType::String, 1)]);

    assert!(ctx.pipeline.handle_event(BusEvent::Connected).await.is_none());
    assert!(ctx
        .pipeline
        .handle_event(BusEvent::Subscribed { filter: "a/b".into() })
        .await
        .is_none());
    assert!(ctx
        .pipeline
        .handle_event(BusEvent::Message {
            topic: "a/b".into(),
            payload: Bytes::from_static(b"hello"),
        })
        .await
        .is_none());
    assert_eq!(ctx.store.row_count(ValueType::String), 1);
}
