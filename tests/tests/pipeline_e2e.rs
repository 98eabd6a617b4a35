//! End-to-end tests of the message pipeline against the in-memory store.

use bridge_core::{SampleValue, SeriesKey, ValueType};
use chrono::{Duration, Utc};
use integration_tests::{fixtures, setup::TestContext};
use serde_json::json;
use worker::MessageOutcome;

fn temp1() -> SeriesKey {
    SeriesKey::named("", "temp1")
}

/// `{"value": 215}` scaled by 0.1 is stored as 21.5, a repeat is
/// suppressed, and a new value is stored again.
#[tokio::test]
async fn test_scaled_double_end_to_end() {
    let mut ctx = TestContext::new(vec![fixtures::temp1_entry()]);

    let outcomes = ctx
        .publish("sensors/temp1", &fixtures::value_payload(json!(215)))
        .await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        &outcomes[0],
        MessageOutcome::Written { value: SampleValue::Double(v), .. } if (*v - 21.5).abs() < 1e-9
    ));

    let outcomes = ctx
        .publish("sensors/temp1", &fixtures::value_payload(json!(215)))
        .await;
    assert!(matches!(outcomes[0], MessageOutcome::Unchanged { .. }));

    ctx.publish("sensors/temp1", &fixtures::value_payload(json!(300)))
        .await;

    let values = ctx.store.values_for(ValueType::Double, &temp1());
    assert_eq!(values.len(), 2);
    assert!(values[0].equivalent(&SampleValue::Double(21.5)));
    assert!(values[1].equivalent(&SampleValue::Double(30.0)));
}

/// The same message twice produces exactly one row, for every type.
#[tokio::test]
async fn test_repeated_message_is_written_once() {
    let mut ctx = TestContext::new(fixtures::entry_per_type());

    for value_type in ValueType::ALL {
        let topic = format!("test/{}", value_type);
        let payload = fixtures::sample_payload(value_type);

        let first = ctx.publish(&topic, &payload).await;
        let second = ctx.publish(&topic, &payload).await;

        assert!(first[0].is_written(), "{}", value_type);
        assert!(!second[0].is_written(), "{}", value_type);
        assert_eq!(ctx.store.row_count(value_type), 1, "{}", value_type);
    }
}

/// Every value lands in the table of its own type.
#[tokio::test]
async fn test_values_are_routed_by_type() {
    let mut ctx = TestContext::new(fixtures::entry_per_type());

    for value_type in ValueType::ALL {
        ctx.publish(
            &format!("test/{}", value_type),
            &fixtures::sample_payload(value_type),
        )
        .await;
    }

    for value_type in ValueType::ALL {
        let rows = ctx.store.rows(value_type);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value.value_type(), value_type);
    }
    assert_eq!(ctx.store.total_rows(), 4);
}

/// With an empty cache the last stored row is the baseline.
#[tokio::test]
async fn test_cold_start_uses_stored_baseline() {
    let mut ctx = TestContext::new(vec![fixtures::temp1_entry()]);
    ctx.store.seed(
        temp1(),
        SampleValue::Double(21.5),
        Utc::now() - Duration::hours(1),
    );

    let outcomes = ctx
        .publish("sensors/temp1", &fixtures::value_payload(json!(215)))
        .await;
    assert!(matches!(outcomes[0], MessageOutcome::Unchanged { .. }));
    assert_eq!(ctx.store.row_count(ValueType::Double), 1);
    assert_eq!(ctx.store.lookup_count(), 1);

    // Baseline is cached now, no second lookup
    ctx.publish("sensors/temp1", &fixtures::value_payload(json!(215)))
        .await;
    assert_eq!(ctx.store.lookup_count(), 1);
}

#[tokio::test]
async fn test_cold_start_different_value_is_written_and_cached() {
    let mut ctx = TestContext::new(vec![fixtures::temp1_entry()]);
    ctx.store.seed(
        temp1(),
        SampleValue::Double(21.5),
        Utc::now() - Duration::hours(1),
    );

    let outcomes = ctx
        .publish("sensors/temp1", &fixtures::value_payload(json!(300)))
        .await;
    assert!(outcomes[0].is_written());
    assert_eq!(ctx.store.row_count(ValueType::Double), 2);

    let cached = ctx
        .pipeline
        .detector()
        .cached(&temp1(), ValueType::Double)
        .cloned();
    assert!(cached.unwrap().equivalent(&SampleValue::Double(30.0)));
}

#[tokio::test]
async fn test_float_tolerance() {
    let mut ctx = TestContext::new(vec![fixtures::raw_entry("meter/power", ValueType::Double, 1)]);

    assert!(ctx.publish("meter/power", b"1.0").await[0].is_written());
    assert!(!ctx.publish("meter/power", b"1.0000001").await[0].is_written());
    assert!(ctx.publish("meter/power", b"1.2").await[0].is_written());
    assert_eq!(ctx.store.row_count(ValueType::Double), 2);
}

/// A topic matching several patterns is handled once per entry.
#[tokio::test]
async fn test_wildcard_patterns_match_published_topics() {
    let mut ctx = TestContext::new(vec![
        fixtures::raw_entry("home/+/temp", ValueType::Double, 1),
        fixtures::raw_entry("home/kitchen/temp", ValueType::String, 2),
        fixtures::raw_entry("garden/#", ValueType::Integer, 3),
    ]);

    let outcomes = ctx.publish("home/kitchen/temp", b"20.5").await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(MessageOutcome::is_written));
    assert_eq!(
        ctx.store.values_for(ValueType::String, &SeriesKey::Id(2)),
        vec![SampleValue::String("20.5".into())]
    );

    ctx.publish("garden/soil/moisture", b"40").await;
    assert_eq!(
        ctx.store.values_for(ValueType::Integer, &SeriesKey::Id(3)),
        vec![SampleValue::Integer(40)]
    );

    assert!(ctx.publish("office/temp", b"19").await.is_empty());
}

#[tokio::test]
async fn test_bool_and_integer_coercion() {
    let mut ctx = TestContext::new(vec![
        fixtures::json_entry("door/state", ValueType::Bool, 1),
        fixtures::json_entry("door/count", ValueType::Integer, 2),
    ]);

    ctx.publish("door/state", &fixtures::value_payload(json!("ON")))
        .await;
    ctx.publish("door/count", &fixtures::value_payload(json!(6.6)))
        .await;

    assert_eq!(
        ctx.store.values_for(ValueType::Bool, &SeriesKey::Id(1)),
        vec![SampleValue::Bool(true)]
    );
    assert_eq!(
        ctx.store.values_for(ValueType::Integer, &SeriesKey::Id(2)),
        vec![SampleValue::Integer(7)]
    );
}
