//! Retention sweep tests.

use bridge_core::{RetentionPolicy, SampleValue, SeriesKey, ValueType};
use chrono::{Duration, Utc};
use integration_tests::setup::TestContext;

fn sample(value_type: ValueType) -> SampleValue {
    match value_type {
        ValueType::String => SampleValue::String("x".into()),
        ValueType::Bool => SampleValue::Bool(false),
        ValueType::Integer => SampleValue::Integer(1),
        ValueType::Double => SampleValue::Double(1.5),
    }
}

/// Rows at now - 2w are deleted, rows at now - w/2 survive, in every table.
#[tokio::test]
async fn test_sweep_deletes_only_expired_rows() {
    let ctx = TestContext::with_policy(vec![], RetentionPolicy::from_hours(24));
    let now = Utc::now();

    for value_type in ValueType::ALL {
        ctx.store
            .seed(SeriesKey::Id(1), sample(value_type), now - Duration::hours(48));
        ctx.store
            .seed(SeriesKey::Id(1), sample(value_type), now - Duration::hours(12));
    }

    let report = ctx.pipeline.sweep(now).await;

    assert_eq!(report.total_deleted(), 4);
    for value_type in ValueType::ALL {
        assert_eq!(report.deleted_from(value_type), Some(1));
        let rows = ctx.store.rows(value_type);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ts, now - Duration::hours(12));
    }
}

/// A failing table does not stop the others.
#[tokio::test]
async fn test_failed_table_does_not_block_others() {
    let ctx = TestContext::with_policy(vec![], RetentionPolicy::from_hours(1));
    let now = Utc::now();

    for value_type in ValueType::ALL {
        ctx.store
            .seed(SeriesKey::Id(1), sample(value_type), now - Duration::hours(2));
    }
    ctx.store.set_delete_failure(ValueType::Bool, true);

    let report = ctx.pipeline.sweep(now).await;

    assert_eq!(report.failed, vec![ValueType::Bool]);
    assert_eq!(report.deleted_from(ValueType::Bool), None);
    assert_eq!(ctx.store.row_count(ValueType::Bool), 1);
    for value_type in [ValueType::String, ValueType::Integer, ValueType::Double] {
        assert_eq!(ctx.store.row_count(value_type), 0);
    }
}

#[tokio::test]
async fn test_sweep_never_touches_seen_topics() {
    let mut ctx = TestContext::with_policy(vec![], RetentionPolicy::from_hours(1));
    let old = Utc::now() - Duration::hours(10);

    ctx.publish_at("old/topic", b"1", old).await;
    ctx.pipeline.sweep(Utc::now()).await;

    assert!(ctx.store.seen_topics().contains_key("old/topic"));
}
