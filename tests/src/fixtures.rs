//! Test fixtures: topic entries and payloads.

use bridge_core::{SeriesKey, TopicConfigEntry, ValueType};

/// `sensors/temp1`, `$.value`, double scaled by 0.1, series `temp1`.
pub fn temp1_entry() -> TopicConfigEntry {
    TopicConfigEntry::new(
        "sensors/temp1",
        Some("$.value"),
        ValueType::Double,
        Some(0.1),
        SeriesKey::named("", "temp1"),
    )
    .expect("valid entry")
}

/// Entry reading `$.value` as `value_type` for numeric series `id`.
pub fn json_entry(topic: &str, value_type: ValueType, id: i32) -> TopicConfigEntry {
    TopicConfigEntry::new(topic, Some("$.value"), value_type, None, SeriesKey::Id(id))
        .expect("valid entry")
}

/// Entry storing the raw payload as `value_type` for numeric series `id`.
pub fn raw_entry(topic: &str, value_type: ValueType, id: i32) -> TopicConfigEntry {
    TopicConfigEntry::new(topic, None, value_type, None, SeriesKey::Id(id)).expect("valid entry")
}

/// One JSON entry per value type on `test/<type>`, series ids 1 to 4.
pub fn entry_per_type() -> Vec<TopicConfigEntry> {
    ValueType::ALL
        .iter()
        .zip(1..)
        .map(|(t, id)| json_entry(&format!("test/{}", t), *t, id))
        .collect()
}

/// `{"value": <value>}`
pub fn value_payload(value: serde_json::Value) -> Vec<u8> {
    serde_json::json!({ "value": value }).to_string().into_bytes()
}

/// A payload per value type, matching `entry_per_type`.
pub fn sample_payload(value_type: ValueType) -> Vec<u8> {
    match value_type {
        ValueType::String => value_payload(serde_json::json!("open")),
        ValueType::Bool => value_payload(serde_json::json!(true)),
        ValueType::Integer => value_payload(serde_json::json!(42)),
        ValueType::Double => value_payload(serde_json::json!(21.5)),
    }
}
