//! Reading data back: topic configuration at startup, stored rows for tests
//! and admin.

use bridge_core::{Error, KeyMode, Result, SeriesKey, TopicConfigEntry, ValueType};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::client::PgStore;

/// One row of the `{prefix}_config` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TopicConfigRow {
    #[sqlx(rename = "sensorid")]
    pub sensor_id: i32,
    pub groupname: Option<String>,
    pub sensor: Option<String>,
    pub topic: Option<String>,
    pub jsonpath: Option<String>,
    pub datatype: Option<String>,
    pub scaling: Option<f32>,
    pub unit: Option<String>,
}

impl TopicConfigRow {
    /// Converts the row. A `scaling` of NULL or 0 means no scaling.
    pub fn into_entry(self, mode: KeyMode) -> Result<TopicConfigEntry> {
        let value_type: ValueType = self.datatype.as_deref().unwrap_or_default().parse()?;

        let series_key = match mode {
            KeyMode::Id => SeriesKey::Id(self.sensor_id),
            KeyMode::Name => {
                let sensor = self
                    .sensor
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| Error::config("sensor name is empty"))?;
                SeriesKey::named(self.groupname.unwrap_or_default(), sensor)
            }
        };

        let scale = self.scaling.filter(|s| *s != 0.0).map(f64::from);
        let entry = TopicConfigEntry::new(
            self.topic.unwrap_or_default(),
            self.jsonpath.as_deref(),
            value_type,
            scale,
            series_key,
        )?;

        Ok(match self.unit.filter(|u| !u.trim().is_empty()) {
            Some(unit) => entry.with_unit(unit),
            None => entry,
        })
    }
}

/// Loads topic entries from the `{prefix}_config` table.
///
/// Rows that do not form a valid entry are logged and skipped.
pub async fn load_topic_config(store: &PgStore) -> Result<Vec<TopicConfigEntry>> {
    let table = store.tables().topic_config();
    let sql = format!(
        "SELECT sensorId, groupname, sensor, topic, jsonpath, datatype, scaling, unit \
         FROM {} ORDER BY sensorId",
        table
    );

    let rows: Vec<TopicConfigRow> = sqlx::query_as(&sql)
        .fetch_all(store.pool())
        .await
        .map_err(|e| Error::storage(format!("reading {} failed: {}", table, e)))?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let sensor_id = row.sensor_id;
        match row.into_entry(store.key_mode()) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(table = %table, sensor_id, error = %e, "Skipping invalid topic row"),
        }
    }

    info!(table = %table, count = entries.len(), "Loaded topic configuration");
    Ok(entries)
}

/// Row count of one value table.
pub async fn count_values(store: &PgStore, value_type: ValueType) -> Result<i64> {
    let table = store.tables().values(value_type);
    let sql = format!("SELECT count(*) FROM {}", table);
    sqlx::query_scalar(&sql)
        .fetch_one(store.pool())
        .await
        .map_err(|e| Error::storage(format!("count on {} failed: {}", table, e)))
}

/// One row of the discovery table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SeenTopicRow {
    pub topic: String,
    pub lastseen: Option<DateTime<Utc>>,
    pub data: Option<String>,
}

/// All discovery rows, ordered by topic.
pub async fn seen_topics(store: &PgStore) -> Result<Vec<SeenTopicRow>> {
    let table = store.tables().seen();
    let sql = format!("SELECT topic, lastseen, data FROM {} ORDER BY topic", table);
    sqlx::query_as(&sql)
    .fetch_all(store.pool())
    .await
    .map_err(|e| Error::storage(format!("reading {} failed: {}", table, e)))
}

/// Inserts a topic configuration row (tests and admin).
pub async fn insert_topic_config(
    store: &PgStore,
    topic: &str,
    jsonpath: Option<&str>,
    datatype: &str,
    scaling: Option<f32>,
    sensor: Option<(&str, &str)>,
) -> Result<i32> {
    let table = store.tables().topic_config();
    let (group, name) = sensor.unzip();
    let sql = format!(
        "INSERT INTO {} (groupname, sensor, topic, jsonpath, datatype, scaling) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING sensorId",
        table
    );
    sqlx::query_scalar(&sql)
    .bind(group)
    .bind(name)
    .bind(topic)
    .bind(jsonpath)
    .bind(datatype)
    .bind(scaling)
    .fetch_one(store.pool())
    .await
    .map_err(|e| Error::storage(format!("insert into {} failed: {}", table, e)))
}
