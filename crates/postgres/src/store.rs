//! Storage seam used by the pipeline, and its PostgreSQL implementation.

use std::time::Instant;

use async_trait::async_trait;
use bridge_core::{Error, Result, SampleValue, SeriesKey, ValueType};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use telemetry::metrics;
use tracing::debug;

use crate::client::PgStore;

/// Operations the pipeline needs from the store.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Appends one timestamped row to the table of the value's type.
    async fn insert_value(
        &self,
        key: &SeriesKey,
        value: &SampleValue,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Most recent value stored for `key` in the `value_type` table.
    async fn latest_value(
        &self,
        key: &SeriesKey,
        value_type: ValueType,
    ) -> Result<Option<SampleValue>>;

    /// Inserts or refreshes the discovery row of a topic.
    async fn upsert_seen_topic(&self, topic: &str, payload: &[u8], at: DateTime<Utc>)
        -> Result<()>;

    /// Deletes rows older than `cutoff` from one value table.
    async fn delete_older_than(&self, value_type: ValueType, cutoff: DateTime<Utc>) -> Result<u64>;
}

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn bind_key<'q>(query: PgQuery<'q>, key: &'q SeriesKey) -> PgQuery<'q> {
    match key {
        SeriesKey::Id(id) => query.bind(*id),
        SeriesKey::Named { group, name } => query.bind(group.as_str()).bind(name.as_str()),
    }
}

fn bind_value<'q>(query: PgQuery<'q>, value: &'q SampleValue) -> Result<PgQuery<'q>> {
    Ok(match value {
        SampleValue::String(s) => query.bind(s.as_str()),
        SampleValue::Bool(b) => query.bind(*b),
        SampleValue::Integer(i) => {
            let v = i32::try_from(*i).map_err(|_| {
                Error::storage(format!("{} is out of range for an integer column", i))
            })?;
            query.bind(v)
        }
        SampleValue::Double(d) => query.bind(*d as f32),
    })
}

fn decode_value(row: &PgRow, value_type: ValueType) -> sqlx::Result<Option<SampleValue>> {
    Ok(match value_type {
        ValueType::String => row.try_get::<Option<String>, _>(0)?.map(SampleValue::String),
        ValueType::Bool => row.try_get::<Option<bool>, _>(0)?.map(SampleValue::Bool),
        ValueType::Integer => row.try_get::<Option<i64>, _>(0)?.map(SampleValue::Integer),
        ValueType::Double => row.try_get::<Option<f64>, _>(0)?.map(SampleValue::Double),
    })
}

/// Read expression for the `value` column; widened so it decodes as i64/f64.
fn value_column(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Integer => "value::bigint",
        ValueType::Double => "value::float8",
        ValueType::String | ValueType::Bool => "value",
    }
}

impl PgStore {
    fn check_key(&self, key: &SeriesKey) -> Result<()> {
        if key.mode() != self.key_mode() {
            return Err(Error::storage(format!(
                "series key {} does not match key mode {:?}",
                key,
                self.key_mode()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SeriesStore for PgStore {
    async fn insert_value(
        &self,
        key: &SeriesKey,
        value: &SampleValue,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_key(key)?;
        let table = self.tables().values(value.value_type());
        let sql = match key {
            SeriesKey::Id(_) => format!(
                "INSERT INTO {} (ts, sensorId, value) VALUES ($1, $2, $3)",
                table
            ),
            SeriesKey::Named { .. } => format!(
                "INSERT INTO {} (ts, groupname, sensor, value) VALUES ($1, $2, $3, $4)",
                table
            ),
        };

        let query = bind_value(bind_key(sqlx::query(&sql).bind(at), key), value)?;

        let start = Instant::now();
        query
            .execute(self.pool())
            .await
            .map_err(|e| Error::storage(format!("insert into {} failed: {}", table, e)))?;
        metrics()
            .insert_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        debug!(table = %table, series = %key, value = %value, "Inserted value");
        Ok(())
    }

    async fn latest_value(
        &self,
        key: &SeriesKey,
        value_type: ValueType,
    ) -> Result<Option<SampleValue>> {
        self.check_key(key)?;
        let table = self.tables().values(value_type);
        let id_column = format!("{}Id", value_type.name());
        let filter = match key {
            SeriesKey::Id(_) => "sensorId = $1",
            SeriesKey::Named { .. } => "groupname = $1 AND sensor = $2",
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY ts DESC, {} DESC LIMIT 1",
            value_column(value_type),
            table,
            filter,
            id_column
        );

        let row = bind_key(sqlx::query(&sql), key)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| Error::storage(format!("select from {} failed: {}", table, e)))?;

        match row {
            Some(row) => decode_value(&row, value_type)
                .map_err(|e| Error::storage(format!("decoding {} row failed: {}", table, e))),
            None => Ok(None),
        }
    }

    async fn upsert_seen_topic(
        &self,
        topic: &str,
        payload: &[u8],
        at: DateTime<Utc>,
    ) -> Result<()> {
        let table = self.tables().seen();
        let sql = format!(
            "INSERT INTO {} (lastseen, topic, data) VALUES ($1, $2, $3) \
             ON CONFLICT (topic) DO UPDATE SET lastseen = EXCLUDED.lastseen, data = EXCLUDED.data",
            table
        );
        // text columns cannot hold NUL
        let data = String::from_utf8_lossy(payload).replace('\0', "");

        sqlx::query(&sql)
            .bind(at)
            .bind(topic)
            .bind(data)
            .execute(self.pool())
            .await
            .map_err(|e| Error::storage(format!("upsert into {} failed: {}", table, e)))?;
        Ok(())
    }

    async fn delete_older_than(&self, value_type: ValueType, cutoff: DateTime<Utc>) -> Result<u64> {
        let table = self.tables().values(value_type);
        let sql = format!("DELETE FROM {} WHERE ts < $1", table);

        let result = sqlx::query(&sql)
            .bind(cutoff)
            .execute(self.pool())
            .await
            .map_err(|e| Error::storage(format!("delete from {} failed: {}", table, e)))?;
        Ok(result.rows_affected())
    }
}
