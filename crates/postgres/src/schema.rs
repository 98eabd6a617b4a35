//! PostgreSQL table layout.
//!
//! Every table name is `{prefix}_{suffix}`. Value tables:
//! - one per `ValueType`, identity primary key `{type}Id`
//! - `ts timestamptz` plus the series key columns of the configured mode
//! - indexed by series key and by timestamp
//!
//! Unquoted identifiers are folded to lower case by PostgreSQL, so
//! `sensorId` and `sensorid` name the same column.

use bridge_core::{KeyMode, ValueType};

/// Table names derived once from the configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    values: [String; 4],
    seen: String,
    topic_config: String,
}

impl TableNames {
    /// `prefix` must already be validated as an identifier.
    pub fn new(prefix: &str) -> Self {
        Self {
            values: ValueType::ALL.map(|t| format!("{}_{}", prefix, t.name())),
            seen: format!("{}_sensors_seen", prefix),
            topic_config: format!("{}_config", prefix),
        }
    }

    pub fn values(&self, value_type: ValueType) -> &str {
        let index = match value_type {
            ValueType::String => 0,
            ValueType::Bool => 1,
            ValueType::Integer => 2,
            ValueType::Double => 3,
        };
        &self.values[index]
    }

    pub fn seen(&self) -> &str {
        &self.seen
    }

    pub fn topic_config(&self) -> &str {
        &self.topic_config
    }
}

/// Column type of the `value` column.
pub fn sql_type(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::String => "text",
        ValueType::Bool => "boolean",
        ValueType::Integer => "integer",
        ValueType::Double => "real",
    }
}

fn key_columns(mode: KeyMode) -> &'static str {
    match mode {
        KeyMode::Id => "sensorId integer",
        KeyMode::Name => "groupname varchar(100),\n    sensor varchar(100)",
    }
}

/// DDL for one value table and its two indexes.
pub fn create_value_table(names: &TableNames, value_type: ValueType, mode: KeyMode) -> Vec<String> {
    let table = names.values(value_type);
    let series_index = match mode {
        KeyMode::Id => format!(
            "CREATE INDEX IF NOT EXISTS {t}_sensorId_idx ON {t} (sensorId)",
            t = table
        ),
        KeyMode::Name => format!(
            "CREATE INDEX IF NOT EXISTS {t}_series_idx ON {t} (groupname, sensor)",
            t = table
        ),
    };

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {t} (\n    \
             {ty}Id integer GENERATED ALWAYS AS IDENTITY PRIMARY KEY,\n    \
             ts timestamptz,\n    \
             {key},\n    \
             value {sql}\n)",
            t = table,
            ty = value_type.name(),
            key = key_columns(mode),
            sql = sql_type(value_type),
        ),
        series_index,
        format!("CREATE INDEX IF NOT EXISTS {t}_ts_idx ON {t} (ts)", t = table),
    ]
}

/// DDL for the discovery table.
pub fn create_seen_table(names: &TableNames) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \
         lastseen timestamptz,\n    \
         topic varchar(255) PRIMARY KEY,\n    \
         data text\n)",
        names.seen()
    )
}

/// DDL for the topic configuration table.
pub fn create_topic_config_table(names: &TableNames) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \
         sensorId integer GENERATED ALWAYS AS IDENTITY PRIMARY KEY,\n    \
         groupname varchar(100),\n    \
         sensor varchar(100),\n    \
         topic varchar(100),\n    \
         jsonpath varchar(100),\n    \
         datatype varchar(10),\n    \
         scaling real,\n    \
         unit varchar(10),\n    \
         lastdata text\n)",
        names.topic_config()
    )
}

/// Every statement needed to bootstrap the schema, in execution order.
pub fn all_statements(names: &TableNames, mode: KeyMode) -> Vec<String> {
    let mut statements = vec![create_topic_config_table(names)];
    for value_type in ValueType::ALL {
        statements.extend(create_value_table(names, value_type, mode));
    }
    statements.push(create_seen_table(names));
    statements
}
