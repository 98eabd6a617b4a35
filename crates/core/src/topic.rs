//! Topic configuration entries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{self, SampleValue, ValueQuery};

/// Storage type of a sensor value. Each type has its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ValueType {
    String,
    Bool,
    Integer,
    Double,
}

impl ValueType {
    /// All value types, in table creation order.
    pub const ALL: [ValueType; 4] = [
        ValueType::String,
        ValueType::Bool,
        ValueType::Integer,
        ValueType::Double,
    ];

    /// Canonical name, used as the table name suffix.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Double => "double",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = Error;

    /// Accepts the canonical names plus the aliases found in existing
    /// `_config` tables (`QString`, `int`, `float`, ...).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "qstring" | "text" => Ok(Self::String),
            "bool" | "boolean" => Ok(Self::Bool),
            "integer" | "int" => Ok(Self::Integer),
            "double" | "float" | "real" => Ok(Self::Double),
            other => Err(Error::config(format!("unknown value type: {}", other))),
        }
    }
}

impl TryFrom<String> for ValueType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// How series are identified in the value tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    /// Numeric `sensorId` column
    #[default]
    Id,
    /// `groupname` + `sensor` columns
    Name,
}

/// Identity of one logical sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SeriesKey {
    Id(i32),
    Named { group: String, name: String },
}

impl SeriesKey {
    pub fn named(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Named {
            group: group.into(),
            name: name.into(),
        }
    }

    pub fn mode(&self) -> KeyMode {
        match self {
            Self::Id(_) => KeyMode::Id,
            Self::Named { .. } => KeyMode::Name,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Named { group, name } if group.is_empty() => write!(f, "{}", name),
            Self::Named { group, name } => write!(f, "{}/{}", group, name),
        }
    }
}

/// Extraction and storage rules for one subscribed topic pattern.
#[derive(Debug, Clone)]
pub struct TopicConfigEntry {
    pub topic: String,
    pub query: Option<ValueQuery>,
    pub value_type: ValueType,
    pub scale: Option<f64>,
    pub series_key: SeriesKey,
    pub unit: Option<String>,
}

impl TopicConfigEntry {
    /// Creates an entry. An empty or blank query means raw mode.
    pub fn new(
        topic: impl Into<String>,
        query: Option<&str>,
        value_type: ValueType,
        scale: Option<f64>,
        series_key: SeriesKey,
    ) -> Result<Self> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(Error::config(format!(
                "topic for series {} is empty",
                series_key
            )));
        }

        let query = match query.map(str::trim) {
            Some(q) if !q.is_empty() => Some(ValueQuery::parse(q)?),
            _ => None,
        };

        if let Some(factor) = scale {
            if !factor.is_finite() {
                return Err(Error::config(format!(
                    "scale for topic {} is not a finite number",
                    topic
                )));
            }
        }

        Ok(Self {
            topic,
            query,
            value_type,
            scale,
            series_key,
            unit: None,
        })
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Whether a scale factor is configured for a type it does not apply to.
    pub fn has_unused_scale(&self) -> bool {
        self.scale.is_some() && self.value_type != ValueType::Double
    }

    /// Extracts, coerces, and scales the value carried by a payload.
    pub fn extract(&self, payload: &[u8]) -> Result<SampleValue> {
        let raw = value::extract(payload, self.query.as_ref())?;
        let sample = SampleValue::coerce(&raw, self.value_type)?;

        Ok(match self.scale {
            Some(factor) if self.value_type == ValueType::Double => sample.scaled(factor),
            _ => sample,
        })
    }
}

/// A `[[topics]]` table from the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSettings {
    /// Topic filter to subscribe to
    pub topic: String,
    /// JSONPath query; raw payload when absent
    #[serde(default)]
    pub query: Option<String>,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Factor applied to doubles
    #[serde(default)]
    pub scale: Option<f64>,
    /// Series key in `id` mode
    #[serde(default)]
    pub sensor_id: Option<i32>,
    /// Series group in `name` mode
    #[serde(default)]
    pub group: Option<String>,
    /// Series name in `name` mode
    #[serde(default)]
    pub sensor: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl TopicSettings {
    /// Converts the settings into an entry for the given key mode.
    pub fn into_entry(self, mode: KeyMode) -> Result<TopicConfigEntry> {
        let series_key = match mode {
            KeyMode::Id => SeriesKey::Id(self.sensor_id.ok_or_else(|| {
                Error::config(format!("topic {} needs a sensor_id", self.topic))
            })?),
            KeyMode::Name => {
                let name = self
                    .sensor
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| Error::config(format!("topic {} needs a sensor", self.topic)))?;
                SeriesKey::named(self.group.unwrap_or_default(), name)
            }
        };

        let entry = TopicConfigEntry::new(
            self.topic,
            self.query.as_deref(),
            self.value_type,
            self.scale,
            series_key,
        )?;

        Ok(match self.unit {
            Some(unit) => entry.with_unit(unit),
            None => entry,
        })
    }
}
