//! MQTT configuration.

use bridge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// MQTT broker connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname (required)
    #[serde(default)]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username; only used together with a password
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Protocol level: 3 or 4 speak MQTT 3.1.1 on the wire, 5 speaks MQTT 5.0
    #[serde(default = "default_version")]
    pub version: u8,
    #[serde(default)]
    pub use_tls: bool,
    /// Client identifier; generated when absent
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Wildcard filter feeding topic discovery
    #[serde(default = "default_catch_all_topic")]
    pub catch_all_topic: String,
    /// Reconnect after transport errors instead of exiting
    #[serde(default)]
    pub reconnect_delay_secs: Option<u64>,
    /// Capacity of the event channel to the pipeline
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_port() -> u16 {
    8883
}

fn default_version() -> u8 {
    3
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_catch_all_topic() -> String {
    "#".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            port: default_port(),
            username: None,
            password: None,
            version: default_version(),
            use_tls: false,
            client_id: None,
            keep_alive_secs: default_keep_alive_secs(),
            catch_all_topic: default_catch_all_topic(),
            reconnect_delay_secs: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl MqttConfig {
    /// Checks the settings that cannot be defaulted.
    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(Error::config("mqtt hostname is empty"));
        }
        if !matches!(self.version, 3..=5) {
            return Err(Error::config(format!(
                "invalid MQTT version: {}",
                self.version
            )));
        }
        if !rumqttc::valid_filter(&self.catch_all_topic) {
            return Err(Error::config(format!(
                "invalid catch-all topic filter: {}",
                self.catch_all_topic
            )));
        }
        Ok(())
    }

    /// Username and password, when both are set and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("mqtt2sql-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Whether the connection speaks MQTT 5.0.
    pub fn is_v5(&self) -> bool {
        self.version == 5
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(5))
    }

    pub fn reconnect_delay(&self) -> Option<Duration> {
        self.reconnect_delay_secs.map(Duration::from_secs)
    }
}
