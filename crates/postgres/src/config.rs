//! PostgreSQL configuration.

use std::time::Duration;

use bridge_core::{Error, KeyMode, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;

/// PostgreSQL connection and layout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    /// Prefix of every table name
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Series key columns of the value tables
    #[serde(default)]
    pub key_mode: KeyMode,
    /// Read topic entries from the `{prefix}_config` table
    #[serde(default = "default_load_topic_table")]
    pub load_topic_table: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_prefix() -> String {
    "mqtt".to_string()
}

fn default_load_topic_table() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            username: None,
            password: None,
            database: None,
            prefix: default_prefix(),
            key_mode: KeyMode::default(),
            load_topic_table: default_load_topic_table(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl PostgresConfig {
    /// The prefix is interpolated into SQL, so it must be a plain identifier.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.prefix) {
            return Err(Error::config(format!(
                "invalid table prefix {:?}: expected [A-Za-z_][A-Za-z0-9_]*",
                self.prefix
            )));
        }
        Ok(())
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.hostname)
            .port(self.port)
            .application_name("mqtt2sql");

        if let Some(ref user) = self.username {
            options = options.username(user);
        }
        if let Some(ref pass) = self.password {
            options = options.password(pass);
        }
        if let Some(ref db) = self.database {
            options = options.database(db);
        }

        options
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
