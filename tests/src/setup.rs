//! Common test setup functions.

use std::sync::Arc;

use bridge_core::{KeyMode, RetentionPolicy, TopicConfigEntry};
use chrono::{DateTime, Utc};
use mqtt_bus::TopicRegistry;
use pg_store::{PgStore, PostgresConfig};
use worker::{MessageOutcome, Pipeline, RetentionSweeper};

use crate::containers::TestContainers;
use crate::mocks::MemoryStore;

/// Pipeline wired to an in-memory store.
///
/// Runs the production message path; only the storage driver is replaced.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub pipeline: Pipeline<MemoryStore>,
}

impl TestContext {
    pub fn new(entries: Vec<TopicConfigEntry>) -> Self {
        Self::with_policy(entries, RetentionPolicy::default())
    }

    pub fn with_policy(entries: Vec<TopicConfigEntry>, policy: RetentionPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(
            store.clone(),
            TopicRegistry::new(entries),
            RetentionSweeper::new(policy),
        );
        Self { store, pipeline }
    }

    /// Delivers one message now.
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Vec<MessageOutcome> {
        self.pipeline.handle_message(topic, payload, Utc::now()).await
    }

    /// Delivers one message at a fixed time.
    pub async fn publish_at(
        &mut self,
        topic: &str,
        payload: &[u8],
        at: DateTime<Utc>,
    ) -> Vec<MessageOutcome> {
        self.pipeline.handle_message(topic, payload, at).await
    }
}

/// Real PostgreSQL store in a container, schema initialized.
pub struct PgTestContext {
    pub containers: TestContainers,
    pub config: PostgresConfig,
    pub store: Arc<PgStore>,
}

impl PgTestContext {
    /// Uses a unique table prefix so tests sharing a server do not collide.
    pub async fn new(prefix: &str, key_mode: KeyMode) -> Self {
        let containers = TestContainers::start().await;
        let config = PostgresConfig {
            hostname: containers.postgres_host.clone(),
            port: containers.postgres_port,
            username: Some(containers.postgres_username.clone()),
            password: Some(containers.postgres_password.clone()),
            database: Some(containers.postgres_database.clone()),
            prefix: prefix.to_string(),
            key_mode,
            ..PostgresConfig::default()
        };

        let store = PgStore::open(&config)
            .await
            .expect("Failed to open PostgreSQL store");
        drop_tables(&store).await;
        assert_eq!(store.init_schema().await, 0, "schema init failed");

        Self {
            containers,
            config,
            store: Arc::new(store),
        }
    }

    pub fn pipeline(&self, entries: Vec<TopicConfigEntry>) -> Pipeline<PgStore> {
        Pipeline::new(
            self.store.clone(),
            TopicRegistry::new(entries),
            RetentionSweeper::new(RetentionPolicy::default()),
        )
    }
}

/// Drops every table of the store's prefix (leftovers of earlier runs).
async fn drop_tables(store: &PgStore) {
    let tables = store.tables();
    let mut names: Vec<&str> = bridge_core::ValueType::ALL
        .iter()
        .map(|t| tables.values(*t))
        .collect();
    names.push(tables.seen());
    names.push(tables.topic_config());

    for name in names {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", name))
            .execute(store.pool())
            .await
            .expect("Failed to drop table");
    }
}
