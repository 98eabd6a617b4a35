//! Topic discovery through the catch-all subscription.

use std::collections::HashSet;

use bridge_core::Result;
use chrono::{DateTime, Utc};
use pg_store::SeriesStore;
use telemetry::metrics;
use tracing::info;

/// Records every observed topic in the seen-topics table.
#[derive(Debug, Default)]
pub struct DiscoveryTracker {
    seen: HashSet<String>,
}

impl DiscoveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the topic's row. Returns true on the first sighting in this
    /// process.
    pub async fn observe<S>(
        &mut self,
        store: &S,
        topic: &str,
        payload: &[u8],
        at: DateTime<Utc>,
    ) -> Result<bool>
    where
        S: SeriesStore + ?Sized,
    {
        store.upsert_seen_topic(topic, payload, at).await?;
        metrics().seen_topic_upserts.inc();

        if self.seen.contains(topic) {
            return Ok(false);
        }

        self.seen.insert(topic.to_string());
        metrics().seen_topics.set(self.seen.len() as u64);
        info!(topic = %topic, "Discovered new topic");
        Ok(true)
    }

    pub fn has_seen(&self, topic: &str) -> bool {
        self.seen.contains(topic)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
