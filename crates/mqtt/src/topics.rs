//! Registry of configured topic patterns.

use std::collections::HashSet;

use bridge_core::TopicConfigEntry;
use tracing::warn;

/// Immutable mapping from topic filters to their extraction rules.
///
/// Holds at most one entry per filter.
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    entries: Vec<TopicConfigEntry>,
}

impl TopicRegistry {
    /// Builds the registry, skipping invalid filters and repeated patterns.
    pub fn new(entries: impl IntoIterator<Item = TopicConfigEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();

        for entry in entries {
            if !rumqttc::valid_filter(&entry.topic) {
                warn!(
                    topic = %entry.topic,
                    series = %entry.series_key,
                    "Skipping topic with invalid filter"
                );
                continue;
            }
            if !seen.insert(entry.topic.clone()) {
                warn!(
                    topic = %entry.topic,
                    series = %entry.series_key,
                    "Skipping duplicate topic configuration"
                );
                continue;
            }
            kept.push(entry);
        }

        Self { entries: kept }
    }

    /// Returns the entry configured for exactly this pattern.
    pub fn get(&self, pattern: &str) -> Option<&TopicConfigEntry> {
        self.entries.iter().find(|e| e.topic == pattern)
    }

    /// Entries whose filter matches a published topic.
    pub fn matching<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a TopicConfigEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| rumqttc::matches(topic, &e.topic))
    }

    pub fn entries(&self) -> &[TopicConfigEntry] {
        &self.entries
    }

    /// One filter per configured pattern, followed by the catch-all filter.
    pub fn subscription_filters(&self, catch_all: &str) -> Vec<String> {
        let mut filters: Vec<String> = self.entries.iter().map(|e| e.topic.clone()).collect();
        if !filters.iter().any(|f| f == catch_all) {
            filters.push(catch_all.to_string());
        }
        filters
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
