//! Message pipeline: topic lookup, extraction, change detection, storage.
//!
//! The pipeline owns all mutable state (last-value cache, discovered
//! topics) and is driven by a single event loop, so no locking is needed.

use std::sync::Arc;

use bridge_core::{Error, ErrorEvent, FatalErrorCode, SampleValue, SeriesKey};
use chrono::{DateTime, Utc};
use mqtt_bus::{BusEvent, TopicRegistry};
use pg_store::SeriesStore;
use telemetry::metrics;
use tracing::{debug, error, info, warn};

use crate::change::ChangeDetector;
use crate::discovery::DiscoveryTracker;
use crate::retention::{RetentionSweeper, SweepReport};

/// What happened to a message for one matching topic entry.
#[derive(Debug)]
pub enum MessageOutcome {
    /// A new row was written
    Written { series: SeriesKey, value: SampleValue },
    /// The value equals the last written one
    Unchanged { series: SeriesKey },
    /// Extraction or coercion failed; nothing was written
    Dropped { series: SeriesKey, error: Error },
    /// The insert failed
    StorageFailed { series: SeriesKey, error: Error },
}

impl MessageOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

pub struct Pipeline<S: SeriesStore + ?Sized> {
    store: Arc<S>,
    registry: TopicRegistry,
    detector: ChangeDetector,
    discovery: DiscoveryTracker,
    sweeper: RetentionSweeper,
}

impl<S: SeriesStore + ?Sized> Pipeline<S> {
    pub fn new(store: Arc<S>, registry: TopicRegistry, sweeper: RetentionSweeper) -> Self {
        for entry in registry.entries().iter().filter(|e| e.has_unused_scale()) {
            warn!(
                topic = %entry.topic,
                value_type = %entry.value_type,
                "Scale is only applied to double values, ignoring it"
            );
        }

        Self {
            store,
            registry,
            detector: ChangeDetector::new(),
            discovery: DiscoveryTracker::new(),
            sweeper,
        }
    }

    /// Handles one bus event. Returns the error event to report, if any.
    pub async fn handle_event(&mut self, event: BusEvent) -> Option<ErrorEvent> {
        match event {
            BusEvent::Connected => {
                info!(topics = self.registry.len(), "Connected to MQTT broker");
                None
            }
            BusEvent::Subscribed { filter } => {
                info!(filter = %filter, "Subscribed");
                None
            }
            BusEvent::SubscriptionFailed { filter, reason } => {
                metrics().subscription_failures.inc();
                warn!(filter = %filter, reason = %reason, "Subscription failed");
                Some(ErrorEvent::advisory(format!(
                    "failed to subscribe to {}: {}",
                    filter, reason
                )))
            }
            BusEvent::Message { topic, payload } => {
                self.handle_message(&topic, &payload, Utc::now()).await;
                None
            }
            BusEvent::ConnectionError {
                kind,
                message,
                fatal,
            } => {
                let text = format!("MQTT connection error ({:?}): {}", kind, message);
                if fatal {
                    Some(ErrorEvent::fatal(FatalErrorCode::Transport, text))
                } else {
                    Some(ErrorEvent::advisory(text))
                }
            }
        }
    }

    /// Processes one published message received at `at`.
    ///
    /// The topic is always recorded for discovery; each matching entry is
    /// then handled independently.
    pub async fn handle_message(
        &mut self,
        topic: &str,
        payload: &[u8],
        at: DateTime<Utc>,
    ) -> Vec<MessageOutcome> {
        metrics().messages_received.inc();
        debug!(topic = %topic, bytes = payload.len(), "Message received");

        if let Err(e) = self
            .discovery
            .observe(self.store.as_ref(), topic, payload, at)
            .await
        {
            metrics().storage_errors.inc();
            error!(topic = %topic, error = %e, "Failed to record seen topic");
        }

        let mut outcomes = Vec::new();
        for entry in self.registry.matching(topic) {
            let series = entry.series_key.clone();

            let value = match entry.extract(payload) {
                Ok(value) => value,
                Err(e) => {
                    metrics().values_dropped.inc();
                    warn!(
                        topic = %topic,
                        query = entry.query.as_ref().map(|q| q.as_str()).unwrap_or("<raw>"),
                        value_type = %entry.value_type,
                        error = %e,
                        "Dropping message"
                    );
                    outcomes.push(MessageOutcome::Dropped { series, error: e });
                    continue;
                }
            };

            if !self
                .detector
                .should_write(self.store.as_ref(), &series, &value)
                .await
            {
                metrics().values_unchanged.inc();
                debug!(topic = %topic, series = %series, value = %value, "Value unchanged");
                outcomes.push(MessageOutcome::Unchanged { series });
                continue;
            }

            match self.store.insert_value(&series, &value, at).await {
                Ok(()) => {
                    metrics().values_written.inc();
                    debug!(topic = %topic, series = %series, value = %value, "Value written");
                    self.detector.record(&series, value.clone());
                    outcomes.push(MessageOutcome::Written { series, value });
                }
                Err(e) => {
                    metrics().storage_errors.inc();
                    error!(
                        topic = %topic,
                        series = %series,
                        value_type = %entry.value_type,
                        error = %e,
                        "Failed to store value"
                    );
                    outcomes.push(MessageOutcome::StorageFailed { series, error: e });
                }
            }
        }

        outcomes
    }

    /// Runs one retention sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.sweeper.sweep(self.store.as_ref(), now).await
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn discovery(&self) -> &DiscoveryTracker {
        &self.discovery
    }

    pub fn sweeper(&self) -> &RetentionSweeper {
        &self.sweeper
    }
}
