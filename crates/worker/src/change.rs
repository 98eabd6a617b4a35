//! Change detection against the last written value of a series.

use std::collections::HashMap;

use bridge_core::{SampleValue, SeriesKey, ValueType};
use pg_store::SeriesStore;
use telemetry::metrics;
use tracing::{debug, warn};

/// Last written value per series and value table.
///
/// Entries are loaded lazily from the store on first use and replaced on
/// every accepted write. Nothing is evicted.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    cache: HashMap<(SeriesKey, ValueType), SampleValue>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `value` differs from the baseline or there is none.
    ///
    /// A failed baseline lookup counts as "no baseline".
    pub async fn should_write<S>(&mut self, store: &S, key: &SeriesKey, value: &SampleValue) -> bool
    where
        S: SeriesStore + ?Sized,
    {
        let value_type = value.value_type();
        let cache_key = (key.clone(), value_type);

        if let Some(last) = self.cache.get(&cache_key) {
            return !last.equivalent(value);
        }

        match store.latest_value(key, value_type).await {
            Ok(Some(baseline)) => {
                debug!(series = %key, baseline = %baseline, "Loaded baseline from storage");
                let changed = !baseline.equivalent(value);
                self.cache.insert(cache_key, baseline);
                metrics().cached_series.set(self.cache.len() as u64);
                changed
            }
            Ok(None) => true,
            Err(e) => {
                metrics().storage_errors.inc();
                warn!(series = %key, value_type = %value_type, error = %e, "Baseline lookup failed");
                true
            }
        }
    }

    /// Records a value that was written.
    pub fn record(&mut self, key: &SeriesKey, value: SampleValue) {
        self.cache.insert((key.clone(), value.value_type()), value);
        metrics().cached_series.set(self.cache.len() as u64);
    }

    pub fn cached(&self, key: &SeriesKey, value_type: ValueType) -> Option<&SampleValue> {
        self.cache.get(&(key.clone(), value_type))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
