//! Retention sweeper for the value tables.
//!
//! Each sweep issues one delete per value table. A failing table is logged
//! and skipped, the others are still swept. The seen-topics table is never
//! touched.

use bridge_core::{RetentionPolicy, ValueType};
use chrono::{DateTime, Utc};
use pg_store::SeriesStore;
use telemetry::metrics;
use tracing::{debug, error, info};

/// Outcome of one sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub cutoff: DateTime<Utc>,
    /// Deleted row counts per successfully swept table
    pub deleted: Vec<(ValueType, u64)>,
    /// Tables whose delete failed
    pub failed: Vec<ValueType>,
}

impl SweepReport {
    pub fn total_deleted(&self) -> u64 {
        self.deleted.iter().map(|(_, n)| n).sum()
    }

    pub fn deleted_from(&self, value_type: ValueType) -> Option<u64> {
        self.deleted
            .iter()
            .find(|(t, _)| *t == value_type)
            .map(|(_, n)| *n)
    }
}

/// Deletes rows older than the retention window.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Runs one sweep over all value tables.
    pub async fn sweep<S>(&self, store: &S, now: DateTime<Utc>) -> SweepReport
    where
        S: SeriesStore + ?Sized,
    {
        let cutoff = self.policy.cutoff(now);
        debug!(cutoff = %cutoff, "Running retention sweep");

        let mut report = SweepReport {
            cutoff,
            deleted: Vec::with_capacity(ValueType::ALL.len()),
            failed: Vec::new(),
        };

        for value_type in ValueType::ALL {
            match store.delete_older_than(value_type, cutoff).await {
                Ok(rows) => {
                    if rows > 0 {
                        info!(value_type = %value_type, rows, "Deleted expired rows");
                    }
                    metrics().rows_expired.inc_by(rows);
                    report.deleted.push((value_type, rows));
                }
                Err(e) => {
                    metrics().storage_errors.inc();
                    error!(value_type = %value_type, error = %e, "Retention delete failed");
                    report.failed.push(value_type);
                }
            }
        }

        info!(
            cutoff = %cutoff,
            deleted = report.total_deleted(),
            failed_tables = report.failed.len(),
            "Retention sweep complete"
        );
        report
    }
}
