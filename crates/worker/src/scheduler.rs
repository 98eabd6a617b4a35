//! Event loop driving the pipeline.
//!
//! Bus events and retention ticks are handled one at a time on the current
//! task. A message or sweep always runs to completion before the next
//! event is taken. A due tick is served before queued bus events so a
//! message backlog cannot hold off retention.

use std::future::Future;
use std::time::Duration;

use bridge_core::ErrorEvent;
use chrono::Utc;
use mqtt_bus::BusEvent;
use pg_store::SeriesStore;
use telemetry::{health, metrics};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::pipeline::Pipeline;

/// Why the event loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The shutdown future completed
    Shutdown,
    /// The bus connection task stopped
    BusClosed,
    /// A fatal error; the process should exit with its code
    Fatal(ErrorEvent),
}

/// Runs until shutdown, bus closure, or a fatal error.
///
/// The first sweep happens one `sweep_interval` after start.
pub async fn run_event_loop<S, F>(
    pipeline: &mut Pipeline<S>,
    events: &mut mpsc::Receiver<BusEvent>,
    sweep_interval: Duration,
    shutdown: F,
) -> LoopExit
where
    S: SeriesStore + ?Sized,
    F: Future<Output = ()>,
{
    let mut ticker = interval_at(Instant::now() + sweep_interval, sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(
        sweep_interval_secs = sweep_interval.as_secs(),
        "Event loop started"
    );

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested");
                return LoopExit::Shutdown;
            }

            _ = ticker.tick() => {
                pipeline.sweep(Utc::now()).await;
                log_snapshot(pipeline.detector().len());
            }

            event = events.recv() => {
                let Some(event) = event else {
                    warn!("Bus event channel closed");
                    return LoopExit::BusClosed;
                };
                if let Some(error_event) = pipeline.handle_event(event).await {
                    if error_event.is_fatal() {
                        return LoopExit::Fatal(error_event);
                    }
                    warn!(message = %error_event.message, "Advisory error");
                }
            }
        }
    }
}

fn log_snapshot(cached_series: usize) {
    let snapshot = metrics().snapshot();
    let report = health().report();
    info!(
        status = ?report.status,
        messages_received = snapshot.messages_received,
        values_written = snapshot.values_written,
        values_unchanged = snapshot.values_unchanged,
        values_dropped = snapshot.values_dropped,
        storage_errors = snapshot.storage_errors,
        seen_topics = snapshot.seen_topics,
        rows_expired = snapshot.rows_expired,
        insert_latency_mean_ms = snapshot.insert_latency_mean_ms,
        insert_latency_buckets = ?snapshot.insert_latency_buckets,
        cached_series,
        "Bridge metrics"
    );
}
