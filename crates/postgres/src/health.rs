//! PostgreSQL health checks.

use telemetry::health;
use tracing::{debug, error};

use crate::client::PgStore;

/// Runs `SELECT 1` and records the result in the health registry.
pub async fn check_connection(store: &PgStore) -> bool {
    match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(store.pool())
        .await
    {
        Ok(_) => {
            debug!("PostgreSQL connection healthy");
            health().postgres.set_healthy();
            true
        }
        Err(e) => {
            error!("PostgreSQL health check failed: {}", e);
            health().postgres.set_unhealthy(e.to_string());
            false
        }
    }
}
