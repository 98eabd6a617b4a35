//! mqtt2sql
//!
//! Subscribes to an MQTT broker and stores sensor values in PostgreSQL:
//! - per-topic JSONPath extraction and type coercion
//! - writes only when a value changed
//! - discovery of every topic seen on the broker
//! - periodic deletion of expired rows

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{error, info, warn};

use bridge_core::{
    ErrorEvent, FatalErrorCode, KeyMode, RetentionPolicy, TopicConfigEntry, TopicSettings,
};
use mqtt_bus::{MqttConfig, TopicRegistry};
use pg_store::{PgStore, PostgresConfig};
use telemetry::{init_tracing, LoggingConfig};
use worker::{run_event_loop, LoopExit, Pipeline, RetentionSweeper};

const DEFAULT_CONFIG_PATH: &str = "config/mqtt2sql.toml";

/// Store MQTT sensor values in PostgreSQL.
#[derive(Debug, Parser)]
#[command(name = "mqtt2sql", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Config {
    #[serde(default)]
    mqtt: MqttConfig,
    #[serde(default)]
    postgres: PostgresConfig,
    #[serde(default)]
    retention: RetentionPolicy,
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    topics: Vec<TopicSettings>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Load .env file if present
    dotenvy::dotenv().ok();

    if let Err(event) = run(cli).await {
        eprintln!("Error: {}", event.message);
        std::process::exit(event.exit_code);
    }
}

async fn run(cli: Cli) -> std::result::Result<(), ErrorEvent> {
    let config = load_config(cli.config).map_err(config_error)?;

    init_tracing(&config.logging.clone().with_env_overrides());
    info!("Starting mqtt2sql v{}", env!("CARGO_PKG_VERSION"));

    config.mqtt.validate().map_err(config_error)?;
    let file_entries =
        topic_entries(config.topics.clone(), config.postgres.key_mode).map_err(config_error)?;

    let store = PgStore::open(&config.postgres).await.map_err(|e| {
        error!(error = %e, "Failed to open PostgreSQL connection");
        ErrorEvent::fatal(FatalErrorCode::StorageOpen, e.to_string())
    })?;
    let schema_failures = store.init_schema().await;
    let connection_ok = pg_store::check_connection(&store).await;
    warn_on_degraded_storage(schema_failures, connection_ok);

    let registry = build_registry(&store, &config, file_entries).await;
    let filters = registry.subscription_filters(&config.mqtt.catch_all_topic);

    let (bus, mut events) = mqtt_bus::connect(&config.mqtt, filters).map_err(config_error)?;

    let store = Arc::new(store);
    let mut pipeline = Pipeline::new(
        store.clone(),
        registry,
        RetentionSweeper::new(config.retention.clone()),
    );

    let exit = run_event_loop(
        &mut pipeline,
        &mut events,
        config.retention.sweep_interval(),
        shutdown_signal(),
    )
    .await;

    info!("Shutting down...");
    bus.disconnect().await;
    store.close().await;

    match exit {
        LoopExit::Shutdown => {
            info!("Shutdown complete");
            Ok(())
        }
        LoopExit::BusClosed => Err(ErrorEvent::fatal(
            FatalErrorCode::Transport,
            "MQTT connection closed",
        )),
        LoopExit::Fatal(event) => {
            error!(exit_code = event.exit_code, message = %event.message, "Fatal error");
            Err(event)
        }
    }
}

/// Logs storage problems that do not stop startup. Returns whether any were found.
fn warn_on_degraded_storage(schema_failures: usize, connection_ok: bool) -> bool {
    if schema_failures > 0 {
        warn!(
            failures = schema_failures,
            "Schema bootstrap incomplete, affected tables may reject writes"
        );
    }
    if !connection_ok {
        warn!("PostgreSQL health check failed after connecting");
    }
    schema_failures > 0 || !connection_ok
}

fn config_error(e: impl std::fmt::Display) -> ErrorEvent {
    ErrorEvent::fatal(FatalErrorCode::Config, format!("{:#}", e))
}

/// Load configuration from defaults, the TOML file, and environment.
///
/// Environment keys look like `MQTT2SQL_POSTGRES__PASSWORD`.
fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let (path, required) = match path {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::from(path.as_path())
                .required(required)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::with_prefix("MQTT2SQL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Converts the `[[topics]]` tables. Any invalid entry is a configuration error.
fn topic_entries(topics: Vec<TopicSettings>, mode: KeyMode) -> Result<Vec<TopicConfigEntry>> {
    topics
        .into_iter()
        .enumerate()
        .map(|(i, settings)| {
            settings
                .into_entry(mode)
                .with_context(|| format!("invalid [[topics]] entry #{}", i + 1))
        })
        .collect()
}

/// Merges file entries with the rows of the topic configuration table.
async fn build_registry(
    store: &PgStore,
    config: &Config,
    mut entries: Vec<TopicConfigEntry>,
) -> TopicRegistry {
    if config.postgres.load_topic_table {
        match pg_store::load_topic_config(store).await {
            Ok(rows) => entries.extend(rows),
            Err(e) => error!(error = %e, "Failed to load topic configuration table"),
        }
    }

    let registry = TopicRegistry::new(entries);
    if registry.is_empty() {
        warn!("No topics configured, only topic discovery is active");
    } else {
        info!(topics = registry.len(), "Topic registry loaded");
    }
    registry
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
