//! Tick Stream Binary
//!
//! Starts the generator, both consumer groups, the query/streaming gateway
//! and the health server in one process.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tick-stream
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `TICKSTREAM_LOG_DIR`: Message log directory (default: data/log)
//! - `TICKSTREAM_TOPIC`: Log topic (default: `market_ticks`)
//! - `TICKSTREAM_LOG_SEGMENT_BYTES`: Log segment size before rolling (default: 64 MiB)
//! - `TICKSTREAM_STORAGE_GROUP` / `TICKSTREAM_CACHE_GROUP`: Consumer groups
//! - `TICKSTREAM_DB_PATH`: SQLite file (default: data/ticks.sqlite)
//! - `TICKSTREAM_WINDOW_HOURS`: Cache lookback (default: 24)
//! - `TICKSTREAM_GENERATION_INTERVAL_MS`: Generation interval (default: 2000)
//! - `TICKSTREAM_SEED`: RNG seed (default: OS entropy)
//! - `TICKSTREAM_HTTP_PORT`: Gateway port (default: 8000)
//! - `TICKSTREAM_HEALTH_PORT`: Health and metrics port (default: 8082)
//! - `TICKSTREAM_CLIENT_BUFFER`: Frames buffered per live client (default: 256)
//! - `TICKSTREAM_RETRY_*`: Bootstrap retry policy (default: every 2s, forever)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tick_stream::application::ports::StoreError;
use tick_stream::infrastructure::config::LogSettings;
use tick_stream::infrastructure::gateway::{GatewayServer, GatewayState};
use tick_stream::infrastructure::health::{HealthServer, HealthServerState};
use tick_stream::infrastructure::telemetry;
use tick_stream::{
    Broadcaster, CacheConsumer, ComponentState, FileMessageLog, FileSubscription, LogError,
    OffsetReset, PipelineConfig, PipelineStatus, RetryError, RetryPolicy, SeededNoise,
    SqliteTickStore, StorageConsumer, SymbolRegistry, SyntheticMarket, TickGenerator, TickStore,
    WindowedStore, init_metrics, run_consumer, wait_until_ready,
};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type TaskError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Tick Stream");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics recorder unavailable");
    }

    let config = Arc::new(PipelineConfig::from_env()?);
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let status = PipelineStatus::new();
    let window = Arc::new(WindowedStore::new(config.cache.window));
    let broadcaster = Arc::new(Broadcaster::new(config.server.client_buffer));

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        status.clone(),
        Arc::clone(&broadcaster),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    // Query and streaming gateway
    let gateway_state = Arc::new(GatewayState::new(
        Arc::clone(&window),
        Arc::clone(&broadcaster),
        config.server.receive_timeout,
        shutdown_token.clone(),
    ));
    let gateway_server = GatewayServer::new(config.server.http_port, gateway_state);

    let mut servers = JoinSet::new();
    servers.spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });
    servers.spawn(async move {
        if let Err(e) = gateway_server.run().await {
            tracing::error!(error = %e, "Gateway server error");
        }
    });

    let signal_token = shutdown_token.clone();
    tokio::spawn(await_shutdown(signal_token));

    let mut failure: Option<String> = None;

    // Components share one log instance; its appends wake their subscribers.
    let mut bootstrap = RetryPolicy::new(config.retry.clone());
    let log = match wait_until_ready(
        "message_log",
        &mut bootstrap,
        &status.generator,
        &shutdown_token,
        || open_log(&config.log),
    )
    .await
    {
        Ok(log) => Some(log),
        Err(RetryError::Cancelled(_)) => None,
        Err(e) => {
            status.generator.set_failed(e.to_string());
            tracing::error!(error = %e, "Message log unavailable, shutting down");
            failure = Some(e.to_string());
            None
        }
    };

    // Pipeline components
    let mut pipeline: JoinSet<Result<(), TaskError>> = JoinSet::new();
    if let Some(log) = log {
        pipeline.spawn(run_generator(
            Arc::clone(&config),
            log.clone(),
            Arc::clone(&status.generator),
            shutdown_token.clone(),
        ));
        pipeline.spawn(run_storage_consumer(
            Arc::clone(&config),
            log.clone(),
            Arc::clone(&status.storage),
            shutdown_token.clone(),
        ));
        pipeline.spawn(run_cache_consumer(
            Arc::clone(&config),
            log,
            CacheConsumer::new(Arc::clone(&window), Arc::clone(&broadcaster)),
            Arc::clone(&status.cache),
            shutdown_token.clone(),
        ));
        tracing::info!("Tick Stream ready");
    }

    while let Some(joined) = pipeline.join_next().await {
        let outcome = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("pipeline task aborted: {e}"),
        };
        tracing::error!(error = %outcome, "Pipeline component stopped, shutting down");
        failure.get_or_insert(outcome);
        shutdown_token.cancel();
    }

    // The pipeline only drains once shutdown began or a component failed.
    shutdown_token.cancel();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while servers.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        tracing::warn!("Servers did not stop within the shutdown timeout");
        servers.abort_all();
    }

    tracing::info!("Tick Stream stopped");

    match failure {
        Some(reason) => Err(reason.into()),
        None => Ok(()),
    }
}

/// Generate into the log until shutdown.
async fn run_generator(
    config: Arc<PipelineConfig>,
    log: FileMessageLog,
    state: Arc<ComponentState>,
    cancel: CancellationToken,
) -> Result<(), TaskError> {
    let noise = config
        .generator
        .seed
        .map_or_else(SeededNoise::from_os_rng, SeededNoise::from_seed);
    let market = SyntheticMarket::new(SymbolRegistry::builtin(), noise);

    TickGenerator::new(market, Arc::new(log), config.generator.interval, state)
        .run(cancel)
        .await;
    Ok(())
}

/// Open the store and the storage group cursor, then persist until shutdown.
async fn run_storage_consumer(
    config: Arc<PipelineConfig>,
    log: FileMessageLog,
    state: Arc<ComponentState>,
    cancel: CancellationToken,
) -> Result<(), TaskError> {
    let db_path = config.storage.db_path.as_path();
    let mut policy = RetryPolicy::new(config.retry.clone());
    let store = match wait_until_ready("tick_store", &mut policy, &state, &cancel, move || {
        open_store(db_path)
    })
    .await
    {
        Ok(store) => store,
        Err(RetryError::Cancelled(_)) => return Ok(()),
        Err(e) => {
            state.set_failed(e.to_string());
            return Err(e.into());
        }
    };

    let group = config.log.storage_group.as_str();
    let Some(mut subscription) =
        subscribe(&log, group, OffsetReset::Earliest, &mut policy, &state, &cancel).await?
    else {
        return Ok(());
    };

    let handler = StorageConsumer::new(Arc::new(store));
    run_consumer(&mut subscription, &handler, &state, &cancel).await?;
    Ok(())
}

/// Open the cache group cursor, then feed the window and live clients until shutdown.
async fn run_cache_consumer(
    config: Arc<PipelineConfig>,
    log: FileMessageLog,
    handler: CacheConsumer,
    state: Arc<ComponentState>,
    cancel: CancellationToken,
) -> Result<(), TaskError> {
    let group = config.log.cache_group.as_str();
    let mut policy = RetryPolicy::new(config.retry.clone());
    let Some(mut subscription) =
        subscribe(&log, group, OffsetReset::Latest, &mut policy, &state, &cancel).await?
    else {
        return Ok(());
    };

    run_consumer(&mut subscription, &handler, &state, &cancel).await?;
    Ok(())
}

/// Subscribe `group` with retry. `None` means shutdown arrived first.
async fn subscribe(
    log: &FileMessageLog,
    group: &str,
    reset: OffsetReset,
    policy: &mut RetryPolicy,
    state: &ComponentState,
    cancel: &CancellationToken,
) -> Result<Option<FileSubscription>, TaskError> {
    let result = wait_until_ready("message_log", policy, state, cancel, move || {
        log.subscribe(group, reset)
    })
    .await;

    match result {
        Ok(subscription) => Ok(Some(subscription)),
        Err(RetryError::Cancelled(_)) => Ok(None),
        Err(e) => {
            state.set_failed(e.to_string());
            Err(e.into())
        }
    }
}

async fn open_log(settings: &LogSettings) -> Result<FileMessageLog, LogError> {
    FileMessageLog::open_with(
        &settings.dir,
        &settings.topic,
        settings.poll_interval,
        settings.segment_bytes,
    )
    .await
}

async fn open_store(path: &Path) -> Result<SqliteTickStore, StoreError> {
    let store = SqliteTickStore::connect(path).await?;
    store.ensure_schema().await?;
    Ok(store)
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &PipelineConfig) {
    tracing::info!(
        log_dir = %config.log.dir.display(),
        topic = %config.log.topic,
        db_path = %config.storage.db_path.display(),
        interval_ms = config.generator.interval.as_millis(),
        window_secs = config.cache.window.as_secs(),
        http_port = config.server.http_port,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        storage_group = %config.log.storage_group,
        cache_group = %config.log.cache_group,
        segment_bytes = config.log.segment_bytes,
        seeded = config.generator.seed.is_some(),
        retry_unlimited = config.retry.is_unlimited(),
        "Pipeline details"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// A handler that fails to install is logged and never fires.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
