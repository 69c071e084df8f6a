// rule-engine-cli/src/main.rs
// ============================================================================
// Module: Rule Engine CLI Entry Point
// Description: Command dispatcher for the `rule-engine` binary: `serve` wires
//              every C1-C11 collaborator together and exposes the health and
//              metrics HTTP surface spec §6 names; `config validate` checks a
//              configuration file without starting anything.
// Purpose: The one place outside the C1-C11 crates that opens a socket.
// Dependencies: clap, axum, tokio, tracing, tracing-subscriber, and every
//               rule-engine-* crate.
// ============================================================================

//! ## Overview
//! `serve` loads [`rule_engine_config::EngineConfig`], connects the shared
//! Redis substrate, opens the relational store, and assembles C1 through
//! C10 before spawning C6's worker pool and C9's schedule manager. It then
//! serves an [`axum`] router with `/health`, `/health/liveness`,
//! `/health/readiness`, and `/metrics`, and runs until `Ctrl-C`.
//!
//! Only the `sqlite:`-scheme store backend is wired through today:
//! `rule-engine-worker::StoreChainProvider`, `rule-engine-index`, and
//! `rule-engine-broker` all take an `Arc<SqliteStore>` directly rather than a
//! shared trait object (see the `rule-engine-store-postgres` design note), so
//! a `postgres:`-scheme store URL is rejected here with a message pointing at
//! that limitation rather than failing later in a more confusing way.

mod error;

use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use rule_engine_bus::EventBus;
use rule_engine_cache::CacheHandle;
use rule_engine_cache::IndexCache;
use rule_engine_collector::DataCollector;
use rule_engine_config::EngineConfig;
use rule_engine_core::CircuitState;
use rule_engine_core::DeliveryBridge;
use rule_engine_core::EventEnqueuer;
use rule_engine_core::OriginatorIndex;
use rule_engine_core::RuleChainProvider;
use rule_engine_core::Thresholds;
use rule_engine_index::StoreBackedIndex;
use rule_engine_metrics::MetricsRegistry;
use rule_engine_queue::Queue;
use rule_engine_scheduler::ScheduleManager;
use rule_engine_store_sqlite::SqliteStore;
use rule_engine_worker::ExecutionTypeIndex;
use rule_engine_worker::StoreChainProvider;
use rule_engine_worker::WorkerPool;
use rule_engine_worker::WorkerTimeouts;

use crate::error::CliError;
use crate::error::CliResult;

/// The `rule-engine` command-line interface.
#[derive(Debug, Parser)]
#[command(name = "rule-engine", version, about = "Event-driven rule engine for IoT telemetry")]
struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Runs the worker pool, schedule manager, and health/metrics HTTP server.
    Serve(ServeArgs),
    /// Configuration inspection commands.
    Config {
        /// The configuration subcommand to run.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `serve`.
#[derive(Debug, Args)]
struct ServeArgs {
    /// Path to a `rule-engine.toml` configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Address the health/metrics HTTP server binds to.
    #[arg(long, default_value = "127.0.0.1:9090")]
    bind: SocketAddr,
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Loads and validates a configuration file (or the environment/default
    /// resolution chain) without starting the engine.
    Validate(ConfigValidateArgs),
}

/// Arguments for `config validate`.
#[derive(Debug, Args)]
struct ConfigValidateArgs {
    /// Path to a `rule-engine.toml` configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Writes an error line to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "error: {message}");
    ExitCode::FAILURE
}

/// CLI entry point returning a process exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments and dispatches to the selected subcommand.
async fn run() -> CliResult<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => command_serve(args).await,
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(args) => command_config_validate(args),
        },
    }
}

/// Executes `config validate`.
fn command_config_validate(args: ConfigValidateArgs) -> CliResult<ExitCode> {
    let config = EngineConfig::load(args.config.as_deref())?;
    let mut stdout = std::io::stdout();
    writeln!(stdout, "configuration is valid")?;
    writeln!(stdout, "store: {}", config.store.url)?;
    writeln!(stdout, "cache: {}", config.cache.url)?;
    writeln!(stdout, "worker concurrency: {}", config.worker.concurrency)?;
    Ok(ExitCode::SUCCESS)
}

/// Opens the relational store named by `url`, refusing any backend other
/// than `sqlite:` (see the module overview).
fn open_sqlite_store(url: &str) -> CliResult<SqliteStore> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        return SqliteStore::open(std::path::Path::new(path)).map_err(CliError::from);
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        return Err(CliError::new(
            "the store pipeline (rule-engine-worker, rule-engine-index, rule-engine-broker) only \
             supports the sqlite: backend today; rule-engine-store-postgres exists as a standalone \
             alternative not yet wired into serve (see DESIGN.md)",
        ));
    }
    Err(CliError::new(format!("unrecognized store URL scheme: {url}")))
}

/// Shared state the health/metrics handlers read from.
#[derive(Clone)]
struct AppState {
    /// The relational store, pinged for the readiness check.
    store: Arc<SqliteStore>,
    /// The shared cache handle, `PING`ed for the readiness check.
    cache: CacheHandle,
    /// C3's event bus, read for its backpressure circuit state.
    event_bus: Arc<EventBus>,
    /// C11's metrics registry, rendered by the `/metrics` route.
    metrics: Arc<MetricsRegistry>,
}

/// Process liveness: always `200 OK` once the HTTP server answers at all.
async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness: `503` when C2's circuit is open or the store/cache substrate
/// is unreachable (spec §6), `200` otherwise.
async fn readiness(State(state): State<AppState>) -> Response {
    if state.event_bus.circuit_state() == CircuitState::Open {
        return (StatusCode::SERVICE_UNAVAILABLE, "circuit open").into_response();
    }

    let store = Arc::clone(&state.store);
    let store_ok = tokio::task::spawn_blocking(move || store.migration_log_version()).await.is_ok_and(|result| result.is_ok());
    if !store_ok {
        return (StatusCode::SERVICE_UNAVAILABLE, "store unreachable").into_response();
    }

    let mut conn = state.cache.manager();
    let cache_ok: Result<String, redis::RedisError> = redis::cmd("PING").query_async(&mut conn).await;
    if cache_ok.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "cache unreachable").into_response();
    }

    (StatusCode::OK, "ready").into_response()
}

/// Aggregated health: liveness first, then readiness.
async fn health(State(state): State<AppState>) -> Response {
    let live = liveness().await;
    if live != StatusCode::OK {
        return live.into_response();
    }
    readiness(State(state)).await
}

/// Renders every C11 metric in Prometheus text exposition format.
async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.gather() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// Executes `serve`: assembles every collaborator and serves the HTTP
/// surface until `Ctrl-C`.
async fn command_serve(args: ServeArgs) -> CliResult<ExitCode> {
    let config = EngineConfig::load(args.config.as_deref())?;

    let cache = CacheHandle::connect(&config.cache.url).await?;
    let store = Arc::new(open_sqlite_store(&config.store.url)?);

    let index_cache = IndexCache::new(cache.clone());
    let index: Arc<dyn OriginatorIndex> = Arc::new(StoreBackedIndex::new(index_cache, Arc::clone(&store)));

    let queue = Arc::new(Queue::new(cache.clone(), "rule-engine-events"));
    let thresholds = Thresholds {
        warning: config.queue_thresholds.warning,
        critical: config.queue_thresholds.critical,
        recovery: config.queue_thresholds.recovery,
    };
    let event_bus = Arc::new(EventBus::new(index, Arc::clone(&queue), thresholds, config.admission.enable_backpressure));
    let enqueuer: Arc<dyn EventEnqueuer> = Arc::clone(&event_bus) as Arc<dyn EventEnqueuer>;

    let execution_types = Arc::new(ExecutionTypeIndex::new());
    let preload_store = Arc::clone(&store);
    let all_chains = tokio::task::spawn_blocking(move || preload_store.list_all_rule_chains())
        .await
        .map_err(|err| CliError::new(format!("startup chain preload task panicked: {err}")))??;
    execution_types.load(&all_chains);
    tracing::info!(count = all_chains.len(), "preloaded execution-type index");

    let chain_provider: Arc<dyn RuleChainProvider> = Arc::new(StoreChainProvider::new(Arc::clone(&store)));
    let collector = Arc::new(DataCollector::new(Arc::clone(&store)));

    let channels = rule_engine_broker::ChannelRegistry::new().with_channel(rule_engine_broker::LogChannel::new(std::io::stdout()));
    let bridge: Arc<dyn DeliveryBridge> = Arc::new(rule_engine_broker::NotificationBridge::new(Arc::clone(&store), cache.clone(), Arc::new(channels)));

    let metrics_registry = Arc::new(MetricsRegistry::new()?);

    let breaker_recovery = time::Duration::seconds(config.breaker.recovery_timeout_secs);
    let worker_timeouts = WorkerTimeouts {
        data_collection_ms: config.timeouts.data_collection_ms,
        rule_chain_ms: config.timeouts.rule_chain_ms,
        worker_ms: config.timeouts.worker_ms,
        external_action_ms: config.timeouts.external_action_ms,
    };
    let worker_pool = Arc::new(WorkerPool::new(
        Arc::clone(&queue),
        chain_provider,
        Arc::clone(&execution_types),
        collector,
        bridge,
        Arc::clone(&metrics_registry),
        config.breaker.threshold,
        breaker_recovery,
        worker_timeouts,
    ));
    let concurrency = config.worker.concurrency;
    let pool_for_run = Arc::clone(&worker_pool);
    tokio::spawn(async move { pool_for_run.run(concurrency).await });

    let scheduler = ScheduleManager::new(Arc::clone(&store), enqueuer);
    scheduler.sync_from_store().await.map_err(|err| CliError::new(format!("schedule sync failed: {err}")))?;

    let state = AppState {
        store,
        cache,
        event_bus,
        metrics: metrics_registry,
    };

    let router = Router::new()
        .route("/health", get(health))
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(metrics))
        .with_state(state);

    tracing::info!(addr = %args.bind, "binding health/metrics server");
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_sqlite_scheme_urls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("rule-engine.db");
        let url = format!("sqlite://{}", db_path.display());
        let store = open_sqlite_store(&url);
        assert!(store.is_ok(), "expected sqlite:// url to open");
    }

    #[test]
    fn rejects_postgres_scheme_urls() {
        let err = open_sqlite_store("postgres://localhost/rule_engine").expect_err("postgres should be rejected");
        assert!(err.to_string().contains("rule-engine-store-postgres"));

        let err = open_sqlite_store("postgresql://localhost/rule_engine").expect_err("postgresql should be rejected");
        assert!(err.to_string().contains("rule-engine-store-postgres"));
    }

    #[test]
    fn rejects_unrecognized_scheme_urls() {
        let err = open_sqlite_store("mysql://localhost/rule_engine").expect_err("mysql should be rejected");
        assert!(err.to_string().contains("unrecognized store URL scheme"));
    }
}
