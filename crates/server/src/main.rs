//! Tandem collab node binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use std::net::SocketAddr;
use tandem_core::config::AppConfig;
use tandem_server::{AppState, create_router};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tandem - real-time collaboration core for shared todo lists
#[derive(Parser, Debug)]
#[command(name = "tandemd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "TANDEM_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Map the flat deployment variables (PORT, AUTH_SECRET, ...) onto the
/// nested configuration. `TANDEM_*` variables handle everything else.
fn env_overrides_from(lookup: impl Fn(&str) -> Option<String>) -> serde_json::Value {
    let mut root = serde_json::Map::new();

    let mut set = |section: &str, field: &str, value: serde_json::Value| {
        root.entry(section)
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()))
            .as_object_mut()
            .expect("section is an object")
            .insert(field.to_string(), value);
    };

    let string_vars = [
        ("HOST", "server", "host"),
        ("ENV", "server", "env"),
        ("CORS_ORIGINS", "server", "cors_origins"),
        ("AUTH_SECRET", "auth", "secret"),
        ("SHARED_STORE_URL", "shared_store", "url"),
        ("PUBSUB_CHANNEL", "shared_store", "pubsub_channel"),
        ("DURABLE_STORE_URL", "durable_store", "url"),
        ("DURABLE_STORE_KEY", "durable_store", "key"),
    ];
    for (var, section, field) in string_vars {
        if let Some(value) = lookup(var) {
            set(section, field, serde_json::Value::String(value));
        }
    }

    let number_vars = [
        ("PORT", "server", "port"),
        ("WRITER_QUEUE_SIZE", "writer", "queue_size"),
        ("WRITER_SHUTDOWN_DRAIN_SECONDS", "writer", "shutdown_drain_seconds"),
    ];
    for (var, section, field) in number_vars {
        if let Some(value) = lookup(var) {
            match value.parse::<u64>() {
                Ok(parsed) => set(section, field, serde_json::Value::from(parsed)),
                Err(_) => tracing::warn!(var, %value, "Ignoring non-numeric environment value"),
            }
        }
    }

    if let Some(value) = lookup("DEBUG") {
        let debug = matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        set("server", "debug", serde_json::Value::Bool(debug));
    }

    serde_json::Value::Object(root)
}

fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    let config_path = std::path::Path::new(path);
    if config_path.exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {path}");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("TANDEM_").split("__"))
        .merge(Serialized::defaults(env_overrides_from(|var| {
            std::env::var(var).ok()
        })))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Tandem v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    tandem_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    // Fail fast: both stores must be reachable before accepting sessions.
    let repository = tandem_repository::from_config(&config.durable_store)
        .await
        .context("failed to initialize durable store")?;
    repository
        .health_check()
        .await
        .context("durable store health check failed")?;
    tracing::info!("Durable store initialized");

    let shared_store = tandem_cache::SharedStore::connect(&config.shared_store)
        .await
        .context("failed to connect to shared store")?;
    tracing::info!("Shared store connection established");

    let readiness = tandem_server::state::Readiness::new();

    let (writer_shutdown_tx, writer_shutdown_rx) = watch::channel(false);
    let (writer, writer_task) = tandem_server::writer::spawn(
        repository.clone(),
        config.writer.queue_size,
        config.writer.shutdown_drain(),
        readiness.clone(),
        writer_shutdown_rx,
    );

    let state = AppState::new(
        config.clone(),
        repository,
        shared_store,
        writer,
        readiness.clone(),
    );

    let (listener_shutdown_tx, listener_shutdown_rx) = watch::channel(false);
    let listener_task = tandem_server::listener::spawn(state.clone(), listener_shutdown_rx);

    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid host/port")?;
    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, env = %config.server.env, "Listening");

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Teardown mirrors startup in reverse: the socket listener is already
    // closed; stop the fan-out listener, then drain the write queue.
    tracing::info!("Shutting down");
    let _ = listener_shutdown_tx.send(true);
    let _ = listener_task.await;

    let _ = writer_shutdown_tx.send(true);
    let drain_grace = config.writer.shutdown_drain() + std::time::Duration::from_secs(1);
    if tokio::time::timeout(drain_grace, writer_task).await.is_err() {
        tracing::warn!("Write worker did not stop within the drain window");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
