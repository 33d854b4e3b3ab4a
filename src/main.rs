//! PebbleStore -- S3-compatible object storage server.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use pebblestore::auth::{CredentialStore, Credentials};
use pebblestore::store::blob::BlobStore;

/// Command-line arguments for the PebbleStore server.
#[derive(Parser, Debug)]
#[command(
    name = "pebblestore",
    version,
    about = "S3-compatible object storage server"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "pebblestore.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = pebblestore::config::load_config(&cli.config)?;

    // Initialize tracing / logging from config (RUST_LOG wins).
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder.
    if config.observability.metrics {
        pebblestore::metrics::init_metrics();
        pebblestore::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // Select the blob store backend.
    let store: Arc<dyn BlobStore> = match config.storage.backend.as_str() {
        "memory" => {
            info!("In-memory blob store initialized");
            Arc::new(pebblestore::store::memory::MemoryBlobStore::new())
        }
        _ => {
            let root = &config.storage.local.root_dir;
            let local = pebblestore::store::local::LocalBlobStore::new(root)
                .map_err(|e| anyhow::anyhow!("failed to open blob store at {root}: {e}"))?;
            info!("Local blob store initialized at {}", root);
            Arc::new(local)
        }
    };

    // Load credentials into the process-wide read-only store.
    let default_region = config.server.region.clone();
    let credentials: Vec<Credentials> = config
        .auth
        .credentials
        .iter()
        .map(|c| Credentials {
            access_key: c.access_key.clone(),
            secret_key: c.secret_key.clone(),
            region: c.region.clone().unwrap_or_else(|| default_region.clone()),
        })
        .collect();
    info!("Loaded {} credential(s)", credentials.len());
    let credentials = Arc::new(CredentialStore::new(credentials));

    let state = Arc::new(pebblestore::AppState::new(config, store, credentials));
    let app = pebblestore::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("PebbleStore listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new
    // connections and let in-flight requests finish.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("PebbleStore shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
