//! stashd — single-tenant file catalog + blob storage server.
//!
//! Startup is idempotent: the catalog seeds itself on first load and
//! every store construction only creates what is missing. SIGTERM and
//! SIGINT stop accepting connections and drain in-flight requests; no
//! shutdown-time cleanup is needed since every write is atomic.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use stashd::audit::Auditor;
use stashd::backup::BackupManager;
use stashd::blobs::local::LocalBlobStore;
use stashd::blobs::store::BlobStore;
use stashd::catalog::model::User;
use stashd::catalog::store::CatalogStore;
use stashd::service::FileService;

/// Command-line arguments for the stashd server.
#[derive(Parser, Debug)]
#[command(
    name = "stashd",
    version,
    about = "Single-tenant file catalog and blob storage server"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "stashd.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from {}", cli.config);
    let config = stashd::config::load_config(&cli.config)?;

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Catalog store; seeds the bootstrap admin on first load.
    let seed_user = User {
        username: config.bootstrap.username.clone(),
        password: config.bootstrap.password.clone(),
        display_name: config.bootstrap.display_name.clone(),
    };
    let catalog = Arc::new(CatalogStore::new(&config.catalog.path, seed_user)?);
    catalog.load();
    info!("Catalog store initialized at {}", config.catalog.path);

    // Blob store on the local filesystem.
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.blobs.root_dir)?);
    info!("Blob store initialized at {}", config.blobs.root_dir);

    let service = FileService::new(
        catalog.clone(),
        blobs.clone(),
        config.uploads.allowed_extensions.clone(),
    );
    let auditor = Auditor::new(catalog.clone(), blobs.clone());
    let backups = BackupManager::new(catalog.clone(), &config.backup.dir);

    let state = Arc::new(stashd::AppState {
        config: config.clone(),
        catalog,
        blobs,
        service,
        auditor,
        backups,
    });

    let app = stashd::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("stashd listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new
    // connections and let in-flight requests finish.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("stashd shut down");

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
