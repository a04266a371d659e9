//! reloop-api - Gamified e-waste teardown service
//!
//! Serves the device catalog, guided teardown sessions, photo verification,
//! valuation, XP and leaderboard over HTTP, with progress on `/api/events`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reloop_common::config::{
    default_config_path, resolve_gemini_api_key, RootFolderInitializer, RootFolderResolver,
    TomlConfig,
};
use reloop_common::events::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reloop_api::services::{CatalogSeed, GeminiClient, GeminiPricing, GeminiVision};
use reloop_api::{AppState, EVENT_BUS_CAPACITY};

/// Command-line arguments for reloop-api
#[derive(Parser, Debug)]
#[command(name = "reloop-api")]
#[command(about = "Gamified e-waste teardown service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "RELOOP_PORT")]
    port: Option<u16>,

    /// Folder holding reloop.db
    #[arg(short, long, env = "RELOOP_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML file
    #[arg(short, long, env = "RELOOP_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = TomlConfig::load_or_default(&config_path);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("reloop_api={0},reloop_common={0},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting reloop-api v{}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    let root_folder = RootFolderResolver::new(args.root_folder.clone(), &config).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = reloop_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    if let Some(seed_path) = &config.catalog_seed {
        match CatalogSeed::load(seed_path) {
            Ok(seed) => match seed.apply(&db_pool).await {
                Ok(summary) => info!(
                    devices = summary.devices,
                    components = summary.components,
                    steps = summary.steps,
                    "Catalog seeded from {}",
                    seed_path.display()
                ),
                Err(e) => warn!("Failed to apply catalog seed: {}", e),
            },
            Err(e) => warn!("Failed to load catalog seed {}: {}", seed_path.display(), e),
        }
    }

    let api_key = resolve_gemini_api_key(&config);
    if api_key.is_none() {
        warn!("No Gemini API key configured; verification will fall back to manual bypass");
    }
    let gemini = GeminiClient::new(&config.gemini, api_key).context("Failed to build HTTP client")?;
    let vision = Arc::new(GeminiVision::new(gemini.clone(), config.gemini.vision_model.clone()));
    let pricing = Arc::new(GeminiPricing::new(gemini, config.gemini.text_model.clone()));

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let state = AppState::new(db_pool, event_bus, vision, pricing, &config);
    let session_store = Arc::clone(&state.session_store);

    let app = reloop_api::build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr = format!("{}:{}", config.bind_address, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let revoked = session_store.shutdown().await;
    info!(revoked, "Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
