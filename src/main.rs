//! Council server - runs one deliberation council

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use council::config::CouncilConfig;
use council::escalation::WebhookNotifier;
use council::spawner::{HttpSpawner, LoggingSpawner, Spawner};
use council::store::{CouncilStore, MemoryStore, SqliteStore};
use council::AppState;

#[derive(Debug, Parser)]
#[command(name = "council", about = "Multi-agent deliberation server")]
struct Args {
    /// Council configuration file
    #[arg(long, env = "COUNCIL_CONFIG", default_value = "council.toml")]
    config: PathBuf,

    /// Overrides `server.database_url`; `memory` keeps everything in process
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Overrides `server.bind`
    #[arg(long, env = "COUNCIL_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "council=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = CouncilConfig::load(&args.config)?;
    tracing::info!(
        council = %config.council.id,
        agents = config.agents.len(),
        rules = config.rules.len(),
        scheme = config.voting.scheme().name().as_str(),
        "Loaded council configuration"
    );

    let database_url = args
        .database_url
        .unwrap_or_else(|| config.server.database_url.clone());
    let store: Arc<dyn CouncilStore> = if database_url == "memory" {
        tracing::warn!("Using in-memory store; state is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;
        let store = SqliteStore::new(pool);
        store.migrate().await?;
        Arc::new(store)
    };

    let spawner: Arc<dyn Spawner> = match &config.spawner.launch_url {
        Some(url) => Arc::new(HttpSpawner::new(url.clone())),
        None => Arc::new(LoggingSpawner::new()),
    };
    let notifier = Arc::new(WebhookNotifier::default());

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let state = AppState::new(config, store, spawner, notifier).await;

    let app = council::build_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
