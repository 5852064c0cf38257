mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use blog_api::auth::{AppState, AppStateInner};
use blog_api::schema::build_schema;
use blog_api::service::ContentService;
use blog_db::{Database, EntityStore, MemoryStore};
use blog_gateway::hub::CommentHub;

use config::{ServerConfig, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blog=debug,blog_api=debug,blog_db=info,blog_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init storage
    let store: Arc<dyn EntityStore> = match &config.storage {
        Storage::Memory => {
            info!("Using in-memory storage");
            Arc::new(MemoryStore::new())
        }
        Storage::Sqlite(path) => {
            info!("Using SQLite storage at {}", path.display());
            Arc::new(Database::open(path)?)
        }
    };

    // Shared state
    let service = ContentService::new(store, CommentHub::new(), config.settings.clone());
    let state: AppState = Arc::new(AppStateInner {
        schema: build_schema(service.clone()),
        service: service.clone(),
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = blog_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Blog server listening on {}", addr);
    info!("GraphQL explorer at http://{}/", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service.clone()))
        .await?;

    info!("Shutting down");
    if let Err(e) = service.shutdown().await {
        error!("Failed to close storage cleanly: {}", e);
    }

    Ok(())
}

/// Resolves on Ctrl+C. Live subscriptions are closed first so their
/// connections can drain.
async fn shutdown_signal(service: ContentService) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, closing subscriptions");
    service.hub().unsubscribe_all().await;
}
