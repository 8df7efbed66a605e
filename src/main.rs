use std::path::Path;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::config::Config;
use newsdesk::connectivity::ConnectivityMonitor;
use newsdesk::feed::ArticleFeedController;
use newsdesk::routes::{self, AppState};
use newsdesk::source::NewsApiClient;
use newsdesk::storage::SqliteStorage;
use newsdesk::store::SavedArticlesStore;

const DEFAULT_CONFIG_PATH: &str = "newsdesk.toml";

fn load_config() -> anyhow::Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => Config::load(&path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH),
        None => {
            info!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = load_config()?.with_env_overrides();
    if config.api.api_key.is_empty() {
        warn!("No News API key configured; set NEWS_API_KEY or api.api_key");
    }

    // Initialize saved-article storage
    let storage = SqliteStorage::new(&config.storage.database_url).await?;
    storage.initialize().await?;
    let store = Arc::new(SavedArticlesStore::new(
        Arc::new(storage),
        config.storage.saved_articles_key.clone(),
    ));
    match store.load().await {
        Ok(saved) => info!("Storage initialized, {} saved articles", saved.len()),
        Err(e) => warn!("Starting with an empty saved list: {}", e),
    }

    // Create the feed controller
    let source = Arc::new(NewsApiClient::new(&config.api)?);
    let monitor = ConnectivityMonitor::new(true);
    let feed = Arc::new(ArticleFeedController::new(
        source,
        monitor.clone(),
        &config.search,
    ));
    if let Err(e) = feed.initialize().await {
        warn!("Initial headline fetch failed: {}", e);
    }

    let state = Arc::new(AppState {
        feed,
        store,
        monitor,
    });

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Server starting on http://{}", config.server.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
