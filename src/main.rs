use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newshub::aggregator::Aggregator;
use newshub::cache::{CacheStore, MemoryCacheStore};
use newshub::config::{CacheBackend, Config};
use newshub::db::SqliteCacheStore;
use newshub::healthcheck::FeedHealthChecker;
use newshub::routes::{self, AppState};
use newshub::warmup::{start_background_warmup, Warmup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newshub=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("NEWSHUB_CONFIG").unwrap_or_else(|_| "newshub.toml".to_string());
    let config = Config::load(&config_path)?;
    info!("Loaded configuration from {}", config_path);

    // Initialize cache
    let cache: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Memory => {
            info!("Using in-memory cache");
            Arc::new(MemoryCacheStore::new())
        }
        CacheBackend::Sqlite => {
            let database_url =
                std::env::var("DATABASE_URL").unwrap_or_else(|_| config.cache.database_url.clone());
            let store = SqliteCacheStore::new(&database_url).await?;
            store.initialize().await?;
            let purged = store.purge_expired().await?;
            info!("SQLite cache initialized, purged {} expired entries", purged);
            Arc::new(store)
        }
    };

    let aggregator = Arc::new(Aggregator::from_config(&config, cache)?);
    info!(
        "Registered {} RSS feeds",
        aggregator.registry().entries().len()
    );

    // Start background warmup task
    let warmup = Arc::new(Warmup::new(aggregator.clone()));
    let bg_warmup = warmup.clone();
    let warmup_interval = config.warmup_interval;
    tokio::spawn(async move {
        start_background_warmup(bg_warmup, warmup_interval).await;
    });

    let state = Arc::new(AppState {
        aggregator,
        warmup,
        health_checker: Arc::new(FeedHealthChecker::new(&config.providers.rss)?),
    });

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Server starting on http://{}", config.bind);

    axum::serve(listener, routes::app(state)).await?;

    Ok(())
}
