use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::query::NewsQuery;
use crate::registry::Scope;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupStatus {
    pub running: bool,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    /// Keys that came back with `status:"error"` on the last run
    pub last_failures: Vec<String>,
}

/// Keeps the default global and local news hot in the cache.
pub struct Warmup {
    aggregator: Arc<Aggregator>,
    warming: Arc<RwLock<bool>>,
    status: RwLock<WarmupStatus>,
}

impl Warmup {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self {
            aggregator,
            warming: Arc::new(RwLock::new(false)),
            status: RwLock::new(WarmupStatus::default()),
        }
    }

    pub async fn is_warming(&self) -> bool {
        *self.warming.read().await
    }

    pub async fn status(&self) -> WarmupStatus {
        let mut status = self.status.read().await.clone();
        status.running = self.is_warming().await;
        status
    }

    /// Refresh every warm query. Returns `false` when a run was already in
    /// progress and this call did nothing.
    pub async fn warm_all(&self) -> bool {
        {
            let mut warming = self.warming.write().await;
            if *warming {
                info!("Warmup already in progress, skipping");
                return false;
            }
            *warming = true;
        }

        self.status.write().await.last_started = Some(Utc::now());
        let failures = self.do_warm_all().await;
        {
            let mut status = self.status.write().await;
            status.last_finished = Some(Utc::now());
            status.last_failures = failures;
        }

        *self.warming.write().await = false;
        true
    }

    async fn do_warm_all(&self) -> Vec<String> {
        let queries: Vec<NewsQuery> = Scope::ALL.iter().map(|s| NewsQuery::new(*s)).collect();
        info!("Warming {} cache entries", queries.len());

        let mut failures = Vec::new();
        for query in queries {
            let response = self.aggregator.refresh(&query).await;
            if response.is_ok() {
                info!(
                    "Warmed {} with {} articles from {}",
                    query.scope,
                    response.articles.len(),
                    response.source
                );
            } else {
                warn!(
                    "Warmup for {} failed: {}",
                    query.scope,
                    response.message.as_deref().unwrap_or("unknown error")
                );
                failures.push(query.cache_key());
            }
        }

        let purged = self.aggregator.purge_cache().await;
        info!("Cache warmup complete, purged {} expired entries", purged);
        failures
    }
}

pub async fn start_background_warmup(warmup: Arc<Warmup>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes.max(1) * 60);

    info!("Starting initial cache warmup");
    warmup.warm_all().await;

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled cache warmup");
        if !warmup.warm_all().await {
            warn!("Scheduled warmup skipped, previous run still active");
        }
    }
}
