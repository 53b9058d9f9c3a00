//! Cache-first aggregation over an ordered chain of providers.
//!
//! A request moves through `CacheCheck -> ProviderAttempt(i) -> Success |
//! NextProvider | AllFailed`. The chain for a request is plain data: either
//! the configured region chain or a single provider when the request names a
//! feed, tenant or category.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::article::{Article, ArticleContent, ContentBlock, NewsResponse};
use crate::cache::CacheStore;
use crate::config::{CacheConfig, ChainsConfig, Config};
use crate::error::ProviderError;
use crate::normalize::{Normalizer, RawItem};
use crate::providers::cms::CmsTaxon;
use crate::providers::{CmsClient, GNewsClient, NewsApiClient, NewsProvider, ProviderKind, RssClient};
use crate::query::NewsQuery;
use crate::registry::{FeedRegistry, Scope, SourceInfo};

pub const CACHE_SOURCE: &str = "cache";

/// One step of a resolved chain: which provider to call and the provenance
/// tag a successful answer carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStep {
    pub kind: ProviderKind,
    pub tag: String,
}

impl ChainStep {
    fn new(kind: ProviderKind, tag: impl Into<String>) -> Self {
        Self {
            kind,
            tag: tag.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedSources {
    pub local: Vec<SourceInfo>,
    pub global: Vec<SourceInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceListing {
    pub tenants: Vec<CmsTaxon>,
    pub categories: Vec<CmsTaxon>,
    pub feeds: FeedSources,
}

pub struct Aggregator {
    providers: HashMap<ProviderKind, Arc<dyn NewsProvider>>,
    cms: Option<Arc<CmsClient>>,
    chains: ChainsConfig,
    cache: Arc<dyn CacheStore>,
    registry: Arc<FeedRegistry>,
    normalizer: Normalizer,
    general_ttl: Duration,
    scoped_ttl: Duration,
}

impl Aggregator {
    pub fn new(cache: Arc<dyn CacheStore>, chains: ChainsConfig, registry: Arc<FeedRegistry>) -> Self {
        let defaults = CacheConfig::default();
        Self {
            providers: HashMap::new(),
            cms: None,
            chains,
            cache,
            registry,
            normalizer: Normalizer::default(),
            general_ttl: defaults.general_ttl(),
            scoped_ttl: defaults.scoped_ttl(),
        }
    }

    /// Wire every provider from configuration.
    pub fn from_config(config: &Config, cache: Arc<dyn CacheStore>) -> Result<Self, ProviderError> {
        let registry = Arc::new(FeedRegistry::from_config(&config.feeds));
        let providers = &config.providers;

        Ok(Self::new(cache, config.chains.clone(), registry.clone())
            .with_ttls(config.cache.general_ttl(), config.cache.scoped_ttl())
            .with_normalizer(Normalizer::new(providers.cms.asset_host.clone()))
            .with_provider(Arc::new(NewsApiClient::new(providers.newsapi.clone())?))
            .with_provider(Arc::new(GNewsClient::new(providers.gnews.clone())?))
            .with_cms(Arc::new(CmsClient::new(providers.cms.clone())?))
            .with_provider(Arc::new(RssClient::new(providers.rss.clone(), registry)?)))
    }

    pub fn with_provider(mut self, provider: Arc<dyn NewsProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Register the CMS both as a chain provider and for article and
    /// taxonomy lookups.
    pub fn with_cms(mut self, cms: Arc<CmsClient>) -> Self {
        self.providers.insert(ProviderKind::Cms, cms.clone());
        self.cms = Some(cms);
        self
    }

    pub fn with_ttls(mut self, general: Duration, scoped: Duration) -> Self {
        self.general_ttl = general;
        self.scoped_ttl = scoped;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn registry(&self) -> &Arc<FeedRegistry> {
        &self.registry
    }

    /// TTL class for a query: narrow requests expire sooner.
    pub fn ttl_for(&self, query: &NewsQuery) -> Duration {
        if query.is_specific() {
            self.scoped_ttl
        } else {
            self.general_ttl
        }
    }

    /// Providers to try for `query`, in order.
    pub fn plan(&self, query: &NewsQuery) -> Vec<ChainStep> {
        if let Some(source) = &query.source {
            return vec![ChainStep::new(ProviderKind::Rss, format!("rss:{}", source))];
        }
        if let Some(tenant) = &query.tenant_id {
            return vec![ChainStep::new(ProviderKind::Cms, format!("tenant:{}", tenant))];
        }
        if let Some(category) = &query.category_id {
            return vec![ChainStep::new(ProviderKind::Cms, format!("category:{}", category))];
        }

        self.chains
            .for_scope(query.scope)
            .iter()
            .map(|kind| ChainStep::new(*kind, kind.as_str()))
            .collect()
    }

    /// Cached response for `query`, or a fresh one from the provider chain.
    pub async fn fetch_news(&self, query: &NewsQuery) -> NewsResponse {
        let key = query.cache_key();
        if let Some(mut cached) = self.cached(&key).await {
            cached.source = CACHE_SOURCE.to_string();
            return cached;
        }

        self.resolve(query, &key).await
    }

    /// Recompute `query` from upstream and overwrite its cache entry.
    pub async fn refresh(&self, query: &NewsQuery) -> NewsResponse {
        self.resolve(query, &query.cache_key()).await
    }

    async fn cached(&self, key: &str) -> Option<NewsResponse> {
        match self.cache.get(key).await {
            Ok(Some(entry)) => {
                debug!("Cache hit for {}", key);
                Some(entry.response)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", key, e);
                None
            }
        }
    }

    /// Evict expired cache entries; failures are logged.
    pub async fn purge_cache(&self) -> u64 {
        match self.cache.purge_expired().await {
            Ok(removed) => {
                if removed > 0 {
                    debug!("Purged {} expired cache entries", removed);
                }
                removed
            }
            Err(e) => {
                warn!("Cache purge failed: {}", e);
                0
            }
        }
    }

    async fn store(&self, key: &str, response: &NewsResponse, ttl: Duration) {
        if let Err(e) = self.cache.set(key, response.clone(), ttl).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    async fn resolve(&self, query: &NewsQuery, key: &str) -> NewsResponse {
        let plan = self.plan(query);
        let mut failures = Vec::with_capacity(plan.len());

        for step in &plan {
            match self.attempt(step.kind, query).await {
                Ok((articles, total)) if !articles.is_empty() => {
                    info!("{} answered {} with {} articles", step.tag, key, articles.len());
                    let response = NewsResponse::ok(step.tag.clone(), articles, total);
                    self.store(key, &response, self.ttl_for(query)).await;
                    return response;
                }
                Ok(_) => {
                    info!("{} returned no articles, trying next provider", step.tag);
                    failures.push(format!("{}: no articles", step.tag));
                }
                Err(e) => {
                    warn!("{} failed, trying next provider: {}", step.tag, e);
                    failures.push(e.to_string());
                }
            }
        }

        error!("All providers failed for {}", key);
        let source = plan
            .last()
            .map(|s| s.tag.clone())
            .unwrap_or_else(|| "none".to_string());
        NewsResponse::error(
            source,
            format!("All news providers failed: {}", failures.join("; ")),
        )
    }

    /// One provider call under its timeout, normalized.
    async fn attempt(
        &self,
        kind: ProviderKind,
        query: &NewsQuery,
    ) -> Result<(Vec<Article>, Option<u64>), ProviderError> {
        let provider = self
            .providers
            .get(&kind)
            .ok_or_else(|| ProviderError::configuration(kind.as_str(), "provider is not configured"))?;

        let limit = provider.timeout();
        let batch = tokio::time::timeout(limit, provider.fetch(query))
            .await
            .map_err(|_| ProviderError::timeout(kind.as_str(), format!("no response within {:?}", limit)))??;

        Ok((self.normalizer.normalize_all(&batch.items), batch.total_results))
    }

    /// Every feed of `scope`, cached on its own key with the scoped TTL.
    pub async fn region_feeds(&self, scope: Scope) -> NewsResponse {
        let key = format!("feeds:{}", scope);
        if let Some(mut cached) = self.cached(&key).await {
            cached.source = CACHE_SOURCE.to_string();
            return cached;
        }

        let query = NewsQuery::new(scope);
        match self.attempt(ProviderKind::Rss, &query).await {
            Ok((articles, total)) => {
                let response = NewsResponse::ok(ProviderKind::Rss.as_str(), articles, total);
                if !response.articles.is_empty() {
                    self.store(&key, &response, self.scoped_ttl).await;
                }
                response
            }
            Err(e) => {
                error!("Region feed fetch failed for {}: {}", scope, e);
                NewsResponse::error(ProviderKind::Rss.as_str(), e.to_string())
            }
        }
    }

    fn cms(&self) -> Result<&Arc<CmsClient>, ProviderError> {
        self.cms
            .as_ref()
            .ok_or_else(|| ProviderError::configuration(ProviderKind::Cms.as_str(), "CMS is not configured"))
    }

    async fn within_cms_timeout<T>(
        &self,
        cms: &CmsClient,
        call: impl std::future::Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        let limit = cms.timeout();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| ProviderError::timeout(ProviderKind::Cms.as_str(), format!("no response within {:?}", limit)))?
    }

    /// CMS article by numeric id or document id. Falls back to scanning the
    /// default list when the direct lookup fails or finds nothing.
    pub async fn article_by_id(&self, id: &str) -> Result<Option<Article>, ProviderError> {
        let cms = self.cms()?;

        let direct = match self.within_cms_timeout(cms, cms.fetch_article(id)).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Direct article lookup failed for {}, searching list: {}", id, e);
                None
            }
        };
        let item = match direct {
            Some(item) => Some(item),
            None => self.within_cms_timeout(cms, cms.find_in_list(id)).await?,
        };

        Ok(item.map(|item| {
            let mut article = self.normalizer.normalize(&RawItem::Cms(item));
            if article.content.is_none() {
                let text = article
                    .description
                    .clone()
                    .unwrap_or_else(|| "No content available".to_string());
                article.content = Some(ArticleContent::Blocks(vec![ContentBlock::paragraph(text)]));
            }
            article
        }))
    }

    /// CMS tenants and categories, fetched concurrently, plus registry feeds.
    pub async fn sources(&self) -> Result<SourceListing, ProviderError> {
        let cms = self.cms()?;
        let (tenants, categories) = tokio::try_join!(
            self.within_cms_timeout(cms, cms.fetch_tenants()),
            self.within_cms_timeout(cms, cms.fetch_categories()),
        )?;

        Ok(SourceListing {
            tenants,
            categories,
            feeds: FeedSources {
                local: self.registry.available_sources(Scope::Local),
                global: self.registry.available_sources(Scope::Global),
            },
        })
    }
}
