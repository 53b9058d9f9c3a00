use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::providers::ProviderKind;
use crate::registry::Scope;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Cache warmup interval in minutes
    #[serde(default = "default_warmup_interval")]
    pub warmup_interval: u64,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub chains: ChainsConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_warmup_interval() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub database_url: String,
    /// TTL in minutes for chain-resolved queries
    pub general_ttl_minutes: u64,
    /// TTL in minutes for queries naming one source, tenant or category
    pub scoped_ttl_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            database_url: "sqlite:newshub_cache.db?mode=rwc".to_string(),
            general_ttl_minutes: 30,
            scoped_ttl_minutes: 10,
        }
    }
}

impl CacheConfig {
    pub fn general_ttl(&self) -> Duration {
        Duration::from_secs(self.general_ttl_minutes * 60)
    }

    pub fn scoped_ttl(&self) -> Duration {
        Duration::from_secs(self.scoped_ttl_minutes * 60)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub newsapi: NewsApiConfig,
    pub gnews: GNewsConfig,
    pub cms: CmsConfig,
    pub rss: RssConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NewsApiConfig {
    pub base_url: String,
    /// Falls back to the NEWS_API_KEY environment variable
    pub api_key: Option<String>,
    pub country: Option<String>,
    pub local_country: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org/v2".to_string(),
            api_key: None,
            country: Some("us".to_string()),
            local_country: None,
            timeout_secs: 8,
        }
    }
}

impl NewsApiConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), "NEWS_API_KEY")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GNewsConfig {
    pub base_url: String,
    /// Falls back to the GNEWS_API_KEY environment variable
    pub api_key: Option<String>,
    pub lang: String,
    pub country: Option<String>,
    pub local_country: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GNewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gnews.io/api/v4".to_string(),
            api_key: None,
            lang: "en".to_string(),
            country: None,
            local_country: Some("et".to_string()),
            timeout_secs: 8,
        }
    }
}

impl GNewsConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), "GNEWS_API_KEY")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CmsConfig {
    pub base_url: String,
    /// Host prepended to relative media paths
    pub asset_host: String,
    pub timeout_secs: u64,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://led.weytech.et:1338/api".to_string(),
            asset_host: "http://led.weytech.et:1338".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RssConfig {
    /// Timeout for one feed URL
    pub timeout_secs: u64,
    /// Budget for one feed inside a region-wide batch
    pub batch_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            batch_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (compatible; NewsHub/1.0; +RSS Aggregator)".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChainsConfig {
    pub global: Vec<ProviderKind>,
    pub local: Vec<ProviderKind>,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            global: vec![
                ProviderKind::NewsApi,
                ProviderKind::GNews,
                ProviderKind::Cms,
                ProviderKind::Rss,
            ],
            local: vec![ProviderKind::Cms, ProviderKind::GNews, ProviderKind::Rss],
        }
    }
}

impl ChainsConfig {
    pub fn for_scope(&self, scope: Scope) -> &[ProviderKind] {
        match scope {
            Scope::Global => &self.global,
            Scope::Local => &self.local,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub scope: Scope,
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub alternates: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
}

fn resolve_secret(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            warmup_interval: default_warmup_interval(),
            cache: CacheConfig::default(),
            providers: ProvidersConfig::default(),
            chains: ChainsConfig::default(),
            feeds: Vec::new(),
        }
    }
}
