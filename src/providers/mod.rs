//! Upstream news providers.
//!
//! Every client implements [`NewsProvider`]: one fetch returning raw,
//! provider-shaped items, or a [`ProviderError`]. Clients never retry; the
//! aggregator owns fallback and applies each provider's timeout.

pub mod cms;
pub mod gnews;
pub mod newsapi;
pub mod rss;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProviderError;
use crate::normalize::RawItem;
use crate::query::NewsQuery;

pub use cms::CmsClient;
pub use gnews::GNewsClient;
pub use newsapi::NewsApiClient;
pub use rss::RssClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    NewsApi,
    GNews,
    Cms,
    Rss,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::NewsApi => "newsapi",
            ProviderKind::GNews => "gnews",
            ProviderKind::Cms => "cms",
            ProviderKind::Rss => "rss",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Items from one provider call, not yet normalized.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub items: Vec<RawItem>,
    /// Upstream total when the provider reports one
    pub total_results: Option<u64>,
}

impl RawBatch {
    pub fn new(items: Vec<RawItem>, total_results: Option<u64>) -> Self {
        Self {
            items,
            total_results,
        }
    }
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Upper bound for one `fetch` call.
    fn timeout(&self) -> Duration;

    async fn fetch(&self, query: &NewsQuery) -> Result<RawBatch, ProviderError>;
}

pub(crate) fn http_client(user_agent: &str) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|e| ProviderError::configuration("http", format!("failed to build HTTP client: {}", e)))
}

/// Send a request and decode a JSON body, mapping each failure to its
/// [`ProviderError`] class.
pub(crate) async fn get_json<T: DeserializeOwned>(
    provider: ProviderKind,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let name = provider.as_str();
    let response = request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(name, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::http(
            name,
            Some(status.as_u16()),
            format!(
                "{} {}",
                status.canonical_reason().unwrap_or("request failed"),
                truncate(&body, 200)
            )
            .trim()
            .to_string(),
        ));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProviderError::from_reqwest(name, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::parse(name, e.to_string()))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Deserialize a field, turning any type mismatch into `None` instead of
/// failing the whole item.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Deserialize a string-ish field: strings pass through, numbers and booleans
/// are stringified, anything else becomes `None`.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Decode a list of items one by one so a single malformed entry degrades to
/// a default item rather than failing the batch.
pub(crate) fn decode_items<T: DeserializeOwned + Default>(
    provider: ProviderKind,
    values: Vec<serde_json::Value>,
) -> Vec<T> {
    values
        .into_iter()
        .filter(|v| v.is_object())
        .map(|v| {
            serde_json::from_value(v).unwrap_or_else(|e| {
                tracing::debug!("{}: degrading malformed item to defaults: {}", provider, e);
                T::default()
            })
        })
        .collect()
}
