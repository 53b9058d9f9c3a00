//! Alternate content API client (gnews.io v4).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{decode_items, get_json, http_client, lenient, lenient_string, NewsProvider, ProviderKind, RawBatch};
use crate::config::GNewsConfig;
use crate::error::ProviderError;
use crate::normalize::RawItem;
use crate::query::NewsQuery;
use crate::registry::Scope;

const DEFAULT_MAX: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GNewsArticle {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub published_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub source: Option<GNewsSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GNewsSource {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GNewsResponse {
    #[serde(default)]
    total_articles: Option<u64>,
    articles: Vec<serde_json::Value>,
}

pub struct GNewsClient {
    client: reqwest::Client,
    config: GNewsConfig,
    api_key: Option<String>,
}

impl GNewsClient {
    pub fn new(config: GNewsConfig) -> Result<Self, ProviderError> {
        let api_key = config.resolved_api_key();
        Ok(Self {
            client: http_client("NewsHub/1.0")?,
            config,
            api_key,
        })
    }

    fn country_for(&self, scope: Scope) -> Option<&str> {
        match scope {
            Scope::Global => self.config.country.as_deref(),
            Scope::Local => self.config.local_country.as_deref(),
        }
    }
}

#[async_trait]
impl NewsProvider for GNewsClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GNews
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn fetch(&self, query: &NewsQuery) -> Result<RawBatch, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::configuration(self.kind().as_str(), "GNEWS_API_KEY is not configured")
        })?;

        let base = self.config.base_url.trim_end_matches('/');
        let mut params: Vec<(&str, String)> = vec![
            ("lang", self.config.lang.clone()),
            ("max", query.page_size.unwrap_or(DEFAULT_MAX).to_string()),
            ("apikey", api_key.to_string()),
        ];
        if let Some(country) = self.country_for(query.scope) {
            params.push(("country", country.to_string()));
        }
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }

        let url = match &query.query {
            Some(q) => {
                params.push(("q", q.clone()));
                format!("{}/search", base)
            }
            None => format!("{}/top-headlines", base),
        };

        let request = self.client.get(&url).query(&params);
        let response: GNewsResponse = get_json(self.kind(), request).await?;

        let items = decode_items::<GNewsArticle>(self.kind(), response.articles)
            .into_iter()
            .map(RawItem::GNews)
            .collect();
        Ok(RawBatch::new(items, response.total_articles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> GNewsClient {
        let mut client = GNewsClient::new(GNewsConfig {
            base_url: server.uri(),
            ..Default::default()
        })
        .unwrap();
        client.api_key = api_key.map(str::to_string);
        client
    }

    #[tokio::test]
    async fn test_local_headlines_use_local_country() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/top-headlines"))
            .and(query_param("country", "et"))
            .and(query_param("apikey", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalArticles": 7,
                "articles": [{
                    "title": "Addis news",
                    "url": "https://example.et/a",
                    "image": "https://example.et/a.jpg",
                    "publishedAt": "2024-12-09T10:00:00Z",
                    "source": {"name": "Example ET", "url": "https://example.et"}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("k"));
        let batch = client.fetch(&NewsQuery::new(Scope::Local)).await.unwrap();

        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.total_results, Some(7));
    }

    #[tokio::test]
    async fn test_search_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "coffee"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalArticles": 0,
                "articles": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("k"));
        let batch = client
            .fetch(&NewsQuery::new(Scope::Global).with_query("coffee"))
            .await
            .unwrap();

        assert!(batch.items.is_empty());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let server = MockServer::start().await;
        let client = client_for(&server, None);

        let err = client.fetch(&NewsQuery::new(Scope::Global)).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_forbidden_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"errors": ["quota"]})))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("k"));
        let err = client.fetch(&NewsQuery::new(Scope::Global)).await.unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Http);
        assert_eq!(err.status, Some(403));
    }

    #[tokio::test]
    async fn test_missing_articles_field_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"totalArticles": 3})))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("k"));
        let err = client.fetch(&NewsQuery::new(Scope::Global)).await.unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Parse);
    }
}
