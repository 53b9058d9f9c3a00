//! Headlines API client (newsapi.org v2).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{decode_items, get_json, http_client, lenient, lenient_string, NewsProvider, ProviderKind, RawBatch};
use crate::config::NewsApiConfig;
use crate::error::ProviderError;
use crate::normalize::RawItem;
use crate::query::NewsQuery;
use crate::registry::Scope;

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsApiArticle {
    #[serde(default, deserialize_with = "lenient")]
    pub source: Option<NewsApiSource>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url_to_image: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub published_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewsApiSource {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total_results: Option<u64>,
    #[serde(default)]
    articles: Vec<serde_json::Value>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct NewsApiClient {
    client: reqwest::Client,
    config: NewsApiConfig,
    api_key: Option<String>,
}

impl NewsApiClient {
    pub fn new(config: NewsApiConfig) -> Result<Self, ProviderError> {
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
            Scope::Local => self
                .config
                .local_country
                .as_deref()
                .or(self.config.country.as_deref()),
        }
    }
}

#[async_trait]
impl NewsProvider for NewsApiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::NewsApi
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn fetch(&self, query: &NewsQuery) -> Result<RawBatch, ProviderError> {
        let name = self.kind().as_str();
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::configuration(name, "NEWS_API_KEY is not configured"))?;

        let base = self.config.base_url.trim_end_matches('/');
        let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE).to_string();
        let mut params: Vec<(&str, String)> = vec![("pageSize", page_size)];
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }

        // Free-text searches go to /everything; plain headline requests need
        // a country or category on /top-headlines.
        let url = match &query.query {
            Some(q) => {
                params.push(("q", q.clone()));
                params.push(("sortBy", "publishedAt".to_string()));
                format!("{}/everything", base)
            }
            None => {
                match self.country_for(query.scope) {
                    Some(country) => params.push(("country", country.to_string())),
                    None => params.push(("category", "general".to_string())),
                }
                format!("{}/top-headlines", base)
            }
        };

        debug!("Requesting {} ({} params)", url, params.len());
        let request = self
            .client
            .get(&url)
            .header("X-Api-Key", api_key)
            .query(&params);
        let response: NewsApiResponse = get_json(self.kind(), request).await?;

        if response.status.as_deref() == Some("error") {
            return Err(ProviderError::parse(
                name,
                format!(
                    "{}: {}",
                    response.code.unwrap_or_else(|| "error".to_string()),
                    response.message.unwrap_or_default()
                ),
            ));
        }

        let items = decode_items::<NewsApiArticle>(self.kind(), response.articles)
            .into_iter()
            .map(RawItem::NewsApi)
            .collect();
        Ok(RawBatch::new(items, response.total_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> NewsApiClient {
        let mut client = NewsApiClient::new(NewsApiConfig {
            base_url: server.uri(),
            api_key: api_key.map(str::to_string),
            ..Default::default()
        })
        .unwrap();
        // Ignore any key present in the environment.
        client.api_key = api_key.map(str::to_string);
        client
    }

    #[tokio::test]
    async fn test_top_headlines_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/top-headlines"))
            .and(query_param("country", "us"))
            .and(header("X-Api-Key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "totalResults": 42,
                "articles": [
                    {
                        "source": {"id": "bbc-news", "name": "BBC News"},
                        "title": "Headline one",
                        "url": "https://bbc.co.uk/1",
                        "publishedAt": "2024-12-09T12:00:00Z"
                    },
                    {"title": "Headline two", "url": "https://bbc.co.uk/2"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));
        let batch = client.fetch(&NewsQuery::new(Scope::Global)).await.unwrap();

        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.total_results, Some(42));
        match &batch.items[0] {
            RawItem::NewsApi(article) => {
                assert_eq!(article.title.as_deref(), Some("Headline one"));
                assert_eq!(
                    article.source.as_ref().and_then(|s| s.name.as_deref()),
                    Some("BBC News")
                );
            }
            other => panic!("unexpected raw item {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_uses_everything_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/everything"))
            .and(query_param("q", "addis ababa"))
            .and(query_param("pageSize", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "totalResults": 1,
                "articles": [{"title": "Found"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));
        let query = NewsQuery::new(Scope::Global)
            .with_query("addis ababa")
            .with_page_size(5);
        let batch = client.fetch(&query).await.unwrap();

        assert_eq!(batch.items.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.fetch(&NewsQuery::new(Scope::Global)).await.unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Configuration);
        assert_eq!(err.provider, "newsapi");
    }

    #[tokio::test]
    async fn test_server_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));
        let err = client.fetch(&NewsQuery::new(Scope::Global)).await.unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Http);
        assert_eq!(err.status, Some(500));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));
        let err = client.fetch(&NewsQuery::new(Scope::Global)).await.unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Parse);
    }

    #[tokio::test]
    async fn test_error_status_in_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "code": "rateLimited",
                "message": "Too many requests"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));
        let err = client.fetch(&NewsQuery::new(Scope::Global)).await.unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Parse);
        assert!(err.message.contains("rateLimited"));
    }

    #[tokio::test]
    async fn test_malformed_item_does_not_fail_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "articles": [
                    {"title": ["not", "a", "string"], "source": "oops"},
                    {"title": "Fine"}
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));
        let batch = client.fetch(&NewsQuery::new(Scope::Global)).await.unwrap();

        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.total_results, None);
    }
}
