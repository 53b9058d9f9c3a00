//! RSS/Atom feeds from the feed registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use futures::future::join_all;
use tracing::{error, info, warn};

use super::{http_client, NewsProvider, ProviderKind, RawBatch};
use crate::config::RssConfig;
use crate::error::ProviderError;
use crate::normalize::RawItem;
use crate::query::NewsQuery;
use crate::registry::{FeedEntry, FeedRegistry, Scope};

/// One feed entry, reduced to the fields the normalizer reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeedItem {
    pub source_id: String,
    pub source_name: String,
    pub title: Option<String>,
    pub link: Option<String>,
    /// RFC 3339 publish (or update) date
    pub pub_date: Option<String>,
    /// Full HTML body
    pub content: Option<String>,
    pub summary: Option<String>,
    pub categories: Vec<String>,
    pub guid: Option<String>,
    pub media_image: Option<String>,
}

pub struct RssClient {
    client: reqwest::Client,
    registry: Arc<FeedRegistry>,
    config: RssConfig,
}

impl RssClient {
    pub fn new(config: RssConfig, registry: Arc<FeedRegistry>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(&config.user_agent)?,
            registry,
            config,
        })
    }

    fn per_url_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn feed_budget(&self) -> Duration {
        Duration::from_secs(self.config.batch_timeout_secs)
    }

    /// Fetch one feed, trying the primary URL and then each alternate.
    pub async fn fetch_feed(&self, entry: &FeedEntry) -> Result<Vec<RawFeedItem>, ProviderError> {
        let per_url = self.per_url_timeout();
        let mut last_error = None;

        for url in entry.urls() {
            info!("Fetching feed: {} ({})", entry.source_id, url);
            let result = match tokio::time::timeout(per_url, self.fetch_and_parse(entry, url)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(
                    ProviderKind::Rss.as_str(),
                    format!("{} timed out after {:?}", url, per_url),
                )),
            };

            match result {
                Ok(items) => {
                    info!("Parsed {} items from feed '{}'", items.len(), entry.source_id);
                    return Ok(items);
                }
                Err(e) => {
                    warn!("Feed URL failed for '{}': {}", entry.source_id, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::configuration(
                ProviderKind::Rss.as_str(),
                format!("feed '{}' has no URLs", entry.source_id),
            )
        }))
    }

    async fn fetch_and_parse(&self, entry: &FeedEntry, url: &str) -> Result<Vec<RawFeedItem>, ProviderError> {
        let name = ProviderKind::Rss.as_str();
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "application/rss+xml, application/atom+xml, application/xml, text/xml",
            )
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::http(
                name,
                Some(status.as_u16()),
                format!("{} returned {}", url, status),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(name, e))?;
        let feed = parser::parse(&bytes[..])
            .map_err(|e| ProviderError::parse(name, format!("{}: {}", url, e)))?;

        let source_name = entry.display_name();
        Ok(feed
            .entries
            .into_iter()
            .map(|e| Self::raw_item(&entry.source_id, &source_name, e))
            .collect())
    }

    fn raw_item(source_id: &str, source_name: &str, entry: feed_rs::model::Entry) -> RawFeedItem {
        let media_image = entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .map(|t| t.image.uri.clone())
            .chain(entry.media.iter().flat_map(|m| m.content.iter()).filter_map(|c| {
                let is_image = c
                    .content_type
                    .as_ref()
                    .map(|m| m.to_string().starts_with("image/"))
                    .unwrap_or(false);
                c.url.as_ref().filter(|_| is_image).map(|u| u.to_string())
            }))
            .next();

        RawFeedItem {
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            title: entry.title.map(|t| t.content),
            link: entry.links.first().map(|l| l.href.clone()),
            pub_date: entry.published.or(entry.updated).map(|d| d.to_rfc3339()),
            content: entry.content.and_then(|c| c.body),
            summary: entry.summary.map(|s| s.content),
            categories: entry.categories.into_iter().map(|c| c.term).collect(),
            guid: Some(entry.id).filter(|id| !id.is_empty()),
            media_image,
        }
    }

    /// Fetch every feed of a scope concurrently. Each feed gets the batch
    /// budget; failed or slow feeds are logged and left out. The call only
    /// fails when every feed failed.
    pub async fn fetch_region(&self, scope: Scope) -> Result<Vec<RawFeedItem>, ProviderError> {
        let entries: Vec<&FeedEntry> = self.registry.in_scope(scope).collect();
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let budget = self.feed_budget();
        let results = join_all(entries.iter().map(|entry| async move {
            tokio::time::timeout(budget, self.fetch_feed(entry))
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::timeout(
                        ProviderKind::Rss.as_str(),
                        format!("feed '{}' exceeded {:?}", entry.source_id, budget),
                    ))
                })
        }))
        .await;

        let mut items = Vec::new();
        let mut failed = 0;
        for (entry, result) in entries.iter().zip(results) {
            match result {
                Ok(feed_items) => items.extend(feed_items),
                Err(e) => {
                    error!("Failed to fetch feed '{}': {}", entry.source_id, e);
                    failed += 1;
                }
            }
        }

        if failed == entries.len() {
            return Err(ProviderError::http(
                ProviderKind::Rss.as_str(),
                None,
                format!("all {} {} feeds failed", failed, scope),
            ));
        }

        info!(
            "Fetched {} items from {}/{} {} feeds",
            items.len(),
            entries.len() - failed,
            entries.len(),
            scope
        );
        Ok(items)
    }
}

#[async_trait]
impl NewsProvider for RssClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Rss
    }

    /// Outer bound for one call. Leaves room for a single feed to walk its
    /// whole URL list and for a region batch to hit its per-feed budget, so
    /// the inner timeouts always fire first.
    fn timeout(&self) -> Duration {
        let longest = self
            .registry
            .entries()
            .iter()
            .map(|e| e.urls().count())
            .max()
            .unwrap_or(1) as u32;
        self.per_url_timeout()
            .saturating_mul(longest)
            .max(self.feed_budget())
            .saturating_add(Duration::from_secs(1))
    }

    async fn fetch(&self, query: &NewsQuery) -> Result<RawBatch, ProviderError> {
        let items = match &query.source {
            Some(source) => {
                let entry = self.registry.get(query.scope, source).ok_or_else(|| {
                    ProviderError::configuration(
                        self.kind().as_str(),
                        format!("unknown {} feed '{}'", query.scope, source),
                    )
                })?;
                self.fetch_feed(entry).await?
            }
            None => self.fetch_region(query.scope).await?,
        };

        Ok(RawBatch::new(items.into_iter().map(RawItem::Rss).collect(), None))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn rss_body(title: &str, count: usize) -> String {
        let items: String = (0..count)
            .map(|i| {
                format!(
                    r#"<item>
                        <title>{title} {i}</title>
                        <link>https://example.com/{title}/{i}</link>
                        <guid>https://example.com/{title}/{i}</guid>
                        <pubDate>Mon, 09 Dec 2024 10:0{i}:00 GMT</pubDate>
                        <description><![CDATA[<p>Story <b>{i}</b></p><img src="https://img.example.com/{i}.jpg"/>]]></description>
                    </item>"#
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <rss version="2.0"><channel><title>{title}</title><link>https://example.com</link>
            <description>Test feed</description>{items}</channel></rss>"#
        )
    }

    fn client_with(feeds: Vec<FeedEntry>) -> RssClient {
        RssClient::new(
            RssConfig {
                timeout_secs: 2,
                batch_timeout_secs: 5,
                ..Default::default()
            },
            Arc::new(FeedRegistry::new(feeds)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_single_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bbc.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_body("bbc", 3)))
            .mount(&server)
            .await;

        let client = client_with(vec![FeedEntry::new(
            Scope::Global,
            "bbc",
            &format!("{}/bbc.xml", server.uri()),
            &[],
        )]);
        let batch = client
            .fetch(&NewsQuery::new(Scope::Global).with_source("bbc"))
            .await
            .unwrap();

        assert_eq!(batch.items.len(), 3);
        match &batch.items[0] {
            RawItem::Rss(item) => {
                assert_eq!(item.source_name, "BBC News");
                assert_eq!(item.title.as_deref(), Some("bbc 0"));
                assert_eq!(item.link.as_deref(), Some("https://example.com/bbc/0"));
                assert!(item.pub_date.is_some());
                assert!(item.summary.is_some());
                assert!(item.guid.is_some());
            }
            other => panic!("unexpected raw item {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_alternate_url_used_after_primary_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/primary"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not a feed"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/alt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_body("cnn", 2)))
            .expect(1)
            .mount(&server)
            .await;

        let primary = format!("{}/primary", server.uri());
        let broken = format!("{}/broken", server.uri());
        let alt = format!("{}/alt", server.uri());
        let entry = FeedEntry::new(Scope::Global, "cnn", &primary, &[broken.as_str(), alt.as_str()]);
        let client = client_with(vec![entry.clone()]);

        let items = client.fetch_feed(&entry).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_all_urls_fail_returns_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let entry = FeedEntry::new(Scope::Local, "ena", &format!("{}/feed", server.uri()), &[]);
        let client = client_with(vec![entry.clone()]);

        let err = client.fetch_feed(&entry).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Http);
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn test_unknown_source_is_configuration_error() {
        let client = client_with(vec![]);
        let err = client
            .fetch(&NewsQuery::new(Scope::Global).with_source("nope"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_region_keeps_successful_feeds() {
        let server = MockServer::start().await;
        let mut feeds = Vec::new();
        for (i, ok) in [true, false, true, false, true].into_iter().enumerate() {
            let route = format!("/feed{}", i);
            let response = if ok {
                ResponseTemplate::new(200).set_body_string(rss_body(&format!("feed{}", i), 2))
            } else {
                ResponseTemplate::new(500)
            };
            Mock::given(method("GET"))
                .and(path(route.as_str()))
                .respond_with(response)
                .mount(&server)
                .await;
            feeds.push(FeedEntry::new(
                Scope::Global,
                &format!("feed{}", i),
                &format!("{}{}", server.uri(), route),
                &[],
            ));
        }

        let client = client_with(feeds);
        let items = client.fetch_region(Scope::Global).await.unwrap();

        assert_eq!(items.len(), 6);
        assert!(items.iter().all(|i| ["feed0", "feed2", "feed4"].contains(&i.source_id.as_str())));
    }

    #[tokio::test]
    async fn test_region_all_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_with(vec![
            FeedEntry::new(Scope::Local, "a", &format!("{}/a", server.uri()), &[]),
            FeedEntry::new(Scope::Local, "b", &format!("{}/b", server.uri()), &[]),
        ]);

        assert!(client.fetch_region(Scope::Local).await.is_err());
        assert!(client.fetch_region(Scope::Global).await.unwrap().is_empty());
    }
}
