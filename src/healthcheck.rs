//! Reachability report for every registered feed URL.

use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RssConfig;
use crate::error::ProviderError;
use crate::providers::http_client;
use crate::registry::{FeedRegistry, Scope};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedHealth {
    pub scope: Scope,
    pub source: String,
    pub url: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub failed: usize,
    pub feeds: Vec<FeedHealth>,
}

pub struct FeedHealthChecker {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedHealthChecker {
    pub fn new(config: &RssConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(&config.user_agent)?,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// A feed is healthy when it answers 2xx with an RSS, Atom or RDF root.
    pub async fn check_url(&self, url: &str) -> (bool, Option<u16>, Option<String>) {
        let response = match tokio::time::timeout(self.timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return (false, None, Some(e.to_string())),
            Err(_) => return (false, None, Some(format!("timed out after {:?}", self.timeout))),
        };

        let status = response.status();
        if !status.is_success() {
            return (false, Some(status.as_u16()), None);
        }

        let body = match tokio::time::timeout(self.timeout, response.text()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => return (false, Some(status.as_u16()), Some(e.to_string())),
            Err(_) => return (false, Some(status.as_u16()), Some("body timed out".to_string())),
        };

        if looks_like_feed(&body) {
            (true, Some(status.as_u16()), None)
        } else {
            (false, Some(status.as_u16()), Some("Not XML/RSS".to_string()))
        }
    }

    pub async fn check_registry(&self, registry: &FeedRegistry) -> HealthReport {
        let targets: Vec<(Scope, &str, &str)> = registry
            .entries()
            .iter()
            .flat_map(|e| e.urls().map(move |url| (e.scope, e.source_id.as_str(), url)))
            .collect();

        let results = join_all(targets.iter().map(|(_, _, url)| self.check_url(url))).await;

        let feeds: Vec<FeedHealth> = targets
            .into_iter()
            .zip(results)
            .map(|((scope, source, url), (ok, status, error))| {
                if !ok {
                    warn!("[{}] {}: {} failed ({:?}, {:?})", scope, source, url, status, error);
                }
                FeedHealth {
                    scope,
                    source: source.to_string(),
                    url: url.to_string(),
                    ok,
                    status,
                    error,
                }
            })
            .collect();

        let healthy = feeds.iter().filter(|f| f.ok).count();
        let failed = feeds.len() - healthy;
        info!("Feed health check: {} good / {} failed", healthy, failed);

        HealthReport {
            healthy,
            failed,
            feeds,
        }
    }
}

fn looks_like_feed(body: &str) -> bool {
    regex::Regex::new(r"(?i)(<rss|<feed|<rdf:RDF)[^>]*>")
        .map(|root| root.is_match(body))
        .unwrap_or(false)
}
