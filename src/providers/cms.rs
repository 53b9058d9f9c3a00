//! Custom CMS API client (Strapi-style REST).
//!
//! The CMS has been edited by hand over time, so the same logical field can
//! show up under different casings (`Title` / `title`). Raw items keep every
//! variant; the normalizer decides precedence.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{decode_items, get_json, http_client, lenient, lenient_string, NewsProvider, ProviderKind, RawBatch};
use crate::article::ArticleContent;
use crate::config::CmsConfig;
use crate::error::ProviderError;
use crate::normalize::RawItem;
use crate::query::NewsQuery;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CmsNewsItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, rename = "documentId", deserialize_with = "lenient_string")]
    pub document_id: Option<String>,

    #[serde(default, rename = "Title", deserialize_with = "lenient_string")]
    pub title_pascal: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub slug: Option<String>,

    #[serde(default, rename = "Date", deserialize_with = "lenient_string")]
    pub date_pascal: Option<String>,
    #[serde(default, rename = "publishedAt", deserialize_with = "lenient_string")]
    pub published_at: Option<String>,
    #[serde(default, rename = "createdAt", deserialize_with = "lenient_string")]
    pub created_at: Option<String>,

    #[serde(default, rename = "Summary", deserialize_with = "lenient_string")]
    pub summary_pascal: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,

    #[serde(default, rename = "Content", deserialize_with = "lenient")]
    pub content_pascal: Option<ArticleContent>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<ArticleContent>,
    #[serde(default, deserialize_with = "lenient")]
    pub body: Option<ArticleContent>,

    #[serde(default, rename = "Link", deserialize_with = "lenient_string")]
    pub link_pascal: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub link: Option<String>,
    #[serde(default, rename = "Url", deserialize_with = "lenient_string")]
    pub url_pascal: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, rename = "SourceLink", deserialize_with = "lenient_string")]
    pub source_link_pascal: Option<String>,
    #[serde(default, rename = "sourceLink", deserialize_with = "lenient_string")]
    pub source_link: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub permalink: Option<String>,

    #[serde(default, rename = "Image", deserialize_with = "lenient")]
    pub image_pascal: Option<CmsMedia>,
    #[serde(default, deserialize_with = "lenient")]
    pub image: Option<CmsMedia>,
    #[serde(default, deserialize_with = "lenient")]
    pub cover: Option<CmsMedia>,
    #[serde(default, deserialize_with = "lenient")]
    pub thumbnail: Option<CmsMedia>,

    #[serde(default, deserialize_with = "lenient")]
    pub tenant: Option<CmsTaxon>,
    #[serde(default, rename = "Tenant", deserialize_with = "lenient")]
    pub tenant_pascal: Option<CmsTaxon>,
    #[serde(default, deserialize_with = "lenient")]
    pub category: Option<CmsTaxon>,
    #[serde(default, rename = "Category", deserialize_with = "lenient")]
    pub category_pascal: Option<CmsTaxon>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CmsMedia {
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub formats: Option<BTreeMap<String, CmsMediaFormat>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CmsMediaFormat {
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
}

/// Tenant or category record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CmsTaxon {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, rename = "documentId", deserialize_with = "lenient_string")]
    pub document_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, rename = "Name", deserialize_with = "lenient_string")]
    pub name_pascal: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub slug: Option<String>,
}

impl CmsTaxon {
    pub fn display_name(&self) -> Option<&str> {
        [self.name.as_deref(), self.name_pascal.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|n| !n.is_empty())
    }

    pub fn identifier(&self) -> Option<&str> {
        self.document_id.as_deref().or(self.id.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
struct CmsMeta {
    #[serde(default, deserialize_with = "lenient")]
    pagination: Option<CmsPagination>,
}

#[derive(Debug, Default, Deserialize)]
struct CmsPagination {
    #[serde(default, deserialize_with = "lenient")]
    total: Option<u64>,
}

/// List endpoints answer either `{data, meta}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CmsListPayload {
    Wrapped {
        data: Vec<serde_json::Value>,
        #[serde(default)]
        meta: Option<CmsMeta>,
    },
    Bare(Vec<serde_json::Value>),
}

impl CmsListPayload {
    fn into_parts(self) -> (Vec<serde_json::Value>, Option<u64>) {
        match self {
            CmsListPayload::Wrapped { data, meta } => {
                let total = meta.and_then(|m| m.pagination).and_then(|p| p.total);
                (data, total)
            }
            CmsListPayload::Bare(data) => (data, None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CmsSinglePayload {
    #[serde(default)]
    data: Option<serde_json::Value>,
}

pub struct CmsClient {
    client: reqwest::Client,
    config: CmsConfig,
}

impl CmsClient {
    pub fn new(config: CmsConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client("NewsHub/1.0")?,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn get_list(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<(Vec<serde_json::Value>, Option<u64>), ProviderError> {
        let request = self.client.get(self.url(path)).query(params);
        let payload: CmsListPayload = get_json(self.kind(), request).await?;
        Ok(payload.into_parts())
    }

    fn list_params(query: &NewsQuery) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(date_gt) = &query.date_gt {
            params.push(("filters[Date][$gt]".to_string(), date_gt.clone()));
        }
        if let Some(q) = &query.query {
            params.push(("filters[Title][$containsi]".to_string(), q.clone()));
        }
        if let Some(page) = query.page {
            params.push(("pagination[page]".to_string(), page.to_string()));
        }
        if let Some(page_size) = query.page_size {
            params.push(("pagination[pageSize]".to_string(), page_size.to_string()));
        }
        params
    }

    /// One article by numeric id or document id.
    pub async fn fetch_article(&self, id: &str) -> Result<Option<CmsNewsItem>, ProviderError> {
        let id = id.trim();
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            let request = self.client.get(self.url(&format!("newsses/{}", id)));
            let payload: CmsSinglePayload = get_json(self.kind(), request).await?;
            return Ok(payload
                .data
                .and_then(|v| decode_items(self.kind(), vec![v]).into_iter().next()));
        }

        let params = vec![
            ("filters[documentId][$eq]".to_string(), id.to_string()),
            ("pagination[pageSize]".to_string(), "1".to_string()),
        ];
        let (data, _) = self.get_list("newsses", &params).await?;
        Ok(decode_items(self.kind(), data).into_iter().next())
    }

    /// Search the default list for an item whose document id or id matches.
    pub async fn find_in_list(&self, id: &str) -> Result<Option<CmsNewsItem>, ProviderError> {
        let (data, _) = self.get_list("newsses", &[]).await?;
        let items: Vec<CmsNewsItem> = decode_items(self.kind(), data);
        Ok(items.into_iter().find(|item| {
            item.document_id.as_deref() == Some(id) || item.id.as_deref() == Some(id)
        }))
    }

    pub async fn fetch_tenants(&self) -> Result<Vec<CmsTaxon>, ProviderError> {
        let (data, _) = self.get_list("tenants", &[]).await?;
        Ok(decode_items(self.kind(), data))
    }

    pub async fn fetch_categories(&self) -> Result<Vec<CmsTaxon>, ProviderError> {
        let (data, _) = self.get_list("categories", &[]).await?;
        Ok(decode_items(self.kind(), data))
    }
}

#[async_trait]
impl NewsProvider for CmsClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cms
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn fetch(&self, query: &NewsQuery) -> Result<RawBatch, ProviderError> {
        let path = if let Some(tenant) = &query.tenant_id {
            format!("tenant/{}/news", urlencoding::encode(tenant))
        } else if let Some(category) = &query.category_id {
            format!("news/category/{}", urlencoding::encode(category))
        } else {
            "newsses".to_string()
        };

        if query.source.is_some() {
            warn!("CMS ignores explicit feed source {:?}", query.source);
        }

        let (data, total) = self.get_list(&path, &Self::list_params(query)).await?;
        debug!("CMS {} returned {} items", path, data.len());

        let items = decode_items::<CmsNewsItem>(self.kind(), data)
            .into_iter()
            .map(RawItem::Cms)
            .collect();
        Ok(RawBatch::new(items, total))
    }
}
