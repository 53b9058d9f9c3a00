//! Maps provider-shaped raw items onto the canonical [`Article`].
//!
//! Normalization never fails. Each output field is taken from an ordered list
//! of candidate raw fields, the first non-blank one winning, and falls back to
//! a fixed default when every candidate is missing.

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::article::{Article, ArticleContent, ArticleSource};
use crate::providers::cms::{CmsMedia, CmsNewsItem};
use crate::providers::gnews::GNewsArticle;
use crate::providers::newsapi::NewsApiArticle;
use crate::providers::rss::RawFeedItem;
use crate::registry::format_source_name;

const DESCRIPTION_MAX_CHARS: usize = 200;

/// Preferred order when a CMS image only has resized variants.
const IMAGE_FORMATS: [&str; 4] = ["large", "medium", "small", "thumbnail"];

/// Raw item tagged with the provider that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    NewsApi(NewsApiArticle),
    GNews(GNewsArticle),
    Cms(CmsNewsItem),
    Rss(RawFeedItem),
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Prefix for relative CMS media paths
    asset_host: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(crate::config::CmsConfig::default().asset_host)
    }
}

impl Normalizer {
    pub fn new(asset_host: impl Into<String>) -> Self {
        Self {
            asset_host: asset_host.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn normalize(&self, item: &RawItem) -> Article {
        match item {
            RawItem::NewsApi(raw) => self.from_newsapi(raw),
            RawItem::GNews(raw) => self.from_gnews(raw),
            RawItem::Cms(raw) => self.from_cms(raw),
            RawItem::Rss(raw) => self.from_rss(raw),
        }
    }

    pub fn normalize_all(&self, items: &[RawItem]) -> Vec<Article> {
        items.iter().map(|item| self.normalize(item)).collect()
    }

    fn from_newsapi(&self, raw: &NewsApiArticle) -> Article {
        let published_raw = raw.published_at.as_deref();
        let url = first_text([raw.url.as_deref()]);
        let id = url
            .clone()
            .unwrap_or_else(|| generated_id("newsapi", raw.title.as_deref(), published_raw));
        let source = raw.source.as_ref();

        Article {
            permalink: permalink(&id),
            id,
            title: first_text([raw.title.as_deref()]).unwrap_or_else(|| "Untitled".to_string()),
            description: first_text([raw.description.as_deref()]),
            url,
            image_url: first_text([raw.url_to_image.as_deref()]),
            published_at: published_or_now(published_raw),
            content: first_text([raw.content.as_deref()]).map(ArticleContent::Text),
            source: ArticleSource {
                id: first_text([source.and_then(|s| s.id.as_deref())]),
                name: first_text([source.and_then(|s| s.name.as_deref())])
                    .unwrap_or_else(|| "Unknown".to_string()),
            },
            category: None,
        }
    }

    fn from_gnews(&self, raw: &GNewsArticle) -> Article {
        let published_raw = raw.published_at.as_deref();
        let url = first_text([raw.url.as_deref()]);
        let id = first_text([raw.id.as_deref(), url.as_deref()])
            .unwrap_or_else(|| generated_id("gnews", raw.title.as_deref(), published_raw));
        let source = raw.source.as_ref();

        Article {
            permalink: permalink(&id),
            id,
            title: first_text([raw.title.as_deref()]).unwrap_or_else(|| "Untitled".to_string()),
            description: first_text([raw.description.as_deref()]),
            url,
            image_url: first_text([raw.image.as_deref()]),
            published_at: published_or_now(published_raw),
            content: first_text([raw.content.as_deref()]).map(ArticleContent::Text),
            source: ArticleSource {
                id: first_text([source.and_then(|s| s.id.as_deref())]),
                name: first_text([source.and_then(|s| s.name.as_deref())])
                    .unwrap_or_else(|| "Unknown".to_string()),
            },
            category: None,
        }
    }

    fn from_cms(&self, raw: &CmsNewsItem) -> Article {
        let published_raw = first_text([
            raw.date_pascal.as_deref(),
            raw.published_at.as_deref(),
            raw.created_at.as_deref(),
        ]);
        let title = first_text([
            raw.title_pascal.as_deref(),
            raw.title.as_deref(),
            raw.name.as_deref(),
        ]);
        let id = first_text([raw.document_id.as_deref(), raw.id.as_deref()])
            .unwrap_or_else(|| generated_id("cms", title.as_deref(), published_raw.as_deref()));

        let content = [&raw.content_pascal, &raw.content, &raw.body]
            .into_iter()
            .flatten()
            .find(|c| !c.plain_text().trim().is_empty())
            .cloned();

        let content_text: Vec<String> = [&raw.content_pascal, &raw.content]
            .into_iter()
            .flatten()
            .map(ArticleContent::plain_text)
            .collect();
        let description = first_text(
            [
                raw.summary_pascal.as_deref(),
                raw.summary.as_deref(),
                raw.description.as_deref(),
            ]
            .into_iter()
            .chain(content_text.iter().map(|t| Some(t.as_str()))),
        );

        let slug = first_text([raw.slug.as_deref(), raw.document_id.as_deref()])
            .unwrap_or_else(|| format!("news-{}", raw.id.as_deref().unwrap_or(&id)));

        let tenant = raw.tenant.as_ref().or(raw.tenant_pascal.as_ref());
        let category = raw.category.as_ref().or(raw.category_pascal.as_ref());

        Article {
            title: title.unwrap_or_else(|| format!("News Item #{}", raw.id.as_deref().unwrap_or(&id))),
            description,
            url: first_text([
                raw.link_pascal.as_deref(),
                raw.link.as_deref(),
                raw.url_pascal.as_deref(),
                raw.url.as_deref(),
                raw.source_link_pascal.as_deref(),
                raw.source_link.as_deref(),
                raw.permalink.as_deref(),
            ]),
            permalink: permalink(&slug),
            id,
            image_url: self.cms_image(raw),
            published_at: published_or_now(published_raw.as_deref()),
            content,
            source: ArticleSource {
                id: tenant.and_then(|t| t.identifier()).map(str::to_string),
                name: tenant
                    .and_then(|t| t.display_name())
                    .unwrap_or("News Source")
                    .to_string(),
            },
            category: category.and_then(|c| c.display_name()).map(str::to_string),
        }
    }

    fn cms_image(&self, raw: &CmsNewsItem) -> Option<String> {
        let media: Vec<&CmsMedia> = [&raw.image_pascal, &raw.image, &raw.cover, &raw.thumbnail]
            .into_iter()
            .flatten()
            .collect();

        if let Some(url) = first_text(media.iter().map(|m| m.url.as_deref())) {
            return Some(self.absolute_asset(&url));
        }

        // Only resized variants are present.
        for formats in media.iter().filter_map(|m| m.formats.as_ref()) {
            let preferred = IMAGE_FORMATS.iter().filter_map(|name| formats.get(*name));
            let others = formats
                .iter()
                .filter(|(name, _)| !IMAGE_FORMATS.contains(&name.as_str()))
                .map(|(_, format)| format);
            if let Some(url) = first_text(preferred.chain(others).map(|f| f.url.as_deref())) {
                return Some(self.absolute_asset(&url));
            }
        }

        None
    }

    fn absolute_asset(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.asset_host, path)
        } else {
            format!("{}/{}", self.asset_host, path)
        }
    }

    fn from_rss(&self, raw: &RawFeedItem) -> Article {
        let title = first_text([raw.title.as_deref()]);
        let link = first_text([raw.link.as_deref()]);
        let id = first_text([raw.guid.as_deref(), link.as_deref()])
            .unwrap_or_else(|| generated_id("rss", title.as_deref(), raw.pub_date.as_deref()));

        let image_url = first_image(raw.content.as_deref())
            .or_else(|| first_image(raw.summary.as_deref()))
            .or_else(|| first_text([raw.media_image.as_deref()]));

        let description = first_text([raw.summary.as_deref(), raw.content.as_deref()])
            .map(|html| truncate_chars(&strip_html(&html), DESCRIPTION_MAX_CHARS))
            .filter(|d| !d.is_empty());

        let source_name = first_text([Some(raw.source_name.as_str())])
            .unwrap_or_else(|| format_source_name(&raw.source_id));

        Article {
            permalink: permalink(&id),
            id,
            title: title.unwrap_or_else(|| "No title".to_string()),
            description,
            url: Some(link.unwrap_or_else(|| "#".to_string())),
            image_url,
            published_at: published_or_now(raw.pub_date.as_deref()),
            content: first_text([raw.content.as_deref()]).map(ArticleContent::Text),
            source: ArticleSource {
                id: Some(raw.source_id.clone()).filter(|s| !s.is_empty()),
                name: source_name,
            },
            category: first_text(raw.categories.iter().map(|c| Some(c.as_str()))),
        }
    }
}

/// First candidate that is non-blank after trimming.
fn first_text<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse RFC 3339, RFC 2822 or a bare `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn published_or_now(raw: Option<&str>) -> DateTime<Utc> {
    match raw.and_then(parse_date) {
        Some(dt) => dt,
        None => {
            if let Some(raw) = raw {
                debug!("Unparseable publish date '{}', using current time", raw);
            }
            Utc::now()
        }
    }
}

fn permalink(id: &str) -> String {
    format!("/article/{}", urlencoding::encode(id))
}

/// Stable id for items with neither a native id nor a URL.
fn generated_id(provider: &str, title: Option<&str>, published: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.unwrap_or_default().trim().as_bytes());
    hasher.update(b"|");
    hasher.update(published.unwrap_or_default().trim().as_bytes());
    format!("{}-{}", provider, hex::encode(&hasher.finalize()[..8]))
}

fn first_image(html: Option<&str>) -> Option<String> {
    let img_pattern = regex::Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).ok()?;
    img_pattern
        .captures(html?)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn strip_html(html: &str) -> String {
    let without_tags = match regex::Regex::new(r"<[^>]*>") {
        Ok(tag_pattern) => tag_pattern.replace_all(html, " ").into_owned(),
        Err(_) => html.to_string(),
    };

    without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
