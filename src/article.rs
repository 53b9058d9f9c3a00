//! Canonical article and response shapes served to every caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// External source URL, when the provider has one.
    pub url: Option<String>,
    /// Internal route path, always present.
    pub permalink: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub content: Option<ArticleContent>,
    pub source: ArticleSource,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSource {
    pub id: Option<String>,
    pub name: String,
}

/// Article body: either plain text or structured rich-text blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArticleContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default = "default_block_type")]
    pub kind: String,
    #[serde(default)]
    pub children: Vec<ContentNode>,
}

fn default_block_type() -> String {
    "paragraph".to_string()
}

/// A rich-text node. Leaves carry `text`; inline containers (links, lists)
/// carry nested `children`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentNode>,
}

impl ContentBlock {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: default_block_type(),
            children: vec![ContentNode {
                text: Some(text.into()),
                children: Vec::new(),
            }],
        }
    }

    /// Concatenation of every leaf text node in this block.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.collect_text(&mut out);
        }
        out
    }
}

impl ContentNode {
    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

impl ArticleContent {
    /// Flatten to plain text; blocks are separated by a blank line and empty
    /// blocks are dropped.
    pub fn plain_text(&self) -> String {
        match self {
            ArticleContent::Text(text) => text.clone(),
            ArticleContent::Blocks(blocks) => blocks
                .iter()
                .map(ContentBlock::plain_text)
                .filter(|t| !t.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Result of one aggregation, as cached and as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsResponse {
    pub status: ResponseStatus,
    pub total_results: u64,
    pub articles: Vec<Article>,
    /// Provenance tag: which provider (or the cache) satisfied the request.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NewsResponse {
    pub fn ok(source: impl Into<String>, articles: Vec<Article>, total: Option<u64>) -> Self {
        let count = articles.len() as u64;
        Self {
            status: ResponseStatus::Ok,
            total_results: total.unwrap_or(count).max(count),
            articles,
            source: source.into(),
            message: None,
        }
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            total_results: 0,
            articles: Vec::new(),
            source: source.into(),
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blocks_flatten_all_leaf_text() {
        let content: ArticleContent = serde_json::from_value(json!([
            {"type": "paragraph", "children": [{"text": "Hello "}, {"text": "world"}]},
            {"type": "paragraph", "children": [{"text": ""}]},
            {"type": "list", "children": [
                {"children": [{"text": "one"}]},
                {"children": [{"text": " two"}]}
            ]}
        ]))
        .unwrap();

        assert_eq!(content.plain_text(), "Hello world\n\none two");
    }

    #[test]
    fn test_text_content_deserializes_as_text() {
        let content: ArticleContent = serde_json::from_value(json!("plain body")).unwrap();
        assert_eq!(content, ArticleContent::Text("plain body".to_string()));
    }

    #[test]
    fn test_error_response_shape() {
        let response = NewsResponse::error("rss", "All providers failed");
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["totalResults"], 0);
        assert_eq!(value["articles"], json!([]));
        assert_eq!(value["message"], "All providers failed");
    }

    #[test]
    fn test_ok_response_omits_message_and_counts_articles() {
        let response = NewsResponse::ok("newsapi", Vec::new(), None);
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["status"], "ok");
        assert_eq!(value["totalResults"], 0);
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_article_serializes_camel_case() {
        let article = Article {
            id: "1".to_string(),
            title: "Title".to_string(),
            description: None,
            url: None,
            permalink: "/article/1".to_string(),
            image_url: Some("https://img".to_string()),
            published_at: Utc::now(),
            content: None,
            source: ArticleSource {
                id: None,
                name: "BBC News".to_string(),
            },
            category: None,
        };
        let value = serde_json::to_value(&article).unwrap();

        assert_eq!(value["imageUrl"], "https://img");
        assert!(value.get("publishedAt").is_some());
        assert_eq!(value["source"]["name"], "BBC News");
        assert!(value["description"].is_null());
    }
}
