use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

use crate::article::NewsResponse;
use crate::cache::{CacheEntry, CacheStore};
use crate::error::CacheError;

#[derive(Debug, Clone, FromRow)]
struct CacheRow {
    payload: String,
    cached_at: String,
    expires_at: String,
}

/// Fixed-width UTC form, so stored timestamps also order correctly as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Cache store persisted in SQLite, so warm entries survive restarts.
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news_cache (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_news_cache_expires
            ON news_cache(expires_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count(&self) -> Result<i64, CacheError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT payload, cached_at, expires_at FROM news_cache WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entry = CacheEntry {
            response: serde_json::from_str(&row.payload)?,
            cached_at: DateTime::parse_from_rfc3339(&row.cached_at)?.with_timezone(&Utc),
            expires_at: DateTime::parse_from_rfc3339(&row.expires_at)?.with_timezone(&Utc),
        };

        if entry.is_expired_at(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn set(&self, key: &str, response: NewsResponse, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry::new(response, ttl);
        let payload = serde_json::to_string(&entry.response)?;

        sqlx::query(
            r#"
            INSERT INTO news_cache (key, payload, cached_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                cached_at = excluded.cached_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(payload)
        .bind(timestamp(entry.cached_at))
        .bind(timestamp(entry.expires_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete rows whose expiry has passed. Returns the number removed.
    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = timestamp(Utc::now());
        let result = sqlx::query("DELETE FROM news_cache WHERE expires_at <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{Article, ArticleSource};

    async fn create_test_store() -> SqliteCacheStore {
        let store = SqliteCacheStore::new("sqlite::memory:").await.unwrap();
        store.initialize().await.unwrap();
        store
    }

    fn create_response(source: &str, titles: &[&str]) -> NewsResponse {
        let articles = titles
            .iter()
            .map(|t| Article {
                id: t.to_string(),
                title: t.to_string(),
                description: None,
                url: Some(format!("https://example.com/{}", t)),
                permalink: format!("/article/{}", t),
                image_url: None,
                published_at: Utc::now(),
                content: None,
                source: ArticleSource {
                    id: None,
                    name: "Example".to_string(),
                },
                category: None,
            })
            .collect();
        NewsResponse::ok(source, articles, None)
    }

    mod initialization_tests {
        use super::*;

        #[tokio::test]
        async fn test_store_creation() {
            let store = SqliteCacheStore::new("sqlite::memory:").await;
            assert!(store.is_ok());
        }

        #[tokio::test]
        async fn test_initialization_creates_empty_table() {
            let store = create_test_store().await;
            assert_eq!(store.count().await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_double_initialization_is_safe() {
            let store = create_test_store().await;
            // Initialize again - should not fail due to IF NOT EXISTS
            let result = store.initialize().await;
            assert!(result.is_ok());
        }
    }

    mod get_set_tests {
        use super::*;

        #[tokio::test]
        async fn test_set_then_get() {
            let store = create_test_store().await;
            let response = create_response("newsapi", &["a", "b"]);

            store
                .set("news:{}", response.clone(), Duration::from_secs(60))
                .await
                .unwrap();

            let entry = store.get("news:{}").await.unwrap().unwrap();
            assert_eq!(entry.response, response);
            assert!(entry.expires_at > entry.cached_at);
        }

        #[tokio::test]
        async fn test_get_missing_key() {
            let store = create_test_store().await;
            assert!(store.get("missing").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_zero_ttl_is_immediately_expired() {
            let store = create_test_store().await;
            store
                .set("k", create_response("gnews", &["a"]), Duration::ZERO)
                .await
                .unwrap();

            assert!(store.get("k").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_set_overwrites_existing_entry() {
            let store = create_test_store().await;
            store
                .set("k", create_response("gnews", &["old"]), Duration::from_secs(60))
                .await
                .unwrap();
            store
                .set("k", create_response("cms", &["new", "newer"]), Duration::from_secs(60))
                .await
                .unwrap();

            let entry = store.get("k").await.unwrap().unwrap();
            assert_eq!(entry.response.source, "cms");
            assert_eq!(entry.response.articles.len(), 2);
            assert_eq!(store.count().await.unwrap(), 1);
        }

        #[tokio::test]
        async fn test_corrupt_payload_is_an_error() {
            let store = create_test_store().await;
            sqlx::query(
                "INSERT INTO news_cache (key, payload, cached_at, expires_at) VALUES (?, ?, ?, ?)",
            )
            .bind("k")
            .bind("not json")
            .bind(Utc::now().to_rfc3339())
            .bind((Utc::now() + chrono::Duration::minutes(5)).to_rfc3339())
            .execute(&store.pool)
            .await
            .unwrap();

            assert!(matches!(store.get("k").await, Err(CacheError::Payload(_))));
        }
    }

    mod purge_tests {
        use super::*;

        #[tokio::test]
        async fn test_purge_removes_only_expired() {
            let store = create_test_store().await;
            store
                .set("expired", create_response("rss", &["a"]), Duration::ZERO)
                .await
                .unwrap();
            store
                .set("fresh", create_response("rss", &["b"]), Duration::from_secs(600))
                .await
                .unwrap();

            let removed = store.purge_expired().await.unwrap();

            assert_eq!(removed, 1);
            assert_eq!(store.count().await.unwrap(), 1);
            assert!(store.get("fresh").await.unwrap().is_some());
        }
    }
}
