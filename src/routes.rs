use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::aggregator::Aggregator;
use crate::article::NewsResponse;
use crate::error::ProviderError;
use crate::healthcheck::FeedHealthChecker;
use crate::query::{NewsParams, NewsQuery};
use crate::registry::Scope;
use crate::warmup::Warmup;

pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub warmup: Arc<Warmup>,
    pub health_checker: Arc<FeedHealthChecker>,
}

// Custom error type
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: anyhow::anyhow!(message.into()),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({"status": "error", "message": self.error.to_string()})),
        )
            .into_response()
    }
}

/// Upstream provider failures map to 502, anything else to 500.
impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        let error = err.into();
        let status = if error.downcast_ref::<ProviderError>().is_some() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        AppError { status, error }
    }
}

fn news_response(response: NewsResponse) -> Response {
    let status = if response.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(response)).into_response()
}

fn parse_scope(raw: &str) -> Result<Scope, AppError> {
    raw.parse::<Scope>().map_err(AppError::bad_request)
}

// Route handlers
pub async fn news(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NewsParams>,
) -> Result<Response, AppError> {
    let query = NewsQuery::try_from(params).map_err(AppError::bad_request)?;
    Ok(news_response(state.aggregator.fetch_news(&query).await))
}

#[derive(Deserialize)]
pub struct ArticleParams {
    #[serde(default)]
    pub id: Option<String>,
}

pub async fn article(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArticleParams>,
) -> Result<impl IntoResponse, AppError> {
    let id = params
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("Article ID is required"))?;

    let article = state
        .aggregator
        .article_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Article {} not found", id)))?;

    Ok(Json(json!({"status": "ok", "article": article})))
}

pub async fn sources(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let listing = state.aggregator.sources().await?;
    Ok(Json(json!({
        "status": "ok",
        "tenants": listing.tenants,
        "categories": listing.categories,
        "feeds": listing.feeds,
    })))
}

pub async fn rss_region(
    State(state): State<Arc<AppState>>,
    Path(scope): Path<String>,
) -> Result<Response, AppError> {
    let scope = parse_scope(&scope)?;
    Ok(news_response(state.aggregator.region_feeds(scope).await))
}

pub async fn rss_source(
    State(state): State<Arc<AppState>>,
    Path((scope, source)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let scope = parse_scope(&scope)?;
    let registry = state.aggregator.registry();
    if registry.get(scope, &source).is_none() {
        let available: Vec<String> = registry.in_scope(scope).map(|e| e.source_id.clone()).collect();
        return Err(AppError::bad_request(format!(
            "Invalid source '{}' for {} news. Available sources: {}",
            source,
            scope,
            available.join(", ")
        )));
    }

    let query = NewsQuery::new(scope).with_source(&source);
    Ok(news_response(state.aggregator.fetch_news(&query).await))
}

pub async fn rss_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state
        .health_checker
        .check_registry(state.aggregator.registry())
        .await;
    Json(report)
}

pub async fn warmup(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let already_running = state.warmup.is_warming().await;
    if !already_running {
        let warmup = state.warmup.clone();
        tokio::spawn(async move {
            warmup.warm_all().await;
        });
    }

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "accepted", "alreadyRunning": already_running})),
    )
}

pub async fn warmup_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.warmup.status().await)
}

pub async fn health() -> impl IntoResponse {
    "OK"
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/news", get(news))
        .route("/api/news/top-headlines", get(news))
        .route("/api/news/article", get(article))
        .route("/api/news/sources", get(sources))
        .route("/api/rss/health", get(rss_health))
        .route("/api/rss/:scope", get(rss_region))
        .route("/api/rss/:scope/:source", get(rss_source))
        .route("/api/cache/warmup", post(warmup))
        .route("/api/cache/warmup/status", get(warmup_status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
