//! NewsHub - a news aggregation and caching layer
//!
//! Pulls articles from NewsAPI, GNews, a headless CMS and RSS feeds through a
//! per-region fallback chain, normalizes them into one article shape and
//! serves them from a TTL cache behind a JSON API.

pub mod aggregator;
pub mod article;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod healthcheck;
pub mod normalize;
pub mod providers;
pub mod query;
pub mod registry;
pub mod routes;
pub mod warmup;
