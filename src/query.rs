//! Normalized request parameters and their canonical cache key.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::registry::Scope;

/// Aggregation request as the aggregator sees it, independent of transport.
///
/// Build it with the `with_*` methods or from query-string parameters; every
/// textual field is trimmed and blank values become `None`, so logically
/// identical requests compare equal and share one cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewsQuery {
    pub scope: Scope,
    /// Explicit RSS feed id within `scope`
    pub source: Option<String>,
    pub tenant_id: Option<String>,
    pub category_id: Option<String>,
    /// Free-text search
    pub query: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Only articles published after this ISO-8601 date (CMS filter)
    pub date_gt: Option<String>,
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !v.is_empty())
}

fn clean_id(value: Option<&str>) -> Option<String> {
    clean(value).map(|v| v.to_ascii_lowercase())
}

impl NewsQuery {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = clean_id(Some(source));
        self
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = clean(Some(tenant_id));
        self
    }

    pub fn with_category(mut self, category_id: &str) -> Self {
        self.category_id = clean(Some(category_id));
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = clean(Some(query));
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page).filter(|p| *p > 0);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size).filter(|p| *p > 0);
        self
    }

    pub fn with_date_gt(mut self, date_gt: &str) -> Self {
        self.date_gt = clean(Some(date_gt));
        self
    }

    /// True when the request names one source, tenant or category and so
    /// bypasses the fallback chain.
    pub fn is_specific(&self) -> bool {
        self.source.is_some() || self.tenant_id.is_some() || self.category_id.is_some()
    }

    /// Canonical cache key. Parameters are emitted in sorted name order and
    /// absent ones are omitted.
    pub fn cache_key(&self) -> String {
        let mut params: BTreeMap<&str, String> = BTreeMap::new();
        params.insert("region", self.scope.as_str().to_string());
        let optional = [
            ("source", self.source.clone()),
            ("tenantId", self.tenant_id.clone()),
            ("categoryId", self.category_id.clone()),
            ("q", self.query.clone()),
            ("page", self.page.map(|p| p.to_string())),
            ("pageSize", self.page_size.map(|p| p.to_string())),
            ("dateGt", self.date_gt.clone()),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                params.insert(name, value);
            }
        }

        // A BTreeMap serializes in key order, which makes the JSON canonical.
        let body = serde_json::to_string(&params).unwrap_or_default();
        format!("news:{}", body)
    }
}

/// Query-string form of [`NewsQuery`], accepting the aliases the HTTP API
/// has always accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsParams {
    #[serde(default, alias = "scope")]
    pub region: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "tenant")]
    pub tenant_id: Option<String>,
    #[serde(default, alias = "category")]
    pub category_id: Option<String>,
    #[serde(default, alias = "query", alias = "search")]
    pub q: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub date_gt: Option<String>,
}

impl TryFrom<NewsParams> for NewsQuery {
    type Error = String;

    fn try_from(params: NewsParams) -> Result<Self, Self::Error> {
        let scope = match clean(params.region.as_deref()) {
            Some(region) => region.parse::<Scope>()?,
            None => Scope::default(),
        };

        Ok(NewsQuery {
            scope,
            source: clean_id(params.source.as_deref()),
            tenant_id: clean(params.tenant_id.as_deref()),
            category_id: clean(params.category_id.as_deref()),
            query: clean(params.q.as_deref()),
            page: params.page.filter(|p| *p > 0),
            page_size: params.page_size.filter(|p| *p > 0),
            date_gt: clean(params.date_gt.as_deref()),
        })
    }
}
