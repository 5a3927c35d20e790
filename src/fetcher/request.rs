//! Request templates and per-call request specs
//!
//! A [`RequestTemplate`] is built once per run from configuration. Every call
//! gets its own immutable [`RequestSpec`] derived from it, carrying a fresh
//! correlation id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::downloader::config::{DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_URI_TEMPLATE};
use crate::fetcher::{FetcherError, FetcherResult};

/// HTTP method used for catalog requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            _ => Err(format!("Unsupported method: {s}. Valid options: get, post")),
        }
    }
}

/// Query parameters understood by the catalog endpoint. `None` is omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    pub transform_name: Option<String>,
    pub updated_since: Option<String>,
    pub offset: Option<u64>,
    pub max: Option<u32>,
    pub system: Option<String>,
    pub paging_request_id: Option<String>,
}

impl CatalogQuery {
    /// Query pairs in wire order, absent values dropped.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(6);
        if let Some(v) = &self.transform_name {
            pairs.push(("transformName", v.clone()));
        }
        if let Some(v) = &self.updated_since {
            pairs.push(("updatedSince", v.clone()));
        }
        if let Some(v) = self.offset {
            pairs.push(("offset", v.to_string()));
        }
        if let Some(v) = self.max {
            pairs.push(("max", v.to_string()));
        }
        if let Some(v) = &self.system {
            pairs.push(("system", v.clone()));
        }
        if let Some(v) = &self.paging_request_id {
            pairs.push(("pagingRequestId", v.clone()));
        }
        pairs
    }
}

/// Everything a run's requests have in common
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    base_url: String,
    path: String,
    method: HttpMethod,
    bearer: String,
    timeout: Duration,
    page_size: u32,
    query: CatalogQuery,
    body: Option<Arc<Value>>,
}

impl RequestTemplate {
    /// Build a template, rendering `{name}` placeholders of `uri_template`
    /// from `path_params`.
    ///
    /// # Errors
    /// Returns `InvalidRequest` for an empty base URL or a placeholder with
    /// no matching parameter.
    pub fn new(
        base_url: impl Into<String>,
        uri_template: &str,
        path_params: &BTreeMap<String, String>,
        bearer: impl Into<String>,
    ) -> FetcherResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(FetcherError::InvalidRequest(
                "base URL cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            path: render_path(uri_template, path_params)?,
            method: HttpMethod::default(),
            bearer: bearer.into(),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            page_size: DEFAULT_PAGE_SIZE,
            query: CatalogQuery::default(),
            body: None,
        })
    }

    /// Template for the catalog endpoint of one organization.
    pub fn for_org(
        base_url: impl Into<String>,
        org_id: &str,
        bearer: impl Into<String>,
    ) -> FetcherResult<Self> {
        let params = BTreeMap::from([("orgId".to_string(), org_id.to_string())]);
        Self::new(base_url, DEFAULT_URI_TEMPLATE, &params, bearer)
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Page size sent as `max`; clamped to at least 1.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_transform_name(mut self, transform_name: Option<String>) -> Self {
        self.query.transform_name = transform_name;
        self
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.query.system = system;
        self
    }

    pub fn with_updated_since(mut self, updated_since: Option<String>) -> Self {
        self.query.updated_since = updated_since;
        self
    }

    pub fn with_paging_request_id(mut self, paging_request_id: Option<String>) -> Self {
        self.query.paging_request_id = paging_request_id;
        self
    }

    /// JSON body sent with every request; null members are dropped.
    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body.and_then(strip_nulls).map(Arc::new);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    pub fn query(&self) -> &CatalogQuery {
        &self.query
    }

    /// Spec for the data page starting at `offset`.
    pub fn page_spec(&self, offset: u64) -> RequestSpec {
        self.spec(Some(offset), self.page_size)
    }

    /// Spec for the count probe: a single record, no offset.
    pub fn probe_spec(&self) -> RequestSpec {
        self.spec(None, 1)
    }

    fn spec(&self, offset: Option<u64>, max: u32) -> RequestSpec {
        let mut query = self.query.clone();
        query.offset = offset;
        query.max = Some(max);

        RequestSpec {
            method: self.method,
            url: self.url(),
            query: query.pairs(),
            body: self.body.clone(),
            bearer: self.bearer.clone(),
            timeout: self.timeout,
            correlation_id: Uuid::new_v4().to_string(),
            offset,
            max,
        }
    }
}

/// One logical API call. Never mutated after it is built.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: HttpMethod,
    url: String,
    query: Vec<(&'static str, String)>,
    body: Option<Arc<Value>>,
    bearer: String,
    timeout: Duration,
    correlation_id: String,
    offset: Option<u64>,
    max: u32,
}

impl RequestSpec {
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query(&self) -> &[(&'static str, String)] {
        &self.query
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_deref()
    }

    pub fn bearer(&self) -> &str {
        &self.bearer
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

/// Substitute `{name}` placeholders with URL-encoded parameter values.
fn render_path(template: &str, params: &BTreeMap<String, String>) -> FetcherResult<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            FetcherError::InvalidRequest(format!("unclosed placeholder in URI template: {template}"))
        })?;
        let name = &after[..close];
        let value = params.get(name).ok_or_else(|| {
            FetcherError::InvalidRequest(format!("no value for URI template parameter '{name}'"))
        })?;
        rendered.push_str(&urlencoding::encode(value));
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);

    if !rendered.starts_with('/') {
        rendered.insert(0, '/');
    }
    Ok(rendered)
}

fn strip_nulls(body: Value) -> Option<Value> {
    match body {
        Value::Null => None,
        Value::Object(map) => {
            let kept: serde_json::Map<String, Value> =
                map.into_iter().filter(|(_, v)| !v.is_null()).collect();
            if kept.is_empty() {
                None
            } else {
                Some(Value::Object(kept))
            }
        }
        other => Some(other),
    }
}
