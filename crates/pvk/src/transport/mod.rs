//! Transport adapter for the PVK REST API.
//!
//! Every request addresses `{api_url}/{resource}/{id}` and carries a structured
//! query: each query value is JSON-encoded on its own before the pairs are
//! joined into the query string, because the backend expects filter objects
//! such as `where={"nethz":"jdoe"}` per field.

mod error;
pub mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use error::ApiError;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// Structured query parameters, one JSON value per field.
pub type Query = BTreeMap<String, Value>;

/// Header carrying the version tag precondition on updates and deletes.
pub const IF_MATCH: &str = "If-Match";

/// A single request against a PVK resource.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub resource: String,
    pub method: Method,
    pub id: Option<String>,
    pub data: Option<Value>,
    pub query: Query,
    pub headers: BTreeMap<String, String>,
}

impl ApiRequest {
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            method,
            id: None,
            data: None,
            query: Query::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn get(resource: impl Into<String>) -> Self {
        Self::new(Method::GET, resource)
    }

    pub fn post(resource: impl Into<String>) -> Self {
        Self::new(Method::POST, resource)
    }

    pub fn patch(resource: impl Into<String>) -> Self {
        Self::new(Method::PATCH, resource)
    }

    pub fn delete(resource: impl Into<String>) -> Self {
        Self::new(Method::DELETE, resource)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Adds every entry of `query`, replacing fields that are already set.
    pub fn with_query(mut self, query: &Query) -> Self {
        self.query
            .extend(query.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.query.insert(key.into(), value);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Binds the request to the record version identified by `etag`.
    pub fn if_match(self, etag: impl Into<String>) -> Self {
        self.with_header(IF_MATCH, etag)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Builds the full request URL below `api_url`.
    pub fn url(&self, api_url: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(api_url.trim_end_matches('/'))?;

        {
            let mut segments = url.path_segments_mut().map_err(|_| ApiError::UrlError {
                message: format!("{api_url} cannot be used as a base URL"),
            })?;
            segments.pop_if_empty().push(&self.resource);
            if let Some(id) = &self.id {
                segments.push(id);
            }
        }

        if !self.query.is_empty() {
            let encoded = encode_query(&self.query)?;
            url.query_pairs_mut().extend_pairs(encoded);
        }

        Ok(url)
    }
}

/// JSON-encodes every query value individually.
pub fn encode_query(query: &Query) -> Result<Vec<(String, String)>, ApiError> {
    query
        .iter()
        .map(|(key, value)| Ok((key.clone(), serde_json::to_string(value)?)))
        .collect()
}

/// Performs requests against the PVK API.
///
/// Implementations attach authorization, surface non-success responses as
/// [`ApiError::Status`] and clear the session on `401` before returning.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<Value, ApiError>;
}
