//! HTTP transport backed by `reqwest`.

use super::{ApiError, ApiRequest, Transport};
use crate::config::ClientConfig;
use crate::session::Session;
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Transport talking to the PVK API over HTTP.
pub struct HttpTransport {
    client: Client,
    api_url: String,
    auth_scheme: String,
    session: Arc<Session>,
}

impl HttpTransport {
    /// Creates a transport for the API configured in `config`.
    ///
    /// The session is consulted on every request, so a token that is cleared
    /// after a `401` stops being sent immediately.
    pub fn new(config: &ClientConfig, session: Arc<Session>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            auth_scheme: config.auth_scheme.clone(),
            session,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let correlation_id = generate_correlation_id();
        let url = request.url(&self.api_url)?;

        debug!(
            correlation_id = %correlation_id,
            method = %request.method,
            url = %url,
            "Sending request"
        );

        let start = Instant::now();
        let mut builder = self.client.request(request.method.clone(), url);

        if let Some(token) = self.session.token() {
            builder = builder.header(AUTHORIZATION, format!("{} {}", self.auth_scheme, token));
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(data) = &request.data {
            builder = builder.json(data);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            debug!(
                correlation_id = %correlation_id,
                status = status.as_u16(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Request completed"
            );
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&body)?);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!(
                correlation_id = %correlation_id,
                resource = %request.resource,
                "Token rejected, logging out"
            );
            self.session.clear();
        }

        let message = error_message(&body);
        warn!(
            correlation_id = %correlation_id,
            resource = %request.resource,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            message = %message,
            "Request failed"
        );

        Err(ApiError::Status {
            resource: request.resource,
            status: status.as_u16(),
            message,
        })
    }
}

/// Extracts `_error.message` from an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/_error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Generates a short correlation ID for request tracing.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}
