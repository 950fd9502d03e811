/// Client configuration for the PVK API
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default API location, relative to the host serving the frontend.
const PVK_API_URL: &str = "https://pvk.amiv.ethz.ch/api";

/// Price per course in the smallest currency unit ("rappen").
const COURSE_PRICE: u64 = 1000;

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL for the PVK REST API, without trailing slash
    pub api_url: String,
    /// Scheme prefix of the `Authorization` header (`Token <token>`)
    pub auth_scheme: String,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// `max_results` sent with every list request
    pub page_size: u32,
    /// Maximum number of list pages requested at the same time
    pub page_concurrency: usize,
    pub course_price: u64,
    pub currency: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: PVK_API_URL.to_string(),
            auth_scheme: "Token".to_string(),
            user_agent: concat!("pvk/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            page_size: 25,
            page_concurrency: 4,
            course_price: COURSE_PRICE,
            currency: "CHF".to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads the configuration from a JSON file
    ///
    /// Fields missing from the file keep their default values.
    ///
    /// # Arguments
    /// * `path` - Path to the JSON configuration file
    ///
    /// # Returns
    /// * `Ok(ClientConfig)` - Loaded configuration
    /// * `Err` - If the file can't be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Applies `PVK_API_URL`, `PVK_PAGE_SIZE` and `PVK_COURSE_PRICE` from the environment
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("PVK_API_URL") {
            self.api_url = url;
        }
        if let Some(size) = std::env::var("PVK_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.page_size = size;
        }
        if let Some(price) = std::env::var("PVK_COURSE_PRICE")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.course_price = price;
        }
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
