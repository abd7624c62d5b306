//! HTTP client for polling deployment status endpoints

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::{debug, error};
use url::Url;

use crate::errors::DeployError;
use crate::models::deployment::StatusView;

/// HTTP client options
#[derive(Debug, Clone)]
pub struct Options {
    /// Base URL that relative monitor URLs resolve against
    pub base_url: String,

    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Result of one status request that got an HTTP response
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// 200 with a parsed status body
    Report(StatusView),
    /// Any other HTTP status
    HttpStatus(u16),
}

/// Fetches a deployment's status view
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn fetch_status(&self, url: &str) -> Result<ProbeOutcome, DeployError>;
}

/// reqwest implementation of [`StatusProbe`]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    pub fn new(options: &Options) -> Result<Self, DeployError> {
        let base_url = Url::parse(&options.base_url).map_err(|e| {
            DeployError::ConfigError(format!("Invalid base URL {}: {}", options.base_url, e))
        })?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent("DeploymentMonitorService/1.0")
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Absolute URLs are used as is, relative ones are joined to the base URL
    pub fn resolve(&self, url: &str) -> Result<Url, DeployError> {
        match Url::parse(url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base_url
                .join(url)
                .map_err(|e| DeployError::ConfigError(format!("Invalid URL {}: {}", url, e))),
            Err(e) => Err(DeployError::ConfigError(format!("Invalid URL {}: {}", url, e))),
        }
    }
}

#[async_trait]
impl StatusProbe for HttpClient {
    async fn fetch_status(&self, url: &str) -> Result<ProbeOutcome, DeployError> {
        let url = self.resolve(url)?;
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            error!("HTTP GET failed: {}", status);
            return Ok(ProbeOutcome::HttpStatus(status.as_u16()));
        }

        Ok(ProbeOutcome::Report(response.json().await?))
    }
}
