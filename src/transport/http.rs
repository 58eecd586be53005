//! reqwest-backed gateway transport

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ApiEnvelope, ApiTransport, Method};
use crate::errors::{ConsoleError, ConsoleResult};

/// Configuration for the gateway HTTP connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Gateway base URL (e.g. "http://192.168.1.1:9090"); the `/api`
    /// prefix is appended per request
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9090".to_string(),
            timeout_secs: 10,
        }
    }
}

/// HTTP client for the gateway REST surface
#[derive(Clone)]
pub struct HttpTransport {
    config: HttpConfig,
    client: Client,
}

impl HttpTransport {
    /// Build a transport with the given configuration
    pub fn new(config: HttpConfig) -> ConsoleResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConsoleError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ConsoleResult<Value> {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ConsoleError::Timeout(format!("{} {}: {}", method, path, e))
            } else {
                ConsoleError::Transport(format!("{} {}: {}", method, path, e))
            }
        })?;

        let status = response.status();
        let envelope: ApiEnvelope = response.json().await.map_err(|e| {
            warn!("invalid envelope from {} (HTTP {}): {}", path, status, e);
            ConsoleError::Transport(format!(
                "invalid reply envelope from {} (HTTP {}): {}",
                path, status, e
            ))
        })?;

        envelope.into_data()
    }
}
