//! Kernel Lifecycle Client
//!
//! Thin pass-through for restart, binary path detection, and kernel
//! update operations. The gateway performs the actual work; this client
//! only relays requests and decodes replies. The commit orchestrator
//! consumes [`KernelLifecycleClient::restart`] when a commit requests an
//! automatic restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::errors::ConsoleResult;
use crate::transport::{decode, ApiTransport};

/// Where the kernel binary was found and what it looks like
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelPath {
    pub path: String,
    pub detection_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Result of an update availability check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelUpdateCheck {
    pub has_update: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    pub latest_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// Pass-through client for kernel process operations
#[derive(Clone)]
pub struct KernelLifecycleClient {
    transport: Arc<dyn ApiTransport>,
}

impl KernelLifecycleClient {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self { transport }
    }

    /// Restart the kernel process so it picks up applied configuration
    pub async fn restart(&self) -> ConsoleResult<()> {
        info!("requesting kernel restart");
        self.transport.post("/singbox/restart", json!({})).await?;
        Ok(())
    }

    /// Locate the kernel binary on the appliance
    pub async fn detect_path(&self) -> ConsoleResult<KernelPath> {
        let data = self.transport.get("/singbox/kernel/detect-path").await?;
        decode(data, "kernel path reply")
    }

    /// Ask the gateway whether a newer kernel release exists
    pub async fn check_update(&self) -> ConsoleResult<KernelUpdateCheck> {
        let data = self.transport.get("/singbox/kernel/check-update").await?;
        decode(data, "kernel update check reply")
    }

    /// Kick off a kernel binary update; the gateway downloads and swaps
    /// the binary asynchronously
    pub async fn start_update(&self, download_url: &str, target_path: &str) -> ConsoleResult<()> {
        info!("starting kernel update from {}", download_url);
        self.transport
            .post(
                "/singbox/kernel/update",
                json!({
                    "download_url": download_url,
                    "target_path": target_path,
                }),
            )
            .await?;
        Ok(())
    }
}
