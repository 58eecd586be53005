//! Managed-service passthrough
//!
//! The gateway manages a handful of services besides the proxy kernel
//! (DNS resolver, etc.). Their configuration files and logs are opaque
//! to the console; this client relays reads and writes, lists the
//! services with their unit state, and forwards start/stop/restart
//! requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::ConsoleResult;
use crate::transport::{decode, ApiTransport};

/// Unit state as the gateway's service manager reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Running,
    Stopped,
    Failed,
    NotInstalled,
    Unknown,
}

/// A managed service and its current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub status: ServiceState,
}

/// Control verb forwarded to the gateway's service manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceAction::Start => write!(f, "start"),
            ServiceAction::Stop => write!(f, "stop"),
            ServiceAction::Restart => write!(f, "restart"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServicesReply {
    services: Vec<ServiceInfo>,
}

#[derive(Debug, Deserialize)]
struct ServiceActionReply {
    service_info: ServiceInfo,
}

/// A managed service's configuration file as the gateway reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub path: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Result of a configuration write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}

/// Log query parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub lines: usize,
    pub filter_keyword: Option<String>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            lines: 100,
            filter_keyword: None,
        }
    }
}

/// A slice of a service's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogView {
    pub content: String,
    pub total_lines: usize,
    pub filtered_lines: usize,
}

/// Passthrough client for managed-service configs and logs
#[derive(Clone)]
pub struct ServiceConfigClient {
    transport: Arc<dyn ApiTransport>,
}

impl ServiceConfigClient {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self { transport }
    }

    /// List every managed service with its unit state
    pub async fn list(&self) -> ConsoleResult<Vec<ServiceInfo>> {
        let data = self.transport.get("/services").await?;
        let reply: ServicesReply = decode(data, "service list reply")?;
        Ok(reply.services)
    }

    /// State of a single managed service
    pub async fn status(&self, service: &str) -> ConsoleResult<ServiceInfo> {
        let path = format!("/services/{}", urlencoding::encode(service));
        let data = self.transport.get(&path).await?;
        decode(data, "service status reply")
    }

    /// Start, stop or restart a managed service; returns its state
    /// after the action
    pub async fn control(
        &self,
        service: &str,
        action: ServiceAction,
    ) -> ConsoleResult<ServiceInfo> {
        info!("{} service {}", action, service);
        let path = format!("/services/{}/action", urlencoding::encode(service));
        let data = self
            .transport
            .post(&path, json!({ "action": action }))
            .await?;
        let reply: ServiceActionReply = decode(data, "service action reply")?;
        Ok(reply.service_info)
    }

    /// Read a managed service's configuration file
    pub async fn get_config(&self, service: &str) -> ConsoleResult<ConfigFile> {
        let path = format!("/config/{}", urlencoding::encode(service));
        let data = self.transport.get(&path).await?;
        decode(data, "service config reply")
    }

    /// Replace a managed service's configuration file
    pub async fn update_config(
        &self,
        service: &str,
        content: &str,
        backup: bool,
    ) -> ConsoleResult<ConfigUpdate> {
        debug!("updating config for service {}", service);
        let path = format!("/config/{}", urlencoding::encode(service));
        let data = self
            .transport
            .put(&path, json!({ "content": content, "backup": backup }))
            .await?;
        decode(data, "service config update reply")
    }

    /// Fetch the tail of a managed service's log
    pub async fn logs(&self, service: &str, query: &LogQuery) -> ConsoleResult<LogView> {
        let mut path = format!(
            "/logs/{}?lines={}",
            urlencoding::encode(service),
            query.lines
        );
        if let Some(keyword) = &query.filter_keyword {
            path.push_str("&filter_keyword=");
            path.push_str(&urlencoding::encode(keyword));
        }
        let data = self.transport.get(&path).await?;
        decode(data, "service log reply")
    }
}
