//! Console client facade
//!
//! One explicitly constructed client instance wires every component
//! over a shared transport. There is deliberately no module-level
//! global: callers own the client and its lifecycle, and tests inject
//! an in-memory transport through [`ConsoleClient::with_transport`].

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::commit::CommitOrchestrator;
use crate::domain::{OutboundNode, OutboundTag, RuleId};
use crate::errors::ConsoleResult;
use crate::lifecycle::KernelLifecycleClient;
use crate::ordering::OrderingEngine;
use crate::services::ServiceConfigClient;
use crate::transport::{decode, ApiTransport, HttpConfig, HttpTransport};
use crate::validator::ValidatorGateway;

#[derive(Debug, Deserialize)]
struct OutboundsReply {
    outbounds: Vec<OutboundNode>,
}

#[derive(Debug, Deserialize)]
struct InboundsReply {
    inbounds: Vec<Value>,
}

/// Administration console client for one gateway appliance
pub struct ConsoleClient {
    transport: Arc<dyn ApiTransport>,
    validator: ValidatorGateway,
    commits: CommitOrchestrator,
    ordering: OrderingEngine,
    kernel: KernelLifecycleClient,
    services: ServiceConfigClient,
}

impl ConsoleClient {
    /// Connect to a gateway over HTTP
    pub fn connect(config: HttpConfig) -> ConsoleResult<Self> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new(config)?)))
    }

    /// Build a client over any transport implementation
    pub fn with_transport(transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            validator: ValidatorGateway::new(Arc::clone(&transport)),
            commits: CommitOrchestrator::new(Arc::clone(&transport)),
            ordering: OrderingEngine::new(Arc::clone(&transport)),
            kernel: KernelLifecycleClient::new(Arc::clone(&transport)),
            services: ServiceConfigClient::new(Arc::clone(&transport)),
            transport,
        }
    }

    pub fn validator(&self) -> &ValidatorGateway {
        &self.validator
    }

    pub fn commits(&self) -> &CommitOrchestrator {
        &self.commits
    }

    pub fn ordering(&self) -> &OrderingEngine {
        &self.ordering
    }

    pub fn kernel(&self) -> &KernelLifecycleClient {
        &self.kernel
    }

    pub fn services(&self) -> &ServiceConfigClient {
        &self.services
    }

    /// Fetch the kernel's live configuration document
    pub async fn config(&self) -> ConsoleResult<Value> {
        self.transport.get("/singbox/config").await
    }

    /// Fetch the configured outbound nodes
    pub async fn outbounds(&self) -> ConsoleResult<Vec<OutboundNode>> {
        let data = self.transport.get("/singbox/outbounds").await?;
        let reply: OutboundsReply = decode(data, "outbounds reply")?;
        Ok(reply.outbounds)
    }

    /// Create a single outbound node outside the staged pipeline
    pub async fn create_outbound(&self, node: &OutboundNode) -> ConsoleResult<()> {
        self.transport
            .post("/singbox/outbounds", node.to_value())
            .await?;
        Ok(())
    }

    /// Update a single outbound node outside the staged pipeline
    pub async fn update_outbound(
        &self,
        tag: &OutboundTag,
        node: &OutboundNode,
    ) -> ConsoleResult<()> {
        let path = format!("/singbox/outbounds/{}", urlencoding::encode(tag.as_str()));
        self.transport.put(&path, node.to_value()).await?;
        Ok(())
    }

    /// Delete a single outbound node outside the staged pipeline
    pub async fn delete_outbound(&self, tag: &OutboundTag) -> ConsoleResult<()> {
        let path = format!("/singbox/outbounds/{}", urlencoding::encode(tag.as_str()));
        self.transport.delete(&path).await?;
        Ok(())
    }

    /// Create a single route rule outside the staged pipeline
    pub async fn create_rule(&self, rule: &Value) -> ConsoleResult<()> {
        self.transport
            .post("/singbox/rules/route", rule.clone())
            .await?;
        Ok(())
    }

    /// Update a single route rule outside the staged pipeline
    pub async fn update_rule(&self, id: &RuleId, rule: &Value) -> ConsoleResult<()> {
        let path = format!("/singbox/rules/route/{}", urlencoding::encode(id.as_str()));
        self.transport.put(&path, rule.clone()).await?;
        Ok(())
    }

    /// Delete a single route rule outside the staged pipeline
    pub async fn delete_rule(&self, id: &RuleId) -> ConsoleResult<()> {
        let path = format!("/singbox/rules/route/{}", urlencoding::encode(id.as_str()));
        self.transport.delete(&path).await?;
        Ok(())
    }

    /// List the kernel's configured inbounds; read-only in the console,
    /// the entries are opaque listen/protocol objects
    pub async fn inbounds(&self) -> ConsoleResult<Vec<Value>> {
        let data = self.transport.get("/singbox/inbounds").await?;
        let reply: InboundsReply = decode(data, "inbounds reply")?;
        Ok(reply.inbounds)
    }

    /// Create a rule set (a named, externally sourced rule collection
    /// route rules can reference); tags must be unique
    pub async fn create_ruleset(&self, ruleset: &Value) -> ConsoleResult<()> {
        self.transport
            .post("/singbox/rulesets", ruleset.clone())
            .await?;
        Ok(())
    }

    /// Replace the rule set with the given tag
    pub async fn update_ruleset(&self, tag: &str, ruleset: &Value) -> ConsoleResult<()> {
        let path = format!("/singbox/rulesets/{}", urlencoding::encode(tag));
        self.transport.put(&path, ruleset.clone()).await?;
        Ok(())
    }

    /// Delete the rule set with the given tag
    pub async fn delete_ruleset(&self, tag: &str) -> ConsoleResult<()> {
        let path = format!("/singbox/rulesets/{}", urlencoding::encode(tag));
        self.transport.delete(&path).await?;
        Ok(())
    }
}
