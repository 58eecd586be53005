//! Validator Gateway
//!
//! Submits a change set or a whole configuration document to the kernel
//! for dry-run validation. Validation never mutates kernel state, so it
//! is idempotent and safe to call concurrently with anything else.
//!
//! A kernel that *rejected* the configuration and a kernel that *could
//! not be reached* are different answers, and callers need to tell them
//! apart: the former means the edits are wrong, the latter means the
//! true state is unknown. Both land in [`ValidationResult`], never
//! conflated.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::ChangeSet;
use crate::errors::{ConsoleError, ConsoleResult};
use crate::transport::{decode, ApiTransport};

/// Structured validation diagnostic: entity reference plus message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(entity: Option<String>, message: impl Into<String>) -> Self {
        Self {
            entity,
            message: message.into(),
        }
    }
}

/// What the validation attempt established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The kernel accepted the configuration
    Pass,
    /// The kernel saw the configuration and refused it
    Rejected,
    /// The kernel could not be consulted; nothing is known about the
    /// configuration itself
    Unreachable,
}

/// Outcome of a dry-run validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub verdict: Verdict,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            verdict: Verdict::Pass,
            diagnostics: Vec::new(),
        }
    }

    pub fn rejected(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            verdict: Verdict::Rejected,
            diagnostics,
        }
    }

    /// Synthetic failure for transport errors and malformed replies
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Unreachable,
            diagnostics: vec![Diagnostic::new(None, message)],
        }
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// On-wire validation reply
#[derive(Debug, Deserialize)]
struct ValidateReply {
    valid: bool,
    #[serde(default)]
    diagnostics: Vec<Diagnostic>,
}

/// Dry-run validation client
#[derive(Clone)]
pub struct ValidatorGateway {
    transport: Arc<dyn ApiTransport>,
}

impl ValidatorGateway {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self { transport }
    }

    /// Validate a proposed change set against the kernel's current live
    /// configuration without applying it
    ///
    /// Outbound-only sets use the dedicated endpoint in one round trip;
    /// mixed sets are merged into a fetched copy of the live document
    /// and validated whole.
    pub async fn validate_changes(&self, changes: &ChangeSet) -> ConsoleResult<ValidationResult> {
        debug!(
            "validating change set {} ({} records)",
            changes.id(),
            changes.len()
        );

        if changes.outbounds_only() {
            let reply = self
                .transport
                .post(
                    "/singbox/outbounds/validate",
                    json!({ "changes": changes.to_wire_changes() }),
                )
                .await;
            return self.to_result(reply);
        }

        let config = match self.transport.get("/singbox/config").await {
            Ok(config) => config,
            Err(e) => return self.to_result(Err(e)),
        };
        let mut merged = config;
        let unmatched = changes.apply_to_config(&mut merged);
        if !unmatched.is_empty() {
            // stale targets would be silently dropped by a merge; the
            // kernel never sees them, so diagnose them here
            let diagnostics = unmatched
                .iter()
                .map(|record| {
                    Diagnostic::new(
                        Some(record.entity_label()),
                        "update target not found in live configuration",
                    )
                })
                .collect();
            return Ok(ValidationResult::rejected(diagnostics));
        }
        self.validate_config(&merged).await
    }

    /// Validate a whole configuration document
    pub async fn validate_config(&self, config: &Value) -> ConsoleResult<ValidationResult> {
        let reply = self
            .transport
            .post("/singbox/config/validate", json!({ "config": config }))
            .await;
        self.to_result(reply)
    }

    /// Re-validate the kernel's already-applied configuration, catching
    /// drift or externally introduced corruption
    pub async fn validate_current(&self) -> ConsoleResult<ValidationResult> {
        let reply = self
            .transport
            .post("/singbox/config/validate-current", json!({}))
            .await;
        self.to_result(reply)
    }

    fn to_result(&self, reply: ConsoleResult<Value>) -> ConsoleResult<ValidationResult> {
        match reply {
            Ok(data) => match decode::<ValidateReply>(data, "validation reply") {
                Ok(reply) if reply.valid => Ok(ValidationResult::pass()),
                Ok(reply) => Ok(ValidationResult::rejected(reply.diagnostics)),
                Err(e) => {
                    warn!("malformed validation reply: {}", e);
                    Ok(ValidationResult::unreachable(e.to_string()))
                }
            },
            Err(ConsoleError::Rejected { code, message }) => Ok(ValidationResult::rejected(vec![
                Diagnostic::new(None, format!("kernel refused validation (code {}): {}", code, message)),
            ])),
            Err(e) if e.is_transport() => {
                warn!("validation transport failure: {}", e);
                Ok(ValidationResult::unreachable(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}
