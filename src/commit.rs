//! Commit Orchestrator
//!
//! Submits a validated change set for atomic application. Outbound-only
//! sets take the dedicated batch-save path (one application round trip
//! for N records); anything else is merged into a fetched copy of the
//! live document and submitted as a whole-config replace. Commits are
//! serialized per scope with async mutexes, so a second commit waits
//! instead of racing the one in flight. Validation has no side effects
//! and may run concurrently with anything.
//!
//! The apply endpoints reply with an outcome envelope even when
//! application fails, reserving non-200 codes for malformed requests.
//! That keeps the three caller-visible outcomes (fully applied, fully
//! rolled back, partially applied) in one structured reply instead of
//! scattered error strings.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ChangeSet;
use crate::errors::{ConsoleError, ConsoleResult};
use crate::lifecycle::KernelLifecycleClient;
use crate::staging::StagingManager;
use crate::transport::{decode, ApiTransport};
use crate::validator::Diagnostic;

/// Orthogonal commit flags; backups default on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOptions {
    /// Snapshot the current configuration before mutation
    pub backup: bool,
    /// Restart the kernel after successful application
    pub auto_restart: bool,
    /// On failure, have the kernel restore its pre-commit snapshot
    pub enable_rollback: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            backup: true,
            auto_restart: false,
            enable_rollback: false,
        }
    }
}

/// How the change set landed
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Every record was applied
    Applied { applied: usize },
    /// Application failed with the live configuration left equal to its
    /// pre-commit value, either because the kernel restored its snapshot
    /// or because the commit was refused before any mutation
    RolledBack { diagnostic: Diagnostic },
    /// Rollback was disabled and some records landed before the failure
    Partial {
        applied: usize,
        total: usize,
        diagnostic: Diagnostic,
    },
}

/// Restart result, reported separately from application: a config can
/// be durably applied even if the restart that would pick it up fails
#[derive(Debug, Clone, PartialEq)]
pub enum RestartOutcome {
    Restarted,
    Failed(String),
}

/// Outcome of a commit call
#[derive(Debug, Clone, PartialEq)]
pub struct CommitResult {
    /// Which change set this answers for
    pub change_set: Uuid,
    pub outcome: CommitOutcome,
    /// Kernel-side snapshot location, when a backup was taken
    pub backup_path: Option<String>,
    /// Populated only when a restart was requested
    pub restart: Option<RestartOutcome>,
    /// True while a kernel restart is still needed to pick up the
    /// applied configuration; cleared by a successful restart
    pub needs_restart: bool,
}

impl CommitResult {
    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, CommitOutcome::Applied { .. })
    }

    /// Collapse the outcome into the error taxonomy for callers that
    /// only want to propagate
    pub fn into_result(self) -> ConsoleResult<CommitResult> {
        match &self.outcome {
            CommitOutcome::Applied { .. } => Ok(self),
            CommitOutcome::RolledBack { diagnostic } => Err(ConsoleError::Rejected {
                code: 400,
                message: format!(
                    "commit rolled back ({}): {}",
                    diagnostic.entity.as_deref().unwrap_or("unknown entity"),
                    diagnostic.message
                ),
            }),
            CommitOutcome::Partial {
                applied,
                total,
                diagnostic,
            } => Err(ConsoleError::PartialApplication {
                applied: *applied,
                total: *total,
                message: format!(
                    "{}: {}",
                    diagnostic.entity.as_deref().unwrap_or("unknown entity"),
                    diagnostic.message
                ),
            }),
        }
    }
}

/// On-wire apply reply shared by batch-save and whole-config replace
#[derive(Debug, Deserialize)]
struct ApplyReply {
    applied: usize,
    total: usize,
    #[serde(default)]
    rolled_back: bool,
    #[serde(default)]
    failed: Option<Diagnostic>,
    #[serde(default)]
    backup_path: Option<String>,
    #[serde(default)]
    needs_restart: bool,
}

/// Applies change sets atomically, with optional backup and rollback
pub struct CommitOrchestrator {
    transport: Arc<dyn ApiTransport>,
    lifecycle: KernelLifecycleClient,
    outbound_gate: Mutex<()>,
    config_gate: Mutex<()>,
}

impl CommitOrchestrator {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        let lifecycle = KernelLifecycleClient::new(Arc::clone(&transport));
        Self {
            transport,
            lifecycle,
            outbound_gate: Mutex::new(()),
            config_gate: Mutex::new(()),
        }
    }

    /// Apply a change set in insertion order
    ///
    /// An empty set is a successful no-op without any round trip. The
    /// restart requested via [`CommitOptions::auto_restart`] is driven
    /// through the lifecycle client after application succeeds, so a
    /// restart failure shows up in [`CommitResult::restart`] and never
    /// masquerades as an application failure.
    pub async fn commit(
        &self,
        changes: &ChangeSet,
        options: CommitOptions,
    ) -> ConsoleResult<CommitResult> {
        if changes.is_empty() {
            return Ok(CommitResult {
                change_set: changes.id(),
                outcome: CommitOutcome::Applied { applied: 0 },
                backup_path: None,
                restart: None,
                needs_restart: false,
            });
        }

        debug!(
            "committing change set {} ({} records, backup={}, rollback={})",
            changes.id(),
            changes.len(),
            options.backup,
            options.enable_rollback
        );

        let mut result = if changes.outbounds_only() {
            let _gate = self.outbound_gate.lock().await;
            self.commit_outbound_batch(changes, options).await?
        } else {
            let _gate = self.config_gate.lock().await;
            self.commit_full_config(changes, options).await?
        };

        if options.auto_restart && result.is_applied() {
            result.restart = Some(match self.lifecycle.restart().await {
                Ok(()) => {
                    result.needs_restart = false;
                    RestartOutcome::Restarted
                }
                Err(e) => {
                    warn!("config applied but kernel restart failed: {}", e);
                    RestartOutcome::Failed(e.to_string())
                }
            });
        }

        match &result.outcome {
            CommitOutcome::Applied { applied } => {
                info!("change set {} applied ({} records)", changes.id(), applied)
            }
            CommitOutcome::RolledBack { diagnostic } => warn!(
                "change set {} rolled back: {}",
                changes.id(),
                diagnostic.message
            ),
            CommitOutcome::Partial {
                applied,
                total,
                diagnostic,
            } => warn!(
                "change set {} partially applied ({}/{}): {}",
                changes.id(),
                applied,
                total,
                diagnostic.message
            ),
        }

        Ok(result)
    }

    /// Commit the staged set, applying the staging lifecycle rules:
    /// full success and rolled-back failure both clear the stage (the
    /// kernel is in a known state either way); partial application and
    /// transport failure leave it intact for retry
    pub async fn commit_staged(
        &self,
        staging: &mut StagingManager,
        options: CommitOptions,
    ) -> ConsoleResult<CommitResult> {
        let result = self.commit(staging.pending(), options).await?;
        match result.outcome {
            CommitOutcome::Applied { .. } | CommitOutcome::RolledBack { .. } => staging.clear(),
            CommitOutcome::Partial { .. } => {}
        }
        Ok(result)
    }

    /// Batch outbound save: N outbound changes, exactly one application
    /// round trip, one partial-failure window
    async fn commit_outbound_batch(
        &self,
        changes: &ChangeSet,
        options: CommitOptions,
    ) -> ConsoleResult<CommitResult> {
        let data = self
            .transport
            .post(
                "/singbox/outbounds/batch-save",
                json!({
                    "changes": changes.to_wire_changes(),
                    "backup": options.backup,
                    "enable_rollback": options.enable_rollback,
                }),
            )
            .await?;
        let reply: ApplyReply = decode(data, "batch-save reply")?;
        Ok(self.from_reply(changes.id(), reply))
    }

    /// Whole-config replace: merge the change set into a fetched copy of
    /// the live document and submit it as one unit
    ///
    /// An update whose target is absent from the live document (a stale
    /// client cache) has nothing to merge into and can never land, so it
    /// must not be folded into a success: with rollback enabled, or when
    /// no record would land at all, the commit is refused before any
    /// mutation; otherwise the matched records are applied and the
    /// outcome is partial.
    async fn commit_full_config(
        &self,
        changes: &ChangeSet,
        options: CommitOptions,
    ) -> ConsoleResult<CommitResult> {
        let mut config = self.transport.get("/singbox/config").await?;
        let unmatched = changes.apply_to_config(&mut config);

        if !unmatched.is_empty() {
            let diagnostic = Diagnostic::new(
                Some(unmatched[0].entity_label()),
                "update target not found in live configuration",
            );
            let applied = changes.len() - unmatched.len();
            if options.enable_rollback || applied == 0 {
                warn!(
                    "change set {} refused: {} stale update target(s)",
                    changes.id(),
                    unmatched.len()
                );
                return Ok(CommitResult {
                    change_set: changes.id(),
                    outcome: CommitOutcome::RolledBack { diagnostic },
                    backup_path: None,
                    restart: None,
                    needs_restart: false,
                });
            }

            let reply = self.replace_config(&config, options).await?;
            return Ok(CommitResult {
                change_set: changes.id(),
                outcome: CommitOutcome::Partial {
                    applied,
                    total: changes.len(),
                    diagnostic,
                },
                backup_path: reply.backup_path,
                restart: None,
                needs_restart: reply.needs_restart,
            });
        }

        let reply = self.replace_config(&config, options).await?;
        Ok(self.from_reply(changes.id(), reply))
    }

    async fn replace_config(
        &self,
        config: &serde_json::Value,
        options: CommitOptions,
    ) -> ConsoleResult<ApplyReply> {
        let data = self
            .transport
            .put(
                "/singbox/config",
                json!({
                    "config": config,
                    "backup": options.backup,
                    // restart is driven client-side via the lifecycle client
                    "auto_restart": false,
                    "enable_rollback": options.enable_rollback,
                }),
            )
            .await?;
        decode(data, "config replace reply")
    }

    fn from_reply(&self, change_set: Uuid, reply: ApplyReply) -> CommitResult {
        let outcome = if reply.rolled_back {
            CommitOutcome::RolledBack {
                diagnostic: reply.failed.unwrap_or_else(|| {
                    Diagnostic::new(None, "kernel restored its pre-commit snapshot")
                }),
            }
        } else if reply.applied == reply.total {
            CommitOutcome::Applied {
                applied: reply.applied,
            }
        } else {
            CommitOutcome::Partial {
                applied: reply.applied,
                total: reply.total,
                diagnostic: reply.failed.unwrap_or_else(|| {
                    Diagnostic::new(None, "kernel did not identify the refused record")
                }),
            }
        };

        CommitResult {
            change_set,
            outcome,
            backup_path: reply.backup_path,
            restart: None,
            needs_restart: reply.needs_restart,
        }
    }
}
