//! Change-management client core for a sing-box gateway administration
//! console
//!
//! The gateway appliance runs a proxy kernel whose configuration
//! (outbound nodes and ordered route rules) this crate edits through a
//! staged pipeline: edits accumulate locally into a [`ChangeSet`], get
//! dry-run validated against the live configuration, and are applied as
//! one atomic batch with optional backup and rollback. Rule precedence
//! is first-match-wins, so the ordering engine treats the rule order as
//! configuration state with its own operations and invariants.
//!
//! ```rust,no_run
//! use singbox_console::{
//!     ChangeRecord, CommitOptions, ConsoleClient, HttpConfig, StagingManager,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ConsoleClient::connect(HttpConfig {
//!     base_url: "http://192.168.1.1:9090".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let mut staging = StagingManager::new();
//! staging.stage(ChangeRecord::create_rule(serde_json::json!({
//!     "domain_suffix": ".lan",
//!     "outbound": "direct",
//! })));
//!
//! let validation = client.validator().validate_changes(staging.pending()).await?;
//! if validation.is_pass() {
//!     let result = client
//!         .commits()
//!         .commit_staged(&mut staging, CommitOptions::default())
//!         .await?;
//!     println!("commit outcome: {:?}", result.outcome);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod commit;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod ordering;
pub mod services;
pub mod staging;
pub mod transport;
pub mod validator;

// Re-export commonly used types
pub use client::ConsoleClient;
pub use commit::{CommitOptions, CommitOrchestrator, CommitOutcome, CommitResult, RestartOutcome};
pub use domain::{
    ChangeKey, ChangeRecord, ChangeSet, EntityKind, MoveOutcome, OrderingError, OutboundNode,
    OutboundTag, RouteRule, RuleId, RuleOrder,
};
pub use errors::{ConsoleError, ConsoleResult};
pub use lifecycle::{KernelLifecycleClient, KernelPath, KernelUpdateCheck};
pub use ordering::OrderingEngine;
pub use services::{
    ConfigFile, ConfigUpdate, LogQuery, LogView, ServiceAction, ServiceConfigClient, ServiceInfo,
    ServiceState,
};
pub use staging::StagingManager;
pub use transport::{ApiEnvelope, ApiTransport, HttpConfig, HttpTransport, Method};
pub use validator::{Diagnostic, ValidationResult, ValidatorGateway, Verdict};
