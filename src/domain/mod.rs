//! Domain model for the configuration change pipeline
//!
//! Value objects for the kernel-owned entities (outbound nodes, route
//! rules) and the client-side change model staged against them.

pub mod change;
pub mod outbound;
pub mod rule;

pub use change::{ChangeKey, ChangeRecord, ChangeSet, EntityKind};
pub use outbound::{OutboundNode, OutboundTag, TagError};
pub use rule::{MoveOutcome, OrderingError, RouteRule, RuleId, RuleOrder};
