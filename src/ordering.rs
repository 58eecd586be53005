//! Ordering Engine
//!
//! Remote operations over the route rule sequence. Rule precedence is
//! first-match-wins downstream, so the total order is configuration
//! state in its own right. Malformed permutations are caught locally by
//! [`RuleOrder`] before any mutation round trip; moves against an edge
//! are no-ops resolved without touching the kernel at all.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{ChangeRecord, ChangeSet, MoveOutcome, OrderingError, RouteRule, RuleId, RuleOrder};
use crate::errors::ConsoleResult;
use crate::transport::{decode, ApiTransport};

#[derive(Debug, Deserialize)]
struct RulesReply {
    rules: Vec<RouteRule>,
}

#[derive(Debug, Deserialize)]
struct MoveReply {
    from: usize,
    to: usize,
}

/// Client for route rule ordering operations
#[derive(Clone)]
pub struct OrderingEngine {
    transport: Arc<dyn ApiTransport>,
}

impl OrderingEngine {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self { transport }
    }

    /// Fetch the live rule sequence in evaluation order
    pub async fn rules(&self) -> ConsoleResult<Vec<RouteRule>> {
        let data = self.transport.get("/singbox/rules/route").await?;
        let reply: RulesReply = decode(data, "route rules reply")?;
        Ok(reply.rules)
    }

    /// Swap a rule with its immediate predecessor; no-op if already first
    pub async fn move_up(&self, id: &RuleId) -> ConsoleResult<MoveOutcome> {
        self.move_rule(id, "move-up", |order, id| {
            order.position_of(id).map(|p| p == 0)
        })
        .await
    }

    /// Swap a rule with its immediate successor; no-op if already last
    pub async fn move_down(&self, id: &RuleId) -> ConsoleResult<MoveOutcome> {
        self.move_rule(id, "move-down", |order, id| {
            order.position_of(id).map(|p| p + 1 == order.len())
        })
        .await
    }

    async fn move_rule(
        &self,
        id: &RuleId,
        action: &str,
        at_edge: impl Fn(&RuleOrder, &RuleId) -> Option<bool>,
    ) -> ConsoleResult<MoveOutcome> {
        let order = RuleOrder::new(self.rules().await?);
        match at_edge(&order, id) {
            None => Err(OrderingError::UnknownRule(id.clone()).into()),
            Some(true) => {
                debug!("rule {} already at edge, {} is a no-op", id, action);
                Ok(MoveOutcome::AtEdge)
            }
            Some(false) => {
                let path = format!(
                    "/singbox/rules/route/{}/{}",
                    urlencoding::encode(id.as_str()),
                    action
                );
                let data = self.transport.post(&path, json!({})).await?;
                let reply: MoveReply = decode(data, "rule move reply")?;
                Ok(MoveOutcome::Moved {
                    from: reply.from,
                    to: reply.to,
                })
            }
        }
    }

    /// Replace the entire position assignment with the given total order
    ///
    /// The permutation is checked locally against the live order first;
    /// a missing, duplicate or foreign id fails with an `OrderingError`
    /// before any mutation call, leaving the kernel untouched.
    pub async fn reorder(&self, ids: &[RuleId]) -> ConsoleResult<Vec<RouteRule>> {
        let order = RuleOrder::new(self.rules().await?);
        order.check_permutation(ids)?;

        let data = self
            .transport
            .post(
                "/singbox/rules/route/reorder",
                json!({ "rule_ids": ids }),
            )
            .await?;
        let reply: RulesReply = decode(data, "reorder reply")?;
        Ok(reply.rules)
    }

    /// Express a reorder as a change set of rule updates, so rule
    /// precedence changes can be validated, committed and rolled back
    /// through the same pipeline as node edits
    pub async fn reorder_change_set(&self, ids: &[RuleId]) -> ConsoleResult<ChangeSet> {
        let mut order = RuleOrder::new(self.rules().await?);
        order.reorder(ids)?;

        let mut set = ChangeSet::new();
        for rule in order.rules() {
            set.push(ChangeRecord::UpdateRule {
                id: rule.id.clone(),
                rule: rule.to_value(),
            });
        }
        Ok(set)
    }
}
