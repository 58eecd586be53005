//! Route Rule Ordering
//!
//! Route rules are an ordered match/action list: the kernel evaluates
//! them top to bottom and the first match wins, so rule precedence is
//! load-bearing configuration state. `RuleOrder` is the pure ordering
//! engine over a rule sequence; every successful operation leaves
//! positions dense `0..n-1` with no gaps or duplicates, and every failed
//! operation leaves the prior order untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Kernel-assigned route rule identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RuleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Ordering violations, caught locally before any kernel round trip
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderingError {
    /// The sequence names a rule the kernel does not have
    #[error("unknown rule id in reorder sequence: {0}")]
    UnknownRule(RuleId),

    /// The sequence names the same rule twice
    #[error("duplicate rule id in reorder sequence: {0}")]
    DuplicateRule(RuleId),

    /// The sequence omits an existing rule
    #[error("reorder sequence is missing rule id: {0}")]
    MissingRule(RuleId),
}

/// A route rule as the kernel reports it
///
/// Match and action parameters are opaque to the console; `position` is
/// the zero-based evaluation index within the full rule sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    pub id: RuleId,
    pub position: usize,

    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl RouteRule {
    pub fn new(id: RuleId, position: usize, params: Map<String, Value>) -> Self {
        Self { id, position, params }
    }

    /// Serialize into the flattened JSON object the kernel expects
    pub fn to_value(&self) -> Value {
        let mut object = self.params.clone();
        object.insert("id".to_string(), Value::String(self.id.as_str().to_string()));
        object.insert("position".to_string(), Value::from(self.position as u64));
        Value::Object(object)
    }
}

/// Outcome of a move operation
///
/// Moving the first rule up or the last rule down is a no-op by
/// contract, not an error, so callers can wire move buttons without
/// bounds bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The rule swapped places with its neighbor
    Moved { from: usize, to: usize },
    /// The rule was already at the edge; order unchanged
    AtEdge,
}

/// Pure ordering engine over a route rule sequence
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleOrder {
    rules: Vec<RouteRule>,
}

impl RuleOrder {
    /// Take ownership of a rule sequence, renumbering positions densely
    /// in the order given
    pub fn new(rules: Vec<RouteRule>) -> Self {
        let mut order = Self { rules };
        order.renumber();
        order
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<RouteRule> {
        self.rules
    }

    /// Current rule ids in evaluation order
    pub fn ids(&self) -> Vec<RuleId> {
        self.rules.iter().map(|r| r.id.clone()).collect()
    }

    /// Position of a rule, if present
    pub fn position_of(&self, id: &RuleId) -> Option<usize> {
        self.rules.iter().position(|r| &r.id == id)
    }

    /// Swap a rule with its immediate predecessor
    pub fn move_up(&mut self, id: &RuleId) -> Result<MoveOutcome, OrderingError> {
        self.move_by(id, -1)
    }

    /// Swap a rule with its immediate successor
    pub fn move_down(&mut self, id: &RuleId) -> Result<MoveOutcome, OrderingError> {
        self.move_by(id, 1)
    }

    fn move_by(&mut self, id: &RuleId, delta: isize) -> Result<MoveOutcome, OrderingError> {
        let from = self
            .position_of(id)
            .ok_or_else(|| OrderingError::UnknownRule(id.clone()))?;

        let to = from as isize + delta;
        if to < 0 || to as usize >= self.rules.len() {
            return Ok(MoveOutcome::AtEdge);
        }
        let to = to as usize;

        self.rules.swap(from, to);
        self.renumber();
        Ok(MoveOutcome::Moved { from, to })
    }

    /// Replace the entire position assignment with the given total order
    ///
    /// Fails without touching the current order unless `ids` is exactly a
    /// permutation of the existing rule identities.
    pub fn reorder(&mut self, ids: &[RuleId]) -> Result<(), OrderingError> {
        self.check_permutation(ids)?;

        let mut reordered = Vec::with_capacity(self.rules.len());
        for id in ids {
            // check_permutation guarantees every id resolves
            if let Some(index) = self.position_of(id) {
                reordered.push(self.rules[index].clone());
            }
        }

        self.rules = reordered;
        self.renumber();
        Ok(())
    }

    /// Verify that `ids` is a permutation of the current rule identities
    pub fn check_permutation(&self, ids: &[RuleId]) -> Result<(), OrderingError> {
        let mut seen: HashSet<&RuleId> = HashSet::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id) {
                return Err(OrderingError::DuplicateRule(id.clone()));
            }
            if self.position_of(id).is_none() {
                return Err(OrderingError::UnknownRule(id.clone()));
            }
        }

        for rule in &self.rules {
            if !seen.contains(&rule.id) {
                return Err(OrderingError::MissingRule(rule.id.clone()));
            }
        }

        Ok(())
    }

    /// Re-derive dense positions from sequence order
    fn renumber(&mut self) {
        for (index, rule) in self.rules.iter_mut().enumerate() {
            rule.position = index;
        }
    }

    /// Positions must be dense 0..n-1 whenever the sequence is consistent
    pub fn positions_are_dense(&self) -> bool {
        self.rules
            .iter()
            .enumerate()
            .all(|(index, rule)| rule.position == index)
    }
}
