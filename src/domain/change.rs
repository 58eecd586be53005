//! Change Record Model
//!
//! In-memory representation of pending edits to the kernel's outbound
//! nodes and route rules. A `ChangeRecord` is a closed sum over
//! {Create, Update, Delete} × {OutboundNode, RouteRule} so the compiler
//! enforces exhaustiveness wherever changes are routed. A `ChangeSet` is
//! the ordered batch of records staged client-side before validation and
//! commit; insertion order is the intended application order.

use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

use super::outbound::{OutboundNode, OutboundTag};
use super::rule::RuleId;

/// The two entity kinds the change pipeline manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Outbound,
    RouteRule,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Outbound => write!(f, "outbound"),
            EntityKind::RouteRule => write!(f, "route_rule"),
        }
    }
}

/// A single pending edit
///
/// Updates and deletes carry the target identity; creates carry only the
/// new payload. Rule payloads are opaque match/action blobs; the kernel
/// assigns rule identities, so a rule create has no id of its own and is
/// tracked under a client-side draft key instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRecord {
    CreateOutbound {
        node: OutboundNode,
    },
    UpdateOutbound {
        tag: OutboundTag,
        node: OutboundNode,
    },
    DeleteOutbound {
        tag: OutboundTag,
    },
    CreateRule {
        draft_key: Uuid,
        rule: Value,
    },
    UpdateRule {
        id: RuleId,
        rule: Value,
    },
    DeleteRule {
        id: RuleId,
    },
}

/// Deduplication key: at most one record per key lives in a change set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeKey {
    /// Outbounds are tag-identified, creates included
    Outbound(OutboundTag),
    /// Existing rules are identified by their kernel-assigned id
    Rule(RuleId),
    /// Rule drafts have no identity yet; distinct drafts never collapse
    RuleDraft(Uuid),
}

impl ChangeRecord {
    /// Stage a new rule draft under a fresh client-side key
    pub fn create_rule(rule: Value) -> Self {
        ChangeRecord::CreateRule {
            draft_key: Uuid::now_v7(),
            rule,
        }
    }

    /// The entity kind this record touches
    pub fn kind(&self) -> EntityKind {
        match self {
            ChangeRecord::CreateOutbound { .. }
            | ChangeRecord::UpdateOutbound { .. }
            | ChangeRecord::DeleteOutbound { .. } => EntityKind::Outbound,
            ChangeRecord::CreateRule { .. }
            | ChangeRecord::UpdateRule { .. }
            | ChangeRecord::DeleteRule { .. } => EntityKind::RouteRule,
        }
    }

    /// The deduplication key for this record
    pub fn key(&self) -> ChangeKey {
        match self {
            ChangeRecord::CreateOutbound { node } => ChangeKey::Outbound(node.tag.clone()),
            ChangeRecord::UpdateOutbound { tag, .. } => ChangeKey::Outbound(tag.clone()),
            ChangeRecord::DeleteOutbound { tag } => ChangeKey::Outbound(tag.clone()),
            ChangeRecord::CreateRule { draft_key, .. } => ChangeKey::RuleDraft(*draft_key),
            ChangeRecord::UpdateRule { id, .. } => ChangeKey::Rule(id.clone()),
            ChangeRecord::DeleteRule { id } => ChangeKey::Rule(id.clone()),
        }
    }

    /// Human-readable entity reference for diagnostics
    pub fn entity_label(&self) -> String {
        match self {
            ChangeRecord::CreateOutbound { node } => format!("outbound/{}", node.tag),
            ChangeRecord::UpdateOutbound { tag, .. } | ChangeRecord::DeleteOutbound { tag } => {
                format!("outbound/{}", tag)
            }
            ChangeRecord::CreateRule { draft_key, .. } => format!("route_rule/draft-{}", draft_key),
            ChangeRecord::UpdateRule { id, .. } | ChangeRecord::DeleteRule { id } => {
                format!("route_rule/{}", id)
            }
        }
    }

    /// Encode into the `{op, kind, id?, data?}` object the kernel expects
    pub fn to_wire(&self) -> Value {
        match self {
            ChangeRecord::CreateOutbound { node } => json!({
                "op": "create",
                "kind": "outbound",
                "data": node.to_value(),
            }),
            ChangeRecord::UpdateOutbound { tag, node } => json!({
                "op": "update",
                "kind": "outbound",
                "id": tag.as_str(),
                "data": node.to_value(),
            }),
            ChangeRecord::DeleteOutbound { tag } => json!({
                "op": "delete",
                "kind": "outbound",
                "id": tag.as_str(),
            }),
            ChangeRecord::CreateRule { rule, .. } => json!({
                "op": "create",
                "kind": "route_rule",
                "data": rule,
            }),
            ChangeRecord::UpdateRule { id, rule } => json!({
                "op": "update",
                "kind": "route_rule",
                "id": id.as_str(),
                "data": rule,
            }),
            ChangeRecord::DeleteRule { id } => json!({
                "op": "delete",
                "kind": "route_rule",
                "id": id.as_str(),
            }),
        }
    }
}

/// Ordered batch of pending edits
///
/// Invariants: insertion order is application order, and at most one
/// record exists per [`ChangeKey`]: a later edit to the same entity
/// replaces the earlier one in place, keeping the slot of the first
/// insertion so unrelated edits never reorder.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    id: Uuid,
    records: Vec<ChangeRecord>,
}

impl Default for ChangeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSet {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            records: Vec::new(),
        }
    }

    /// Batch identity, carried for logging and commit correlation
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Insert a record, replacing any earlier record with the same key
    /// in its original slot
    pub fn push(&mut self, record: ChangeRecord) {
        let key = record.key();
        match self.records.iter().position(|r| r.key() == key) {
            Some(index) => self.records[index] = record,
            None => self.records.push(record),
        }
    }

    /// True when every record targets an outbound node, which makes the
    /// set eligible for the dedicated batch-save path
    pub fn outbounds_only(&self) -> bool {
        !self.records.is_empty()
            && self
                .records
                .iter()
                .all(|r| r.kind() == EntityKind::Outbound)
    }

    /// Encode all records in application order for the wire
    pub fn to_wire_changes(&self) -> Vec<Value> {
        self.records.iter().map(ChangeRecord::to_wire).collect()
    }

    /// Merge the records into a full configuration document, in
    /// insertion order, returning the records whose update target does
    /// not exist in the document
    ///
    /// This mirrors what the kernel does when applying a change batch
    /// and backs the whole-config validate/commit path: fetch the live
    /// document, merge, submit. An update whose target id/tag is absent
    /// (a stale client cache) has no slot to land in; callers must
    /// surface the returned records instead of reporting success.
    /// Deleting an absent target is a no-op, since the document already
    /// matches the intended state.
    pub fn apply_to_config(&self, config: &mut Value) -> Vec<ChangeRecord> {
        let mut unmatched = Vec::new();
        for record in &self.records {
            match record {
                ChangeRecord::CreateOutbound { node } => {
                    outbounds_mut(config).push(node.to_value());
                }
                ChangeRecord::UpdateOutbound { tag, node } => {
                    let outbounds = outbounds_mut(config);
                    match outbounds
                        .iter_mut()
                        .find(|o| o["tag"].as_str() == Some(tag.as_str()))
                    {
                        Some(slot) => *slot = node.to_value(),
                        None => unmatched.push(record.clone()),
                    }
                }
                ChangeRecord::DeleteOutbound { tag } => {
                    outbounds_mut(config).retain(|o| o["tag"].as_str() != Some(tag.as_str()));
                }
                ChangeRecord::CreateRule { rule, .. } => {
                    rules_mut(config).push(rule.clone());
                }
                ChangeRecord::UpdateRule { id, rule } => {
                    let rules = rules_mut(config);
                    match rules
                        .iter_mut()
                        .find(|r| r["id"].as_str() == Some(id.as_str()))
                    {
                        Some(slot) => *slot = rule.clone(),
                        None => unmatched.push(record.clone()),
                    }
                }
                ChangeRecord::DeleteRule { id } => {
                    rules_mut(config).retain(|r| r["id"].as_str() != Some(id.as_str()));
                }
            }
        }
        sort_rules_by_position(config);
        unmatched
    }
}

/// Rule updates can carry new positions; re-sort so array order and
/// positions agree in the submitted document. Skipped when any rule
/// lacks a position (the kernel assigns them on create).
fn sort_rules_by_position(config: &mut Value) {
    if let Some(rules) = config
        .get_mut("route")
        .and_then(|route| route.get_mut("rules"))
        .and_then(Value::as_array_mut)
    {
        if rules.iter().all(|r| r["position"].is_u64()) {
            rules.sort_by_key(|r| r["position"].as_u64().unwrap_or(0));
        }
    }
}

fn outbounds_mut(config: &mut Value) -> &mut Vec<Value> {
    let object = ensure_object(config);
    let slot = object
        .entry("outbounds")
        .or_insert_with(|| Value::Array(Vec::new()));
    ensure_array(slot)
}

fn rules_mut(config: &mut Value) -> &mut Vec<Value> {
    let object = ensure_object(config);
    let route = object
        .entry("route")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    let slot = ensure_object(route)
        .entry("rules")
        .or_insert_with(|| Value::Array(Vec::new()));
    ensure_array(slot)
}

fn ensure_array(value: &mut Value) -> &mut Vec<Value> {
    if !value.is_array() {
        *value = Value::Array(Vec::new());
    }
    match value {
        Value::Array(array) => array,
        _ => unreachable!(),
    }
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }
    match value {
        Value::Object(object) => object,
        _ => unreachable!(),
    }
}
