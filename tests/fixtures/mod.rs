//! Test fixtures: an in-memory mock kernel
//!
//! `MockKernel` implements [`ApiTransport`] over an in-memory
//! configuration document and models the kernel contract the client
//! depends on: dry-run validation with no side effects, record-by-record
//! batch application with optional snapshot/rollback, dense rule
//! ordering, and the `{code, message, data}` reply envelope. An outbound
//! or rule object carrying `"broken": true` is treated as invalid, which
//! lets tests force a failure at a chosen point in a change batch.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use singbox_console::{ApiEnvelope, ApiTransport, ConsoleError, ConsoleResult, Method};

pub struct MockKernel {
    state: Mutex<KernelState>,
    /// Simulate an unreachable gateway
    pub offline: AtomicBool,
    /// Make POST /singbox/restart fail
    pub restart_fails: AtomicBool,
    apply_in_flight: AtomicUsize,
    /// Set when two apply calls were observed overlapping
    pub apply_overlap: AtomicBool,
}

struct KernelState {
    config: Value,
    backup_seq: usize,
    restart_count: usize,
    services: HashMap<String, String>,
    service_configs: HashMap<String, String>,
    service_logs: HashMap<String, Vec<String>>,
    counters: HashMap<String, usize>,
}

impl MockKernel {
    /// A gateway with three outbounds and three route rules
    pub fn seeded() -> Self {
        let config = json!({
            "log": { "level": "info" },
            "inbounds": [
                { "tag": "mixed-in", "type": "mixed", "listen": "127.0.0.1", "listen_port": 2080 }
            ],
            "outbounds": [
                { "tag": "direct", "type": "direct" },
                { "tag": "proxy-a", "type": "socks", "server": "a.example" },
                { "tag": "proxy-b", "type": "socks", "server": "b.example" }
            ],
            "route": {
                "rules": [
                    { "id": "r1", "position": 0, "domain_suffix": ".lan", "outbound": "direct" },
                    { "id": "r2", "position": 1, "domain_suffix": ".corp", "outbound": "proxy-a" },
                    { "id": "r3", "position": 2, "ip_is_private": true, "outbound": "direct" }
                ],
                "rule_set": [
                    { "tag": "geoip-cn", "type": "remote", "format": "binary" }
                ]
            }
        });

        let mut services = HashMap::new();
        services.insert("sing-box".to_string(), "running".to_string());
        services.insert("dns".to_string(), "running".to_string());

        let mut service_logs = HashMap::new();
        service_logs.insert(
            "dns".to_string(),
            vec![
                "started".to_string(),
                "query a.example".to_string(),
                "query b.example".to_string(),
            ],
        );
        let mut service_configs = HashMap::new();
        service_configs.insert("dns".to_string(), "listen: 127.0.0.1:53\n".to_string());

        Self {
            state: Mutex::new(KernelState {
                config,
                backup_seq: 0,
                restart_count: 0,
                services,
                service_configs,
                service_logs,
                counters: HashMap::new(),
            }),
            offline: AtomicBool::new(false),
            restart_fails: AtomicBool::new(false),
            apply_in_flight: AtomicUsize::new(0),
            apply_overlap: AtomicBool::new(false),
        }
    }

    /// How many times an endpoint was hit (query strings stripped)
    pub fn count(&self, method_and_path: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.counters.get(method_and_path).copied().unwrap_or(0)
    }

    pub fn restart_count(&self) -> usize {
        self.state.lock().unwrap().restart_count
    }

    /// Current live configuration document
    pub fn live_config(&self) -> Value {
        self.state.lock().unwrap().config.clone()
    }

    /// The outbound object with the given tag, if configured
    pub fn outbound(&self, tag: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state.config["outbounds"]
            .as_array()
            .and_then(|outbounds| {
                outbounds
                    .iter()
                    .find(|o| o["tag"].as_str() == Some(tag))
                    .cloned()
            })
    }

    /// Configured rule set tags
    pub fn ruleset_tags(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.config["route"]["rule_set"]
            .as_array()
            .map(|sets| {
                sets.iter()
                    .filter_map(|s| s["tag"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rule ids in evaluation order
    pub fn rule_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.config["route"]["rules"]
            .as_array()
            .map(|rules| {
                rules
                    .iter()
                    .filter_map(|r| r["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Validate a configuration document the way the kernel's checker does
fn validate_document(config: &Value) -> Vec<Value> {
    let mut diagnostics = Vec::new();
    if let Some(outbounds) = config["outbounds"].as_array() {
        for outbound in outbounds {
            if outbound["broken"].as_bool() == Some(true) {
                let tag = outbound["tag"].as_str().unwrap_or("?");
                diagnostics.push(json!({
                    "entity": format!("outbound/{}", tag),
                    "message": "unsupported outbound parameters",
                }));
            }
        }
    }
    if let Some(rules) = config["route"]["rules"].as_array() {
        for rule in rules {
            if rule["broken"].as_bool() == Some(true) {
                let id = rule["id"].as_str().unwrap_or("?");
                diagnostics.push(json!({
                    "entity": format!("route_rule/{}", id),
                    "message": "unsupported rule parameters",
                }));
            }
        }
    }
    diagnostics
}

fn validation_reply(config: &Value) -> Value {
    let diagnostics = validate_document(config);
    json!({ "valid": diagnostics.is_empty(), "diagnostics": diagnostics })
}

/// Apply one `{op, kind, id?, data?}` change to a document; returns a
/// diagnostic when the record is refused
fn apply_change(config: &mut Value, change: &Value) -> Result<(), Value> {
    let op = change["op"].as_str().unwrap_or("");
    let kind = change["kind"].as_str().unwrap_or("");
    let data = &change["data"];

    if data["broken"].as_bool() == Some(true) {
        let entity = match kind {
            "outbound" => format!(
                "outbound/{}",
                change["id"]
                    .as_str()
                    .or_else(|| data["tag"].as_str())
                    .unwrap_or("?")
            ),
            _ => format!("route_rule/{}", change["id"].as_str().unwrap_or("draft")),
        };
        return Err(json!({
            "entity": entity,
            "message": "unsupported parameters",
        }));
    }

    match (kind, op) {
        ("outbound", "create") => {
            config["outbounds"].as_array_mut().unwrap().push(data.clone());
        }
        ("outbound", "update") => {
            let tag = change["id"].as_str().unwrap_or("");
            match config["outbounds"]
                .as_array_mut()
                .unwrap()
                .iter_mut()
                .find(|o| o["tag"].as_str() == Some(tag))
            {
                Some(slot) => *slot = data.clone(),
                None => {
                    return Err(json!({
                        "entity": format!("outbound/{}", tag),
                        "message": "target not found",
                    }))
                }
            }
        }
        ("outbound", "delete") => {
            let tag = change["id"].as_str().unwrap_or("");
            config["outbounds"]
                .as_array_mut()
                .unwrap()
                .retain(|o| o["tag"].as_str() != Some(tag));
        }
        ("route_rule", "create") => {
            let rules = config["route"]["rules"].as_array_mut().unwrap();
            let mut rule = data.clone();
            rule["id"] = json!(format!("r{}", rules.len() + 1));
            rules.push(rule);
        }
        ("route_rule", "update") => {
            let id = change["id"].as_str().unwrap_or("");
            match config["route"]["rules"]
                .as_array_mut()
                .unwrap()
                .iter_mut()
                .find(|r| r["id"].as_str() == Some(id))
            {
                Some(slot) => *slot = data.clone(),
                None => {
                    return Err(json!({
                        "entity": format!("route_rule/{}", id),
                        "message": "target not found",
                    }))
                }
            }
        }
        ("route_rule", "delete") => {
            let id = change["id"].as_str().unwrap_or("");
            config["route"]["rules"]
                .as_array_mut()
                .unwrap()
                .retain(|r| r["id"].as_str() != Some(id));
        }
        _ => {}
    }
    Ok(())
}

fn renumber_rules(config: &mut Value) {
    if let Some(rules) = config["route"]["rules"].as_array_mut() {
        for (index, rule) in rules.iter_mut().enumerate() {
            rule["position"] = json!(index);
        }
    }
}

impl KernelState {
    fn take_backup(&mut self) -> String {
        self.backup_seq += 1;
        format!("/etc/sing-box/config.json.backup.{}", self.backup_seq)
    }

    fn batch_save(&mut self, body: &Value) -> ApiEnvelope {
        let empty = Vec::new();
        let changes = body["changes"].as_array().unwrap_or(&empty);
        let backup = body["backup"].as_bool().unwrap_or(true);
        let enable_rollback = body["enable_rollback"].as_bool().unwrap_or(false);
        let total = changes.len();

        let snapshot = self.config.clone();
        let backup_path = if backup || enable_rollback {
            Some(self.take_backup())
        } else {
            None
        };

        let mut applied = 0usize;
        for change in changes {
            match apply_change(&mut self.config, change) {
                Ok(()) => applied += 1,
                Err(failed) => {
                    if enable_rollback {
                        self.config = snapshot;
                        return ApiEnvelope::success(json!({
                            "applied": 0,
                            "total": total,
                            "rolled_back": true,
                            "failed": failed,
                            "backup_path": backup_path,
                            "needs_restart": false,
                        }));
                    }
                    renumber_rules(&mut self.config);
                    return ApiEnvelope::success(json!({
                        "applied": applied,
                        "total": total,
                        "rolled_back": false,
                        "failed": failed,
                        "backup_path": backup_path,
                        "needs_restart": applied > 0,
                    }));
                }
            }
        }

        renumber_rules(&mut self.config);
        ApiEnvelope::success(json!({
            "applied": applied,
            "total": total,
            "rolled_back": false,
            "backup_path": backup_path,
            "needs_restart": true,
        }))
    }

    fn replace_config(&mut self, body: &Value) -> ApiEnvelope {
        let new_config = body["config"].clone();
        let backup = body["backup"].as_bool().unwrap_or(true);

        let diagnostics = validate_document(&new_config);
        if let Some(first) = diagnostics.first() {
            return ApiEnvelope::error(
                400,
                format!(
                    "configuration check failed: {}: {}",
                    first["entity"].as_str().unwrap_or("?"),
                    first["message"].as_str().unwrap_or("invalid")
                ),
            );
        }

        let backup_path = if backup { Some(self.take_backup()) } else { None };
        self.config = new_config;
        renumber_rules(&mut self.config);
        ApiEnvelope::success(json!({
            "applied": 1,
            "total": 1,
            "rolled_back": false,
            "backup_path": backup_path,
            "needs_restart": true,
        }))
    }

    fn move_rule(&mut self, id: &str, delta: isize) -> ApiEnvelope {
        let rules = match self.config["route"]["rules"].as_array_mut() {
            Some(rules) => rules,
            None => return ApiEnvelope::error(404, "no rules configured"),
        };
        let from = match rules.iter().position(|r| r["id"].as_str() == Some(id)) {
            Some(index) => index,
            None => return ApiEnvelope::error(404, format!("rule not found: {}", id)),
        };
        let to = from as isize + delta;
        if to < 0 || to as usize >= rules.len() {
            return ApiEnvelope::error(400, "move out of bounds");
        }
        rules.swap(from, to as usize);
        renumber_rules(&mut self.config);
        ApiEnvelope::success(json!({ "from": from, "to": to }))
    }

    fn create_ruleset(&mut self, body: &Value) -> ApiEnvelope {
        let tag = match body["tag"].as_str() {
            Some(tag) if !tag.is_empty() => tag.to_string(),
            _ => return ApiEnvelope::error(400, "rule set tag is required"),
        };
        let sets = self.config["route"]["rule_set"].as_array_mut().unwrap();
        if sets.iter().any(|s| s["tag"].as_str() == Some(tag.as_str())) {
            return ApiEnvelope::error(400, format!("rule set tag already exists: {}", tag));
        }
        sets.push(body.clone());
        ApiEnvelope::success(Value::Null)
    }

    fn update_ruleset(&mut self, tag: &str, body: &Value) -> ApiEnvelope {
        let sets = self.config["route"]["rule_set"].as_array_mut().unwrap();
        match sets.iter_mut().find(|s| s["tag"].as_str() == Some(tag)) {
            Some(slot) => {
                let mut replacement = body.clone();
                replacement["tag"] = json!(tag);
                *slot = replacement;
                ApiEnvelope::success(Value::Null)
            }
            None => ApiEnvelope::error(404, format!("rule set not found: {}", tag)),
        }
    }

    fn delete_ruleset(&mut self, tag: &str) -> ApiEnvelope {
        let sets = self.config["route"]["rule_set"].as_array_mut().unwrap();
        let before = sets.len();
        sets.retain(|s| s["tag"].as_str() != Some(tag));
        if sets.len() == before {
            ApiEnvelope::error(404, format!("rule set not found: {}", tag))
        } else {
            ApiEnvelope::success(Value::Null)
        }
    }

    fn reorder_rules(&mut self, body: &Value) -> ApiEnvelope {
        let empty = Vec::new();
        let ids: Vec<&str> = body["rule_ids"]
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        let rules = self.config["route"]["rules"].as_array().cloned().unwrap_or_default();
        if ids.len() != rules.len() {
            return ApiEnvelope::error(400, "rule id count mismatch");
        }

        let mut reordered = Vec::with_capacity(rules.len());
        for id in &ids {
            match rules.iter().find(|r| r["id"].as_str() == Some(*id)) {
                Some(rule) => reordered.push(rule.clone()),
                None => return ApiEnvelope::error(400, format!("unknown rule id: {}", id)),
            }
        }

        self.config["route"]["rules"] = Value::Array(reordered);
        renumber_rules(&mut self.config);
        ApiEnvelope::success(json!({ "rules": self.config["route"]["rules"] }))
    }
}

#[async_trait]
impl ApiTransport for MockKernel {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ConsoleResult<Value> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ConsoleError::Transport(
                "connection refused (mock offline)".to_string(),
            ));
        }

        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let body = body.unwrap_or(Value::Null);

        {
            let mut state = self.state.lock().unwrap();
            *state
                .counters
                .entry(format!("{} {}", method, path))
                .or_insert(0) += 1;
        }

        // Apply endpoints track overlap so tests can prove commits are
        // serialized; the yields give an unserialized pair a chance to
        // interleave.
        let is_apply = matches!(
            (method, path),
            (Method::Post, "/singbox/outbounds/batch-save") | (Method::Put, "/singbox/config")
        );
        if is_apply {
            if self.apply_in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.apply_overlap.store(true, Ordering::SeqCst);
            }
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }

        let envelope = self.dispatch(method, path, query, &body);

        if is_apply {
            self.apply_in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        envelope.into_data()
    }
}

impl MockKernel {
    fn dispatch(&self, method: Method, path: &str, query: Option<&str>, body: &Value) -> ApiEnvelope {
        let mut state = self.state.lock().unwrap();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        match (method, segments.as_slice()) {
            (Method::Get, ["singbox", "config"]) => ApiEnvelope::success(state.config.clone()),
            (Method::Put, ["singbox", "config"]) => state.replace_config(body),
            (Method::Post, ["singbox", "config", "validate"]) => {
                ApiEnvelope::success(validation_reply(&body["config"]))
            }
            (Method::Post, ["singbox", "config", "validate-current"]) => {
                ApiEnvelope::success(validation_reply(&state.config))
            }

            (Method::Get, ["singbox", "outbounds"]) => ApiEnvelope::success(json!({
                "outbounds": state.config["outbounds"],
            })),
            (Method::Post, ["singbox", "outbounds", "validate"]) => {
                let mut staged = state.config.clone();
                let empty = Vec::new();
                for change in body["changes"].as_array().unwrap_or(&empty) {
                    if let Err(failed) = apply_change(&mut staged, change) {
                        return ApiEnvelope::success(json!({
                            "valid": false,
                            "diagnostics": [failed],
                        }));
                    }
                }
                ApiEnvelope::success(validation_reply(&staged))
            }
            (Method::Post, ["singbox", "outbounds", "batch-save"]) => state.batch_save(body),
            (Method::Post, ["singbox", "outbounds"]) => {
                let change = json!({ "op": "create", "kind": "outbound", "data": body });
                match apply_change(&mut state.config, &change) {
                    Ok(()) => ApiEnvelope::success(Value::Null),
                    Err(failed) => {
                        ApiEnvelope::error(400, failed["message"].as_str().unwrap_or("invalid"))
                    }
                }
            }
            (Method::Put, ["singbox", "outbounds", tag]) => {
                let change = json!({ "op": "update", "kind": "outbound", "id": tag, "data": body });
                match apply_change(&mut state.config, &change) {
                    Ok(()) => ApiEnvelope::success(Value::Null),
                    Err(failed) => {
                        ApiEnvelope::error(400, failed["message"].as_str().unwrap_or("invalid"))
                    }
                }
            }
            (Method::Delete, ["singbox", "outbounds", tag]) => {
                let change = json!({ "op": "delete", "kind": "outbound", "id": tag });
                let _ = apply_change(&mut state.config, &change);
                ApiEnvelope::success(Value::Null)
            }

            (Method::Get, ["singbox", "rules", "route"]) => ApiEnvelope::success(json!({
                "rules": state.config["route"]["rules"],
            })),
            (Method::Post, ["singbox", "rules", "route", "reorder"]) => state.reorder_rules(body),
            (Method::Post, ["singbox", "rules", "route", id, "move-up"]) => {
                state.move_rule(id, -1)
            }
            (Method::Post, ["singbox", "rules", "route", id, "move-down"]) => {
                state.move_rule(id, 1)
            }
            (Method::Post, ["singbox", "rules", "route"]) => {
                let change = json!({ "op": "create", "kind": "route_rule", "data": body });
                match apply_change(&mut state.config, &change) {
                    Ok(()) => {
                        renumber_rules(&mut state.config);
                        ApiEnvelope::success(Value::Null)
                    }
                    Err(failed) => {
                        ApiEnvelope::error(400, failed["message"].as_str().unwrap_or("invalid"))
                    }
                }
            }
            (Method::Put, ["singbox", "rules", "route", id]) => {
                let change = json!({ "op": "update", "kind": "route_rule", "id": id, "data": body });
                match apply_change(&mut state.config, &change) {
                    Ok(()) => ApiEnvelope::success(Value::Null),
                    Err(failed) => {
                        ApiEnvelope::error(400, failed["message"].as_str().unwrap_or("invalid"))
                    }
                }
            }
            (Method::Delete, ["singbox", "rules", "route", id]) => {
                let change = json!({ "op": "delete", "kind": "route_rule", "id": id });
                let _ = apply_change(&mut state.config, &change);
                renumber_rules(&mut state.config);
                ApiEnvelope::success(Value::Null)
            }

            (Method::Post, ["singbox", "restart"]) => {
                if self.restart_fails.load(Ordering::SeqCst) {
                    ApiEnvelope::error(500, "kernel failed to start: invalid runtime state")
                } else {
                    state.restart_count += 1;
                    ApiEnvelope::success(Value::Null)
                }
            }
            (Method::Get, ["singbox", "kernel", "detect-path"]) => ApiEnvelope::success(json!({
                "path": "/usr/local/bin/sing-box",
                "detection_method": "systemctl",
                "file_size": 28311552u64,
                "modified_at": "2026-08-01T08:30:00Z",
            })),
            (Method::Get, ["singbox", "kernel", "check-update"]) => ApiEnvelope::success(json!({
                "has_update": true,
                "current_version": "1.9.0",
                "latest_version": "1.10.1",
                "published_at": "2026-07-20T00:00:00Z",
                "download_url": "https://example.com/sing-box-1.10.1.tar.gz",
            })),
            (Method::Post, ["singbox", "kernel", "update"]) => ApiEnvelope::success(Value::Null),

            (Method::Get, ["singbox", "inbounds"]) => ApiEnvelope::success(json!({
                "inbounds": state.config["inbounds"],
            })),
            (Method::Post, ["singbox", "rulesets"]) => state.create_ruleset(body),
            (Method::Put, ["singbox", "rulesets", tag]) => state.update_ruleset(tag, body),
            (Method::Delete, ["singbox", "rulesets", tag]) => state.delete_ruleset(tag),

            (Method::Get, ["services"]) => {
                let mut services: Vec<Value> = state
                    .services
                    .iter()
                    .map(|(name, status)| json!({ "name": name, "status": status }))
                    .collect();
                services.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
                ApiEnvelope::success(json!({ "services": services }))
            }
            (Method::Get, ["services", name]) => match state.services.get(*name) {
                Some(status) => {
                    ApiEnvelope::success(json!({ "name": name, "status": status }))
                }
                None => ApiEnvelope::error(404, format!("unknown service: {}", name)),
            },
            (Method::Post, ["services", name, "action"]) => {
                let action = body["action"].as_str().unwrap_or("");
                let new_status = match action {
                    "start" | "restart" => Some("running"),
                    "stop" => Some("stopped"),
                    _ => None,
                };
                match (new_status, state.services.get_mut(*name)) {
                    (None, _) => {
                        ApiEnvelope::error(400, format!("unsupported action: {}", action))
                    }
                    (_, None) => ApiEnvelope::error(404, format!("unknown service: {}", name)),
                    (Some(new_status), Some(status)) => {
                        *status = new_status.to_string();
                        ApiEnvelope::success(json!({
                            "success": true,
                            "message": format!("{} applied to {}", action, name),
                            "service_info": { "name": name, "status": status.clone() },
                        }))
                    }
                }
            }

            (Method::Get, ["config", service]) => match state.service_configs.get(*service) {
                Some(content) => ApiEnvelope::success(json!({
                    "path": format!("/etc/{}/config.yaml", service),
                    "content": content,
                    "last_modified": "2026-08-10T12:00:00Z",
                    "size": content.len(),
                })),
                None => ApiEnvelope::error(404, format!("unknown service: {}", service)),
            },
            (Method::Put, ["config", service]) => {
                let content = body["content"].as_str().unwrap_or("").to_string();
                let backup = body["backup"].as_bool().unwrap_or(true);
                let backup_path = backup.then(|| format!("/etc/{}/config.yaml.backup", service));
                state.service_configs.insert(service.to_string(), content);
                ApiEnvelope::success(json!({ "backup_path": backup_path }))
            }
            (Method::Get, ["logs", service]) => {
                let lines: Vec<String> = state
                    .service_logs
                    .get(*service)
                    .cloned()
                    .unwrap_or_default();
                let total = lines.len();
                let mut keyword = None;
                let mut limit = 100usize;
                for pair in query.unwrap_or("").split('&') {
                    match pair.split_once('=') {
                        Some(("lines", v)) => limit = v.parse().unwrap_or(100),
                        Some(("filter_keyword", v)) if !v.is_empty() => {
                            keyword = Some(
                                urlencoding::decode(v)
                                    .map(|s| s.into_owned())
                                    .unwrap_or_else(|_| v.to_string()),
                            )
                        }
                        _ => {}
                    }
                }
                let filtered: Vec<String> = lines
                    .into_iter()
                    .filter(|line| keyword.as_deref().map_or(true, |k| line.contains(k)))
                    .collect();
                let tail: Vec<String> = filtered
                    .iter()
                    .rev()
                    .take(limit)
                    .rev()
                    .cloned()
                    .collect();
                ApiEnvelope::success(json!({
                    "content": tail.join("\n"),
                    "total_lines": total,
                    "filtered_lines": filtered.len(),
                }))
            }

            _ => ApiEnvelope::error(404, format!("no such endpoint: {} {}", method, path)),
        }
    }
}
