//! Formatter for Codex JSONL events.
//!
//! Items arrive as `item.started` / `item.completed` pairs keyed by item id.
//! `command_execution` items render as `bash`; other tool item types carry
//! their own tool name. `response.completed` carries usage and status.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::{
    extract_detail, message_text, normalize_tool, parse_json_object, summarize_shell, truncate,
    Formatter, FormatterCore,
};
use crate::output::Sink;

const TOOL_ITEM_TYPES: &[&str] = &[
    "command_execution",
    "tool_call",
    "function_call",
    "web_search_call",
    "file_search_call",
    "computer_call",
    "mcp_call",
];

pub struct CodexFormatter {
    core: FormatterCore,
    pending_by_id: HashMap<String, (String, String)>,
}

impl CodexFormatter {
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            core: FormatterCore::new(sink),
            pending_by_id: HashMap::new(),
        }
    }

    fn is_tool_item_type(item_type: &str) -> bool {
        TOOL_ITEM_TYPES.contains(&item_type)
    }

    fn codex_tool(item: &Value) -> Option<(String, String)> {
        let item_type = item.get("type").and_then(Value::as_str)?;

        if item_type == "command_execution" {
            let cmd = item.get("command").and_then(Value::as_str).unwrap_or("");
            return Some(("bash".to_string(), summarize_shell(cmd, 120)));
        }
        if !Self::is_tool_item_type(item_type) {
            return None;
        }

        let raw_name = ["tool_name", "tool", "name"]
            .iter()
            .find_map(|key| {
                item.get(*key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
            })
            .map_or_else(
                || item_type.trim_end_matches("_call").to_string(),
                ToString::to_string,
            );
        let canonical = normalize_tool(&raw_name);

        let mut params = Value::Object(serde_json::Map::new());
        for key in ["input", "parameters", "args", "arguments"] {
            if let Some(raw) = item.get(key) {
                let parsed = parse_json_object(raw);
                if parsed.as_object().is_some_and(|m| !m.is_empty()) {
                    params = parsed;
                    break;
                }
            }
        }

        let mut detail = extract_detail(&canonical, &params);
        if detail.is_empty() {
            for key in ["query", "prompt", "path"] {
                if let Some(value) = item.get(key).and_then(Value::as_str) {
                    if !value.is_empty() {
                        detail = truncate(value, 100);
                        break;
                    }
                }
            }
        }
        Some((canonical, detail))
    }

    fn buffer_tool_item(&mut self, item: &Value) {
        let Some((name, detail)) = Self::codex_tool(item) else {
            return;
        };
        match item.get("id").and_then(Value::as_str) {
            Some(item_id) if !item_id.is_empty() => {
                self.pending_by_id.insert(item_id.to_string(), (name, detail));
            }
            _ => self.core.buffer_tool(name, detail),
        }
    }

    fn resolve_tool_item(&mut self, item: &Value) {
        let exit_code = item.get("exit_code").and_then(Value::as_i64);
        let mut ok = exit_code.map_or(true, |code| code == 0);
        if let Some(status) = item.get("status").and_then(Value::as_str) {
            let status = status.to_lowercase();
            if ["error", "failed", "aborted"].contains(&status.as_str()) {
                ok = false;
            } else if ["success", "completed", "ok"].contains(&status.as_str())
                && exit_code.is_none()
            {
                ok = true;
            }
        }

        if let Some(item_id) = item.get("id").and_then(Value::as_str) {
            if let Some((name, detail)) = self.pending_by_id.remove(item_id) {
                self.core.tool(&name, &detail, ok);
                return;
            }
        }
        self.core.resolve_tool(ok);
    }

    fn handle_completed(&mut self, item: &Value) {
        let item_type = item.get("type").and_then(Value::as_str).unwrap_or("");
        if Self::is_tool_item_type(item_type) {
            self.resolve_tool_item(item);
        } else if ["message", "agent_message", "assistant_message"].contains(&item_type) {
            let content = message_text(item);
            if !content.is_empty() {
                if item.get("role").and_then(Value::as_str) == Some("user") {
                    self.core.prompt_echo(&content);
                } else {
                    self.core.accumulate_whole(&content);
                }
            }
        } else if item_type == "file_change" {
            if let Some(changes) = item.get("changes").and_then(Value::as_array) {
                for change in changes {
                    let path = change.get("path").and_then(Value::as_str).unwrap_or("");
                    let kind = change.get("kind").and_then(Value::as_str).unwrap_or("update");
                    let canonical = if kind == "create" { "write" } else { "edit" };
                    self.core.tool(canonical, path, true);
                }
            }
        } else if item_type == "usage" {
            if let Some(total) = item
                .get("usage")
                .and_then(|u| u.get("total_tokens"))
                .and_then(Value::as_i64)
            {
                self.core.set_stat_tokens(total);
            }
        }
    }
}

impl Formatter for CodexFormatter {
    fn process_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            return;
        };

        let etype = event.get("type").and_then(Value::as_str).unwrap_or("");
        let item = event.get("item").cloned().unwrap_or(Value::Null);
        let item_type = item.get("type").and_then(Value::as_str).unwrap_or("");

        match etype {
            "item.started" => {
                if Self::is_tool_item_type(item_type) {
                    self.buffer_tool_item(&item);
                }
            }
            "item.completed" => {
                if item.is_object() {
                    self.handle_completed(&item);
                }
            }
            "response.completed" => {
                if let Some(total) = event
                    .get("usage")
                    .and_then(|u| u.get("total_tokens"))
                    .and_then(Value::as_i64)
                {
                    self.core.set_stat_tokens(total);
                }
                if let Some(status) = event.get("status").and_then(Value::as_str) {
                    if !status.is_empty() {
                        self.core.set_stat_str("status", status);
                    }
                }
            }
            "error" => {
                let msg = event
                    .get("error")
                    .and_then(Value::as_str)
                    .map_or_else(|| event.to_string(), ToString::to_string);
                self.core.error(&msg);
            }
            _ => {}
        }
    }

    fn finish(&mut self) {
        let pending: Vec<(String, String)> = self.pending_by_id.drain().map(|(_, v)| v).collect();
        for (name, detail) in pending {
            self.core.tool(&name, &detail, true);
        }
        self.core.flush_pending();
        self.core.print_stats();
        self.core.print_summary();
    }
}
