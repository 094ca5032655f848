//! Formatter for Claude stream-json events, including partial streaming.
//!
//! `stream_event` envelopes wrap `content_block_{start,delta,stop}`. A
//! `tool_use` block aggregates `input_json_delta` partials into the
//! invocation's argument JSON, parsed at `content_block_stop`. Tool ids
//! seen via stream events are remembered so the consolidated `tool_use`
//! event is not rendered twice.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use super::{extract_detail, message_text, normalize_tool, Formatter, FormatterCore};
use crate::output::Sink;

pub struct ClaudeFormatter {
    core: FormatterCore,
    thinking: bool,
    active_block_type: Option<String>,
    active_tool_name: Option<String>,
    active_tool_json_parts: Vec<String>,
    stream_tool_ids: HashSet<String>,
}

impl ClaudeFormatter {
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            core: FormatterCore::new(sink),
            thinking: false,
            active_block_type: None,
            active_tool_name: None,
            active_tool_json_parts: Vec::new(),
            stream_tool_ids: HashSet::new(),
        }
    }

    fn handle_stream_event(&mut self, event: &Value) {
        let Some(inner) = event.get("event").filter(|v| v.is_object()) else {
            return;
        };
        let inner_type = inner.get("type").and_then(Value::as_str).unwrap_or("");

        match inner_type {
            "content_block_start" => {
                let Some(block) = inner.get("content_block").filter(|v| v.is_object()) else {
                    return;
                };
                let btype = block.get("type").and_then(Value::as_str).unwrap_or("");
                self.active_block_type = Some(btype.to_string());
                if btype == "thinking" {
                    if !self.thinking {
                        self.thinking = true;
                        self.core.info("thinking...");
                    }
                } else if btype == "tool_use" {
                    self.active_tool_name = Some(
                        block
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or("?")
                            .to_string(),
                    );
                    self.active_tool_json_parts.clear();
                    if let Some(tool_id) = block.get("id").and_then(Value::as_str) {
                        if !tool_id.is_empty() {
                            self.stream_tool_ids.insert(tool_id.to_string());
                        }
                    }
                }
            }
            "content_block_delta" => {
                let Some(delta) = inner.get("delta").filter(|v| v.is_object()) else {
                    return;
                };
                match delta.get("type").and_then(Value::as_str) {
                    Some("input_json_delta") => {
                        if let Some(part) = delta.get("partial_json").and_then(Value::as_str) {
                            if !part.is_empty() {
                                self.active_tool_json_parts.push(part.to_string());
                            }
                        }
                    }
                    Some("text_delta") => {
                        if let Some(part) = delta.get("text").and_then(Value::as_str) {
                            self.core.accumulate_delta(part);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if self.active_block_type.as_deref() == Some("tool_use") {
                    if let Some(raw_name) = self.active_tool_name.take() {
                        let canonical = normalize_tool(&raw_name);
                        let raw_json = self.active_tool_json_parts.concat();
                        let input: Value = serde_json::from_str(&raw_json)
                            .unwrap_or(Value::Object(serde_json::Map::new()));
                        let detail = extract_detail(&canonical, &input);
                        self.core.buffer_tool(canonical, detail);
                    }
                }
                self.thinking = false;
                self.active_block_type = None;
                self.active_tool_name = None;
                self.active_tool_json_parts.clear();
            }
            _ => {}
        }
    }
}

impl Formatter for ClaudeFormatter {
    fn process_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            return;
        };

        match event.get("type").and_then(Value::as_str).unwrap_or("") {
            "stream_event" => self.handle_stream_event(&event),
            "assistant" => {
                self.thinking = false;
                // Replace, not append: partial assistant events repeat the
                // accumulated message.
                let msg = message_text(&serde_json::json!({
                    "message": event.get("message").cloned().unwrap_or(Value::Null)
                }));
                self.core.set_summary(&msg);
            }
            "result" => {
                let cost = event
                    .get("cost_usd")
                    .or_else(|| event.get("total_cost_usd"))
                    .and_then(Value::as_f64);
                if let Some(duration_ms) = event.get("duration_ms").and_then(Value::as_f64) {
                    self.core.set_stat_duration(duration_ms / 1000.0);
                }
                if let Some(cost) = cost {
                    self.core.set_stat_cost(cost);
                }
            }
            "tool_use" => {
                self.thinking = false;
                // Skip if already rendered via stream events.
                if let Some(tool_id) = event.get("tool_use_id").and_then(Value::as_str) {
                    if !tool_id.is_empty() && self.stream_tool_ids.contains(tool_id) {
                        return;
                    }
                }
                let raw = event
                    .get("tool")
                    .or_else(|| event.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("?");
                let canonical = normalize_tool(raw);
                let input = event.get("input").cloned().unwrap_or(Value::Null);
                let detail = extract_detail(&canonical, &input);
                self.core.buffer_tool(canonical, detail);
            }
            "tool_result" => {
                let is_error = event
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                self.core.resolve_tool(!is_error);
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
        self.core.flush_pending();
        self.core.print_stats();
        self.core.print_summary();
    }
}
