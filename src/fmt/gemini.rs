//! Formatter for Gemini `--output-format stream-json` events.
//!
//! No deltas; messages arrive whole. `tool_use` buffers until the matching
//! `tool_result`; `result.status` is copied into the stats verbatim.

use std::sync::Arc;

use serde_json::Value;

use super::{extract_detail, normalize_tool, Formatter, FormatterCore};
use crate::output::Sink;

pub struct GeminiFormatter {
    core: FormatterCore,
}

impl GeminiFormatter {
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            core: FormatterCore::new(sink),
        }
    }
}

impl Formatter for GeminiFormatter {
    fn process_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            return;
        };

        match event.get("type").and_then(Value::as_str).unwrap_or("") {
            "tool_use" => {
                let raw = event.get("tool_name").and_then(Value::as_str).unwrap_or("?");
                let canonical = normalize_tool(raw);
                let params = event.get("parameters").cloned().unwrap_or(Value::Null);
                let detail = extract_detail(&canonical, &params);
                self.core.buffer_tool(canonical, detail);
            }
            "tool_result" => {
                let status = event
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_lowercase();
                self.core
                    .resolve_tool(matches!(status.as_str(), "success" | "ok" | ""));
            }
            "message" => {
                if event.get("role").and_then(Value::as_str) == Some("assistant") {
                    if let Some(content) = event.get("content").and_then(Value::as_str) {
                        if !content.is_empty() {
                            self.core.accumulate_whole(content);
                        }
                    }
                }
            }
            "result" => {
                let status = event
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                self.core.set_stat_str("status", status);
                if let Some(duration_ms) = event.get("duration_ms").and_then(Value::as_f64) {
                    self.core.set_stat_duration(duration_ms / 1000.0);
                }
                if let Some(total) = event
                    .get("usage")
                    .and_then(|u| u.get("totalTokens"))
                    .and_then(Value::as_i64)
                {
                    self.core.set_stat_tokens(total);
                }
            }
            "error" => {
                let err = event.get("error").cloned().unwrap_or(Value::Null);
                let msg = match &err {
                    Value::Object(_) => err
                        .get("message")
                        .or_else(|| err.get("details"))
                        .and_then(Value::as_str)
                        .map_or_else(|| err.to_string(), ToString::to_string),
                    Value::String(s) if !s.is_empty() => s.clone(),
                    _ => event
                        .get("message")
                        .and_then(Value::as_str)
                        .map_or_else(|| line.to_string(), ToString::to_string),
                };
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
