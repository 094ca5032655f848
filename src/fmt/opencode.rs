//! Formatter for OpenCode `run --format json` events.
//!
//! Tool calls arrive fully resolved (`tool_use` with a `state.status`), so
//! there is no pending buffering. Errors carry a nested `data.message`.

use std::sync::Arc;

use serde_json::Value;

use super::{extract_detail, normalize_tool, Formatter, FormatterCore};
use crate::output::Sink;

pub struct OpenCodeFormatter {
    core: FormatterCore,
}

impl OpenCodeFormatter {
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            core: FormatterCore::new(sink),
        }
    }
}

impl Formatter for OpenCodeFormatter {
    fn process_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            return;
        };

        match event.get("type").and_then(Value::as_str).unwrap_or("") {
            "tool_use" => {
                let part = event.get("part").cloned().unwrap_or(Value::Null);
                let raw = part.get("tool").and_then(Value::as_str).unwrap_or("?");
                let canonical = normalize_tool(raw);
                let state = part.get("state").cloned().unwrap_or(Value::Null);
                let input = state.get("input").cloned().unwrap_or(Value::Null);
                let detail = extract_detail(&canonical, &input);
                let status = state.get("status").and_then(Value::as_str).unwrap_or("");
                self.core.tool(&canonical, &detail, status != "error");
            }
            "text" => {
                if let Some(text) = event
                    .get("part")
                    .and_then(|p| p.get("text"))
                    .and_then(Value::as_str)
                {
                    if !text.trim().is_empty() {
                        self.core.accumulate_whole(text);
                    }
                }
            }
            "error" => {
                let err = event.get("error").cloned().unwrap_or(Value::Null);
                let msg = match &err {
                    Value::Object(_) => err
                        .get("data")
                        .and_then(|d| d.get("message"))
                        .and_then(Value::as_str)
                        .or_else(|| err.get("message").and_then(Value::as_str))
                        .or_else(|| err.get("name").and_then(Value::as_str))
                        .map_or_else(|| err.to_string(), ToString::to_string),
                    Value::String(s) => s.clone(),
                    _ => line.to_string(),
                };
                self.core.error(&msg);
            }
            _ => {}
        }
    }

    fn finish(&mut self) {
        self.core.print_stats();
        self.core.print_summary();
    }
}
