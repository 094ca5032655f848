//! Formatter for pi `--mode json` events.
//!
//! `tool_execution_start` / `tool_execution_end` bracket tool calls with an
//! `isError` flag; `message_update` nests an `assistantMessageEvent` whose
//! `text_delta` variants stream assistant text; `message_end` may carry an
//! `error` / `aborted` stop reason.

use std::sync::Arc;

use serde_json::Value;

use super::{extract_detail, normalize_tool, Formatter, FormatterCore};
use crate::output::Sink;

pub struct PiFormatter {
    core: FormatterCore,
}

impl PiFormatter {
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            core: FormatterCore::new(sink),
        }
    }

    fn handle_message_update(&mut self, event: &Value) {
        let Some(assistant_event) = event.get("assistantMessageEvent").filter(|v| v.is_object())
        else {
            return;
        };
        match assistant_event.get("type").and_then(Value::as_str) {
            Some("text_delta") => {
                if let Some(delta) = assistant_event.get("delta").and_then(Value::as_str) {
                    self.core.accumulate_delta(delta);
                }
            }
            Some("error") => {
                let error_value = assistant_event.get("error").cloned().unwrap_or(Value::Null);
                let mut message = "assistant error".to_string();
                if let Value::Object(_) = error_value {
                    for key in ["errorMessage", "message"] {
                        if let Some(value) = error_value.get(key).and_then(Value::as_str) {
                            if !value.is_empty() {
                                message = value.to_string();
                                break;
                            }
                        }
                    }
                }
                self.core.error(&message);
            }
            _ => {}
        }
    }

    fn handle_message_end(&mut self, event: &Value) {
        let Some(message) = event.get("message").filter(|v| v.is_object()) else {
            return;
        };
        if message.get("role").and_then(Value::as_str) != Some("assistant") {
            return;
        }
        let stop_reason = message.get("stopReason").and_then(Value::as_str);
        if let Some(stop_reason @ ("error" | "aborted")) = stop_reason {
            let error_message = message
                .get("errorMessage")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map_or_else(|| format!("assistant {stop_reason}"), ToString::to_string);
            self.core.error(&error_message);
        }
    }
}

impl Formatter for PiFormatter {
    fn process_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            return;
        };

        match event.get("type").and_then(Value::as_str).unwrap_or("") {
            "tool_execution_start" => {
                let raw = event.get("toolName").and_then(Value::as_str).unwrap_or("?");
                let canonical = normalize_tool(raw);
                let args = event.get("args").cloned().unwrap_or(Value::Null);
                let detail = extract_detail(&canonical, &args);
                self.core.buffer_tool(canonical, detail);
            }
            "tool_execution_end" => {
                let is_error = event
                    .get("isError")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                self.core.resolve_tool(!is_error);
            }
            "message_update" => self.handle_message_update(&event),
            "message_end" => self.handle_message_end(&event),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordingSink;
    use serde_json::json;

    fn formatter() -> (PiFormatter, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (PiFormatter::new(sink.clone()), sink)
    }

    fn emit(fmt: &mut PiFormatter, event: Value) {
        fmt.process_line(&event.to_string());
    }

    #[test]
    fn tool_execution_bracketing() {
        let (mut fmt, sink) = formatter();
        emit(
            &mut fmt,
            json!({
                "type": "tool_execution_start",
                "toolCallId": "tool_1",
                "toolName": "bash",
                "args": {"command": "/usr/bin/zsh -lc 'echo hi'"}
            }),
        );
        assert!(sink.tools().is_empty());
        emit(
            &mut fmt,
            json!({"type": "tool_execution_end", "toolCallId": "tool_1",
                   "toolName": "bash", "isError": false}),
        );
        assert_eq!(sink.tools(), vec![("bash".into(), "echo hi".into(), true)]);
    }

    #[test]
    fn tool_execution_error_flag() {
        let (mut fmt, sink) = formatter();
        emit(
            &mut fmt,
            json!({"type": "tool_execution_start", "toolName": "find",
                   "args": {"pattern": "*.rs"}}),
        );
        emit(&mut fmt, json!({"type": "tool_execution_end", "isError": true}));
        assert_eq!(sink.tools(), vec![("glob".into(), "*.rs".into(), false)]);
    }

    #[test]
    fn text_deltas_stream() {
        let (mut fmt, sink) = formatter();
        emit(
            &mut fmt,
            json!({"type": "message_update", "message": {"role": "assistant"},
                   "assistantMessageEvent": {"type": "text_delta",
                   "delta": "Applied pi "}}),
        );
        emit(
            &mut fmt,
            json!({"type": "message_update", "message": {"role": "assistant"},
                   "assistantMessageEvent": {"type": "text_delta",
                   "delta": "backend updates."}}),
        );
        fmt.finish();
        assert_eq!(sink.text(), "Applied pi backend updates.");
    }

    #[test]
    fn thinking_deltas_suppressed() {
        let (mut fmt, sink) = formatter();
        emit(
            &mut fmt,
            json!({"type": "message_update", "message": {"role": "assistant"},
                   "assistantMessageEvent": {"type": "thinking_delta",
                   "delta": "**Planning tests**"}}),
        );
        fmt.finish();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn message_end_error_stop_reason() {
        let (mut fmt, sink) = formatter();
        emit(
            &mut fmt,
            json!({"type": "message_end", "message": {"role": "assistant",
                   "stopReason": "error", "errorMessage": "rate limited"}}),
        );
        assert_eq!(sink.errors(), vec!["rate limited".to_string()]);
    }

    #[test]
    fn message_end_aborted_without_message() {
        let (mut fmt, sink) = formatter();
        emit(
            &mut fmt,
            json!({"type": "message_end", "message": {"role": "assistant",
                   "stopReason": "aborted"}}),
        );
        assert_eq!(sink.errors(), vec!["assistant aborted".to_string()]);
    }

    #[test]
    fn tool_result_payload_suppressed() {
        let (mut fmt, sink) = formatter();
        emit(
            &mut fmt,
            json!({"type": "tool_execution_end", "toolCallId": "tool_1",
                   "toolName": "bash",
                   "result": {"content": [{"type": "text", "text": "hi"}]},
                   "isError": false}),
        );
        // No pending start: nothing rendered.
        assert!(sink.events().is_empty());
    }
}
