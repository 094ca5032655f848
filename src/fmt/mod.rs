//! Streaming formatters for backend output.
//!
//! Each backend pairs with a formatter that consumes JSON lines and emits
//! structured updates to the [`Sink`]: tool invocations (one line each),
//! live or whole assistant text, statistics, and errors. Malformed JSON
//! lines are dropped; unknown event types and tool names downgrade
//! gracefully.

mod claude;
mod codex;
mod gemini;
mod opencode;
mod pi;

pub use claude::ClaudeFormatter;
pub use codex::CodexFormatter;
pub use gemini::GeminiFormatter;
pub use opencode::OpenCodeFormatter;
pub use pi::PiFormatter;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::output::{Sink, Style};

/// Consumes backend output lines and drives the sink.
///
/// Single-threaded: lines arrive in stream order and must never block the
/// reader beyond the sink call itself.
pub trait Formatter: Send {
    /// Feed one complete output line.
    fn process_line(&mut self, line: &str);
    /// Flush pending state after the stream ends.
    fn finish(&mut self);
}

/// Formatter for a backend name; unknown names get the codex formatter.
#[must_use]
pub fn get_formatter(backend_name: &str, sink: Arc<dyn Sink>) -> Box<dyn Formatter> {
    match backend_name {
        "claude" => Box::new(ClaudeFormatter::new(sink)),
        "opencode" => Box::new(OpenCodeFormatter::new(sink)),
        "gemini" => Box::new(GeminiFormatter::new(sink)),
        "pi" => Box::new(PiFormatter::new(sink)),
        _ => Box::new(CodexFormatter::new(sink)),
    }
}

static SHELL_WRAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^/\S+\s+-lc\s+(.+)$").expect("shell wrap regex"));
static CD_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^cd\s+\S+\s*&&\s*").expect("cd prefix regex"));

/// Canonical tool name aliases across the vendor dialects.
static TOOL_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // Claude / generic
        ("read", "read"),
        ("write", "write"),
        ("edit", "edit"),
        ("bash", "bash"),
        ("glob", "glob"),
        ("grep", "grep"),
        ("task", "task"),
        // Gemini
        ("read_file", "read"),
        ("write_file", "write"),
        ("replace", "edit"),
        ("run_shell_command", "bash"),
        ("search_file_content", "grep"),
        // Pi
        ("find", "glob"),
        // Local function tools
        ("exec_command", "bash"),
        ("write_stdin", "bash"),
        ("parallel", "task"),
        ("apply_patch", "edit"),
        ("image_query", "search"),
        ("search_query", "search"),
        ("open", "read"),
        ("click", "read"),
        ("screenshot", "read"),
    ])
});

/// Map a backend-specific tool name to its canonical lowercase name.
/// Dotted names reduce to the segment after the last dot; `mcp__*` tools
/// are delegations; unknown names pass through unchanged.
#[must_use]
pub fn normalize_tool(raw_name: &str) -> String {
    let name = raw_name.trim();
    if name.is_empty() {
        return "tool".to_string();
    }
    let name = name.rsplit('.').next().unwrap_or(name);
    if name.starts_with("mcp__") {
        return "task".to_string();
    }
    let name = name.to_lowercase();
    TOOL_ALIASES
        .get(name.as_str())
        .map_or(name.clone(), |canonical| (*canonical).to_string())
}

/// Style class for a canonical tool name.
#[must_use]
pub fn tool_style(canonical_name: &str, ok: bool) -> Style {
    if !ok {
        return Style::Error;
    }
    match canonical_name {
        "edit" | "write" => Style::Mutate,
        "read" | "glob" | "grep" | "search" => Style::Observe,
        "bash" => Style::Execute,
        "task" => Style::Delegate,
        _ => Style::Dim,
    }
}

/// Extract the inner command from `/bin/zsh -lc '...'` wrappers and strip a
/// leading `cd <dir> && `.
#[must_use]
pub fn strip_shell(cmd: &str) -> String {
    let mut cmd = cmd.to_string();
    if let Some(caps) = SHELL_WRAP_RE.captures(&cmd) {
        let mut inner = caps[1].trim().to_string();
        let quoted = (inner.starts_with('\'') && inner.ends_with('\''))
            || (inner.starts_with('"') && inner.ends_with('"'));
        if quoted && inner.len() >= 2 {
            inner = inner[1..inner.len() - 1].to_string();
        }
        cmd = inner;
    }
    CD_PREFIX_RE.replace(&cmd, "").into_owned()
}

/// One-line summary of a shell command: unwrap, drop `set -euo pipefail`,
/// first non-empty line plus a `(+N more lines)` marker, truncated.
#[must_use]
pub fn summarize_shell(cmd: &str, max_len: usize) -> String {
    let raw = strip_shell(cmd).trim().replace("\\n", "\n");
    if raw.is_empty() {
        return String::new();
    }
    let mut lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines
        .first()
        .is_some_and(|line| line.starts_with("set -euo pipefail"))
    {
        lines.remove(0);
    }
    let flattened;
    if lines.is_empty() {
        flattened = raw.replace('\n', " ").trim().to_string();
        lines.push(flattened.as_str());
    }
    let mut head = lines[0].to_string();
    if lines.len() > 1 {
        head = format!("{head} (+{} more lines)", lines.len() - 1);
    }
    truncate(&head, max_len)
}

/// Truncate to `n` chars, ellipsis included.
#[must_use]
pub fn truncate(s: &str, n: usize) -> String {
    if s.chars().count() > n {
        let cut: String = s.chars().take(n.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}

/// Parse a JSON object from a value that may be an object already or an
/// embedded JSON string. Anything else yields an empty object.
#[must_use]
pub fn parse_json_object(raw: &Value) -> Value {
    match raw {
        Value::Object(_) => raw.clone(),
        Value::String(s) if !s.trim().is_empty() => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::Object(serde_json::Map::new()),
        },
        _ => Value::Object(serde_json::Map::new()),
    }
}

/// Pull assistant text out of the various message shapes: `text`,
/// `output_text`, a `content` string or list of parts, or a nested
/// `message` object.
#[must_use]
pub fn message_text(item: &Value) -> String {
    if let Some(text) = item.get("text").and_then(Value::as_str) {
        if !text.is_empty() {
            return text.to_string();
        }
    }
    if let Some(text) = item.get("output_text").and_then(Value::as_str) {
        if !text.is_empty() {
            return text.to_string();
        }
    }
    match item.get("content") {
        Some(Value::String(content)) => return content.clone(),
        Some(Value::Array(parts)) => {
            let mut collected: Vec<String> = Vec::new();
            for part in parts {
                match part {
                    Value::String(s) if !s.is_empty() => collected.push(s.clone()),
                    Value::Object(_) => {
                        for key in ["text", "content", "output_text"] {
                            if let Some(s) = part.get(key).and_then(Value::as_str) {
                                if !s.is_empty() {
                                    collected.push(s.to_string());
                                    break;
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            return collected.join("\n");
        }
        _ => {}
    }
    if let Some(message @ Value::Object(_)) = item.get("message") {
        return message_text(message);
    }
    String::new()
}

/// Extract a human-readable detail string from tool parameters.
#[must_use]
pub fn extract_detail(canonical_name: &str, params: &Value) -> String {
    let Value::Object(_) = params else {
        return String::new();
    };
    let str_field = |key: &str| -> Option<String> {
        params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    };

    match canonical_name {
        "read" | "glob" | "grep" => {
            for key in ["file_path", "filePath", "path", "pattern", "query"] {
                if let Some(v) = str_field(key) {
                    return v;
                }
            }
        }
        "edit" | "write" => {
            for key in ["file_path", "filePath", "path"] {
                if let Some(v) = str_field(key) {
                    return v;
                }
            }
        }
        "bash" => {
            for key in ["command", "cmd"] {
                if let Some(v) = str_field(key) {
                    return summarize_shell(&v, 80);
                }
            }
        }
        "task" => {
            if let Some(v) = str_field("description") {
                return v;
            }
        }
        _ => {
            if let Value::Object(map) = params {
                for value in map.values() {
                    if let Some(s) = value.as_str() {
                        if !s.is_empty() {
                            return truncate(s, 60);
                        }
                    }
                }
            }
        }
    }
    String::new()
}

/// Shared formatter state: pending tool buffering, assistant text
/// accumulation, statistics.
pub(crate) struct FormatterCore {
    sink: Arc<dyn Sink>,
    summary_parts: Vec<String>,
    pending_tool: Option<(String, String)>,
    stats: Vec<(String, String)>,
    streamed_text: bool,
}

impl FormatterCore {
    pub(crate) fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            summary_parts: Vec::new(),
            pending_tool: None,
            stats: Vec::new(),
            streamed_text: false,
        }
    }

    /// Emit a single tool invocation line.
    pub(crate) fn tool(&mut self, name: &str, detail: &str, ok: bool) {
        self.sink.tool(name, detail, ok);
    }

    /// Buffer a tool call; rendered when its result arrives.
    pub(crate) fn buffer_tool(&mut self, name: String, detail: String) {
        self.flush_pending();
        self.pending_tool = Some((name, detail));
    }

    /// Render the buffered tool call with its outcome.
    pub(crate) fn resolve_tool(&mut self, ok: bool) {
        if let Some((name, detail)) = self.pending_tool.take() {
            self.tool(&name, &detail, ok);
        }
    }

    /// Flush any buffered tool as success (stream ended without a result).
    pub(crate) fn flush_pending(&mut self) {
        if let Some((name, detail)) = self.pending_tool.take() {
            self.tool(&name, &detail, true);
        }
    }

    pub(crate) fn error(&mut self, msg: &str) {
        self.sink.error(msg);
    }

    pub(crate) fn info(&mut self, msg: &str) {
        self.sink.line(msg, Style::Dim);
    }

    fn set_stat_raw(&mut self, key: &str, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(entry) = self.stats.iter_mut().find(|(k, _)| k == key) {
            entry.1 = text;
        } else {
            self.stats.push((key.to_string(), text));
        }
    }

    pub(crate) fn set_stat_str(&mut self, key: &str, value: &str) {
        self.set_stat_raw(key, value.to_string());
    }

    pub(crate) fn set_stat_duration(&mut self, seconds: f64) {
        self.set_stat_raw("duration", format!("{seconds:.1}"));
    }

    pub(crate) fn set_stat_cost(&mut self, dollars: f64) {
        self.set_stat_raw("cost", format!("{dollars:.4}"));
    }

    pub(crate) fn set_stat_tokens(&mut self, tokens: i64) {
        self.set_stat_raw("tokens", tokens.to_string());
    }

    /// Emit accumulated statistics, fixed keys first.
    pub(crate) fn print_stats(&mut self) {
        if self.stats.is_empty() {
            return;
        }
        let mut ordered: Vec<(String, String)> = Vec::new();
        for key in ["status", "duration", "cost", "tokens"] {
            if let Some((k, v)) = self.stats.iter().find(|(k, _)| k == key) {
                let shown = match key {
                    "duration" => format!("{v}s"),
                    "cost" => format!("${v}"),
                    _ => v.clone(),
                };
                ordered.push((k.clone(), shown));
            }
        }
        for (k, v) in &self.stats {
            if !["status", "duration", "cost", "tokens"].contains(&k.as_str()) {
                ordered.push((k.clone(), v.clone()));
            }
        }
        self.sink.stats(&ordered);
    }

    /// Stream an assistant text delta.
    pub(crate) fn accumulate_delta(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.summary_parts.push(text.to_string());
        self.streamed_text = true;
        self.sink.text(text, true);
    }

    /// Render a whole assistant message once.
    pub(crate) fn accumulate_whole(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.summary_parts.push(text.to_string());
        self.streamed_text = true;
        self.sink.text(text, false);
    }

    /// Replace the accumulated summary without emitting (consolidated
    /// message already covered by streamed deltas).
    pub(crate) fn set_summary(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.summary_parts = vec![text.to_string()];
        }
    }

    /// Echo of the user prompt found in the stream.
    pub(crate) fn prompt_echo(&mut self, text: &str) {
        if !text.is_empty() {
            self.sink.panel("prompt", text, Style::Info);
        }
    }

    /// Emit the final summary when nothing was streamed yet.
    pub(crate) fn print_summary(&mut self) {
        if self.streamed_text {
            return;
        }
        let text = self.summary_parts.concat();
        let text = text.trim();
        if !text.is_empty() {
            self.sink.text(text, false);
        }
    }
}
