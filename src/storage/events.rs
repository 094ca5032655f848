//! Append-only JSONL event log.
//!
//! The audit channel for every mutation in the system. The log is:
//! - fixed envelope schema, versioned (`v`)
//! - append-only, one canonical-JSON line per record
//! - concurrency-safe across processes (single write under an advisory lock)
//!
//! Run correlation uses a process-wide scoped run-id stack: `RunScope` pushes
//! an id for the duration of a run and `emit` picks it up automatically.
//! Callers without a scope can pass an explicit `run_id` instead.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};

use crate::error::{InshallahError, Result};
use crate::util::jsonl::append_line_locked;
use crate::util::time::now_ts_ms;

/// Envelope schema version.
pub const EVENT_VERSION: i64 = 1;

static RUN_ID_STACK: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(Vec::new()));

// The run-id stack is process-wide; tests that push a scope or assert its
// absence serialise on this guard.
#[cfg(test)]
pub(crate) static RUN_SCOPE_TEST_GUARD: Mutex<()> = Mutex::new(());

/// The run-id currently in scope, if any.
#[must_use]
pub fn current_run_id() -> Option<String> {
    RUN_ID_STACK
        .lock()
        .ok()
        .and_then(|stack| stack.last().cloned())
}

/// RAII guard scoping a run-id. Nested scopes push and pop.
pub struct RunScope;

impl RunScope {
    pub fn enter(run_id: impl Into<String>) -> Self {
        if let Ok(mut stack) = RUN_ID_STACK.lock() {
            stack.push(run_id.into());
        }
        Self
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        if let Ok(mut stack) = RUN_ID_STACK.lock() {
            stack.pop();
        }
    }
}

/// Optional per-emit fields.
#[derive(Debug, Default, Clone)]
pub struct EmitOptions {
    pub issue_id: Option<String>,
    pub run_id: Option<String>,
    pub ts_ms: Option<i64>,
}

/// Append-only JSONL event log at `.inshallah/events.jsonl`.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn from_state_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join("events.jsonl"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialise one event record, append it under the file lock, and return
    /// the record as written.
    ///
    /// # Errors
    ///
    /// `Validation` when the payload is not a JSON object; I/O errors
    /// surface to the caller.
    pub fn emit(
        &self,
        event_type: &str,
        source: &str,
        payload: Value,
        opts: EmitOptions,
    ) -> Result<Value> {
        let Value::Object(payload) = payload else {
            return Err(InshallahError::validation(
                "payload",
                "must be a JSON object",
            ));
        };

        let record = self.build_record(event_type, source, payload, &opts);
        // Compact separators; serde_json escapes non-ASCII via \u sequences
        // only inside strings it owns, so force ASCII by escaping here.
        let line = to_ascii_json(&record);
        append_line_locked(&self.path, &line)?;
        Ok(record)
    }

    fn build_record(
        &self,
        event_type: &str,
        source: &str,
        payload: Map<String, Value>,
        opts: &EmitOptions,
    ) -> Value {
        let mut record = Map::new();
        record.insert("v".into(), json!(EVENT_VERSION));
        record.insert(
            "ts_ms".into(),
            json!(opts.ts_ms.unwrap_or_else(now_ts_ms)),
        );
        record.insert("type".into(), json!(event_type));
        record.insert("source".into(), json!(source));
        let run_id = opts.run_id.clone().or_else(current_run_id);
        if let Some(run_id) = run_id {
            record.insert("run_id".into(), json!(run_id));
        }
        if let Some(issue_id) = &opts.issue_id {
            record.insert("issue_id".into(), json!(issue_id));
        }
        record.insert("payload".into(), Value::Object(payload));
        Value::Object(record)
    }
}

/// Compact JSON with non-ASCII characters escaped, matching the canonical
/// line format of the log.
fn to_ascii_json(value: &Value) -> String {
    let raw = value.to_string();
    if raw.is_ascii() {
        return raw;
    }
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut buf = [0u16; 2];
            for unit in ch.encode_utf16(&mut buf) {
                use std::fmt::Write;
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    out
}
