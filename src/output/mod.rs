//! Output abstraction: the `Sink` the engine emits structured updates to.
//!
//! The core never renders a terminal itself. Formatters and the runner talk
//! to a [`Sink`]; the CLI installs a plain-text implementation, the web
//! layer its own, tests a recorder.

use std::io::Write;
use std::sync::Mutex;

/// Rendering hint attached to lines and panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Plain,
    Dim,
    Info,
    Warn,
    Error,
    Mutate,
    Observe,
    Execute,
    Delegate,
}

/// Abstract rendering surface for structured updates.
///
/// Implementations must be cheap: formatters call into the sink from the
/// stream-reading path and never buffer behind it.
pub trait Sink: Send + Sync {
    /// Large titled message.
    fn panel(&self, title: &str, body: &str, style: Style);
    /// Plain or styled line.
    fn line(&self, text: &str, style: Style);
    /// Structured tabular data.
    fn table(&self, title: &str, rows: &[Vec<String>]);
    /// Tool-invocation trace.
    fn tool(&self, name: &str, detail: &str, ok: bool);
    /// Assistant text chunk; `delta` marks incremental streaming.
    fn text(&self, chunk: &str, delta: bool);
    /// Key/value metrics.
    fn stats(&self, kv: &[(String, String)]);
    /// Error line.
    fn error(&self, msg: &str);
}

/// Sink that renders plain text to a writer. No colour, no box drawing;
/// suitable for pipes and logs.
pub struct PlainSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> PlainSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_line(&self, line: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{line}");
        }
    }
}

impl PlainSink<std::io::Stderr> {
    /// Plain sink over stderr, keeping stdout machine-readable.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> Sink for PlainSink<W> {
    fn panel(&self, title: &str, body: &str, _style: Style) {
        self.write_line(&format!("== {title} =="));
        if !body.is_empty() {
            self.write_line(body);
        }
    }

    fn line(&self, text: &str, _style: Style) {
        self.write_line(text);
    }

    fn table(&self, title: &str, rows: &[Vec<String>]) {
        if !title.is_empty() {
            self.write_line(title);
        }
        for row in rows {
            self.write_line(&format!("  {}", row.join("  ")));
        }
    }

    fn tool(&self, name: &str, detail: &str, ok: bool) {
        let mark = if ok { "\u{2713}" } else { "\u{2717}" };
        if detail.is_empty() {
            self.write_line(&format!("  {mark} {name}"));
        } else {
            self.write_line(&format!("  {mark} {name} {detail}"));
        }
    }

    fn text(&self, chunk: &str, delta: bool) {
        if delta {
            if let Ok(mut out) = self.out.lock() {
                let _ = write!(out, "{chunk}");
                let _ = out.flush();
            }
        } else {
            self.write_line(chunk);
        }
    }

    fn stats(&self, kv: &[(String, String)]) {
        if kv.is_empty() {
            return;
        }
        let joined: Vec<String> = kv.iter().map(|(k, v)| format!("{k}={v}")).collect();
        self.write_line(&format!("  stats {}", joined.join(" ")));
    }

    fn error(&self, msg: &str) {
        self.write_line(&format!("  error: {msg}"));
    }
}

/// Sink that swallows everything. For `--json` runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {
    fn panel(&self, _title: &str, _body: &str, _style: Style) {}
    fn line(&self, _text: &str, _style: Style) {}
    fn table(&self, _title: &str, _rows: &[Vec<String>]) {}
    fn tool(&self, _name: &str, _detail: &str, _ok: bool) {}
    fn text(&self, _chunk: &str, _delta: bool) {}
    fn stats(&self, _kv: &[(String, String)]) {}
    fn error(&self, _msg: &str) {}
}

/// One recorded sink call, for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Panel { title: String, body: String },
    Line { text: String },
    Table { title: String, rows: Vec<Vec<String>> },
    Tool { name: String, detail: String, ok: bool },
    Text { chunk: String, delta: bool },
    Stats { kv: Vec<(String, String)> },
    Error { msg: String },
}

/// Sink that records every call. Test helper.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded calls.
    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded tool traces as `(name, detail, ok)` triples.
    #[must_use]
    pub fn tools(&self) -> Vec<(String, String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|ev| match ev {
                SinkEvent::Tool { name, detail, ok } => Some((name, detail, ok)),
                _ => None,
            })
            .collect()
    }

    /// Concatenated assistant text.
    #[must_use]
    pub fn text(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|ev| match ev {
                SinkEvent::Text { chunk, .. } => Some(chunk),
                _ => None,
            })
            .collect()
    }

    /// Recorded error lines.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|ev| match ev {
                SinkEvent::Error { msg } => Some(msg),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Sink for RecordingSink {
    fn panel(&self, title: &str, body: &str, _style: Style) {
        self.push(SinkEvent::Panel {
            title: title.into(),
            body: body.into(),
        });
    }

    fn line(&self, text: &str, _style: Style) {
        self.push(SinkEvent::Line { text: text.into() });
    }

    fn table(&self, title: &str, rows: &[Vec<String>]) {
        self.push(SinkEvent::Table {
            title: title.into(),
            rows: rows.to_vec(),
        });
    }

    fn tool(&self, name: &str, detail: &str, ok: bool) {
        self.push(SinkEvent::Tool {
            name: name.into(),
            detail: detail.into(),
            ok,
        });
    }

    fn text(&self, chunk: &str, delta: bool) {
        self.push(SinkEvent::Text {
            chunk: chunk.into(),
            delta,
        });
    }

    fn stats(&self, kv: &[(String, String)]) {
        self.push(SinkEvent::Stats { kv: kv.to_vec() });
    }

    fn error(&self, msg: &str) {
        self.push(SinkEvent::Error { msg: msg.into() });
    }
}
