//! Backend abstraction: external agent CLIs speaking JSON-line protocols.
//!
//! A backend is a command-line program that accepts a prompt plus a handful
//! of parameters, writes JSON-line events to stdout/stderr, and exits with a
//! POSIX exit code. Launching is synchronous: `run` returns when the child
//! exits. Every streamed line is passed to `on_line` in order and teed
//! verbatim to the per-issue log file.

mod adapters;
mod stream;

pub use adapters::{ClaudeBackend, CodexBackend, GeminiBackend, OpenCodeBackend, PiBackend};
pub use stream::stream_process;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{InshallahError, Result};

/// Parameters for one backend invocation.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub reasoning: &'a str,
    pub cwd: &'a Path,
}

/// An external agent CLI.
pub trait Backend: Send + Sync {
    /// Registry name (`codex`, `claude`, ...).
    fn name(&self) -> &str;

    /// Concrete argv for an invocation; the program is `argv[0]`.
    fn build_argv(&self, req: &RunRequest<'_>) -> Vec<String>;

    /// Launch the subprocess and stream its output. `on_line` receives each
    /// complete line in order; `tee_path` receives a verbatim copy, flushed
    /// line by line. Returns the child's exit code.
    fn run(
        &self,
        req: &RunRequest<'_>,
        on_line: &mut dyn FnMut(&str),
        tee_path: Option<&Path>,
    ) -> Result<i32> {
        let argv = self.build_argv(req);
        stream::stream_process(&argv, req.cwd, on_line, tee_path).map_err(|err| match err {
            InshallahError::Io(io) => InshallahError::BackendSpawn {
                name: self.name().to_string(),
                source: io,
            },
            other => other,
        })
    }
}

/// Name of the fallback backend.
pub const DEFAULT_BACKEND: &str = "codex";

/// Registry of available backends.
///
/// Registration rejects duplicates and empty names; lookup of an unknown
/// name falls back to `codex`.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Empty registry. Most callers want [`BackendRegistry::with_defaults`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registry pre-loaded with the five stock backends.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for backend in [
            Arc::new(CodexBackend) as Arc<dyn Backend>,
            Arc::new(ClaudeBackend),
            Arc::new(OpenCodeBackend),
            Arc::new(GeminiBackend),
            Arc::new(PiBackend),
        ] {
            registry
                .register(backend)
                .expect("stock backends register cleanly");
        }
        registry
    }

    /// Register a backend.
    ///
    /// # Errors
    ///
    /// `EmptyBackendName` for an empty name, `DuplicateBackend` when the
    /// name is already taken.
    pub fn register(&mut self, backend: Arc<dyn Backend>) -> Result<()> {
        let name = backend.name().to_string();
        if name.is_empty() {
            return Err(InshallahError::EmptyBackendName);
        }
        if self.backends.contains_key(&name) {
            return Err(InshallahError::DuplicateBackend { name });
        }
        self.backends.insert(name, backend);
        Ok(())
    }

    /// Backend by name; unknown names fall back to `codex`.
    ///
    /// # Panics
    ///
    /// Panics if the registry contains neither the requested backend nor
    /// the fallback; `with_defaults` always provides the fallback.
    #[must_use]
    pub fn get(&self, name: &str) -> Arc<dyn Backend> {
        self.backends
            .get(name)
            .or_else(|| self.backends.get(DEFAULT_BACKEND))
            .cloned()
            .expect("registry must contain the fallback backend")
    }

    /// Registered backend names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
