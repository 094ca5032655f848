//! Workspace discovery and state-directory layout.
//!
//! All persistent state lives under `<repo>/.inshallah/`:
//!
//! ```text
//! .inshallah/
//!   issues.jsonl      issue records
//!   forum.jsonl       forum messages
//!   events.jsonl      audit event log
//!   orchestrator.md   orchestrator defaults + prompt template
//!   roles/<name>.md   role templates
//!   logs/<id>.jsonl   verbatim backend stream tees
//! ```

use std::path::{Path, PathBuf};

/// Name of the state directory.
pub const STATE_DIR_NAME: &str = ".inshallah";

/// Walk up from `start` until a directory containing `.git` is found; fall
/// back to `start` itself.
#[must_use]
pub fn find_repo_root(start: &Path) -> PathBuf {
    let mut current = start;
    loop {
        if current.join(".git").exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return start.to_path_buf(),
        }
    }
}

/// Repo root discovered from the current working directory.
#[must_use]
pub fn repo_root_from_cwd() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_repo_root(&cwd)
}

/// `<repo>/.inshallah`
#[must_use]
pub fn state_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(STATE_DIR_NAME)
}

/// `<repo>/.inshallah/orchestrator.md`
#[must_use]
pub fn orchestrator_path(repo_root: &Path) -> PathBuf {
    state_dir(repo_root).join("orchestrator.md")
}

/// `<repo>/.inshallah/roles`
#[must_use]
pub fn roles_dir(repo_root: &Path) -> PathBuf {
    state_dir(repo_root).join("roles")
}

/// `<repo>/.inshallah/roles/<role>.md`
#[must_use]
pub fn role_path(repo_root: &Path, role: &str) -> PathBuf {
    roles_dir(repo_root).join(format!("{role}.md"))
}

/// `<repo>/.inshallah/logs`
#[must_use]
pub fn logs_dir(repo_root: &Path) -> PathBuf {
    state_dir(repo_root).join("logs")
}
