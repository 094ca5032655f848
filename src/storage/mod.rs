//! Persistent state for `inshallah`: issues, forum, and the event log.
//!
//! All three stores live in `.inshallah/` as JSONL files shared across
//! processes. Appends and read-modify-write cycles hold an exclusive
//! advisory lock; rewrites are atomic (temp file → rename).

pub mod events;
pub mod forum;
pub mod issues;

pub use events::{current_run_id, EmitOptions, EventLog, RunScope, EVENT_VERSION};
pub use forum::ForumStore;
pub use issues::{IssuePatch, IssueStore, NewIssue};
