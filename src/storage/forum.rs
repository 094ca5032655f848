//! JSONL-backed forum message store.
//!
//! The coordination side-channel: append-only, topic-keyed, messages are
//! never mutated. Topics follow the `issue:<id>` convention for per-issue
//! threads; anything else is free-form.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::model::{ForumMessage, TopicSummary};
use crate::storage::events::{EmitOptions, EventLog};
use crate::util::jsonl::{read_jsonl, write_jsonl, FileLock};
use crate::util::time::now_ts;

const SOURCE: &str = "forum_store";

/// JSONL-backed message forum stored in `.inshallah/forum.jsonl`.
#[derive(Debug, Clone)]
pub struct ForumStore {
    path: PathBuf,
    events: EventLog,
}

impl ForumStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let events = EventLog::from_state_dir(path.parent().unwrap_or_else(|| Path::new(".")));
        Self { path, events }
    }

    #[must_use]
    pub fn from_state_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join("forum.jsonl"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a message and return it. Topics of the form `issue:<id>` tag
    /// the emitted event with the issue id.
    pub fn post(&self, topic: &str, body: &str, author: &str) -> Result<ForumMessage> {
        let issue_id = topic
            .strip_prefix("issue:")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string);

        let msg = ForumMessage {
            topic: topic.to_string(),
            body: body.to_string(),
            author: author.to_string(),
            created_at: now_ts(),
        };

        let _lock = FileLock::acquire(&self.path)?;
        let mut rows: Vec<ForumMessage> = read_jsonl(&self.path)?;
        rows.push(msg.clone());
        write_jsonl(&self.path, &rows)?;
        drop(_lock);

        if let Err(err) = self.events.emit(
            "forum.post",
            SOURCE,
            json!({"message": msg}),
            EmitOptions {
                issue_id,
                ..Default::default()
            },
        ) {
            debug!(?err, "event emission failed");
        }
        Ok(msg)
    }

    /// Last `limit` messages for a topic, oldest first.
    pub fn read(&self, topic: &str, limit: usize) -> Result<Vec<ForumMessage>> {
        let rows: Vec<ForumMessage> = read_jsonl(&self.path)?;
        let mut matching: Vec<ForumMessage> =
            rows.into_iter().filter(|row| row.topic == topic).collect();
        if matching.len() > limit {
            matching.drain(..matching.len() - limit);
        }
        Ok(matching)
    }

    /// Per-topic metadata sorted by most-recent activity (ties broken by
    /// topic name, descending).
    pub fn topics(&self, prefix: Option<&str>) -> Result<Vec<TopicSummary>> {
        let rows: Vec<ForumMessage> = read_jsonl(&self.path)?;
        let mut by_topic: HashMap<String, TopicSummary> = HashMap::new();
        for row in rows {
            if let Some(prefix) = prefix {
                if !row.topic.starts_with(prefix) {
                    continue;
                }
            }
            let entry = by_topic
                .entry(row.topic.clone())
                .or_insert_with(|| TopicSummary {
                    topic: row.topic.clone(),
                    messages: 0,
                    last_at: 0,
                });
            entry.messages += 1;
            entry.last_at = entry.last_at.max(row.created_at);
        }
        let mut topics: Vec<TopicSummary> = by_topic.into_values().collect();
        topics.sort_by(|a, b| {
            b.last_at
                .cmp(&a.last_at)
                .then_with(|| b.topic.cmp(&a.topic))
        });
        Ok(topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    fn forum(dir: &TempDir) -> ForumStore {
        ForumStore::from_state_dir(&dir.path().join(".inshallah"))
    }

    #[test]
    fn post_then_read_in_order() {
        let dir = TempDir::new().unwrap();
        let forum = forum(&dir);
        forum.post("general", "first", "worker").unwrap();
        forum.post("general", "second", "worker").unwrap();
        forum.post("other", "elsewhere", "worker").unwrap();

        let msgs = forum.read("general", 50).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].body, "first");
        assert_eq!(msgs[1].body, "second");
    }

    #[test]
    fn read_honours_limit_keeping_latest() {
        let dir = TempDir::new().unwrap();
        let forum = forum(&dir);
        for n in 0..5 {
            forum.post("t", &format!("msg {n}"), "worker").unwrap();
        }
        let msgs = forum.read("t", 2).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].body, "msg 3");
        assert_eq!(msgs[1].body, "msg 4");
    }

    #[test]
    fn topics_filter_and_counts() {
        let dir = TempDir::new().unwrap();
        let forum = forum(&dir);
        forum.post("issue:inshallah-aaaaaaaa", "x", "a").unwrap();
        forum.post("issue:inshallah-aaaaaaaa", "y", "a").unwrap();
        forum.post("misc", "z", "a").unwrap();

        let topics = forum.topics(Some("issue:")).unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic, "issue:inshallah-aaaaaaaa");
        assert_eq!(topics[0].messages, 2);

        let all = forum.topics(None).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn issue_topic_tags_event_with_issue_id() {
        let dir = TempDir::new().unwrap();
        let forum = forum(&dir);
        forum
            .post("issue:inshallah-abc12345", "hello", "worker")
            .unwrap();
        forum.post("general", "hi", "worker").unwrap();

        let events: Vec<Value> =
            read_jsonl(&dir.path().join(".inshallah").join("events.jsonl")).unwrap();
        let posts: Vec<&Value> = events
            .iter()
            .filter(|ev| ev["type"] == "forum.post")
            .collect();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0]["issue_id"], "inshallah-abc12345");
        assert!(posts[1].get("issue_id").is_none());
    }
}
