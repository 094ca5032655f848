//! `inshallah forum` (coordination side-channel operations).

use crate::cli::{print_json, ForumCommand};
use crate::config::{repo_root_from_cwd, state_dir};
use crate::error::Result;
use crate::storage::ForumStore;

pub fn execute(command: &ForumCommand, json: bool) -> Result<i32> {
    let forum = ForumStore::from_state_dir(&state_dir(&repo_root_from_cwd()));
    match command {
        ForumCommand::Post {
            topic,
            body,
            author,
        } => {
            let msg = forum.post(topic, body, author)?;
            if json {
                print_json(&msg);
            } else {
                println!("[{}] {}: {}", msg.topic, msg.author, msg.body);
            }
        }
        ForumCommand::Read { topic, limit } => {
            let msgs = forum.read(topic, *limit)?;
            if json {
                print_json(&msgs);
            } else if msgs.is_empty() {
                println!("No messages for {topic}");
            } else {
                for msg in msgs {
                    println!("[{}] {}: {}", msg.created_at, msg.author, msg.body);
                }
            }
        }
        ForumCommand::Topics { prefix } => {
            let topics = forum.topics(prefix.as_deref())?;
            if json {
                print_json(&topics);
            } else if topics.is_empty() {
                println!("No topics");
            } else {
                for topic in topics {
                    println!("{} ({} messages)", topic.topic, topic.messages);
                }
            }
        }
    }
    Ok(0)
}
