//! `inshallah status` (workspace overview).

use serde_json::json;

use crate::cli::print_json;
use crate::config::{repo_root_from_cwd, state_dir};
use crate::error::Result;
use crate::model::{Status, TAG_AGENT, TAG_ROOT};
use crate::prompt::list_roles;
use crate::storage::{ForumStore, IssueStore};

pub fn execute(json: bool) -> Result<i32> {
    let repo_root = repo_root_from_cwd();
    let state = state_dir(&repo_root);
    let store = IssueStore::from_state_dir(&state);
    let forum = ForumStore::from_state_dir(&state);

    let roots = store.list(None, Some(TAG_ROOT))?;
    let open = store.list(Some(Status::Open), None)?;
    let ready = store.ready(None, &[TAG_AGENT])?;
    let mut topics = forum.topics(Some("issue:"))?;
    topics.truncate(10);
    let roles = list_roles(&repo_root);

    if json {
        print_json(&json!({
            "repo_root": repo_root,
            "roots": roots,
            "open_count": open.len(),
            "ready_count": ready.len(),
            "ready": ready.iter().take(10).collect::<Vec<_>>(),
            "recent_topics": topics,
            "roles": roles,
        }));
        return Ok(0);
    }

    println!("Repo: {}", repo_root.display());
    println!("Root issues: {}", roots.len());
    println!("Open issues: {}", open.len());
    println!("Ready issues: {}", ready.len());
    println!("Roles: {}", roles.len());
    for issue in ready.iter().take(10) {
        println!("  p{} {} {}", issue.priority, issue.id, issue.title);
    }
    for topic in &topics {
        println!("  {} ({} messages)", topic.topic, topic.messages);
    }
    Ok(0)
}
