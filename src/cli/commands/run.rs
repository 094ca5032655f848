//! `inshallah run` and `inshallah resume` (drive the DAG loop).

use std::sync::Arc;

use serde_json::json;

use crate::cli::{print_json, RunArgs};
use crate::config::{repo_root_from_cwd, state_dir};
use crate::error::Result;
use crate::model::{TAG_AGENT, TAG_ROOT};
use crate::output::{NullSink, PlainSink, Sink};
use crate::runner::{DagResult, DagRunner};
use crate::storage::issues::NewIssue;
use crate::storage::{ForumStore, IssueStore, RunScope};
use crate::util::id::new_run_id;

fn runner_sink(json: bool) -> Arc<dyn Sink> {
    if json {
        Arc::new(NullSink)
    } else {
        Arc::new(PlainSink::stderr())
    }
}

fn report(result: &DagResult, root_id: &str, json: bool) -> i32 {
    if json {
        print_json(&json!({
            "status": result.status.as_str(),
            "steps": result.steps,
            "error": result.error,
            "root_id": root_id,
        }));
    } else {
        if !result.error.is_empty() {
            eprintln!("Runner error: {}", result.error);
        }
        println!("{} ({} steps)", result.status.as_str(), result.steps);
    }
    i32::from(!result.is_final())
}

/// Create a root issue from the prompt and run the loop over it.
pub fn execute(args: &RunArgs, json: bool) -> Result<i32> {
    let prompt_text = args.prompt.join(" ");
    if prompt_text.trim().is_empty() {
        if json {
            print_json(&json!({"error": "missing prompt"}));
        } else {
            eprintln!("No prompt provided.");
            eprintln!("Try: inshallah run \"Break down and execute this goal\"");
        }
        return Ok(1);
    }

    let repo_root = repo_root_from_cwd();
    let state = state_dir(&repo_root);
    let store = IssueStore::from_state_dir(&state);
    let forum = ForumStore::from_state_dir(&state);

    let _scope = RunScope::enter(new_run_id());
    let root_issue = store.create(NewIssue {
        title: prompt_text,
        tags: vec![TAG_AGENT.to_string(), TAG_ROOT.to_string()],
        ..Default::default()
    })?;
    if !json {
        eprintln!("Root issue: {} {}", root_issue.id, root_issue.title);
    }

    let runner = DagRunner::new(store, forum, &repo_root, runner_sink(json));
    let result = runner.run(&root_issue.id, args.max_steps, !args.no_review)?;
    Ok(report(&result, &root_issue.id, json))
}

/// Resume an interrupted DAG: reset stale claims, then run the loop.
pub fn execute_resume(root: &str, args: &RunArgs, json: bool) -> Result<i32> {
    let repo_root = repo_root_from_cwd();
    let state = state_dir(&repo_root);
    let store = IssueStore::from_state_dir(&state);
    let forum = ForumStore::from_state_dir(&state);

    let issue = store.resolve(root)?;
    let root_id = issue.id.clone();

    let reset = store.reset_in_progress(&root_id)?;
    if !reset.is_empty() && !json {
        eprintln!("Reset {} stale issue(s) to open: {}", reset.len(), reset.join(", "));
    }
    if !json {
        eprintln!("Resuming {root_id} - {}", issue.title);
    }

    let _scope = RunScope::enter(new_run_id());
    let runner = DagRunner::new(store, forum, &repo_root, runner_sink(json));
    let result = runner.run(&root_id, args.max_steps, !args.no_review)?;
    Ok(report(&result, &root_id, json))
}
