//! `inshallah issues` (direct store operations).

use std::str::FromStr;

use serde_json::json;

use crate::cli::{print_json, IssuesCommand};
use crate::config::{repo_root_from_cwd, state_dir};
use crate::error::Result;
use crate::model::{DepType, ExecutionSpec, Issue, Outcome, Status};
use crate::storage::issues::{IssuePatch, NewIssue};
use crate::storage::IssueStore;

fn store() -> IssueStore {
    IssueStore::from_state_dir(&state_dir(&repo_root_from_cwd()))
}

fn print_issue(issue: &Issue, json: bool) {
    if json {
        print_json(issue);
    } else {
        let outcome = issue
            .outcome
            .map_or_else(|| "-".to_string(), |o| o.to_string());
        println!(
            "{} [{}/{}] p{} {}",
            issue.id, issue.status, outcome, issue.priority, issue.title
        );
    }
}

fn print_issues(issues: &[Issue], json: bool) {
    if json {
        print_json(issues);
    } else if issues.is_empty() {
        println!("No issues");
    } else {
        for issue in issues {
            print_issue(issue, false);
        }
    }
}

fn parse_dep(raw: &str) -> Result<(DepType, String)> {
    let (dep_type, target) = raw.split_once(':').ok_or_else(|| {
        crate::error::InshallahError::validation("dep", "expected TYPE:TARGET")
    })?;
    Ok((DepType::from_str(dep_type)?, target.to_string()))
}

#[allow(clippy::too_many_lines)]
pub fn execute(command: &IssuesCommand, json: bool) -> Result<i32> {
    let store = store();
    match command {
        IssuesCommand::List { status, tag } => {
            let status = status.as_deref().map(Status::from_str).transpose()?;
            let issues = store.list(status, tag.as_deref())?;
            print_issues(&issues, json);
        }
        IssuesCommand::Get { id } => {
            let issue = store.resolve(id)?;
            print_issue(&issue, json);
        }
        IssuesCommand::Create {
            title,
            body,
            tag,
            priority,
            role,
            cli,
            model,
            reasoning,
            prompt_path,
            dep,
        } => {
            let spec = ExecutionSpec {
                role: role.clone(),
                cli: cli.clone(),
                model: model.clone(),
                reasoning: reasoning.clone(),
                prompt_path: prompt_path.clone(),
            };
            let issue = store.create(NewIssue {
                title: title.clone(),
                body: body.clone().unwrap_or_default(),
                tags: tag.clone(),
                execution_spec: (!spec.is_empty()).then_some(spec),
                priority: *priority,
            })?;
            for raw in dep {
                let (dep_type, target) = parse_dep(raw)?;
                let target = store.resolve(&target)?.id;
                store.add_dep(&issue.id, dep_type, &target)?;
            }
            let issue = store.get(&issue.id)?.unwrap_or(issue);
            print_issue(&issue, json);
        }
        IssuesCommand::Update {
            id,
            title,
            body,
            status,
            outcome,
            tag,
            priority,
        } => {
            let issue_id = store.resolve(id)?.id;
            let patch = IssuePatch {
                title: title.clone(),
                body: body.clone(),
                status: status.as_deref().map(Status::from_str).transpose()?,
                outcome: match outcome.as_deref() {
                    None => None,
                    Some("") | Some("none") => Some(None),
                    Some(raw) => Some(Some(Outcome::from_str(raw)?)),
                },
                tags: (!tag.is_empty()).then(|| tag.clone()),
                priority: *priority,
                execution_spec: None,
            };
            let issue = store.update(&issue_id, patch)?;
            print_issue(&issue, json);
        }
        IssuesCommand::Claim { id } => {
            let issue_id = store.resolve(id)?.id;
            let claimed = store.claim(&issue_id)?;
            if json {
                print_json(&json!({"id": issue_id, "claimed": claimed}));
            } else {
                println!("{issue_id} claimed={claimed}");
            }
            return Ok(i32::from(!claimed));
        }
        IssuesCommand::Close { id, outcome } => {
            let issue_id = store.resolve(id)?.id;
            let issue = store.close(&issue_id, Outcome::from_str(outcome)?)?;
            print_issue(&issue, json);
        }
        IssuesCommand::Dep { src, dep_type, dst } => {
            let src = store.resolve(src)?.id;
            let dst = store.resolve(dst)?.id;
            store.add_dep(&src, DepType::from_str(dep_type)?, &dst)?;
            if json {
                print_json(&json!({"src": src, "type": dep_type, "target": dst}));
            } else {
                println!("{src} {dep_type} {dst}");
            }
        }
        IssuesCommand::Undep { src, dep_type, dst } => {
            let src = store.resolve(src)?.id;
            let dst = store.resolve(dst)?.id;
            let removed = store.remove_dep(&src, DepType::from_str(dep_type)?, &dst)?;
            if json {
                print_json(&json!({"src": src, "removed": removed}));
            } else {
                println!("removed={removed}");
            }
        }
        IssuesCommand::Children { id } => {
            let parent_id = store.resolve(id)?.id;
            let children = store.children(&parent_id)?;
            print_issues(&children, json);
        }
        IssuesCommand::Ready { root, tag } => {
            let root_id = match root {
                Some(root) => Some(store.resolve(root)?.id),
                None => None,
            };
            let tags: Vec<&str> = tag.iter().map(String::as_str).collect();
            let ready = store.ready(root_id.as_deref(), &tags)?;
            print_issues(&ready, json);
        }
        IssuesCommand::Validate { root } => {
            let root_id = store.resolve(root)?.id;
            let result = store.validate(&root_id)?;
            if json {
                print_json(&result);
            } else {
                println!(
                    "{}: {}",
                    if result.is_final { "final" } else { "not final" },
                    result.reason
                );
            }
            return Ok(i32::from(!result.is_final));
        }
    }
    Ok(0)
}
