//! JSONL-backed issue store and DAG queries.
//!
//! Backed by a single `issues.jsonl` file. Each mutation reads the whole
//! file, mutates the in-memory list, and rewrites it atomically while
//! holding the advisory lock. Acceptable at corpus scale (hundreds of
//! issues) and keeps crash-safety trivial. Every mutation also appends one
//! record to the event log.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::debug;

use crate::error::{InshallahError, Result};
use crate::model::{
    DepEdge, DepType, ExecutionSpec, Issue, Outcome, Status, ValidationResult, DEFAULT_PRIORITY,
    PRIORITY_RANGE,
};
use crate::storage::events::{EmitOptions, EventLog};
use crate::util::id::{generate_issue_id, resolve_prefix};
use crate::util::jsonl::{read_jsonl, write_jsonl, FileLock};
use crate::util::time::now_ts;

const SOURCE: &str = "issue_store";

/// Partial update applied by [`IssueStore::update`].
///
/// `outcome` and `execution_spec` are doubly optional so a patch can clear
/// them (`Some(None)`) or leave them untouched (`None`).
#[derive(Debug, Default, Clone)]
pub struct IssuePatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub status: Option<Status>,
    pub outcome: Option<Option<Outcome>>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<i64>,
    pub execution_spec: Option<Option<ExecutionSpec>>,
}

/// Parameters for [`IssueStore::create`].
#[derive(Debug, Default, Clone)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub execution_spec: Option<ExecutionSpec>,
    pub priority: Option<i64>,
}

/// JSONL-backed issue tracker stored in `.inshallah/issues.jsonl`.
#[derive(Debug, Clone)]
pub struct IssueStore {
    path: PathBuf,
    events: EventLog,
}

impl IssueStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let events = EventLog::from_state_dir(path.parent().unwrap_or_else(|| Path::new(".")));
        Self { path, events }
    }

    #[must_use]
    pub fn from_state_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join("issues.jsonl"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Issue>> {
        read_jsonl(&self.path)
    }

    fn save(&self, rows: &[Issue]) -> Result<()> {
        write_jsonl(&self.path, rows)
    }

    fn emit(&self, event_type: &str, issue_id: &str, payload: serde_json::Value) {
        // Audit failures must not poison the mutation that already happened.
        let opts = EmitOptions {
            issue_id: Some(issue_id.to_string()),
            ..Default::default()
        };
        if let Err(err) = self.events.emit(event_type, SOURCE, payload, opts) {
            debug!(?err, event_type, "event emission failed");
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Create a new open issue and return it.
    ///
    /// # Errors
    ///
    /// `InvalidPriority` when the priority is outside 1-5.
    pub fn create(&self, new: NewIssue) -> Result<Issue> {
        let priority = new.priority.unwrap_or(DEFAULT_PRIORITY);
        if !PRIORITY_RANGE.contains(&priority) {
            return Err(InshallahError::InvalidPriority { priority });
        }

        let _lock = FileLock::acquire(&self.path)?;
        let mut rows = self.load()?;
        let id = generate_issue_id(&new.title, |candidate| {
            rows.iter().any(|row| row.id == candidate)
        });
        let now = now_ts();
        let issue = Issue {
            id: id.clone(),
            title: new.title,
            body: new.body,
            status: Status::Open,
            outcome: None,
            tags: new.tags,
            deps: Vec::new(),
            execution_spec: new.execution_spec,
            priority,
            created_at: now,
            updated_at: now,
        };
        rows.push(issue.clone());
        self.save(&rows)?;
        drop(_lock);

        self.emit(
            "issue.create",
            &id,
            json!({"title": issue.title, "tags": issue.tags, "priority": issue.priority}),
        );
        Ok(issue)
    }

    /// Apply a partial update, bump `updated_at`, and return the new record.
    ///
    /// A patch moving the issue to `open` clears the outcome and is audited
    /// as `issue.open` (a reopen); everything else as `issue.update`.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` for an unknown id, `InvalidPriority` for an
    /// out-of-range priority, `Validation` when the patch would close an
    /// issue without an outcome.
    pub fn update(&self, issue_id: &str, patch: IssuePatch) -> Result<Issue> {
        if let Some(priority) = patch.priority {
            if !PRIORITY_RANGE.contains(&priority) {
                return Err(InshallahError::InvalidPriority { priority });
            }
        }

        let _lock = FileLock::acquire(&self.path)?;
        let mut rows = self.load()?;
        let issue = find_mut(&mut rows, issue_id)?;
        let was_status = issue.status;

        if let Some(title) = patch.title {
            issue.title = title;
        }
        if let Some(body) = patch.body {
            issue.body = body;
        }
        if let Some(status) = patch.status {
            issue.status = status;
        }
        if let Some(outcome) = patch.outcome {
            issue.outcome = outcome;
        }
        if let Some(tags) = patch.tags {
            issue.tags = tags;
        }
        if let Some(priority) = patch.priority {
            issue.priority = priority;
        }
        if let Some(spec) = patch.execution_spec {
            issue.execution_spec = spec;
        }

        // closed ⇔ outcome present
        match issue.status {
            Status::Closed => {
                if issue.outcome.is_none() {
                    return Err(InshallahError::validation(
                        "outcome",
                        "closing an issue requires an outcome",
                    ));
                }
            }
            _ => issue.outcome = None,
        }

        issue.updated_at = issue.updated_at.max(now_ts());
        let updated = issue.clone();
        self.save(&rows)?;
        drop(_lock);

        let reopened = was_status != Status::Open && updated.status == Status::Open;
        self.emit(
            if reopened { "issue.open" } else { "issue.update" },
            issue_id,
            json!({"status": updated.status, "outcome": updated.outcome}),
        );
        Ok(updated)
    }

    /// Claim an open issue: `open → in_progress`. Returns false when the
    /// issue exists but is not open.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` for an unknown id.
    pub fn claim(&self, issue_id: &str) -> Result<bool> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut rows = self.load()?;
        let issue = find_mut(&mut rows, issue_id)?;
        if issue.status != Status::Open {
            return Ok(false);
        }
        issue.status = Status::InProgress;
        issue.updated_at = issue.updated_at.max(now_ts());
        self.save(&rows)?;
        drop(_lock);

        self.emit("issue.claim", issue_id, json!({}));
        Ok(true)
    }

    /// Force-close an issue with the given outcome.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` for an unknown id.
    pub fn close(&self, issue_id: &str, outcome: Outcome) -> Result<Issue> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut rows = self.load()?;
        let issue = find_mut(&mut rows, issue_id)?;
        issue.status = Status::Closed;
        issue.outcome = Some(outcome);
        issue.updated_at = issue.updated_at.max(now_ts());
        let closed = issue.clone();
        self.save(&rows)?;
        drop(_lock);

        self.emit("issue.close", issue_id, json!({"outcome": outcome}));
        Ok(closed)
    }

    /// Reopen an issue: back to `open`, outcome cleared.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` for an unknown id.
    pub fn reopen(&self, issue_id: &str) -> Result<Issue> {
        self.update(
            issue_id,
            IssuePatch {
                status: Some(Status::Open),
                outcome: Some(None),
                ..Default::default()
            },
        )
    }

    /// Append a dependency edge if not already present.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` when the source id is unknown. A dangling target is
    /// legal and inert.
    pub fn add_dep(&self, src_id: &str, dep_type: DepType, dst_id: &str) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut rows = self.load()?;
        let issue = find_mut(&mut rows, src_id)?;
        let edge = DepEdge::new(dep_type, dst_id);
        if issue.deps.contains(&edge) {
            return Ok(());
        }
        issue.deps.push(edge);
        issue.updated_at = issue.updated_at.max(now_ts());
        self.save(&rows)?;
        drop(_lock);

        self.emit(
            "issue.dep.add",
            src_id,
            json!({"type": dep_type, "target": dst_id}),
        );
        Ok(())
    }

    /// Drop a matching dependency edge. Returns true when an edge was
    /// removed.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` when the source id is unknown.
    pub fn remove_dep(&self, src_id: &str, dep_type: DepType, dst_id: &str) -> Result<bool> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut rows = self.load()?;
        let issue = find_mut(&mut rows, src_id)?;
        let before = issue.deps.len();
        issue
            .deps
            .retain(|d| !(d.dep_type == dep_type && d.target == dst_id));
        let changed = issue.deps.len() != before;
        if changed {
            issue.updated_at = issue.updated_at.max(now_ts());
            self.save(&rows)?;
        }
        drop(_lock);

        if changed {
            self.emit(
                "issue.dep.remove",
                src_id,
                json!({"type": dep_type, "target": dst_id}),
            );
        }
        Ok(changed)
    }

    /// Reset every `in_progress` issue in the subtree back to `open`.
    /// Returns the reset ids. Used by `resume` to clear a crashed run.
    pub fn reset_in_progress(&self, root_id: &str) -> Result<Vec<String>> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut rows = self.load()?;
        let in_scope: HashSet<String> = subtree_ids_of(&rows, root_id).into_iter().collect();
        let now = now_ts();
        let mut reset = Vec::new();
        for issue in &mut rows {
            if in_scope.contains(&issue.id) && issue.status == Status::InProgress {
                issue.status = Status::Open;
                issue.outcome = None;
                issue.updated_at = issue.updated_at.max(now);
                reset.push(issue.id.clone());
            }
        }
        if !reset.is_empty() {
            self.save(&rows)?;
        }
        drop(_lock);

        if !reset.is_empty() {
            self.emit("issue.reset", root_id, json!({"reset": reset}));
        }
        Ok(reset)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Full record for an id, or `None`.
    pub fn get(&self, issue_id: &str) -> Result<Option<Issue>> {
        Ok(self.load()?.into_iter().find(|row| row.id == issue_id))
    }

    /// All issues in insertion order, optionally filtered by status and tag.
    pub fn list(&self, status: Option<Status>, tag: Option<&str>) -> Result<Vec<Issue>> {
        let mut rows = self.load()?;
        if let Some(status) = status {
            rows.retain(|row| row.status == status);
        }
        if let Some(tag) = tag {
            rows.retain(|row| row.has_tag(tag));
        }
        Ok(rows)
    }

    /// Resolve a full id or unique prefix to the matching issue.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` / `AmbiguousPrefix` per prefix-resolution rules.
    pub fn resolve(&self, input: &str) -> Result<Issue> {
        let rows = self.load()?;
        let resolved = resolve_prefix(input, rows.iter().map(|row| row.id.as_str()))?;
        rows.into_iter()
            .find(|row| row.id == resolved)
            .ok_or(InshallahError::IssueNotFound {
                id: input.to_string(),
            })
    }

    /// Issues that carry a `parent` edge pointing at `parent_id`.
    pub fn children(&self, parent_id: &str) -> Result<Vec<Issue>> {
        let rows = self.load()?;
        Ok(rows
            .iter()
            .filter(|row| row.parent_ids().contains(&parent_id))
            .cloned()
            .collect())
    }

    /// BFS through parent edges from `root_id`; includes the root. Cycles
    /// terminate via the visited set.
    pub fn subtree_ids(&self, root_id: &str) -> Result<Vec<String>> {
        Ok(subtree_ids_of(&self.load()?, root_id))
    }

    /// Open, unblocked leaf issues in scope, filtered by tags, sorted by
    /// ascending priority (stable on insertion order).
    ///
    /// An issue is ready when all hold:
    /// 1. in the subtree of `root_id` (whole store when `None`)
    /// 2. `status == open`
    /// 3. no incoming `blocks` edge from a prerequisite that is not closed,
    ///    or that closed `expanded` (delegated work does not satisfy the
    ///    ordering contract)
    /// 4. it is a leaf: no children, or every direct child closed
    /// 5. it carries every filter tag
    pub fn ready(&self, root_id: Option<&str>, tags: &[&str]) -> Result<Vec<Issue>> {
        let rows = self.load()?;
        let in_scope: HashSet<&str> = match root_id {
            Some(root_id) => subtree_scope(&rows, root_id),
            None => rows.iter().map(|row| row.id.as_str()).collect(),
        };

        let mut blocked: HashSet<&str> = HashSet::new();
        for row in &rows {
            let unsatisfied = row.status != Status::Closed || row.outcome == Some(Outcome::Expanded);
            if !unsatisfied {
                continue;
            }
            for dep in &row.deps {
                if dep.dep_type == DepType::Blocks {
                    blocked.insert(dep.target.as_str());
                }
            }
        }

        let children_of = children_index(&rows);
        let mut result: Vec<Issue> = Vec::new();
        for row in &rows {
            if !in_scope.contains(row.id.as_str()) || row.status != Status::Open {
                continue;
            }
            if blocked.contains(row.id.as_str()) {
                continue;
            }
            let kids = children_of.get(row.id.as_str());
            let is_leaf = kids.map_or(true, |kids| {
                kids.iter().all(|kid| kid.status == Status::Closed)
            });
            if !is_leaf {
                continue;
            }
            if !tags.iter().all(|tag| row.has_tag(tag)) {
                continue;
            }
            result.push(row.clone());
        }

        result.sort_by_key(|row| row.priority);
        Ok(result)
    }

    /// Expanded issues whose children all closed with a terminal outcome
    /// (`success` or `skipped`). The terminal-children constraint enforces
    /// bottom-up order: a parent cannot collapse while a child is still
    /// expanded.
    pub fn collapsible(&self, root_id: &str) -> Result<Vec<Issue>> {
        let rows = self.load()?;
        let in_scope = subtree_scope(&rows, root_id);
        let children_of = children_index(&rows);

        let mut result = Vec::new();
        for row in &rows {
            if !in_scope.contains(row.id.as_str()) || !row.is_expanded() {
                continue;
            }
            let Some(kids) = children_of.get(row.id.as_str()) else {
                continue;
            };
            if kids.is_empty() {
                continue;
            }
            let all_terminal = kids.iter().all(|kid| {
                kid.status == Status::Closed && kid.outcome.is_some_and(Outcome::is_terminal)
            });
            if all_terminal {
                result.push(row.clone());
            }
        }
        Ok(result)
    }

    /// Check whether the DAG rooted at `root_id` has reached a final state.
    ///
    /// Completion semantics:
    /// - `expanded` is a delegation outcome: the node itself finished
    ///   (decomposition), and its logical completion flows through its
    ///   descendants. Expanded nodes are transparent when determining
    ///   whether work remains.
    /// - `failure` and `needs_work` are not final: they signal that the
    ///   orchestrator should re-expand the issue with remediation children.
    /// - The DAG is final when no open/in_progress work remains and no node
    ///   awaits re-orchestration.
    pub fn validate(&self, root_id: &str) -> Result<ValidationResult> {
        let rows = self.load()?;
        if !rows.iter().any(|row| row.id == root_id) {
            return Ok(ValidationResult::finished("root not found"));
        }

        let ids = subtree_ids_of(&rows, root_id);
        let id_set: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let by_id: HashMap<&str, &Issue> =
            rows.iter().map(|row| (row.id.as_str(), row)).collect();
        let children_of = children_index(&rows);

        let mut needs_reorch: Vec<&str> = id_set
            .iter()
            .copied()
            .filter(|id| by_id.get(id).is_some_and(|row| row.needs_reorchestration()))
            .collect();
        if !needs_reorch.is_empty() {
            needs_reorch.sort_unstable();
            return Ok(ValidationResult::pending(format!(
                "needs work: {}",
                needs_reorch.join(",")
            )));
        }

        // "expanded" without children is a structural bug: the node
        // delegated to nothing, so the DAG cannot converge.
        let mut bad_expanded: Vec<&str> = id_set
            .iter()
            .copied()
            .filter(|id| {
                by_id.get(id).is_some_and(|row| row.is_expanded())
                    && children_of.get(*id).map_or(true, Vec::is_empty)
            })
            .collect();
        if !bad_expanded.is_empty() {
            bad_expanded.sort_unstable();
            return Ok(ValidationResult::pending(format!(
                "expanded without children: {}",
                bad_expanded.join(",")
            )));
        }

        let pending: Vec<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| {
                by_id
                    .get(id)
                    .is_some_and(|row| row.status != Status::Closed)
            })
            .collect();

        if pending.is_empty() {
            return Ok(ValidationResult::finished("all work completed"));
        }
        if pending == [root_id] && ids.len() > 1 {
            return Ok(ValidationResult::pending(
                "all children closed, root still open",
            ));
        }
        Ok(ValidationResult::pending("in progress"))
    }
}

fn find_mut<'a>(rows: &'a mut [Issue], issue_id: &str) -> Result<&'a mut Issue> {
    rows.iter_mut()
        .find(|row| row.id == issue_id)
        .ok_or_else(|| InshallahError::IssueNotFound {
            id: issue_id.to_string(),
        })
}

fn children_index(rows: &[Issue]) -> HashMap<&str, Vec<&Issue>> {
    let mut index: HashMap<&str, Vec<&Issue>> = HashMap::new();
    for row in rows {
        for dep in &row.deps {
            if dep.dep_type == DepType::Parent {
                index.entry(dep.target.as_str()).or_default().push(row);
            }
        }
    }
    index
}

fn subtree_ids_of(rows: &[Issue], root_id: &str) -> Vec<String> {
    let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for row in rows {
        for dep in &row.deps {
            if dep.dep_type == DepType::Parent {
                children_of
                    .entry(dep.target.as_str())
                    .or_default()
                    .push(row.id.as_str());
            }
        }
    }

    let mut result = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(root_id);
    while let Some(node_id) = queue.pop_front() {
        if !seen.insert(node_id) {
            continue;
        }
        result.push(node_id.to_string());
        if let Some(kids) = children_of.get(node_id) {
            for kid in kids {
                queue.push_back(kid);
            }
        }
    }
    result
}

fn subtree_scope<'a>(rows: &'a [Issue], root_id: &str) -> HashSet<&'a str> {
    let ids = subtree_ids_of(rows, root_id);
    rows.iter()
        .filter(|row| ids.iter().any(|id| id == &row.id))
        .map(|row| row.id.as_str())
        .collect()
}
