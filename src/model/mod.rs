//! Core data types for `inshallah`.
//!
//! This module defines the fundamental types used throughout the engine:
//! - `Issue` - A unit of work, a node in the DAG
//! - `Status` - Issue lifecycle states
//! - `Outcome` - Terminal outcome attached when an issue closes
//! - `DepEdge` / `DepType` - Relationships between issues
//! - `ExecutionSpec` - Per-issue execution overrides
//! - `ForumMessage` - A message on the coordination side-channel
//! - `ValidationResult` - Result of the subtree completion check

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InshallahError;

/// Issue lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Closed,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = InshallahError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "closed" => Ok(Self::Closed),
            other => Err(InshallahError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Outcome attached to a closed issue.
///
/// `Expanded` is a delegation outcome: the issue decomposed its work into
/// children, so its logical completion flows through its descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    NeedsWork,
    Skipped,
    Expanded,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::NeedsWork => "needs_work",
            Self::Skipped => "skipped",
            Self::Expanded => "expanded",
        }
    }

    /// Terminal outcomes satisfy a `blocks` prerequisite and allow a parent
    /// to be collapsed. `Expanded` is not terminal; `Failure` and
    /// `NeedsWork` demand re-orchestration.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Skipped)
    }

    /// Outcomes that require the orchestrator to re-expand the issue.
    #[must_use]
    pub const fn needs_reorchestration(self) -> bool {
        matches!(self, Self::Failure | Self::NeedsWork)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = InshallahError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "needs_work" | "needswork" => Ok(Self::NeedsWork),
            "skipped" => Ok(Self::Skipped),
            "expanded" => Ok(Self::Expanded),
            other => Err(InshallahError::InvalidOutcome {
                outcome: other.to_string(),
            }),
        }
    }
}

/// Dependency edge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepType {
    /// Child → parent hierarchy edge: the carrying issue is a child of the
    /// target.
    Parent,
    /// Ordering edge: the carrying issue must terminate before the target
    /// may run.
    Blocks,
}

impl DepType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Blocks => "blocks",
        }
    }
}

impl fmt::Display for DepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DepType {
    type Err = InshallahError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parent" => Ok(Self::Parent),
            "blocks" => Ok(Self::Blocks),
            other => Err(InshallahError::InvalidDepType {
                dep_type: other.to_string(),
            }),
        }
    }
}

/// A single dependency edge carried on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepEdge {
    #[serde(rename = "type")]
    pub dep_type: DepType,
    pub target: String,
}

impl DepEdge {
    #[must_use]
    pub fn new(dep_type: DepType, target: impl Into<String>) -> Self {
        Self {
            dep_type,
            target: target.into(),
        }
    }
}

/// Per-issue execution overrides, the highest tier of config resolution.
///
/// All fields are optional; `role` routes the issue to a role template under
/// `.inshallah/roles/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_path: Option<String>,
}

impl ExecutionSpec {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.cli.is_none()
            && self.model.is_none()
            && self.reasoning.is_none()
            && self.prompt_path.is_none()
    }
}

/// Default issue priority (1 = highest, 5 = lowest).
pub const DEFAULT_PRIORITY: i64 = 3;

/// Valid priority range.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i64> = 1..=5;

/// The primary issue entity, one JSON object per line in `issues.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique ID (`inshallah-` + 8 hex chars). Immutable.
    pub id: String,

    /// Short title.
    pub title: String,

    /// Detailed body, may be empty.
    #[serde(default)]
    pub body: String,

    /// Lifecycle status.
    #[serde(default)]
    pub status: Status,

    /// Outcome, non-null exactly when `status == Closed`.
    #[serde(default)]
    pub outcome: Option<Outcome>,

    /// Ordered tags, duplicates forbidden. `node:agent` marks the issue as
    /// dispatchable; `node:root` marks a top-level goal.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Ordered dependency edges.
    #[serde(default)]
    pub deps: Vec<DepEdge>,

    /// Per-issue execution overrides.
    #[serde(default)]
    pub execution_spec: Option<ExecutionSpec>,

    /// Priority (1 = highest, 5 = lowest).
    #[serde(default = "default_priority")]
    pub priority: i64,

    /// Creation time, epoch seconds. Immutable.
    pub created_at: i64,

    /// Last mutation time, epoch seconds. Advances monotonically.
    pub updated_at: i64,
}

const fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

impl Issue {
    /// Direct parent ids (targets of this issue's `parent` edges).
    #[must_use]
    pub fn parent_ids(&self) -> Vec<&str> {
        self.deps
            .iter()
            .filter(|d| d.dep_type == DepType::Parent)
            .map(|d| d.target.as_str())
            .collect()
    }

    /// Whether the issue carries the given tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether this issue closed with an outcome demanding re-expansion.
    #[must_use]
    pub fn needs_reorchestration(&self) -> bool {
        self.status == Status::Closed
            && self.outcome.is_some_and(Outcome::needs_reorchestration)
    }

    /// Whether this issue is a closed delegation node.
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.status == Status::Closed && self.outcome == Some(Outcome::Expanded)
    }
}

/// Tag marking issues eligible for agent dispatch.
pub const TAG_AGENT: &str = "node:agent";
/// Tag marking top-level goal issues.
pub const TAG_ROOT: &str = "node:root";

/// A message on the append-only forum. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumMessage {
    /// Topic key, by convention `issue:<id>` or free-form.
    pub topic: String,
    /// Message body, may itself be JSON.
    pub body: String,
    /// Author label (e.g. `orchestrator`, `reviewer`).
    pub author: String,
    /// Epoch seconds.
    pub created_at: i64,
}

/// Per-topic metadata returned by `ForumStore::topics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic: String,
    pub messages: usize,
    pub last_at: i64,
}

/// Result of the subtree completion check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_final: bool,
    pub reason: String,
}

impl ValidationResult {
    #[must_use]
    pub fn finished(reason: impl Into<String>) -> Self {
        Self {
            is_final: true,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn pending(reason: impl Into<String>) -> Self {
        Self {
            is_final: false,
            reason: reason.into(),
        }
    }
}
