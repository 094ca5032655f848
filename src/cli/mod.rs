//! CLI definitions and dispatch.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

pub mod commands;

/// Print a value as pretty JSON on stdout (machine mode).
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => println!("{{\"error\":\"{err}\"}}"),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "inshallah",
    about = "Drive coding agents through a tree of issues",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only errors on stderr
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// The goal (run); ignored by resume
    pub prompt: Vec<String>,

    /// Maximum loop steps before giving up
    #[arg(long, default_value_t = 20)]
    pub max_steps: u32,

    /// Skip the reviewer pass after successful steps
    #[arg(long)]
    pub no_review: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a root issue from a goal and drive it to completion
    Run(RunArgs),

    /// Resume an interrupted DAG run
    Resume {
        /// Root issue id (or unique prefix)
        root: String,
        #[command(flatten)]
        args: RunArgs,
    },

    /// Workspace overview: roots, ready work, topics, roles
    Status,

    /// List role templates from .inshallah/roles/
    Roles,

    /// Issue store operations
    Issues {
        #[command(subcommand)]
        command: IssuesCommand,
    },

    /// Forum (coordination side-channel) operations
    Forum {
        #[command(subcommand)]
        command: ForumCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum IssuesCommand {
    /// List issues, optionally filtered
    List {
        /// Filter by status (open, in_progress, closed)
        #[arg(long)]
        status: Option<String>,
        /// Filter by tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// Show one issue by id or unique prefix
    Get { id: String },
    /// Create an issue
    Create {
        title: String,
        #[arg(long)]
        body: Option<String>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tag: Vec<String>,
        /// Priority 1-5, lower is higher
        #[arg(long)]
        priority: Option<i64>,
        /// Execution spec: role under .inshallah/roles/
        #[arg(long)]
        role: Option<String>,
        /// Execution spec: backend CLI name
        #[arg(long)]
        cli: Option<String>,
        /// Execution spec: model name
        #[arg(long)]
        model: Option<String>,
        /// Execution spec: reasoning level
        #[arg(long)]
        reasoning: Option<String>,
        /// Execution spec: prompt template path
        #[arg(long)]
        prompt_path: Option<String>,
        /// Dependency edge TYPE:TARGET (repeatable)
        #[arg(long = "dep")]
        dep: Vec<String>,
    },
    /// Patch an issue
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Outcome; "none" clears it
        #[arg(long)]
        outcome: Option<String>,
        /// Replace tags (repeatable)
        #[arg(long = "tag")]
        tag: Vec<String>,
        #[arg(long)]
        priority: Option<i64>,
    },
    /// Claim an open issue (open → in_progress)
    Claim { id: String },
    /// Close an issue with an outcome
    Close {
        id: String,
        #[arg(long, default_value = "success")]
        outcome: String,
    },
    /// Add a dependency edge
    Dep {
        src: String,
        dep_type: String,
        dst: String,
    },
    /// Remove a dependency edge
    Undep {
        src: String,
        dep_type: String,
        dst: String,
    },
    /// Direct children of an issue
    Children { id: String },
    /// Ready leaves: open, unblocked, tag-matching
    Ready {
        #[arg(long)]
        root: Option<String>,
        /// Required tag (repeatable)
        #[arg(long = "tag")]
        tag: Vec<String>,
    },
    /// Completion check for a subtree
    Validate { root: String },
}

#[derive(Subcommand, Debug)]
pub enum ForumCommand {
    /// Append a message to a topic
    Post {
        topic: String,
        body: String,
        #[arg(long, default_value = "system")]
        author: String,
    },
    /// Read the last messages of a topic
    Read {
        topic: String,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// List topics by recency
    Topics {
        #[arg(long)]
        prefix: Option<String>,
    },
}
