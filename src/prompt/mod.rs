//! Prompt templates: frontmatter, placeholder substitution, role catalog.
//!
//! Templates are markdown files with optional YAML frontmatter carrying
//! `cli` / `model` / `reasoning` defaults. The body supports two
//! placeholders: `{{PROMPT}}` (the issue's title and body) and `{{ROLES}}`
//! (a catalog of the repo's role templates).

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::roles_dir;
use crate::error::Result;
use crate::model::Issue;

/// Frontmatter keys recognised on orchestrator and role templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PromptMeta {
    #[serde(default)]
    pub cli: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl PromptMeta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cli.is_none() && self.model.is_none() && self.reasoning.is_none()
    }
}

/// A role template listed for `status` / `roles` output.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RoleInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub description: String,
}

/// Split a template into `(frontmatter, body)`. Frontmatter is the
/// `---` ... `---` block at the very start of the file.
#[must_use]
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content.strip_prefix("---\n") else {
        return (None, content);
    };
    match rest.find("\n---") {
        Some(end) => {
            let meta = &rest[..end + 1];
            let mut body = &rest[end + 4..];
            if let Some(stripped) = body.strip_prefix('\n') {
                body = stripped;
            }
            (Some(meta), body)
        }
        None => (None, content),
    }
}

/// Parse the frontmatter of a template file. Missing frontmatter or a file
/// that fails to parse yields empty meta.
pub fn read_prompt_meta(path: &Path) -> Result<PromptMeta> {
    let content = fs::read_to_string(path)?;
    let (meta, _) = split_frontmatter(&content);
    match meta {
        Some(yaml) => Ok(serde_yaml::from_str(yaml).unwrap_or_default()),
        None => Ok(PromptMeta::default()),
    }
}

fn issue_prompt_text(issue: &Issue) -> String {
    if issue.body.is_empty() {
        issue.title.clone()
    } else {
        format!("{}\n\n{}", issue.title, issue.body)
    }
}

/// Render a template for an issue: strip frontmatter, substitute
/// `{{PROMPT}}` and `{{ROLES}}`. Without a repo root the role catalog
/// expands to the empty string.
pub fn render(template_path: &Path, issue: &Issue, repo_root: Option<&Path>) -> Result<String> {
    let content = fs::read_to_string(template_path)?;
    let (_, body) = split_frontmatter(&content);

    let mut rendered = body.replace("{{PROMPT}}", &issue_prompt_text(issue));
    if rendered.contains("{{ROLES}}") {
        let catalog = repo_root.map_or_else(String::new, build_role_catalog);
        rendered = rendered.replace("{{ROLES}}", &catalog);
    }
    Ok(rendered)
}

/// Fallback prompt when no template resolves: title, blank line, body.
#[must_use]
pub fn render_bare(issue: &Issue) -> String {
    issue_prompt_text(issue)
}

fn role_files(repo_root: &Path) -> Vec<(String, PathBuf)> {
    let dir = roles_dir(repo_root);
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_stem()?.to_str()?.to_string();
            (path.extension().and_then(|e| e.to_str()) == Some("md")).then_some((name, path))
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

fn first_body_line(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Build the `{{ROLES}}` catalog from `.inshallah/roles/*.md`, sorted by
/// role name. Each entry: a `###` heading, the resolved config line (or
/// `default config`), and the first body line as a blockquote.
#[must_use]
pub fn build_role_catalog(repo_root: &Path) -> String {
    let mut sections = Vec::new();
    for (name, path) in role_files(repo_root) {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let (meta_src, body) = split_frontmatter(&content);
        let meta: PromptMeta = meta_src
            .and_then(|yaml| serde_yaml::from_str(yaml).ok())
            .unwrap_or_default();

        let mut config_parts = Vec::new();
        if let Some(cli) = &meta.cli {
            config_parts.push(format!("cli: {cli}"));
        }
        if let Some(model) = &meta.model {
            config_parts.push(format!("model: {model}"));
        }
        if let Some(reasoning) = &meta.reasoning {
            config_parts.push(format!("reasoning: {reasoning}"));
        }
        let config_line = if config_parts.is_empty() {
            "default config".to_string()
        } else {
            config_parts.join(", ")
        };

        let mut section = format!("### {name}\n{config_line}");
        let description = first_body_line(body);
        if !description.is_empty() {
            section.push_str(&format!("\n> {description}"));
        }
        sections.push(section);
    }
    sections.join("\n\n")
}

/// Role templates as structured records for `status` and `roles` output.
#[must_use]
pub fn list_roles(repo_root: &Path) -> Vec<RoleInfo> {
    role_files(repo_root)
        .into_iter()
        .filter_map(|(name, path)| {
            let content = fs::read_to_string(&path).ok()?;
            let (meta_src, body) = split_frontmatter(&content);
            let meta: PromptMeta = meta_src
                .and_then(|yaml| serde_yaml::from_str(yaml).ok())
                .unwrap_or_default();
            Some(RoleInfo {
                name,
                cli: meta.cli,
                model: meta.model,
                reasoning: meta.reasoning,
                description: first_body_line(body),
            })
        })
        .collect()
}
