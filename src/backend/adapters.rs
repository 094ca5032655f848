//! Argv construction for the stock backends.
//!
//! Each adapter maps the resolved `(prompt, model, reasoning, cwd)` onto the
//! vendor CLI's flags. The prompt rides as the final positional argument
//! except where the CLI wants a named flag.

use super::{Backend, RunRequest};

pub struct CodexBackend;

impl Backend for CodexBackend {
    fn name(&self) -> &str {
        "codex"
    }

    fn build_argv(&self, req: &RunRequest<'_>) -> Vec<String> {
        vec![
            "codex".into(),
            "exec".into(),
            "--json".into(),
            "-C".into(),
            req.cwd.display().to_string(),
            "-m".into(),
            req.model.into(),
            "-c".into(),
            format!("model_reasoning_effort={}", req.reasoning),
            req.prompt.into(),
        ]
    }
}

pub struct ClaudeBackend;

impl Backend for ClaudeBackend {
    fn name(&self) -> &str {
        "claude"
    }

    fn build_argv(&self, req: &RunRequest<'_>) -> Vec<String> {
        vec![
            "claude".into(),
            "-p".into(),
            "--verbose".into(),
            "--output-format".into(),
            "stream-json".into(),
            "--include-partial-messages".into(),
            "--model".into(),
            req.model.into(),
            req.prompt.into(),
        ]
    }
}

pub struct OpenCodeBackend;

impl Backend for OpenCodeBackend {
    fn name(&self) -> &str {
        "opencode"
    }

    fn build_argv(&self, req: &RunRequest<'_>) -> Vec<String> {
        vec![
            "opencode".into(),
            "run".into(),
            "--print-logs".into(),
            "--format".into(),
            "json".into(),
            "-m".into(),
            req.model.into(),
            req.prompt.into(),
        ]
    }
}

pub struct GeminiBackend;

impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn build_argv(&self, req: &RunRequest<'_>) -> Vec<String> {
        vec![
            "gemini".into(),
            "--approval-mode".into(),
            "yolo".into(),
            "--output-format".into(),
            "stream-json".into(),
            "--model".into(),
            req.model.into(),
            "--prompt".into(),
            req.prompt.into(),
        ]
    }
}

pub struct PiBackend;

impl Backend for PiBackend {
    fn name(&self) -> &str {
        "pi"
    }

    fn build_argv(&self, req: &RunRequest<'_>) -> Vec<String> {
        vec![
            "pi".into(),
            "--mode".into(),
            "json".into(),
            "-p".into(),
            "--no-session".into(),
            req.prompt.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn req<'a>(cwd: &'a Path) -> RunRequest<'a> {
        RunRequest {
            prompt: "Example prompt",
            model: "test-model",
            reasoning: "high",
            cwd,
        }
    }

    fn flag_value<'a>(argv: &'a [String], flag: &str) -> &'a str {
        let idx = argv.iter().position(|a| a == flag).unwrap();
        &argv[idx + 1]
    }

    #[test]
    fn codex_argv_shape() {
        let cwd = Path::new("/work");
        let argv = CodexBackend.build_argv(&req(cwd));
        assert_eq!(&argv[..2], &["codex".to_string(), "exec".to_string()]);
        assert!(argv.contains(&"--json".to_string()));
        assert_eq!(flag_value(&argv, "-C"), "/work");
        assert_eq!(flag_value(&argv, "-m"), "test-model");
        assert_eq!(flag_value(&argv, "-c"), "model_reasoning_effort=high");
        assert_eq!(argv.last().unwrap(), "Example prompt");
    }

    #[test]
    fn claude_argv_appends_prompt() {
        let cwd = Path::new("/work");
        let argv = ClaudeBackend.build_argv(&req(cwd));
        assert_eq!(argv[0], "claude");
        assert!(argv.contains(&"--output-format".to_string()));
        assert!(argv.contains(&"stream-json".to_string()));
        assert!(argv.contains(&"--include-partial-messages".to_string()));
        assert_eq!(flag_value(&argv, "--model"), "test-model");
        assert_eq!(argv.last().unwrap(), "Example prompt");
    }

    #[test]
    fn opencode_argv_shape() {
        let cwd = Path::new("/work");
        let argv = OpenCodeBackend.build_argv(&req(cwd));
        assert_eq!(&argv[..2], &["opencode".to_string(), "run".to_string()]);
        assert_eq!(flag_value(&argv, "--format"), "json");
        assert_eq!(flag_value(&argv, "-m"), "test-model");
        assert_eq!(argv.last().unwrap(), "Example prompt");
    }

    #[test]
    fn gemini_argv_shape() {
        let cwd = Path::new("/work");
        let argv = GeminiBackend.build_argv(&req(cwd));
        assert_eq!(argv[0], "gemini");
        assert_eq!(flag_value(&argv, "--approval-mode"), "yolo");
        assert_eq!(flag_value(&argv, "--output-format"), "stream-json");
        assert_eq!(flag_value(&argv, "--model"), "test-model");
        assert_eq!(flag_value(&argv, "--prompt"), "Example prompt");
    }

    #[test]
    fn pi_argv_shape() {
        let cwd = Path::new("/work");
        let argv = PiBackend.build_argv(&req(cwd));
        assert_eq!(argv[0], "pi");
        assert_eq!(flag_value(&argv, "--mode"), "json");
        assert_eq!(argv.last().unwrap(), "Example prompt");
    }
}
