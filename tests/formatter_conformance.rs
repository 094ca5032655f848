//! Formatter conformance against captured vendor streams.
//!
//! Replays short real-world-shaped sessions line by line and checks the
//! structured updates that reach the sink.

use std::sync::Arc;

use inshallah::fmt::get_formatter;
use inshallah::output::{RecordingSink, SinkEvent};

fn replay(backend: &str, lines: &[&str]) -> Arc<RecordingSink> {
    let sink = Arc::new(RecordingSink::new());
    let mut formatter = get_formatter(backend, sink.clone());
    for line in lines {
        formatter.process_line(line);
    }
    formatter.finish();
    sink
}

#[test]
fn codex_session() {
    let sink = replay(
        "codex",
        &[
            r#"{"type":"item.started","item":{"id":"item_0","type":"command_execution","command":"/usr/bin/zsh -lc 'cd /repo && cargo test'","status":"in_progress"}}"#,
            r#"{"type":"item.completed","item":{"id":"item_0","type":"command_execution","exit_code":0,"status":"completed"}}"#,
            r#"{"type":"item.started","item":{"id":"item_1","type":"tool_call","tool_name":"apply_patch","input":"{\"path\":\"src/lib.rs\"}"}}"#,
            r#"{"type":"item.completed","item":{"id":"item_1","type":"tool_call","status":"completed"}}"#,
            r#"{"type":"item.completed","item":{"id":"item_2","type":"agent_message","text":"All tests pass."}}"#,
            r#"{"type":"response.completed","status":"completed","usage":{"total_tokens":4321}}"#,
        ],
    );

    assert_eq!(
        sink.tools(),
        vec![
            ("bash".to_string(), "cargo test".to_string(), true),
            ("edit".to_string(), "src/lib.rs".to_string(), true),
        ]
    );
    assert_eq!(sink.text(), "All tests pass.");
}

#[test]
fn claude_partial_stream_session() {
    let sink = replay(
        "claude",
        &[
            r#"{"type":"stream_event","event":{"type":"content_block_start","content_block":{"type":"thinking"}}}"#,
            r#"{"type":"stream_event","event":{"type":"content_block_stop"}}"#,
            r#"{"type":"stream_event","event":{"type":"content_block_start","content_block":{"type":"tool_use","id":"toolu_1","name":"Bash"}}}"#,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{\"command\":\"ls"}}}"#,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":" -la\"}"}}}"#,
            r#"{"type":"stream_event","event":{"type":"content_block_stop"}}"#,
            r#"{"type":"tool_result","is_error":false}"#,
            r#"{"type":"stream_event","event":{"type":"content_block_start","content_block":{"type":"text"}}}"#,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"Done"}}}"#,
            r#"{"type":"stream_event","event":{"type":"content_block_stop"}}"#,
            r#"{"type":"assistant","message":{"content":"Done"}}"#,
            r#"{"type":"result","cost_usd":0.02,"duration_ms":1500}"#,
        ],
    );

    assert_eq!(
        sink.tools(),
        vec![("bash".to_string(), "ls -la".to_string(), true)]
    );
    // Streamed text is not duplicated by the consolidated assistant event.
    assert_eq!(sink.text(), "Done");
    let lines: Vec<String> = sink
        .events()
        .into_iter()
        .filter_map(|ev| match ev {
            SinkEvent::Line { text } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec!["thinking...".to_string()]);
}

#[test]
fn gemini_session() {
    let sink = replay(
        "gemini",
        &[
            r#"{"type":"init","model":"gemini-2.5-pro"}"#,
            r#"{"type":"tool_use","tool_name":"search_file_content","tool_id":"t1","parameters":{"pattern":"fn main"}}"#,
            r#"{"type":"tool_result","tool_id":"t1","status":"success"}"#,
            r#"{"type":"message","role":"assistant","content":"Found it."}"#,
            r#"{"type":"result","status":"success","duration_ms":800,"usage":{"totalTokens":99}}"#,
        ],
    );
    assert_eq!(
        sink.tools(),
        vec![("grep".to_string(), "fn main".to_string(), true)]
    );
    assert_eq!(sink.text(), "Found it.");
}

#[test]
fn pi_session_with_error_end() {
    let sink = replay(
        "pi",
        &[
            r#"{"type":"tool_execution_start","toolCallId":"t1","toolName":"write","args":{"path":"out.txt"}}"#,
            r#"{"type":"tool_execution_end","toolCallId":"t1","isError":false}"#,
            r#"{"type":"message_update","message":{"role":"assistant"},"assistantMessageEvent":{"type":"text_delta","delta":"Partial"}}"#,
            r#"{"type":"message_end","message":{"role":"assistant","stopReason":"error","errorMessage":"quota exceeded"}}"#,
        ],
    );
    assert_eq!(
        sink.tools(),
        vec![("write".to_string(), "out.txt".to_string(), true)]
    );
    assert_eq!(sink.text(), "Partial");
    assert_eq!(sink.errors(), vec!["quota exceeded".to_string()]);
}

#[test]
fn opencode_session() {
    let sink = replay(
        "opencode",
        &[
            r#"{"type":"tool_use","part":{"tool":"glob","state":{"status":"completed","input":{"pattern":"**/*.rs"}}}}"#,
            r#"{"type":"text","part":{"text":"Scanned the tree."}}"#,
        ],
    );
    assert_eq!(
        sink.tools(),
        vec![("glob".to_string(), "**/*.rs".to_string(), true)]
    );
    assert_eq!(sink.text(), "Scanned the tree.");
}

#[test]
fn garbage_streams_never_panic() {
    for backend in ["codex", "claude", "opencode", "gemini", "pi"] {
        let sink = replay(
            backend,
            &[
                "",
                "   ",
                "{broken json",
                r#"{"type":"totally_unknown","x":1}"#,
                r#"[1,2,3]"#,
                r#""just a string""#,
            ],
        );
        assert!(sink.events().is_empty(), "{backend} emitted on garbage");
    }
}
