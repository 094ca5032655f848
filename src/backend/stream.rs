//! Subprocess launch and line-by-line output streaming.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use tracing::debug;

use crate::error::{InshallahError, Result};

/// Spawn `argv` in `cwd` and stream its output.
///
/// stdout and stderr are each read line-by-line on their own thread and
/// merged into a single channel, so lines reach the tee file (flushed
/// immediately) and `on_line` in arrival order across both streams. A read
/// error on one stream ends that stream's delivery; the other continues.
/// Returns the child's exit code (`-1` when killed by a signal).
pub fn stream_process(
    argv: &[String],
    cwd: &Path,
    on_line: &mut dyn FnMut(&str),
    tee_path: Option<&Path>,
) -> Result<i32> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        InshallahError::validation("argv", "backend argv must not be empty")
    })?;

    let mut tee = match tee_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            Some(OpenOptions::new().create(true).append(true).open(path)?)
        }
        None => None,
    };

    debug!(program, ?args, cwd = %cwd.display(), "spawning backend");
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let (tx, rx) = mpsc::channel::<String>();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_line_reader(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_line_reader(stderr, tx.clone()));
    }
    // The receive loop ends once both reader threads hang up.
    drop(tx);

    for line in rx {
        deliver(&line, tee.as_mut(), on_line);
    }
    for handle in readers {
        let _ = handle.join();
    }

    let status = child.wait()?;
    Ok(status.code().unwrap_or(-1))
}

fn spawn_line_reader<R>(stream: R, tx: mpsc::Sender<String>) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(std::result::Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

fn deliver(line: &str, tee: Option<&mut File>, on_line: &mut dyn FnMut(&str)) {
    if let Some(tee) = tee {
        let _ = writeln!(tee, "{line}");
        let _ = tee.flush();
    }
    on_line(line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn streams_stdout_lines_in_order() {
        let dir = TempDir::new().unwrap();
        let mut lines = Vec::new();
        let code = stream_process(
            &sh("printf 'one\\ntwo\\n'"),
            dir.path(),
            &mut |line| lines.push(line.to_string()),
            None,
        )
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn returns_child_exit_code() {
        let dir = TempDir::new().unwrap();
        let code = stream_process(&sh("exit 3"), dir.path(), &mut |_| {}, None).unwrap();
        assert_eq!(code, 3);
    }

    #[test]
    fn tee_receives_verbatim_copy() {
        let dir = TempDir::new().unwrap();
        let tee = dir.path().join("logs").join("out.jsonl");
        stream_process(
            &sh("printf '{\"a\":1}\\n{\"b\":2}\\n'"),
            dir.path(),
            &mut |_| {},
            Some(&tee),
        )
        .unwrap();
        let content = fs::read_to_string(&tee).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"b\":2}\n");
    }

    #[test]
    fn stderr_merges_in_arrival_order() {
        let dir = TempDir::new().unwrap();
        let mut lines = Vec::new();
        // Sleeps force unambiguous arrival times across the two pipes.
        stream_process(
            &sh("echo first 1>&2; sleep 0.3; echo second; sleep 0.3; echo third 1>&2"),
            dir.path(),
            &mut |line| lines.push(line.to_string()),
            None,
        )
        .unwrap();
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn stderr_lines_reach_the_tee() {
        let dir = TempDir::new().unwrap();
        let tee = dir.path().join("out.jsonl");
        stream_process(
            &sh("echo out; sleep 0.2; echo err 1>&2"),
            dir.path(),
            &mut |_| {},
            Some(&tee),
        )
        .unwrap();
        let content = fs::read_to_string(&tee).unwrap();
        assert_eq!(content, "out\nerr\n");
    }

    #[test]
    fn missing_program_is_io_error() {
        let dir = TempDir::new().unwrap();
        let argv = vec!["definitely-not-a-real-binary-zz".to_string()];
        let err = stream_process(&argv, dir.path(), &mut |_| {}, None).unwrap_err();
        assert!(matches!(err, InshallahError::Io(_)));
    }
}
