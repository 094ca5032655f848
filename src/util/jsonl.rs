//! JSONL file helpers shared by the stores.
//!
//! The `.inshallah/` JSONL files are shared across processes. Rewrites go
//! through a temp file and an atomic rename; appends are a single `write`.
//! Both paths hold an exclusive advisory lock on a sidecar `.lock` file for
//! the duration of the critical section. Where the platform refuses advisory
//! locks the guard degrades to unlocked single-write appends.
//!
//! Files are created with mode 0644 (subject to the umask) so sibling
//! processes of other users can read the shared state.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// Mode for newly created state files.
const FILE_MODE: u32 = 0o644;

fn apply_create_mode(options: &mut OpenOptions) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    #[cfg(not(unix))]
    let _ = options;
}

/// Exclusive advisory lock over a data file, held via a `<file>.lock`
/// sidecar so atomic renames of the data file do not invalidate the lock.
pub struct FileLock {
    file: Option<File>,
}

impl FileLock {
    /// Acquire the lock, blocking until available. Lock acquisition failure
    /// (unsupported filesystem) is tolerated; the guard is then a no-op.
    pub fn acquire(data_path: &Path) -> Result<Self> {
        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_path = lock_path_for(data_path);
        let mut options = OpenOptions::new();
        options.create(true).write(true);
        apply_create_mode(&mut options);
        let file = options.open(&lock_path)?;
        match file.lock_exclusive() {
            Ok(()) => Ok(Self { file: Some(file) }),
            Err(err) => {
                debug!(?err, path = %lock_path.display(), "advisory lock unavailable");
                Ok(Self { file: None })
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}

fn lock_path_for(data_path: &Path) -> PathBuf {
    let mut os = data_path.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

/// Read every record from a JSONL file. A missing file is an empty list.
/// Blank lines are skipped; a malformed line is a hard error (the stores own
/// these files and never write garbage).
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(serde_json::from_str(&line)?);
    }
    Ok(rows)
}

/// Rewrite a JSONL file with the given records: write to a temp file in the
/// same directory, flush, then rename over the target.
///
/// Callers that read-modify-write must hold a [`FileLock`] across the whole
/// cycle; this function only guarantees the write itself is atomic.
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let tmp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .map_or_else(|| "jsonl".to_string(), |n| n.to_string_lossy().into_owned()),
        std::process::id()
    ));

    {
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        apply_create_mode(&mut options);
        let tmp = options.open(&tmp_path)?;
        let mut writer = BufWriter::new(tmp);
        for row in rows {
            serde_json::to_writer(&mut writer, row)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Append one pre-serialized line under the file lock, as a single write.
/// The file is created with mode 0644 on first write.
pub fn append_line_locked(path: &Path, line: &str) -> Result<()> {
    let _lock = FileLock::acquire(path)?;
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    apply_create_mode(&mut options);
    let mut file = options.open(path)?;
    let mut data = line.to_string();
    if !data.ends_with('\n') {
        data.push('\n');
    }
    file.write_all(data.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        n: i64,
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<Row> = read_jsonl(&dir.path().join("missing.jsonl")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        let rows = vec![
            Row { id: "a".into(), n: 1 },
            Row { id: "b".into(), n: 2 },
        ];
        write_jsonl(&path, &rows).unwrap();
        let back: Vec<Row> = read_jsonl(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("rows.jsonl");
        write_jsonl::<Row>(&path, &[]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_append_line_locked_adds_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        append_line_locked(&path, "{\"a\":1}").unwrap();
        append_line_locked(&path, "{\"a\":2}\n").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_created_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let appended = dir.path().join("events.jsonl");
        append_line_locked(&appended, "{}").unwrap();
        let rewritten = dir.path().join("issues.jsonl");
        write_jsonl(&rewritten, &[Row { id: "a".into(), n: 1 }]).unwrap();

        for path in [appended, rewritten] {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            // 0644 requested; the umask may clear group/other bits but the
            // owner must end up with rw and nothing executable.
            assert_eq!(mode & 0o600, 0o600, "{path:?} mode {mode:o}");
            assert_eq!(mode & 0o111, 0, "{path:?} mode {mode:o}");
        }
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        write_jsonl(&path, &[Row { id: "a".into(), n: 1 }]).unwrap();
        write_jsonl(&path, &[Row { id: "b".into(), n: 2 }]).unwrap();
        let back: Vec<Row> = read_jsonl(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].id, "b");
    }
}
