//! ID generation and prefix resolution for issues.
//!
//! Issue IDs have the fixed format `inshallah-<hash>` where hash is exactly
//! 8 lowercase hex chars derived from a SHA-256 seed. Collisions are handled
//! by bumping a nonce in the seed.

use sha2::{Digest, Sha256};

use crate::error::{InshallahError, Result};
use crate::util::time::now_ts_ms;

/// Issue ID prefix, including the separator.
pub const ID_PREFIX: &str = "inshallah-";

/// Length of the hex hash portion.
const HASH_LEN: usize = 8;

/// Seed string for ID generation: `title | created_at_ms | nonce`.
fn id_seed(title: &str, created_at_ms: i64, nonce: u32) -> String {
    format!("{title}|{created_at_ms}|{nonce}")
}

/// Lowercase hex SHA-256 of the input, truncated to `len` chars.
fn hex_hash(input: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(len);
    for byte in digest.iter() {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
        if out.len() >= len {
            break;
        }
    }
    out.truncate(len);
    out
}

/// Generate a fresh issue ID, retrying with a nonce while `exists` reports a
/// collision.
pub fn generate_issue_id<F>(title: &str, exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    let created_at_ms = now_ts_ms();
    let mut nonce = 0u32;
    loop {
        let hash = hex_hash(&id_seed(title, created_at_ms, nonce), HASH_LEN);
        let id = format!("{ID_PREFIX}{hash}");
        if !exists(&id) {
            return id;
        }
        nonce += 1;
    }
}

/// Fresh run correlation ID: 32 hex chars.
#[must_use]
pub fn new_run_id() -> String {
    let pid = std::process::id();
    let seed = format!("run|{}|{pid}", now_ts_ms());
    hex_hash(&seed, 32)
}

/// Check that a string has the exact issue ID shape.
#[must_use]
pub fn is_valid_issue_id(id: &str) -> bool {
    match id.strip_prefix(ID_PREFIX) {
        Some(hash) => {
            hash.len() == HASH_LEN
                && hash
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        }
        None => false,
    }
}

/// Resolve a partial ID against the set of known IDs.
///
/// An exact match wins outright. Otherwise every ID starting with the input
/// is a candidate: exactly one resolves, several is `AmbiguousPrefix`
/// (carrying up to five candidates), none is `IssueNotFound`.
///
/// # Errors
///
/// - `IssueNotFound` if nothing matches.
/// - `AmbiguousPrefix` if more than one ID shares the prefix.
pub fn resolve_prefix<'a, I>(input: &str, ids: I) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let input = input.trim();
    if input.is_empty() {
        return Err(InshallahError::IssueNotFound {
            id: input.to_string(),
        });
    }

    let mut matches: Vec<String> = Vec::new();
    for id in ids {
        if id == input {
            return Ok(id.to_string());
        }
        if id.starts_with(input) {
            matches.push(id.to_string());
        }
    }

    match matches.len() {
        0 => Err(InshallahError::IssueNotFound {
            id: input.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => {
            matches.truncate(5);
            Err(InshallahError::AmbiguousPrefix {
                partial: input.to_string(),
                matches,
            })
        }
    }
}
