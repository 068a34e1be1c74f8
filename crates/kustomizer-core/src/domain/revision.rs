//! Materialized source revisions.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Exactly which source content a run operates on.
///
/// Whatever strategy produced it, later stages only need [`Revision::root`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Revision {
    /// A working tree checked out at a concrete commit.
    Commit { root: PathBuf, hash: String },
    /// A directory of downloaded release assets.
    Assets { root: PathBuf, files: Vec<PathBuf> },
}

impl Revision {
    pub fn root(&self) -> &Path {
        match self {
            Revision::Commit { root, .. } | Revision::Assets { root, .. } => root,
        }
    }

    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            Revision::Commit { hash, .. } => format!("commit {}", short(hash)),
            Revision::Assets { files, .. } => format!("{} release asset(s)", files.len()),
        }
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
