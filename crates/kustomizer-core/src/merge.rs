//! Tree merge: overlay as the base, source revision as the override.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

use crate::domain::{KustomizerError, Result};

/// Directory names never copied into the merged tree.
const SKIPPED_DIRS: &[&str] = &[".git"];

/// Counts gathered while merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub overlay_files: usize,
    pub source_files: usize,
    /// Source files that replaced an overlay file at the same relative path.
    pub overridden: usize,
}

/// Copy `overlay` and then `source` into `dest`.
///
/// Later writes win, so a file present in both trees ends up with the
/// source content. Symbolic links are copied as links, never dereferenced.
/// A failure leaves the partial `dest` in place.
pub fn merge_trees(overlay: &Path, source: &Path, dest: &Path) -> Result<MergeStats> {
    let mut stats = MergeStats::default();
    fs::create_dir_all(dest).map_err(|e| merge_err("creating", dest, e))?;

    copy_tree(overlay, dest, &mut |_| stats.overlay_files += 1)
        .map_err(|e| KustomizerError::Merge(format!("copying overlay tree: {e}")))?;
    copy_tree(source, dest, &mut |replaced| {
        stats.source_files += 1;
        if replaced {
            stats.overridden += 1;
        }
    })
    .map_err(|e| KustomizerError::Merge(format!("copying source tree: {e}")))?;

    Ok(stats)
}

/// Run [`merge_trees`] on the blocking thread pool.
pub async fn merge(overlay: &Path, source: &Path, dest: &Path) -> Result<MergeStats> {
    let (overlay, source, dest) = (overlay.to_path_buf(), source.to_path_buf(), dest.to_path_buf());
    tokio::task::spawn_blocking(move || merge_trees(&overlay, &source, &dest))
        .await
        .map_err(|e| KustomizerError::Merge(format!("merge task failed: {e}")))?
}

// `on_file` receives whether the copy replaced an existing entry.
fn copy_tree(src: &Path, dst: &Path, on_file: &mut dyn FnMut(bool)) -> io::Result<()> {
    for entry in fs::read_dir(src).map_err(|e| annotate(e, src))? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        // Symlinks are recreated as links and never followed.
        let file_type = entry.file_type().map_err(|e| annotate(e, &from))?;

        if file_type.is_dir() {
            if SKIPPED_DIRS.iter().any(|skip| entry.file_name() == *skip) {
                continue;
            }
            if fs::symlink_metadata(&to).is_ok_and(|meta| !meta.is_dir()) {
                fs::remove_file(&to).map_err(|e| annotate(e, &to))?;
            }
            fs::create_dir_all(&to).map_err(|e| annotate(e, &to))?;
            copy_tree(&from, &to, on_file)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&from).map_err(|e| annotate(e, &from))?;
            let replaced = clear_destination(&to)?;
            symlink(&target, &to).map_err(|e| annotate(e, &to))?;
            debug!(path = %to.display(), target = %target.display(), replaced, "merged symlink");
            on_file(replaced);
        } else if file_type.is_file() {
            let replaced = clear_destination(&to)?;
            fs::copy(&from, &to).map_err(|e| annotate(e, &to))?;
            debug!(path = %to.display(), replaced, "merged file");
            on_file(replaced);
        } else {
            warn!(path = %from.display(), "skipping special file");
        }
    }
    Ok(())
}

/// Remove whatever occupies `path` so a write never goes through a link
/// left by the overlay tree. Returns whether anything was there.
fn clear_destination(path: &Path) -> io::Result<bool> {
    let removed = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => Err(e),
    };
    removed.map(|()| true).map_err(|e| annotate(e, path))
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links can only be merged on unix",
    ))
}

fn annotate(err: io::Error, path: &Path) -> io::Error {
    io::Error::new(err.kind(), format!("{}: {err}", path.display()))
}

fn merge_err(action: &str, path: &Path, err: io::Error) -> KustomizerError {
    KustomizerError::Merge(format!("{action} {}: {err}", path.display()))
}
