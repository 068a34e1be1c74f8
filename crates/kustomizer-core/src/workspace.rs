//! Per-run scratch directories.
//!
//! Layout for a run on `owner/repository`:
//!
//! ```text
//! <base>/<owner>/<repository>-<run>             source revision
//! <base>/<owner>/<repository>-<run>-kustomize   overlay clone
//! <base>/<owner>/<repository>-<run>-tmp         merged tree
//! ```
//!
//! The run identifier makes every path unique, so concurrent runs for the
//! same repository never share filesystem state. Nothing is created here;
//! each stage creates its own directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const OVERLAY_SUFFIX: &str = "-kustomize";
const MERGE_SUFFIX: &str = "-tmp";

/// Directories owned by a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    run_id: Uuid,
    source: PathBuf,
    overlay: PathBuf,
    merged: PathBuf,
}

impl Workspace {
    /// Allocate paths for a new run with a fresh identifier.
    pub fn allocate(base: &Path, owner: &str, repository: &str) -> Self {
        Self::with_run_id(base, owner, repository, Uuid::new_v4())
    }

    pub fn with_run_id(base: &Path, owner: &str, repository: &str, run_id: Uuid) -> Self {
        let source = base
            .join(owner)
            .join(format!("{repository}-{}", run_id.simple()));
        let overlay = suffixed(&source, OVERLAY_SUFFIX);
        let merged = suffixed(&source, MERGE_SUFFIX);
        Workspace {
            run_id,
            source,
            overlay,
            merged,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn overlay(&self) -> &Path {
        &self.overlay
    }

    pub fn merged(&self) -> &Path {
        &self.merged
    }

    /// Location of the rendered manifest inside the overlay clone.
    pub fn output_path(&self, output_file: &str) -> PathBuf {
        self.overlay.join(output_file)
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
