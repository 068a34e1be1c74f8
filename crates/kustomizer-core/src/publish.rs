//! Publication of the rendered manifest to the overlay remote.

use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::config::{Credentials, Identity};
use crate::domain::{KustomizerError, Result};
use crate::git::Git;

/// Remote the overlay clone pushes to.
pub const REMOTE: &str = "origin";

/// Outcome of a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Publication {
    /// A new commit was pushed.
    Pushed { commit: String, message: String },
    /// The manifest matched the committed one; nothing was pushed.
    Unchanged,
}

/// Commit message for `file`, based on whether HEAD already tracks it.
pub fn commit_message(file: &str, tracked: bool) -> String {
    if tracked {
        format!("updating {file}")
    } else {
        format!("adding {file}")
    }
}

/// Stage exactly `file`, commit it as `identity` and push to `origin`.
///
/// Nothing else in the repository is staged. An unchanged manifest yields
/// [`Publication::Unchanged`] without a commit. Push rejections are not
/// retried.
pub async fn publish(
    git: &Git,
    repo: &Path,
    file: &str,
    identity: &Identity,
    credentials: &Credentials,
) -> Result<Publication> {
    if !git.is_git_repo(repo).await {
        return Err(KustomizerError::Stage {
            file: file.to_string(),
            cause: format!("{} is not a git repository", repo.display()),
        });
    }

    let tracked = git.is_tracked(repo, file).await;
    git.add(repo, file).await?;

    if !git.has_staged_changes(repo, file).await? {
        info!(file, "rendered manifest unchanged; nothing to publish");
        return Ok(Publication::Unchanged);
    }

    let message = commit_message(file, tracked);
    let commit = git.commit(repo, &message, identity).await?;
    git.push(repo, REMOTE, credentials).await?;
    info!(commit = %commit, message = %message, "pushed rendered manifest");

    Ok(Publication::Pushed { commit, message })
}
