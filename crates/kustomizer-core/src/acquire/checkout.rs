//! Clone-and-checkout acquisition.

use std::path::Path;
use tracing::info;

use crate::domain::{CheckoutTarget, Result, Revision};
use crate::git::Git;
use crate::resolver::resolve_revision;

/// Clone `clone_url` into `dest` and check out `target`.
pub async fn checkout_source(
    git: &Git,
    clone_url: &str,
    target: &CheckoutTarget,
    dest: &Path,
) -> Result<Revision> {
    git.clone_repo(clone_url, dest).await?;
    git.pull(dest).await?;

    let revision = resolve_revision(git, dest, target).await?;
    let hash = git.checkout(dest, &revision).await?;
    info!(target = %target.as_str(), hash = %hash, "checked out source revision");

    Ok(Revision::Commit {
        root: dest.to_path_buf(),
        hash,
    })
}
