//! Resolve a checkout target to a concrete commit hash.

use std::path::Path;
use tracing::debug;

use crate::domain::{CheckoutTarget, KustomizerError, Result};
use crate::git::{Git, TagRef};

const TAG_PREFIX: &str = "refs/tags/";

/// Full reference name for a tag given either `v1.0` or `refs/tags/v1.0`.
pub fn full_tag_ref(name: &str) -> String {
    if name.starts_with(TAG_PREFIX) {
        name.to_string()
    } else {
        format!("{TAG_PREFIX}{name}")
    }
}

/// Scan `tags` in order and return the target of the first exact match.
///
/// The scan returns as soon as a tag matches; later entries are never pulled
/// from the iterator, so an error further down cannot mask a match.
pub fn resolve_tag<I>(tags: I, name: &str) -> Result<String>
where
    I: IntoIterator<Item = Result<TagRef>>,
{
    let wanted = full_tag_ref(name);
    for tag in tags {
        let tag = tag?;
        if tag.name == wanted {
            return Ok(tag.target);
        }
    }
    Err(KustomizerError::TagNotFound {
        name: name.to_string(),
    })
}

/// Turn a checkout target into a commit hash for the repository at `repo`.
///
/// Commit targets are already hashes and pass through untouched.
pub async fn resolve_revision(git: &Git, repo: &Path, target: &CheckoutTarget) -> Result<String> {
    match target {
        CheckoutTarget::Commit(hash) => Ok(hash.clone()),
        CheckoutTarget::Tag(name) => {
            let tags = git.tags(repo).await?;
            debug!(tag = %name, candidates = tags.len(), "resolving tag");
            resolve_tag(tags.into_iter().map(Ok), name)
        }
    }
}
