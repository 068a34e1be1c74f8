//! Overlay repository fetch.

use std::path::Path;
use tracing::info;

use crate::domain::Result;
use crate::git::Git;

/// Clone the overlay repository at its default branch tip into `dest`.
pub async fn fetch_overlay(git: &Git, overlay_url: &str, dest: &Path) -> Result<()> {
    git.clone_repo(overlay_url, dest).await?;
    info!(dest = %dest.display(), "cloned overlay repository");
    Ok(())
}
