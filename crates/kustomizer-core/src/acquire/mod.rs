//! Source acquisition: materialize the triggering revision on disk.

pub mod assets;
pub mod checkout;

pub use assets::{download_release_assets, reencode_path, AssetSource, GithubReleases, ReleaseAsset};
pub use checkout::checkout_source;

use std::path::Path;

use crate::domain::{Result, Revision, Strategy, Trigger};
use crate::git::Git;

/// Materialize the revision named by `trigger` into `dest`.
pub async fn acquire(
    trigger: &Trigger,
    git: &Git,
    assets: &dyn AssetSource,
    dest: &Path,
) -> Result<Revision> {
    match &trigger.strategy {
        Strategy::ReleaseAssets { release_id } => {
            download_release_assets(assets, &trigger.owner, &trigger.repository, *release_id, dest)
                .await
        }
        Strategy::Checkout { clone_url, target } => {
            checkout_source(git, clone_url, target, dest).await
        }
    }
}
