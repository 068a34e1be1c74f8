//! Release-asset acquisition.
//!
//! Lists the assets attached to a release and streams each one into the
//! run's source directory.

use async_trait::async_trait;
use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{ACCEPT, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::domain::{KustomizerError, Result, Revision};

const MAX_REDIRECTS: usize = 10;
const PER_PAGE: usize = 100;

/// Bytes escaped inside one path segment; matches the WHATWG path-segment set.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Where release assets come from.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// List every asset of release `release_id`.
    async fn list_assets(
        &self,
        owner: &str,
        repository: &str,
        release_id: u64,
    ) -> Result<Vec<ReleaseAsset>>;

    /// Stream `asset` into the file at `dest`.
    async fn download(&self, asset: &ReleaseAsset, dest: &Path) -> Result<()>;
}

/// GitHub REST API client for release assets.
pub struct GithubReleases {
    api_base: Url,
    http_client: Client,
}

impl GithubReleases {
    /// Create a client against `api_base`, e.g. `https://api.github.com`.
    pub fn new(api_base: &str) -> std::result::Result<Self, String> {
        let mut api_base =
            Url::parse(api_base).map_err(|e| format!("invalid API URL {api_base:?}: {e}"))?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        // Redirects are followed by hand so each hop can be re-encoded.
        let http_client = Client::builder()
            .user_agent(concat!("kustomizer/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::none())
            .build()
            .map_err(|e| format!("failed to create HTTP client: {e}"))?;

        Ok(GithubReleases {
            api_base,
            http_client,
        })
    }

    fn assets_url(&self, owner: &str, repository: &str, release_id: u64, page: usize) -> Result<Url> {
        let mut url = self
            .api_base
            .join(&format!("repos/{owner}/{repository}/releases/{release_id}/assets"))
            .map_err(|e| KustomizerError::AssetList(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("per_page", &PER_PAGE.to_string())
            .append_pair("page", &page.to_string());
        Ok(url)
    }

    /// GET `url`, following redirects with re-encoded paths.
    async fn fetch(&self, url: &str) -> std::result::Result<Response, String> {
        let mut target = Url::parse(url).map_err(|e| format!("invalid URL {url:?}: {e}"))?;

        for _ in 0..=MAX_REDIRECTS {
            let response = self
                .http_client
                .get(target.clone())
                .header(ACCEPT, "application/octet-stream")
                .send()
                .await
                .map_err(|e| e.to_string())?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| format!("redirect {status} without a Location header"))?;
                let mut next = target
                    .join(location)
                    .map_err(|e| format!("invalid redirect target {location:?}: {e}"))?;
                reencode_path(&mut next);
                debug!(from = %target, to = %next, "following redirect");
                target = next;
                continue;
            }

            if !status.is_success() {
                return Err(format!("unexpected response status: {status}"));
            }
            return Ok(response);
        }

        Err(format!("stopped after {MAX_REDIRECTS} redirects"))
    }
}

#[async_trait]
impl AssetSource for GithubReleases {
    async fn list_assets(
        &self,
        owner: &str,
        repository: &str,
        release_id: u64,
    ) -> Result<Vec<ReleaseAsset>> {
        let mut assets = Vec::new();
        let mut page = 1;
        loop {
            let url = self.assets_url(owner, repository, release_id, page)?;
            let response = self
                .http_client
                .get(url)
                .header(ACCEPT, "application/vnd.github+json")
                .send()
                .await
                .map_err(|e| KustomizerError::AssetList(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(KustomizerError::AssetList(format!(
                    "unexpected response status: {status}"
                )));
            }

            let batch: Vec<ReleaseAsset> = response
                .json()
                .await
                .map_err(|e| KustomizerError::AssetList(e.to_string()))?;
            let last_page = batch.len() < PER_PAGE;
            assets.extend(batch);
            if last_page {
                return Ok(assets);
            }
            page += 1;
        }
    }

    async fn download(&self, asset: &ReleaseAsset, dest: &Path) -> Result<()> {
        let download_err = |cause: String| KustomizerError::Download {
            asset: asset.name.clone(),
            cause,
        };

        let mut response = self
            .fetch(&asset.browser_download_url)
            .await
            .map_err(download_err)?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| download_err(format!("creating {}: {e}", dest.display())))?;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| download_err(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| download_err(format!("writing {}: {e}", dest.display())))?;
        }
        file.flush()
            .await
            .map_err(|e| download_err(format!("writing {}: {e}", dest.display())))?;

        Ok(())
    }
}

/// Rebuild the path of `url` from its decoded segments.
///
/// Redirect targets (signed storage URLs in particular) may carry characters
/// that are only valid once re-encoded; decoding and re-encoding each segment
/// yields one canonical form. Segments are handled as raw bytes, so escapes
/// that are not valid UTF-8 survive unchanged.
pub fn reencode_path(url: &mut Url) {
    let segments: Vec<String> = match url.path_segments() {
        Some(segments) => segments
            .map(|s| {
                let raw: Vec<u8> = percent_decode_str(s).collect();
                percent_encode(&raw, PATH_SEGMENT).to_string()
            })
            .collect(),
        None => return,
    };
    url.set_path(&format!("/{}", segments.join("/")));
}

/// Download every asset of a release into `dest`.
///
/// Any single failure aborts the whole acquisition.
pub async fn download_release_assets(
    source: &dyn AssetSource,
    owner: &str,
    repository: &str,
    release_id: u64,
    dest: &Path,
) -> Result<Revision> {
    let assets = source.list_assets(owner, repository, release_id).await?;
    info!(release_id, assets = assets.len(), "listed release assets");

    tokio::fs::create_dir_all(dest)
        .await
        .map_err(|e| KustomizerError::filesystem(dest, e))?;

    let mut files = Vec::with_capacity(assets.len());
    for asset in &assets {
        let path = asset_path(dest, &asset.name).ok_or_else(|| KustomizerError::Download {
            asset: asset.name.clone(),
            cause: "asset name is not a plain file name".to_string(),
        })?;
        source.download(asset, &path).await?;
        debug!(asset = %asset.name, "downloaded asset");
        files.push(path);
    }

    Ok(Revision::Assets {
        root: dest.to_path_buf(),
        files,
    })
}

fn asset_path(dest: &Path, name: &str) -> Option<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Some(dest.join(file)),
        _ => None,
    }
}
