//! Startup configuration, read once from flags or the environment.

use anyhow::{bail, Context, Result};
use clap::Args;
use kustomizer_core::{
    Credentials, Dispatcher, GithubReleases, Identity, KustomizeCli, Pipeline, Settings,
    DEFAULT_MAX_CONCURRENT_RUNS, DEFAULT_OUTPUT_FILE,
};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Clone URL of the overlay repository the manifest is published to
    #[arg(long = "overlay-repo", env = "K_REPO")]
    pub overlay_url: String,

    /// Token used as the password when pushing
    #[arg(long, env = "GIT_TOKEN", hide_env_values = true)]
    pub git_token: String,

    /// Username paired with the token when pushing
    #[arg(long, env = "GIT_USERNAME", default_value = "kustomizer")]
    pub git_username: String,

    /// Directory under which per-run workspaces are created
    #[arg(long, env = "KUSTOMIZER_BASE_DIR", default_value = "/home")]
    pub base_dir: PathBuf,

    /// Author and committer name of published commits
    #[arg(long, env = "KUSTOMIZER_AUTHOR_NAME", default_value = "kustomizer")]
    pub author_name: String,

    /// Author and committer email of published commits
    #[arg(
        long,
        env = "KUSTOMIZER_AUTHOR_EMAIL",
        default_value = "kustomizer@triggermesh.io"
    )]
    pub author_email: String,

    /// Name of the rendered manifest at the overlay repository root
    #[arg(long, env = "KUSTOMIZER_OUTPUT_FILE", default_value = DEFAULT_OUTPUT_FILE)]
    pub output_file: String,

    /// Command that renders a directory; the directory is appended
    #[arg(long, env = "KUSTOMIZE_BIN", default_value = "kustomize build")]
    pub kustomize: String,

    /// Base URL of the GitHub REST API used to list release assets
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// Maximum number of pipeline runs in flight
    #[arg(long, env = "KUSTOMIZER_MAX_RUNS", default_value_t = DEFAULT_MAX_CONCURRENT_RUNS)]
    pub max_runs: usize,
}

impl ConfigArgs {
    pub fn settings(&self) -> Result<Settings> {
        if self.overlay_url.trim().is_empty() {
            bail!("overlay repository URL must not be empty");
        }
        if self.git_token.is_empty() {
            bail!("GIT_TOKEN must not be empty");
        }
        let mut output = Path::new(&self.output_file).components();
        if !matches!(
            (output.next(), output.next()),
            (Some(Component::Normal(_)), None)
        ) {
            bail!(
                "output file {:?} must be a file name at the repository root",
                self.output_file
            );
        }

        Ok(Settings::new(
            &self.base_dir,
            self.overlay_url.trim(),
            Credentials::new(&self.git_username, &self.git_token),
        )
        .with_identity(Identity {
            name: self.author_name.clone(),
            email: self.author_email.clone(),
        })
        .with_output_file(&self.output_file))
    }

    /// Wire the pipeline and its collaborators.
    pub fn dispatcher(&self) -> Result<Dispatcher> {
        let settings = self.settings()?;
        let engine = KustomizeCli::from_command_line(&self.kustomize)
            .context("KUSTOMIZE_BIN must name a command")?;
        let assets = GithubReleases::new(&self.github_api_url)
            .map_err(anyhow::Error::msg)
            .context("configuring the release asset client")?;

        let pipeline = Pipeline::new(Arc::new(settings), Arc::new(assets), Arc::new(engine));
        Ok(Dispatcher::new(Arc::new(pipeline), self.max_runs))
    }
}
