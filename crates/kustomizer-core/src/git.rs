//! Thin async driver over the `git` executable.
//!
//! Every operation maps its failure to the pipeline error of the stage that
//! calls it. Commands never prompt for credentials.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

use crate::config::{Credentials, Identity};
use crate::domain::{KustomizerError, Result};

/// A tag reference and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    /// Full reference name, e.g. `refs/tags/v1.0`.
    pub name: String,
    /// Commit hash; annotated tags are peeled to their commit.
    pub target: String,
}

/// Runs git subcommands.
#[derive(Debug, Clone)]
pub struct Git {
    program: PathBuf,
}

impl Default for Git {
    fn default() -> Self {
        Git {
            program: PathBuf::from("git"),
        }
    }
}

impl Git {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Git {
            program: program.into(),
        }
    }

    fn command(&self, dir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    async fn output(&self, mut cmd: Command, args: &[&str]) -> std::result::Result<Output, String> {
        debug!(args = ?args, "running git");
        cmd.args(args)
            .output()
            .await
            .map_err(|e| format!("failed to run git: {e}"))
    }

    /// Run a command and return its trimmed stdout, or the failure text.
    async fn run(&self, cmd: Command, args: &[&str]) -> std::result::Result<String, String> {
        let output = self.output(cmd, args).await?;
        if !output.status.success() {
            return Err(failure_text(&output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Clone `url` into `dest`, recursing into submodules.
    pub async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let dest_str = dest.to_string_lossy();
        self.run(
            self.command(None),
            &["clone", "--quiet", "--recurse-submodules", url, &dest_str],
        )
        .await
        .map(|_| ())
        .map_err(|cause| KustomizerError::Clone {
            url: url.to_string(),
            cause,
        })
    }

    /// Fast-forward the current branch from its upstream.
    ///
    /// Already being up to date is success.
    pub async fn pull(&self, repo: &Path) -> Result<()> {
        self.run(self.command(Some(repo)), &["pull", "--quiet", "--ff-only"])
            .await
            .map(|_| ())
            .map_err(KustomizerError::Pull)
    }

    /// List every tag in the repository, ordered by reference name.
    pub async fn tags(&self, repo: &Path) -> Result<Vec<TagRef>> {
        let stdout = self
            .run(
                self.command(Some(repo)),
                &[
                    "for-each-ref",
                    "--format=%(refname)\t%(objectname)\t%(*objectname)",
                    "refs/tags",
                ],
            )
            .await
            .map_err(tags_err)?;

        parse_tags(&stdout)
    }

    /// Check out `revision` on a detached HEAD and return its full hash.
    pub async fn checkout(&self, repo: &Path, revision: &str) -> Result<String> {
        let checkout_err = |cause: String| KustomizerError::Checkout {
            revision: revision.to_string(),
            cause,
        };
        let spec = format!("{revision}^{{commit}}");
        let hash = self
            .run(
                self.command(Some(repo)),
                &["rev-parse", "--verify", "--quiet", &spec],
            )
            .await
            .map_err(|cause| {
                if cause.is_empty() || cause.starts_with("git exited") {
                    checkout_err(format!("unknown revision {revision}"))
                } else {
                    checkout_err(cause)
                }
            })?;

        self.run(
            self.command(Some(repo)),
            &["checkout", "--quiet", "--detach", &hash],
        )
        .await
        .map_err(checkout_err)?;

        Ok(hash)
    }

    /// Capture the HEAD commit SHA.
    pub async fn head_sha(&self, repo: &Path) -> std::result::Result<String, String> {
        let sha = self
            .run(self.command(Some(repo)), &["rev-parse", "HEAD"])
            .await?;
        if sha.is_empty() {
            return Err("git rev-parse HEAD returned empty output".to_string());
        }
        Ok(sha)
    }

    /// Check whether a directory is inside a git work tree.
    pub async fn is_git_repo(&self, dir: &Path) -> bool {
        self.run(
            self.command(Some(dir)),
            &["rev-parse", "--is-inside-work-tree"],
        )
        .await
        .is_ok()
    }

    /// Whether `file` exists in the commit at HEAD.
    pub async fn is_tracked(&self, repo: &Path, file: &str) -> bool {
        let object = format!("HEAD:{file}");
        self.run(self.command(Some(repo)), &["cat-file", "-e", &object])
            .await
            .is_ok()
    }

    /// Stage exactly one file.
    pub async fn add(&self, repo: &Path, file: &str) -> Result<()> {
        self.run(self.command(Some(repo)), &["add", "--", file])
            .await
            .map(|_| ())
            .map_err(|cause| KustomizerError::Stage {
                file: file.to_string(),
                cause,
            })
    }

    /// Whether the index holds changes to `file` relative to HEAD.
    pub async fn has_staged_changes(&self, repo: &Path, file: &str) -> Result<bool> {
        let stage_err = |cause: String| KustomizerError::Stage {
            file: file.to_string(),
            cause,
        };
        let output = self
            .output(
                self.command(Some(repo)),
                &["diff", "--cached", "--quiet", "--", file],
            )
            .await
            .map_err(stage_err)?;

        // `--quiet` exits 1 when there are differences.
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(stage_err(failure_text(&output))),
        }
    }

    /// Commit the index as `identity` and return the new commit hash.
    pub async fn commit(&self, repo: &Path, message: &str, identity: &Identity) -> Result<String> {
        let mut cmd = self.command(Some(repo));
        cmd.env("GIT_AUTHOR_NAME", &identity.name)
            .env("GIT_AUTHOR_EMAIL", &identity.email)
            .env("GIT_COMMITTER_NAME", &identity.name)
            .env("GIT_COMMITTER_EMAIL", &identity.email);

        self.run(cmd, &["commit", "--quiet", "--no-verify", "-m", message])
            .await
            .map_err(KustomizerError::Commit)?;

        self.head_sha(repo).await.map_err(KustomizerError::Commit)
    }

    /// Push HEAD to the branch of the same name on `remote`.
    ///
    /// Credentials travel as an HTTP basic `Authorization` header supplied
    /// through the environment, so they never appear on the command line or
    /// in the repository config.
    pub async fn push(&self, repo: &Path, remote: &str, credentials: &Credentials) -> Result<()> {
        let mut cmd = self.command(Some(repo));
        cmd.env("GIT_CONFIG_COUNT", "1")
            .env("GIT_CONFIG_KEY_0", "http.extraHeader")
            .env(
                "GIT_CONFIG_VALUE_0",
                format!("Authorization: {}", credentials.basic_auth_header()),
            );

        self.run(cmd, &["push", "--quiet", remote, "HEAD"])
            .await
            .map(|_| ())
            .map_err(KustomizerError::Push)
    }
}

fn tags_err(cause: String) -> KustomizerError {
    KustomizerError::Checkout {
        revision: "refs/tags".to_string(),
        cause,
    }
}

/// Parse `for-each-ref` output. A line that cannot be parsed fails the whole
/// listing so no tag is ever skipped.
fn parse_tags(stdout: &str) -> Result<Vec<TagRef>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            parse_tag_line(line).ok_or_else(|| tags_err(format!("malformed tag line {line:?}")))
        })
        .collect()
}

fn parse_tag_line(line: &str) -> Option<TagRef> {
    let mut fields = line.split('\t');
    let name = fields.next()?.trim();
    let object = fields.next()?.trim();
    let peeled = fields.next().unwrap_or("").trim();
    if name.is_empty() || object.is_empty() {
        return None;
    }
    let target = if peeled.is_empty() { object } else { peeled };
    Some(TagRef {
        name: name.to_string(),
        target: target.to_string(),
    })
}

fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("git exited with {}", output.status)
    } else {
        stderr
    }
}
