//! Manifest rendering.
//!
//! The engine is treated as a pure function of the merged tree. Its output is
//! written atomically, so a failed build never leaves a partial manifest.

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::domain::{KustomizerError, Result};

/// Renders a directory into a single manifest.
#[async_trait]
pub trait ManifestEngine: Send + Sync {
    /// Render the tree at `root`; errors are reported verbatim.
    async fn render(&self, root: &Path) -> std::result::Result<Vec<u8>, String>;
}

/// Runs an external kustomize binary, e.g. `kustomize build <dir>`.
#[derive(Debug, Clone)]
pub struct KustomizeCli {
    program: String,
    args: Vec<String>,
}

impl Default for KustomizeCli {
    fn default() -> Self {
        KustomizeCli::new("kustomize", vec!["build".to_string()])
    }
}

impl KustomizeCli {
    /// `program` runs with `args` followed by the directory to render.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        KustomizeCli {
            program: program.into(),
            args,
        }
    }

    /// Parse a whitespace-separated command line such as `kubectl kustomize`.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(KustomizeCli::new(program, words.collect()))
    }
}

#[async_trait]
impl ManifestEngine for KustomizeCli {
    async fn render(&self, root: &Path) -> std::result::Result<Vec<u8>, String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            });
        }
        Ok(output.stdout)
    }
}

/// A manifest written into the overlay repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedManifest {
    pub path: PathBuf,
    /// Hex SHA-256 of the manifest bytes.
    pub digest: String,
    pub bytes: usize,
}

/// Render `merged` with `engine` and write the result to `output`.
pub async fn build_manifest(
    engine: &dyn ManifestEngine,
    merged: &Path,
    output: &Path,
) -> Result<RenderedManifest> {
    let rendered = engine
        .render(merged)
        .await
        .map_err(|cause| KustomizerError::Build { cause })?;

    write_atomically(output, &rendered)?;

    Ok(RenderedManifest {
        path: output.to_path_buf(),
        digest: hex::encode(Sha256::digest(&rendered)),
        bytes: rendered.len(),
    })
}

// Temp file in the destination directory, then rename over the target.
fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| KustomizerError::filesystem(dir, e))?;
    tmp.write_all(data)
        .map_err(|e| KustomizerError::filesystem(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| KustomizerError::filesystem(path, e.error))?;
    Ok(())
}
