//! Shared fixtures: throwaway git repositories and a tiny manifest engine.

#![allow(dead_code)]

use async_trait::async_trait;
use kustomizer_core::ManifestEngine;
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Work tree on branch `main` with a local identity.
pub fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "--quiet"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir, &["config", "user.name", "fixture"]);
    git(dir, &["config", "user.email", "fixture@example.com"]);
}

/// Commit everything in the work tree and return the new HEAD.
pub fn commit_all(dir: &Path, message: &str) -> String {
    git(dir, &["add", "--all"]);
    git(dir, &["commit", "--quiet", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

/// Bare copy of `work` at `dest`, used as a push/clone remote.
pub fn bare_remote(work: &Path, dest: &Path) -> PathBuf {
    let parent = dest.parent().unwrap();
    std::fs::create_dir_all(parent).unwrap();
    git(
        parent,
        &[
            "clone",
            "--quiet",
            "--bare",
            &work.to_string_lossy(),
            &dest.to_string_lossy(),
        ],
    );
    dest.to_path_buf()
}

pub fn remote_commit_count(remote: &Path, branch: &str) -> usize {
    git(remote, &["rev-list", "--count", branch]).parse().unwrap()
}

pub fn remote_file(remote: &Path, branch: &str, file: &str) -> String {
    git(remote, &["show", &format!("{branch}:{file}")])
}

/// Files touched by the tip commit of `branch`.
pub fn changed_files(remote: &Path, branch: &str) -> Vec<String> {
    git(
        remote,
        &["diff-tree", "--no-commit-id", "--name-only", "-r", branch],
    )
    .lines()
    .map(str::to_string)
    .collect()
}

/// Renders the `resources:` list of `kustomization.yaml` by concatenation.
///
/// Deterministic, and like kustomize it ignores files it is not pointed at.
pub struct ConcatEngine;

#[async_trait]
impl ManifestEngine for ConcatEngine {
    async fn render(&self, root: &Path) -> Result<Vec<u8>, String> {
        let kustomization = std::fs::read_to_string(root.join("kustomization.yaml"))
            .map_err(|e| format!("unable to find kustomization.yaml: {e}"))?;

        let mut documents = Vec::new();
        for line in kustomization.lines() {
            if let Some(resource) = line.trim().strip_prefix("- ") {
                let body = std::fs::read_to_string(root.join(resource.trim()))
                    .map_err(|e| format!("accumulating resources: {resource}: {e}"))?;
                documents.push(body);
            }
        }
        Ok(documents.join("---\n").into_bytes())
    }
}
