//! The five-stage render-and-publish pipeline.
//!
//! Stages run strictly in order: acquire the source revision, clone the
//! overlay, merge both trees, render the manifest, publish it. The first
//! failing stage ends the run and its error is returned as is. A failed run
//! keeps its workspace on disk for inspection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use crate::acquire::{acquire, AssetSource};
use crate::build::{build_manifest, ManifestEngine, RenderedManifest};
use crate::config::Settings;
use crate::domain::{Result, Revision, Strategy, Trigger};
use crate::git::Git;
use crate::merge::{merge, MergeStats};
use crate::obs::{emit_run_failed, emit_run_finished, emit_run_started, emit_stage_finished};
use crate::overlay::fetch_overlay;
use crate::publish::{publish, Publication};
use crate::workspace::Workspace;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Acquire,
    FetchOverlay,
    Merge,
    Build,
    Publish,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::Acquire,
        PipelineStage::FetchOverlay,
        PipelineStage::Merge,
        PipelineStage::Build,
        PipelineStage::Publish,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Acquire => "acquire",
            PipelineStage::FetchOverlay => "fetch_overlay",
            PipelineStage::Merge => "merge",
            PipelineStage::Build => "build",
            PipelineStage::Publish => "publish",
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub repository: String,
    pub strategy: Strategy,
    pub revision: Revision,
    pub merge: MergeStats,
    pub manifest: RenderedManifest,
    pub publication: Publication,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Pipeline wiring: settings plus the external collaborators.
pub struct Pipeline {
    settings: Arc<Settings>,
    git: Git,
    assets: Arc<dyn AssetSource>,
    engine: Arc<dyn ManifestEngine>,
}

impl Pipeline {
    pub fn new(
        settings: Arc<Settings>,
        assets: Arc<dyn AssetSource>,
        engine: Arc<dyn ManifestEngine>,
    ) -> Self {
        Pipeline {
            settings,
            git: Git::default(),
            assets,
            engine,
        }
    }

    /// Use a specific git executable.
    pub fn with_git(mut self, git: Git) -> Self {
        self.git = git;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run every stage for `trigger` in a freshly allocated workspace.
    pub async fn run(&self, trigger: &Trigger) -> Result<RunReport> {
        let workspace = Workspace::allocate(
            &self.settings.base_dir,
            &trigger.owner,
            &trigger.repository,
        );
        self.run_in(trigger, workspace).await
    }

    /// Run every stage for `trigger` inside `workspace`.
    pub async fn run_in(&self, trigger: &Trigger, workspace: Workspace) -> Result<RunReport> {
        let span = tracing::info_span!(
            "kustomizer.run",
            run_id = %workspace.run_id(),
            repository = %trigger.slug(),
        );
        self.execute(trigger, &workspace).instrument(span).await
    }

    async fn execute(&self, trigger: &Trigger, workspace: &Workspace) -> Result<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = workspace.run_id().to_string();
        let settings = &self.settings;
        emit_run_started(&run_id, &trigger.slug(), trigger.strategy.name());

        let revision = timed(
            &run_id,
            PipelineStage::Acquire,
            acquire(trigger, &self.git, self.assets.as_ref(), workspace.source()),
        )
        .await?;

        timed(
            &run_id,
            PipelineStage::FetchOverlay,
            fetch_overlay(&self.git, &settings.overlay_url, workspace.overlay()),
        )
        .await?;

        let merge_stats = timed(
            &run_id,
            PipelineStage::Merge,
            merge(workspace.overlay(), revision.root(), workspace.merged()),
        )
        .await?;

        let output = workspace.output_path(&settings.output_file);
        let manifest = timed(
            &run_id,
            PipelineStage::Build,
            build_manifest(self.engine.as_ref(), workspace.merged(), &output),
        )
        .await?;

        let publication = timed(
            &run_id,
            PipelineStage::Publish,
            publish(
                &self.git,
                workspace.overlay(),
                &settings.output_file,
                &settings.identity,
                &settings.credentials,
            ),
        )
        .await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let outcome = match &publication {
            Publication::Pushed { .. } => "pushed",
            Publication::Unchanged => "unchanged",
        };
        emit_run_finished(&run_id, duration_ms, outcome);

        Ok(RunReport {
            run_id,
            repository: trigger.slug(),
            strategy: trigger.strategy.clone(),
            revision,
            merge: merge_stats,
            manifest,
            publication,
            started_at,
            duration_ms,
        })
    }
}

async fn timed<T>(
    run_id: &str,
    stage: PipelineStage,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    let start = Instant::now();
    match work.await {
        Ok(value) => {
            emit_stage_finished(run_id, stage.name(), start.elapsed().as_millis() as u64);
            Ok(value)
        }
        Err(err) => {
            emit_run_failed(run_id, stage.name(), &err);
            Err(err)
        }
    }
}
