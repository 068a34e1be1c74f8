//! Kustomizer Core Library
//!
//! Turns a revision event for a source repository into a rendered kustomize
//! manifest committed to an overlay repository:
//!
//! 1. acquire the source revision (release assets or clone-and-checkout)
//! 2. clone the overlay repository
//! 3. merge overlay (base) and source (override) into a scratch tree
//! 4. render the merged tree into `output.yaml` inside the overlay clone
//! 5. commit and push `output.yaml`

pub mod acquire;
pub mod build;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod git;
pub mod merge;
pub mod obs;
pub mod overlay;
pub mod pipeline;
pub mod publish;
pub mod resolver;
pub mod telemetry;
pub mod workspace;

pub use acquire::{acquire, AssetSource, GithubReleases, ReleaseAsset};
pub use build::{build_manifest, KustomizeCli, ManifestEngine, RenderedManifest};
pub use config::{Credentials, Identity, Settings, DEFAULT_OUTPUT_FILE};
pub use dispatcher::{Dispatcher, DEFAULT_MAX_CONCURRENT_RUNS};
pub use domain::{
    CheckoutTarget, EventKind, InboundEvent, KustomizerError, Result, Revision, Strategy, Trigger,
};
pub use git::{Git, TagRef};
pub use merge::{merge_trees, MergeStats};
pub use pipeline::{Pipeline, PipelineStage, RunReport};
pub use publish::{publish, Publication};
pub use resolver::{resolve_revision, resolve_tag};
pub use telemetry::init_tracing;
pub use workspace::Workspace;

/// Kustomizer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
