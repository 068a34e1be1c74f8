//! Inbound revision events and their validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

use super::error::{KustomizerError, Result};

/// What kind of revision an event announces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A published release; `id` is the numeric release identifier.
    Release,
    /// A pushed tag; `id` is the tag name.
    Tag,
    /// A pushed commit; `id` is the commit hash.
    Commit,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Release => "release",
            EventKind::Tag => "tag",
            EventKind::Commit => "commit",
        }
    }

    /// Parse an event type attribute.
    ///
    /// Namespaced types such as `dev.example.tag` are accepted; the last
    /// dot-separated segment decides the kind.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        let kind = event_type.rsplit('.').next().unwrap_or(event_type);
        match kind.to_ascii_lowercase().as_str() {
            "release" => Some(EventKind::Release),
            "tag" => Some(EventKind::Tag),
            "commit" | "push" => Some(EventKind::Commit),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event as delivered by the transport. Every field may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundEvent {
    pub id: Option<String>,
    pub kind: Option<EventKind>,
    pub owner: Option<String>,
    pub repository: Option<String>,
    pub clone_url: Option<String>,
}

/// Revision to check out after cloning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CheckoutTarget {
    Tag(String),
    Commit(String),
}

impl CheckoutTarget {
    pub fn as_str(&self) -> &str {
        match self {
            CheckoutTarget::Tag(name) => name,
            CheckoutTarget::Commit(hash) => hash,
        }
    }
}

/// How the source revision is materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    /// Download every asset attached to a release.
    ReleaseAssets { release_id: u64 },
    /// Clone the repository and check out a revision.
    Checkout {
        clone_url: String,
        target: CheckoutTarget,
    },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::ReleaseAssets { .. } => "release_assets",
            Strategy::Checkout { .. } => "checkout",
        }
    }
}

/// A validated event: every field a run needs is present and well formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub owner: String,
    pub repository: String,
    pub strategy: Strategy,
}

impl Trigger {
    /// `owner/repository`, used for logging and admission keys.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}

impl InboundEvent {
    /// Check the event and select its acquisition strategy.
    ///
    /// Fields are checked in a fixed order (`owner`, `repository`, `kind`,
    /// `clone_url`, `id`) and the first problem is reported. Nothing is
    /// touched on disk or on the network.
    pub fn validate(&self) -> Result<Trigger> {
        let owner = required(&self.owner, "owner")?;
        let repository = required(&self.repository, "repository")?;
        path_component(owner, "owner")?;
        path_component(repository, "repository")?;

        let kind = self
            .kind
            .ok_or(KustomizerError::MissingField { field: "kind" })?;

        let strategy = match kind {
            EventKind::Release => {
                let id = required(&self.id, "id")?;
                let release_id = id.parse::<u64>().map_err(|e| KustomizerError::InvalidField {
                    field: "id",
                    reason: format!("release id {id:?} is not an integer: {e}"),
                })?;
                Strategy::ReleaseAssets { release_id }
            }
            EventKind::Tag | EventKind::Commit => {
                let clone_url = required(&self.clone_url, "clone_url")?.to_string();
                let id = required(&self.id, "id")?.to_string();
                let target = if kind == EventKind::Tag {
                    CheckoutTarget::Tag(id)
                } else {
                    CheckoutTarget::Commit(id)
                };
                Strategy::Checkout { clone_url, target }
            }
        };

        Ok(Trigger {
            owner: owner.to_string(),
            repository: repository.to_string(),
            strategy,
        })
    }
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(KustomizerError::MissingField { field }),
    }
}

// Owner and repository become directory names under the base directory.
fn path_component(value: &str, field: &'static str) -> Result<()> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.contains(['/', '\\']) => Ok(()),
        _ => Err(KustomizerError::InvalidField {
            field,
            reason: format!("{value:?} must be a single path component"),
        }),
    }
}
