//! Process-wide settings, loaded once at startup and shared by every run.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default name of the rendered manifest inside the overlay repository.
pub const DEFAULT_OUTPUT_FILE: &str = "output.yaml";

/// Username/token pair used for every push.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    token: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// `Authorization` header value for HTTP basic authentication.
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.token);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Author and committer identity of published commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Identity {
            name: "kustomizer".to_string(),
            email: "kustomizer@triggermesh.io".to_string(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory under which per-run workspaces are allocated.
    pub base_dir: PathBuf,
    /// Clone URL of the overlay repository.
    pub overlay_url: String,
    pub credentials: Credentials,
    pub identity: Identity,
    /// File name of the rendered manifest, relative to the overlay root.
    pub output_file: String,
}

impl Settings {
    pub fn new(
        base_dir: impl AsRef<Path>,
        overlay_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Settings {
            base_dir: base_dir.as_ref().to_path_buf(),
            overlay_url: overlay_url.into(),
            credentials,
            identity: Identity::default(),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_output_file(mut self, output_file: impl Into<String>) -> Self {
        self.output_file = output_file.into();
        self
    }
}
