//! Error taxonomy for repoherd
//!
//! Each error type is scoped to the blast radius it is allowed to have:
//! a [`ConfigError`] or [`ResolveError`] skips one source, an [`ExecutionError`]
//! fails one repository. Only whole-document failures abort a run, and those are
//! reported through `anyhow` at the orchestration layer.

use std::path::PathBuf;
use thiserror::Error;

/// A source (or the document holding it) is malformed
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A source entry could not be deserialized at all
    #[error("source #{index} in {origin}: {message}")]
    Malformed {
        index: usize,
        origin: String,
        message: String,
    },

    /// A required field is empty
    #[error("source {source_name:?}: {field} is required")]
    MissingField {
        source_name: String,
        field: &'static str,
    },

    /// A field has a value that cannot be used
    #[error("source {source_name:?}: {message}")]
    Invalid {
        source_name: String,
        message: String,
    },

    /// A path field could not be expanded
    #[error("source {source_name:?}: cannot expand path {path:?}: {message}")]
    PathExpansion {
        source_name: String,
        path: String,
        message: String,
    },
}

impl ConfigError {
    /// Name of the offending source, or its position when it has none
    pub fn source_label(&self) -> String {
        match self {
            ConfigError::Malformed { index, origin, .. } => format!("#{} in {}", index, origin),
            ConfigError::MissingField { source_name, .. }
            | ConfigError::Invalid { source_name, .. }
            | ConfigError::PathExpansion { source_name, .. } => source_name.clone(),
        }
    }
}

/// Repository enumeration against a provider API failed
#[derive(Debug, Error)]
pub enum FetchError {
    /// The identifier names neither an account nor an organization
    #[error("user or organization not found: {0}")]
    NotFound(String),

    /// The provider rejected the credential
    #[error("authentication failed: invalid token")]
    Unauthorized,

    /// Any other non-success status
    #[error("unexpected status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// Network or TLS failure
    #[error("request failed: {0}")]
    Transport(String),

    /// The response body did not have the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// A source's strategy could not be turned into a repository list
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("source {source_name:?}: no token found - set {var} or run 'repoherd connect'")]
    MissingCredential { source_name: String, var: &'static str },

    #[error("source {source_name:?}: source must include user/org (e.g. github.com/username)")]
    MissingOwner { source_name: String },

    #[error("source {source_name:?}: invalid regex pattern: {error}")]
    InvalidPattern {
        source_name: String,
        #[source]
        error: regex::Error,
    },

    #[error("source {source_name:?}: strategy {strategy:?} is not supported")]
    Unsupported {
        source_name: String,
        strategy: String,
    },

    #[error("source {source_name:?}: failed to list repositories: {error}")]
    Fetch {
        source_name: String,
        #[source]
        error: FetchError,
    },
}

/// A single clone or pull failed
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("git clone of {url} into {} failed: {output}", .path.display())]
    Clone {
        url: String,
        path: PathBuf,
        output: String,
    },

    #[error("git pull in {} failed: {output}", .path.display())]
    Pull { path: PathBuf, output: String },

    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("cancelled before start")]
    Cancelled,
}
