//! Provider directory clients
//!
//! A [`Connector`] lists the repositories an account or organization owns on
//! one hosting provider. Every implementation first works out whether the owner
//! is a user or an organization (the listing endpoints differ), pages through
//! the full result set, and drops archived or otherwise unsyncable repositories.
//! Nothing is retained beyond the full names.

mod bitbucket;
mod gitea;
mod github;
mod http;

pub use bitbucket::{BitbucketCloudConnector, BitbucketServerConnector};
pub use gitea::GiteaConnector;
pub use github::GitHubConnector;

use async_trait::async_trait;
use std::fmt;

use crate::error::FetchError;

/// Provider family, which also selects the credential variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    GitHub,
    Gitea,
    Bitbucket,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::GitHub,
        ProviderKind::Gitea,
        ProviderKind::Bitbucket,
    ];

    /// Infer the provider from a host name, defaulting to Gitea for self-hosted
    pub fn detect(host: &str) -> Self {
        let host = host.to_lowercase();
        if host.contains("github.com") {
            ProviderKind::GitHub
        } else if host.contains("bitbucket.org") {
            ProviderKind::Bitbucket
        } else {
            ProviderKind::Gitea
        }
    }

    /// Parse an explicit `type` value
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "github" => Some(ProviderKind::GitHub),
            "gitea" => Some(ProviderKind::Gitea),
            "bitbucket" => Some(ProviderKind::Bitbucket),
            _ => None,
        }
    }

    /// Environment variable holding this provider's token
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "GITHUB_TOKEN",
            ProviderKind::Gitea => "GITEA_TOKEN",
            ProviderKind::Bitbucket => "BITBUCKET_TOKEN",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::Gitea => "gitea",
            ProviderKind::Bitbucket => "bitbucket",
        }
    }

    /// Host assumed by `connect` when none is given
    pub fn default_host(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github.com",
            ProviderKind::Gitea => "gitea.com",
            ProviderKind::Bitbucket => "bitbucket.org",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository listing for one provider host
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Full names (`owner/repo`) of every syncable repository `owner` has
    async fn list_repos(&self, owner: &str) -> Result<Vec<String>, FetchError>;

    /// Check that the token is accepted
    async fn test_connection(&self) -> Result<(), FetchError>;

    fn name(&self) -> &'static str;
}

/// Builds connectors; swapped out in tests to avoid the network
pub trait ConnectorFactory: Send + Sync {
    fn connector(
        &self,
        kind: ProviderKind,
        host: &str,
        token: &str,
    ) -> Result<Box<dyn Connector>, FetchError>;
}

/// Real HTTP connectors
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnectors;

impl ConnectorFactory for HttpConnectors {
    fn connector(
        &self,
        kind: ProviderKind,
        host: &str,
        token: &str,
    ) -> Result<Box<dyn Connector>, FetchError> {
        Ok(match kind {
            ProviderKind::GitHub => Box::new(GitHubConnector::new(host, token)?),
            ProviderKind::Gitea => Box::new(GiteaConnector::new(host, token)?),
            ProviderKind::Bitbucket if host == "bitbucket.org" => {
                Box::new(BitbucketCloudConnector::new(token)?)
            }
            ProviderKind::Bitbucket => Box::new(BitbucketServerConnector::new(host, token)?),
        })
    }
}
