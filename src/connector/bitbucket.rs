use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::http::ApiClient;
use super::Connector;
use crate::error::FetchError;

/// bitbucket.org workspaces
pub struct BitbucketCloudConnector {
    api: ApiClient,
}

/// Bitbucket Server / Data Center projects and personal (`~user`) spaces
pub struct BitbucketServerConnector {
    api: ApiClient,
}

#[derive(Debug, Deserialize)]
struct CloudPage {
    #[serde(default)]
    values: Vec<CloudRepo>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CloudRepo {
    full_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerPage {
    #[serde(default)]
    values: Vec<ServerRepo>,
    #[serde(default = "default_last_page")]
    is_last_page: bool,
    next_page_start: Option<u64>,
}

fn default_last_page() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ServerRepo {
    slug: String,
    #[serde(default)]
    archived: bool,
}

impl BitbucketCloudConnector {
    pub fn new(token: &str) -> Result<Self, FetchError> {
        Self::with_base_url("https://api.bitbucket.org/2.0", token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, FetchError> {
        Ok(Self {
            api: ApiClient::new(base_url, &format!("Bearer {}", token))?,
        })
    }
}

#[async_trait]
impl Connector for BitbucketCloudConnector {
    async fn list_repos(&self, workspace: &str) -> Result<Vec<String>, FetchError> {
        let workspace_url = self.api.url(&format!("/workspaces/{}", workspace));
        if !self.api.resource_exists(&workspace_url, workspace).await? {
            return Err(FetchError::NotFound(workspace.to_string()));
        }

        let mut names = Vec::new();
        let mut next = Some(self.api.url(&format!("/repositories/{}?pagelen=100", workspace)));
        while let Some(url) = next {
            let page: CloudPage = self.api.get_json(&url).await?;
            names.extend(page.values.into_iter().map(|r| r.full_name));
            next = page.next.filter(|n| !n.is_empty());
        }

        info!("Found {} Bitbucket repositories for {}", names.len(), workspace);
        Ok(names)
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        self.api.get_ok(&self.api.url("/user")).await
    }

    fn name(&self) -> &'static str {
        "bitbucket"
    }
}

impl BitbucketServerConnector {
    pub fn new(host: &str, token: &str) -> Result<Self, FetchError> {
        Self::with_base_url(&format!("https://{}/rest/api/1.0", host), token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, FetchError> {
        Ok(Self {
            api: ApiClient::new(base_url, &format!("Bearer {}", token))?,
        })
    }

    /// Resource path for a `~user` or project key owner
    fn owner_path(owner: &str) -> String {
        match owner.strip_prefix('~') {
            Some(user) => format!("/users/{}", user),
            None => format!("/projects/{}", owner),
        }
    }
}

#[async_trait]
impl Connector for BitbucketServerConnector {
    async fn list_repos(&self, owner: &str) -> Result<Vec<String>, FetchError> {
        let owner_path = Self::owner_path(owner);
        if !self.api.resource_exists(&self.api.url(&owner_path), owner).await? {
            return Err(FetchError::NotFound(owner.to_string()));
        }

        let mut names = Vec::new();
        let mut start = 0;
        loop {
            let url = self
                .api
                .url(&format!("{}/repos?limit=100&start={}", owner_path, start));
            let page: ServerPage = self.api.get_json(&url).await?;

            for repo in page.values {
                if repo.archived {
                    debug!("Skipping archived repository: {}/{}", owner, repo.slug);
                    continue;
                }
                names.push(format!("{}/{}", owner, repo.slug));
            }

            match page.next_page_start {
                Some(next) if !page.is_last_page => start = next,
                _ => break,
            }
        }

        info!("Found {} Bitbucket Server repositories for {}", names.len(), owner);
        Ok(names)
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        self.api.get_ok(&self.api.url("/application-properties")).await
    }

    fn name(&self) -> &'static str {
        "bitbucket-server"
    }
}
