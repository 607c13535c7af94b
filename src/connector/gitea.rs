use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::http::ApiClient;
use super::Connector;
use crate::error::FetchError;

const PAGE_LIMIT: usize = 50;

/// Gitea and Forgejo instances
pub struct GiteaConnector {
    api: ApiClient,
}

#[derive(Debug, Deserialize)]
struct RepoItem {
    full_name: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    empty: bool,
}

impl GiteaConnector {
    pub fn new(host: &str, token: &str) -> Result<Self, FetchError> {
        Self::with_base_url(&format!("https://{}/api/v1", host), token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, FetchError> {
        Ok(Self {
            api: ApiClient::new(base_url, &format!("token {}", token))?,
        })
    }

    /// Organizations are tried first, then users
    async fn is_organization(&self, owner: &str) -> Result<bool, FetchError> {
        if self.api.resource_exists(&self.api.url(&format!("/orgs/{}", owner)), owner).await? {
            return Ok(true);
        }
        if self.api.resource_exists(&self.api.url(&format!("/users/{}", owner)), owner).await? {
            return Ok(false);
        }
        Err(FetchError::NotFound(owner.to_string()))
    }
}

#[async_trait]
impl Connector for GiteaConnector {
    async fn list_repos(&self, owner: &str) -> Result<Vec<String>, FetchError> {
        let kind = if self.is_organization(owner).await? {
            "orgs"
        } else {
            "users"
        };

        let mut names = Vec::new();
        let mut page = 1;
        loop {
            let url = self.api.url(&format!(
                "/{}/{}/repos?page={}&limit={}",
                kind, owner, page, PAGE_LIMIT
            ));
            let items: Vec<RepoItem> = self.api.get_json(&url).await?;
            if items.is_empty() {
                break;
            }

            for repo in items {
                if repo.archived || repo.empty {
                    debug!("Skipping archived or empty repository: {}", repo.full_name);
                    continue;
                }
                names.push(repo.full_name);
            }
            page += 1;
        }

        info!("Found {} Gitea repositories for {}", names.len(), owner);
        Ok(names)
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        self.api.get_ok(&self.api.url("/user")).await
    }

    fn name(&self) -> &'static str {
        "gitea"
    }
}
