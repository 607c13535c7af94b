use async_trait::async_trait;
use octocrab::{Octocrab, Page};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::http::REQUEST_TIMEOUT;
use super::Connector;
use crate::error::FetchError;

/// GitHub and GitHub Enterprise, via octocrab
pub struct GitHubConnector {
    client: Octocrab,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RepoItem {
    full_name: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    disabled: bool,
}

#[derive(Serialize)]
struct ListParams {
    per_page: u8,
}

impl GitHubConnector {
    pub fn new(host: &str, token: &str) -> Result<Self, FetchError> {
        Self::with_base_url(&api_url(host), token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, FetchError> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .set_connect_timeout(Some(REQUEST_TIMEOUT))
            .set_read_timeout(Some(REQUEST_TIMEOUT))
            .base_uri(base_url)
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { client })
    }

    async fn is_organization(&self, owner: &str) -> Result<bool, FetchError> {
        let account: Account = self
            .client
            .get(format!("/users/{}", owner), None::<&()>)
            .await
            .map_err(|e| map_error(e, owner))?;

        debug!("GitHub account {} has type {}", owner, account.kind);
        Ok(account.kind == "Organization")
    }
}

/// `api.github.com` for github.com, `/api/v3` on Enterprise hosts
pub fn api_url(host: &str) -> String {
    if host.is_empty() || host == "github.com" {
        "https://api.github.com".to_string()
    } else {
        format!("https://{}/api/v3", host)
    }
}

fn map_error(err: octocrab::Error, owner: &str) -> FetchError {
    match err {
        octocrab::Error::GitHub { source, .. } => match source.status_code.as_u16() {
            404 => FetchError::NotFound(owner.to_string()),
            401 => FetchError::Unauthorized,
            status => FetchError::Status {
                status,
                url: source.documentation_url.clone().unwrap_or_default(),
                body: source.message.clone(),
            },
        },
        octocrab::Error::Serde { source, .. } => FetchError::Decode(source.to_string()),
        other => FetchError::Transport(other.to_string()),
    }
}

fn collect_syncable(names: &mut Vec<String>, items: Vec<RepoItem>) {
    for repo in items {
        if repo.archived || repo.disabled {
            debug!("Skipping archived or disabled repository: {}", repo.full_name);
            continue;
        }
        names.push(repo.full_name);
    }
}

#[async_trait]
impl Connector for GitHubConnector {
    async fn list_repos(&self, owner: &str) -> Result<Vec<String>, FetchError> {
        let route = if self.is_organization(owner).await? {
            format!("/orgs/{}/repos", owner)
        } else {
            format!("/users/{}/repos", owner)
        };

        let mut page: Page<RepoItem> = self
            .client
            .get(&route, Some(&ListParams { per_page: 100 }))
            .await
            .map_err(|e| map_error(e, owner))?;

        let mut names = Vec::new();
        loop {
            let next = page.next.clone();
            collect_syncable(&mut names, std::mem::take(&mut page.items));

            match self
                .client
                .get_page::<RepoItem>(&next)
                .await
                .map_err(|e| map_error(e, owner))?
            {
                Some(next_page) => page = next_page,
                None => break,
            }
        }

        info!("Found {} GitHub repositories for {}", names.len(), owner);
        Ok(names)
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        let user = self
            .client
            .current()
            .user()
            .await
            .map_err(|e| map_error(e, "current user"))?;

        info!("Authenticated as GitHub user: {}", user.login);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "github"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_api_url() {
        assert_eq!(api_url("github.com"), "https://api.github.com");
        assert_eq!(api_url("ghe.corp.net"), "https://ghe.corp.net/api/v3");
    }

    #[tokio::test]
    async fn test_lists_org_repos_across_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": "acme",
                "type": "Organization"
            })))
            .mount(&server)
            .await;

        let next = format!(
            "<{}/orgs/acme/repos?per_page=100&page=2>; rel=\"next\"",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/orgs/acme/repos"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"full_name": "acme/three", "archived": false, "disabled": false}
            ])))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/repos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", next.as_str())
                    .set_body_json(json!([
                        {"full_name": "acme/one", "archived": false, "disabled": false},
                        {"full_name": "acme/old", "archived": true, "disabled": false},
                        {"full_name": "acme/two", "archived": false, "disabled": false}
                    ])),
            )
            .with_priority(2)
            .mount(&server)
            .await;

        let connector = GitHubConnector::with_base_url(&server.uri(), "token").unwrap();
        let repos = connector.list_repos("acme").await.unwrap();

        assert_eq!(repos, vec!["acme/one", "acme/two", "acme/three"]);
    }

    #[tokio::test]
    async fn test_user_uses_users_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/octocat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": "octocat",
                "type": "User"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"full_name": "octocat/hello", "disabled": true},
                {"full_name": "octocat/spoon"}
            ])))
            .mount(&server)
            .await;

        let connector = GitHubConnector::with_base_url(&server.uri(), "token").unwrap();
        let repos = connector.list_repos("octocat").await.unwrap();

        assert_eq!(repos, vec!["octocat/spoon"]);
    }

    #[tokio::test]
    async fn test_unknown_owner_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "Not Found",
                "documentation_url": "https://docs.github.com/rest"
            })))
            .mount(&server)
            .await;

        let connector = GitHubConnector::with_base_url(&server.uri(), "token").unwrap();
        let err = connector.list_repos("ghost").await.unwrap_err();

        assert_matches!(err, FetchError::NotFound(owner) if owner == "ghost");
    }
}
