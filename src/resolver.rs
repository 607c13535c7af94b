use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{RepoEntry, Source, Strategy};
use crate::connector::{ConnectorFactory, HttpConnectors};
use crate::credentials::Credentials;
use crate::error::ResolveError;

/// Turns a source's strategy into the concrete list of repositories it declares
pub struct StrategyResolver {
    credentials: Credentials,
    connectors: Arc<dyn ConnectorFactory>,
}

impl StrategyResolver {
    pub fn new(credentials: Credentials, connectors: Arc<dyn ConnectorFactory>) -> Self {
        Self {
            credentials,
            connectors,
        }
    }

    /// Resolver backed by the real provider APIs
    pub fn with_http(credentials: Credentials) -> Self {
        Self::new(credentials, Arc::new(HttpConnectors))
    }

    /// Resolve `source` to its declared entries
    ///
    /// `manual` returns the configured entries untouched. `all` and `regex`
    /// enumerate the owner through the provider; every local check (pattern,
    /// owner, credential) happens before the first request.
    pub async fn resolve(&self, source: &Source) -> Result<Vec<RepoEntry>, ResolveError> {
        let filter = match source.strategy {
            Strategy::Manual => return Ok(source.repos.clone()),
            Strategy::File => {
                return Err(ResolveError::Unsupported {
                    source_name: source.name.clone(),
                    strategy: source.strategy.to_string(),
                })
            }
            Strategy::All => None,
            Strategy::Regex => {
                let pattern = source.regex_pattern().unwrap_or_default();
                Some(
                    Regex::new(pattern).map_err(|error| ResolveError::InvalidPattern {
                        source_name: source.name.clone(),
                        error,
                    })?,
                )
            }
        };

        let owner = source.owner();
        if owner.is_empty() {
            return Err(ResolveError::MissingOwner {
                source_name: source.name.clone(),
            });
        }

        let kind = source.provider_kind();
        let token = self.credentials.require(kind, &source.name)?;

        let fetch_error = |error| ResolveError::Fetch {
            source_name: source.name.clone(),
            error,
        };
        let connector = self
            .connectors
            .connector(kind, source.host(), token)
            .map_err(fetch_error)?;

        debug!("Listing {} repositories for {} via {}", source.strategy, owner, connector.name());
        let names = connector.list_repos(owner).await.map_err(fetch_error)?;
        let total = names.len();

        let entries: Vec<RepoEntry> = names
            .into_iter()
            .filter(|name| filter.as_ref().map_or(true, |re| re.is_match(name)))
            .map(RepoEntry::new)
            .collect();

        if filter.is_some() {
            info!(
                "Source {}: {} of {} repositories match the pattern",
                source.name,
                entries.len(),
                total
            );
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{Connector, MockConnector, ProviderKind};
    use crate::error::FetchError;
    use assert_matches::assert_matches;
    use std::sync::Mutex;

    /// Hands out one prepared connector and records what it was asked for
    struct OneShotFactory {
        connector: Mutex<Option<MockConnector>>,
        requested: Mutex<Vec<(ProviderKind, String, String)>>,
    }

    impl OneShotFactory {
        fn new(connector: MockConnector) -> Arc<Self> {
            Arc::new(Self {
                connector: Mutex::new(Some(connector)),
                requested: Mutex::new(Vec::new()),
            })
        }

        fn unused() -> Arc<Self> {
            Arc::new(Self {
                connector: Mutex::new(None),
                requested: Mutex::new(Vec::new()),
            })
        }
    }

    impl ConnectorFactory for OneShotFactory {
        fn connector(
            &self,
            kind: ProviderKind,
            host: &str,
            token: &str,
        ) -> Result<Box<dyn Connector>, FetchError> {
            self.requested
                .lock()
                .unwrap()
                .push((kind, host.to_string(), token.to_string()));
            let connector = self
                .connector
                .lock()
                .unwrap()
                .take()
                .expect("connector requested more than once");
            Ok(Box::new(connector))
        }
    }

    fn source(yaml: &str) -> Source {
        serde_yaml::from_str(yaml).expect("Failed to parse source")
    }

    fn github_creds() -> Credentials {
        Credentials::new().with_token(ProviderKind::GitHub, "gh-token")
    }

    #[tokio::test]
    async fn test_manual_is_identity() {
        let src = source(
            "{name: m, source: github.com/a, strategy: manual, local_path: /tmp, repos: [a/x, {name: b/x, local_path: /opt/x}, a/x]}",
        );
        let factory = OneShotFactory::unused();
        let resolver = StrategyResolver::new(Credentials::new(), factory.clone());

        let entries = resolver.resolve(&src).await.unwrap();

        assert_eq!(entries, src.repos);
        assert!(factory.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_wraps_names() {
        let mut mock = MockConnector::new();
        mock.expect_name().return_const("github");
        mock.expect_list_repos().times(1).returning(|owner| {
            assert_eq!(owner, "acme");
            Ok(vec!["acme/one".to_string(), "acme/two".to_string()])
        });

        let factory = OneShotFactory::new(mock);
        let resolver = StrategyResolver::new(github_creds(), factory.clone());
        let src = source("{name: s, source: github.com/acme, strategy: all, local_path: /tmp}");

        let entries = resolver.resolve(&src).await.unwrap();

        assert_eq!(entries, vec![RepoEntry::new("acme/one"), RepoEntry::new("acme/two")]);
        assert_eq!(
            factory.requested.lock().unwrap()[0],
            (ProviderKind::GitHub, "github.com".to_string(), "gh-token".to_string())
        );
    }

    #[tokio::test]
    async fn test_regex_matches_full_name() {
        let mut mock = MockConnector::new();
        mock.expect_name().return_const("gitea");
        mock.expect_list_repos().returning(|_| {
            Ok(vec![
                "team/svc-auth".to_string(),
                "team/web".to_string(),
                "team/svc-billing".to_string(),
            ])
        });

        let resolver = StrategyResolver::new(
            Credentials::new().with_token(ProviderKind::Gitea, "t"),
            OneShotFactory::new(mock),
        );
        let src = source(
            "{name: s, source: git.corp/team, strategy: regex, local_path: /tmp, regex_strategy: {pattern: '^team/svc-'}}",
        );

        let names: Vec<String> = resolver
            .resolve(&src)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();

        assert_eq!(names, vec!["team/svc-auth", "team/svc-billing"]);
    }

    #[tokio::test]
    async fn test_invalid_pattern_fails_before_any_request() {
        let factory = OneShotFactory::unused();
        let resolver = StrategyResolver::new(github_creds(), factory.clone());
        let mut src = source("{name: s, source: github.com/a, strategy: regex, local_path: /tmp}");
        src.regex_strategy = Some(crate::config::RegexStrategy {
            pattern: "([".to_string(),
        });

        assert_matches!(
            resolver.resolve(&src).await,
            Err(ResolveError::InvalidPattern { .. })
        );
        assert!(factory.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_any_request() {
        let factory = OneShotFactory::unused();
        let resolver = StrategyResolver::new(Credentials::new(), factory.clone());
        let src = source("{name: s, source: bitbucket.org/ws, strategy: all, local_path: /tmp}");

        let err = resolver.resolve(&src).await.unwrap_err();

        assert_matches!(err, ResolveError::MissingCredential { var: "BITBUCKET_TOKEN", .. });
        assert!(factory.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_owner() {
        let resolver = StrategyResolver::new(github_creds(), OneShotFactory::unused());
        let src = source("{name: s, source: github.com, strategy: all, local_path: /tmp}");

        assert_matches!(
            resolver.resolve(&src).await,
            Err(ResolveError::MissingOwner { .. })
        );
    }

    #[tokio::test]
    async fn test_file_strategy_is_unsupported() {
        let resolver = StrategyResolver::new(github_creds(), OneShotFactory::unused());
        let src = source(
            "{name: s, source: github.com/a, strategy: file, local_path: /tmp, file_strategy: {filename: repos.txt}}",
        );

        assert_matches!(
            resolver.resolve(&src).await,
            Err(ResolveError::Unsupported { strategy, .. }) if strategy == "file"
        );
    }

    #[tokio::test]
    async fn test_fetch_error_is_wrapped() {
        let mut mock = MockConnector::new();
        mock.expect_name().return_const("github");
        mock.expect_list_repos()
            .returning(|owner| Err(FetchError::NotFound(owner.to_string())));

        let resolver = StrategyResolver::new(github_creds(), OneShotFactory::new(mock));
        let src = source("{name: s, source: github.com/ghost, strategy: all, local_path: /tmp}");

        assert_matches!(
            resolver.resolve(&src).await,
            Err(ResolveError::Fetch { error: FetchError::NotFound(_), .. })
        );
    }
}
