/// Common test utilities and helpers for repoherd tests
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use repoherd::error::{ExecutionError, FetchError};
use repoherd::orphans::{OrphanAction, Prompter};
use repoherd::{
    Config, Connector, ConnectorFactory, Credentials, ExecutionEngine, GitOps, ProviderKind,
    StopSignal, StrategyResolver, SyncRunner,
};

/// Temporary config directory plus a root for working copies
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
    pub repos_dir: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("repoherd");
        let repos_dir = temp_dir.path().join("repos");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        Self {
            temp_dir,
            config_dir,
            repos_dir,
        }
    }

    /// Root directory for a named source
    pub fn root(&self, source: &str) -> PathBuf {
        self.repos_dir.join(source)
    }

    pub fn create_test_config(&self, content: &str) -> PathBuf {
        let config_path = self.config_dir.join("config.yaml");
        std::fs::write(&config_path, content).expect("Failed to write test config");
        config_path
    }

    /// Make `root/name` look like a working copy
    pub fn create_working_copy(&self, root: &Path, name: &str) -> PathBuf {
        let path = root.join(name);
        std::fs::create_dir_all(path.join(".git")).expect("Failed to create working copy");
        path
    }

    pub async fn load(&self, path: &Path) -> Config {
        Config::load(&repoherd::ConfigLocation::Local(path.to_path_buf()))
            .await
            .expect("Failed to load test config")
    }
}

/// Git backend that fakes clones by creating `.git` and records every call
#[derive(Default)]
pub struct FakeGit {
    pub cloned: Mutex<Vec<(String, PathBuf)>>,
    pub pulled: Mutex<Vec<PathBuf>>,
    /// Targets whose directory name is listed here fail
    pub failing: Vec<String>,
}

impl FakeGit {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    fn should_fail(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| self.failing.iter().any(|f| f == n))
            .unwrap_or(false)
    }

    pub fn cloned_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .cloned
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }
}

#[async_trait]
impl GitOps for FakeGit {
    async fn clone_repo(
        &self,
        url: &str,
        path: &Path,
        _branch: Option<&str>,
        _ssh_key: Option<&Path>,
    ) -> Result<(), ExecutionError> {
        self.cloned
            .lock()
            .unwrap()
            .push((url.to_string(), path.to_path_buf()));
        if self.should_fail(path) {
            return Err(ExecutionError::Clone {
                url: url.to_string(),
                path: path.to_path_buf(),
                output: "fatal: repository not found".to_string(),
            });
        }
        std::fs::create_dir_all(path.join(".git"))?;
        Ok(())
    }

    async fn pull(&self, path: &Path, _ssh_key: Option<&Path>) -> Result<(), ExecutionError> {
        self.pulled.lock().unwrap().push(path.to_path_buf());
        if self.should_fail(path) {
            return Err(ExecutionError::Pull {
                path: path.to_path_buf(),
                output: "fatal: not possible to fast-forward".to_string(),
            });
        }
        Ok(())
    }
}

/// Prompter with fixed answers that counts how often it was asked
pub struct CannedPrompter {
    pub action: OrphanAction,
    pub confirm: bool,
    pub asked: Mutex<usize>,
}

impl CannedPrompter {
    pub fn new(action: OrphanAction, confirm: bool) -> Self {
        Self {
            action,
            confirm,
            asked: Mutex::new(0),
        }
    }

    pub fn times_asked(&self) -> usize {
        *self.asked.lock().unwrap()
    }
}

impl Prompter for CannedPrompter {
    fn choose_orphan_action(&self, _: &str, _: &[String]) -> anyhow::Result<OrphanAction> {
        *self.asked.lock().unwrap() += 1;
        Ok(self.action)
    }

    fn confirm_prune(&self, _: &[String]) -> anyhow::Result<bool> {
        *self.asked.lock().unwrap() += 1;
        Ok(self.confirm)
    }

    fn confirm_create_dir(&self, _: &Path) -> anyhow::Result<bool> {
        *self.asked.lock().unwrap() += 1;
        Ok(self.confirm)
    }
}

/// Provider directory keyed by owner; unknown owners are not found
#[derive(Default, Clone)]
pub struct StaticDirectory {
    owners: HashMap<String, Vec<String>>,
}

impl StaticDirectory {
    pub fn with_owner(mut self, owner: &str, repos: &[&str]) -> Self {
        self.owners.insert(
            owner.to_string(),
            repos.iter().map(|r| format!("{}/{}", owner, r)).collect(),
        );
        self
    }
}

#[async_trait]
impl Connector for StaticDirectory {
    async fn list_repos(&self, owner: &str) -> Result<Vec<String>, FetchError> {
        self.owners
            .get(owner)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(owner.to_string()))
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

impl ConnectorFactory for StaticDirectory {
    fn connector(
        &self,
        _kind: ProviderKind,
        _host: &str,
        _token: &str,
    ) -> Result<Box<dyn Connector>, FetchError> {
        Ok(Box::new(self.clone()))
    }
}

/// Runner wired to fakes, with a GitHub token available
pub fn test_runner(
    directory: StaticDirectory,
    git: Arc<FakeGit>,
    prompter: Arc<CannedPrompter>,
) -> SyncRunner {
    let credentials = Credentials::new().with_token(ProviderKind::GitHub, "test-token");
    let resolver = StrategyResolver::new(credentials, Arc::new(directory));
    let engine = ExecutionEngine::new(git, StopSignal::new());
    SyncRunner::new(resolver, engine, prompter)
}
