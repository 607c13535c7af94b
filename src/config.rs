use anyhow::{anyhow, bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::connector::ProviderKind;
use crate::error::ConfigError;

/// How a source's repository set is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Explicit `repos` list
    Manual,
    /// Every repository the owner has
    All,
    /// Every repository whose full name matches `regex_strategy.pattern`
    Regex,
    /// Reserved, resolving it always fails
    File,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Manual => "manual",
            Strategy::All => "all",
            Strategy::Regex => "regex",
            Strategy::File => "file",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared repository: full name plus optional local path override
///
/// On disk this is either a bare `"owner/repo"` string or a mapping with `name`
/// and `local_path`. Both forms normalize to this one shape, and the compact
/// string form is written back whenever there is no override.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "RawRepoEntry", into = "RawRepoEntry")]
pub struct RepoEntry {
    pub name: String,
    pub local_path: Option<String>,
}

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum RawRepoEntry {
    Plain(String),
    WithOverride {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_path: Option<String>,
    },
}

impl From<RawRepoEntry> for RepoEntry {
    fn from(raw: RawRepoEntry) -> Self {
        match raw {
            RawRepoEntry::Plain(name) => RepoEntry::new(name),
            RawRepoEntry::WithOverride { name, local_path } => RepoEntry {
                name,
                local_path: local_path.filter(|p| !p.is_empty()),
            },
        }
    }
}

impl From<RepoEntry> for RawRepoEntry {
    fn from(entry: RepoEntry) -> Self {
        match entry.local_path {
            None => RawRepoEntry::Plain(entry.name),
            Some(path) => RawRepoEntry::WithOverride {
                name: entry.name,
                local_path: Some(path),
            },
        }
    }
}

impl RepoEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_path: None,
        }
    }

    pub fn with_local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Last segment of the full name, used as the directory name
    pub fn basename(&self) -> &str {
        repo_basename(&self.name)
    }

    /// Override if present, else `root/basename`
    pub fn resolved_path(&self, root: &Path) -> PathBuf {
        match &self.local_path {
            // Overrides are checked for expandability when the source is validated
            Some(path) => expand_path(path)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
            None => root.join(self.basename()),
        }
    }
}

/// Extract the repository name from an `owner/repo` full name
pub fn repo_basename(full_name: &str) -> &str {
    full_name.rsplit('/').next().unwrap_or(full_name)
}

/// SSH transport settings for clone/pull
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SshOptions {
    /// Non-default port, switches remote URLs to the `ssh://` form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegexStrategy {
    #[serde(default)]
    pub pattern: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileStrategy {
    #[serde(default)]
    pub filename: String,
}

/// One synchronization unit
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Source {
    /// Display name
    #[serde(default)]
    pub name: String,

    /// `host/owner`
    #[serde(default)]
    pub source: String,

    pub strategy: Strategy,

    /// Explicit provider, else inferred from the host
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_strategy: Option<RegexStrategy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_strategy: Option<FileStrategy>,

    /// Root directory holding this source's working copies
    #[serde(default)]
    pub local_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_options: Option<SshOptions>,

    /// Deprecated, use `ssh_options.private_key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<RepoEntry>,

    /// File this source was read from, if it came from a local document
    #[serde(skip)]
    pub origin: Option<PathBuf>,
}

impl Source {
    /// Host part of `host/owner`
    pub fn host(&self) -> &str {
        match self.source.split_once('/') {
            Some((host, _)) => host,
            None => &self.source,
        }
    }

    /// Owner part of `host/owner`, empty when absent
    pub fn owner(&self) -> &str {
        match self.source.split_once('/') {
            Some((_, owner)) => owner,
            None => "",
        }
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider
            .as_deref()
            .and_then(ProviderKind::from_name)
            .unwrap_or_else(|| ProviderKind::detect(self.host()))
    }

    /// Remote URL used to clone `full_name`
    pub fn repo_url(&self, full_name: &str) -> String {
        let host = self.host();
        match self.ssh_options.as_ref().and_then(|o| o.port).filter(|p| *p > 0) {
            Some(port) => format!("ssh://git@{}:{}/{}.git", host, port, full_name),
            None => format!("git@{}:{}.git", host, full_name),
        }
    }

    /// Branch override, `None` means the remote default
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref().filter(|b| !b.is_empty())
    }

    /// SSH key, preferring `ssh_options.private_key` over the deprecated field
    pub fn private_key(&self) -> Option<PathBuf> {
        self.ssh_options
            .as_ref()
            .and_then(|o| o.private_key.as_deref())
            .or(self.private_key.as_deref())
            .filter(|k| !k.is_empty())
            .map(|k| expand_path(k).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(k)))
    }

    pub fn regex_pattern(&self) -> Option<&str> {
        self.regex_strategy.as_ref().map(|r| r.pattern.as_str())
    }

    /// Expanded local root
    pub fn local_root(&self) -> Result<PathBuf, ConfigError> {
        expand_path(&self.local_path)
            .map(PathBuf::from)
            .map_err(|message| ConfigError::PathExpansion {
                source_name: self.name.clone(),
                path: self.local_path.clone(),
                message,
            })
    }

    /// Check the invariants a source must hold before it can be synced
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = |field| ConfigError::MissingField {
            source_name: self.name.clone(),
            field,
        };
        let invalid = |message: String| ConfigError::Invalid {
            source_name: self.name.clone(),
            message,
        };

        if self.name.trim().is_empty() {
            return Err(missing("name"));
        }
        if self.source.trim().is_empty() {
            return Err(missing("source"));
        }
        if self.local_path.trim().is_empty() {
            return Err(missing("local_path"));
        }
        self.local_root()?;

        if let Some(provider) = &self.provider {
            if ProviderKind::from_name(provider).is_none() {
                return Err(invalid(format!(
                    "unknown type {:?} (expected github, gitea or bitbucket)",
                    provider
                )));
            }
        }

        match self.strategy {
            Strategy::Manual => {
                if self.repos.is_empty() {
                    return Err(invalid(
                        "repos list is required for manual strategy".to_string(),
                    ));
                }
                if self.repos.iter().any(|r| r.name.trim().is_empty()) {
                    return Err(missing("repo name"));
                }
            }
            Strategy::Regex => {
                let pattern = self.regex_pattern().unwrap_or_default();
                if pattern.is_empty() {
                    return Err(invalid(
                        "regex_strategy.pattern is required for regex strategy".to_string(),
                    ));
                }
                regex::Regex::new(pattern)
                    .map_err(|e| invalid(format!("invalid regex pattern: {}", e)))?;
            }
            Strategy::File => {
                let filename = self.file_strategy.as_ref().map(|f| f.filename.as_str());
                if filename.unwrap_or_default().is_empty() {
                    return Err(invalid(
                        "file_strategy.filename is required for file strategy".to_string(),
                    ));
                }
            }
            Strategy::All => {}
        }

        for entry in &self.repos {
            if let Some(path) = &entry.local_path {
                expand_path(path).map_err(|message| ConfigError::PathExpansion {
                    source_name: self.name.clone(),
                    path: path.clone(),
                    message,
                })?;
            }
        }

        Ok(())
    }

    /// Write this source's `repos` list back into the file it came from
    ///
    /// Only the `repos` key of the matching source mapping is replaced; every
    /// other source and key in that file is left as parsed.
    pub fn persist_repos(&self) -> Result<PathBuf> {
        let path = self
            .origin
            .clone()
            .ok_or_else(|| anyhow!("source {:?} was not loaded from a local file", self.name))?;

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut document: serde_yaml::Value = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        let entry = document
            .get_mut("sources")
            .and_then(|s| s.as_sequence_mut())
            .and_then(|seq| {
                seq.iter_mut().find(|s| {
                    s.get("name").and_then(|n| n.as_str()) == Some(self.name.as_str())
                })
            })
            .and_then(|s| s.as_mapping_mut())
            .ok_or_else(|| anyhow!("source {:?} not found in {:?}", self.name, path))?;

        let repos = serde_yaml::to_value(&self.repos).context("Failed to serialize repos")?;
        entry.insert(serde_yaml::Value::from("repos"), repos);

        let content = serde_yaml::to_string(&document).context("Failed to serialize configuration")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        debug!("Persisted {} repos for source {} to {:?}", self.repos.len(), self.name, path);
        Ok(path)
    }
}

/// Where the configuration document lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    Local(PathBuf),
    Http(String),
    /// `ssh://user@host/path` or `user@host:/path`
    Ssh { host: String, path: String },
}

impl ConfigLocation {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(ConfigLocation::Http(raw.to_string()));
        }

        if let Some(rest) = raw.strip_prefix("ssh://") {
            let (host, path) = rest
                .find('/')
                .map(|idx| rest.split_at(idx))
                .ok_or_else(|| anyhow!("invalid SSH URL: missing path"))?;
            return Ok(ConfigLocation::Ssh {
                host: host.to_string(),
                path: path.to_string(),
            });
        }

        if is_scp_style(raw) {
            if let Some((host, path)) = raw.split_once(':') {
                return Ok(ConfigLocation::Ssh {
                    host: host.to_string(),
                    path: path.to_string(),
                });
            }
        }

        Ok(ConfigLocation::Local(PathBuf::from(raw)))
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, ConfigLocation::Local(_))
    }
}

impl fmt::Display for ConfigLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLocation::Local(path) => write!(f, "{}", path.display()),
            ConfigLocation::Http(url) => f.write_str(url),
            ConfigLocation::Ssh { host, path } => write!(f, "{}:{}", host, path),
        }
    }
}

// user@host:/path, but not a Windows drive path
fn is_scp_style(raw: &str) -> bool {
    match (raw.find('@'), raw.find(':')) {
        (Some(at), Some(colon)) => at > 0 && colon > at && !raw[colon..].starts_with(":\\"),
        _ => false,
    }
}

/// Raw document shape; sources stay untyped so one bad entry can't sink the rest
#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    sources: Vec<serde_yaml::Value>,
}

/// Loaded configuration: the sources that passed validation plus the rejects
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub sources: Vec<Source>,
    pub rejected: Vec<ConfigError>,
}

impl Config {
    /// Load the document at `location`, layering `sources.d` for local files
    pub async fn load(location: &ConfigLocation) -> Result<Self> {
        let mut config = Config::default();

        match location {
            ConfigLocation::Local(path) => {
                match std::fs::read_to_string(path) {
                    Ok(content) => config.ingest(&content, Some(path))?,
                    // A missing main file is fine when sources.d supplies sources
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        debug!("Config file {:?} not found, relying on sources.d", path);
                    }
                    Err(e) => {
                        return Err(e)
                            .with_context(|| format!("Failed to read config file: {:?}", path))
                    }
                }

                let sources_dir = path
                    .parent()
                    .map(|p| p.join("sources.d"))
                    .unwrap_or_else(|| PathBuf::from("sources.d"));
                config.load_sources_dir(&sources_dir)?;
            }
            ConfigLocation::Http(url) => {
                let content = fetch_http(url).await?;
                config.ingest(&content, None)?;
            }
            ConfigLocation::Ssh { host, path } => {
                let content = fetch_ssh(host, path).await?;
                config.ingest(&content, None)?;
            }
        }

        if config.sources.is_empty() && config.rejected.is_empty() {
            bail!("invalid config {}: no sources defined", location);
        }

        info!(
            "Loaded {} sources from {} ({} rejected)",
            config.sources.len(),
            location,
            config.rejected.len()
        );
        Ok(config)
    }

    /// Parse a document held in memory
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut config = Config::default();
        config.ingest(content, None)?;
        Ok(config)
    }

    /// Parse one document and append its sources
    fn ingest(&mut self, content: &str, origin: Option<&Path>) -> Result<()> {
        let label = origin
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<remote>".to_string());

        let document: Document = serde_yaml::from_str(content)
            .with_context(|| format!("Failed to parse config file: {}", label))?;

        for (index, value) in document.sources.into_iter().enumerate() {
            let parsed = serde_yaml::from_value::<Source>(value).map_err(|e| {
                ConfigError::Malformed {
                    index,
                    origin: label.clone(),
                    message: e.to_string(),
                }
            });

            match parsed.and_then(|source| source.validate().map(|_| source)) {
                Ok(mut source) => {
                    source.origin = origin.map(Path::to_path_buf);
                    self.sources.push(source);
                }
                Err(err) => {
                    warn!("Skipping invalid source: {}", err);
                    self.rejected.push(err);
                }
            }
        }

        Ok(())
    }

    /// Append sources from every `*.yaml`/`*.yml` in `dir`, in name order
    fn load_sources_dir(&mut self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        if !dir.is_dir() {
            bail!("{:?} is not a directory", dir);
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read {:?}", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        files.sort();

        for file in files {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            self.ingest(&content, Some(&file))?;
        }

        Ok(())
    }

    /// Sources to act on, optionally narrowed to one name
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&Source>> {
        match name {
            None => Ok(self.sources.iter().collect()),
            Some(name) => {
                let found: Vec<&Source> = self.sources.iter().filter(|s| s.name == name).collect();
                if found.is_empty() {
                    bail!("no valid source named {:?}", name);
                }
                Ok(found)
            }
        }
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repoherd").join("config.yaml"))
    }

    /// Write the default template to `path` if nothing is there yet
    pub fn create_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        std::fs::write(path, DEFAULT_TEMPLATE)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        info!("Created default configuration at: {:?}", path);
        Ok(())
    }
}

async fn fetch_http(url: &str) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch config from {}", url))?;

    if !response.status().is_success() {
        bail!("failed to fetch config: HTTP {}", response.status().as_u16());
    }

    response
        .text()
        .await
        .with_context(|| format!("Failed to read config body from {}", url))
}

async fn fetch_ssh(host: &str, path: &str) -> Result<String> {
    let output = tokio::process::Command::new("ssh")
        .args([host, "cat", path])
        .output()
        .await
        .context("Failed to run ssh")?;

    if !output.status.success() {
        bail!("SSH failed: {}", String::from_utf8_lossy(&output.stderr).trim());
    }

    String::from_utf8(output.stdout).context("Remote config is not valid UTF-8")
}

/// Expand `~` and `$VAR` in a configured path
pub fn expand_path(raw: &str) -> Result<String, String> {
    shellexpand::full(raw)
        .map(|s| s.into_owned())
        .map_err(|e| e.to_string())
}

/// Template written by `config --generate` and on first use
pub const DEFAULT_TEMPLATE: &str = r#"# repoherd configuration

sources:
  # Example source configuration
  - name: "GitHub"
    source: github.com/your-username
    strategy: manual # manual | all | regex
    local_path: "~/Git/github"
    # type: github  # optional, inferred from the host otherwise
    # branch: main  # optional, uses remote default if not set
    # ssh_options:
    #   port: 2222  # optional, for non-standard SSH port
    #   private_key: "~/.ssh/id_ed25519"  # optional, for private repos
    # regex_strategy:
    #   pattern: "^your-username/tools-"
    repos:
      - your-username/repo1
      - name: your-username/repo2
        local_path: "~/work/repo2"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    const TWO_SOURCES: &str = r#"
sources:
  - name: personal
    source: github.com/octocat
    strategy: manual
    local_path: /tmp/personal
    repos:
      - octocat/hello
      - name: octocat/spoon
        local_path: /elsewhere/spoon
  - name: work
    source: git.example.com/team
    strategy: regex
    local_path: /tmp/work
    regex_strategy:
      pattern: "^team/svc-"
"#;

    #[test]
    fn test_parse_both_repo_entry_forms() {
        let config = Config::from_yaml_str(TWO_SOURCES).expect("Failed to parse YAML");

        assert_eq!(config.sources.len(), 2);
        assert!(config.rejected.is_empty());

        let personal = &config.sources[0];
        assert_eq!(personal.repos[0], RepoEntry::new("octocat/hello"));
        assert_eq!(
            personal.repos[1],
            RepoEntry::new("octocat/spoon").with_local_path("/elsewhere/spoon")
        );
        assert_eq!(config.sources[1].regex_pattern(), Some("^team/svc-"));
    }

    #[test]
    fn test_repo_entry_serializes_compact_without_override() {
        let entries = vec![
            RepoEntry::new("a/x"),
            RepoEntry::new("a/y").with_local_path("/opt/y"),
        ];
        let yaml = serde_yaml::to_string(&entries).unwrap();

        assert!(yaml.contains("- a/x"));
        assert!(yaml.contains("name: a/y"));
        assert!(yaml.contains("local_path: /opt/y"));
        assert!(!yaml.contains("name: a/x"));
    }

    #[test]
    fn test_empty_override_normalizes_to_none() {
        let entry: RepoEntry = serde_yaml::from_str("{name: a/x, local_path: ''}").unwrap();
        assert_eq!(entry.local_path, None);
    }

    #[test]
    fn test_resolved_path() {
        let root = Path::new("/srv/git");
        assert_eq!(
            RepoEntry::new("owner/repo").resolved_path(root),
            PathBuf::from("/srv/git/repo")
        );
        assert_eq!(
            RepoEntry::new("owner/repo")
                .with_local_path("/opt/custom")
                .resolved_path(root),
            PathBuf::from("/opt/custom")
        );
    }

    #[test]
    fn test_invalid_source_is_rejected_others_kept() {
        let yaml = r#"
sources:
  - name: broken
    source: github.com/x
    strategy: manual
    local_path: /tmp/x
  - name: bad-strategy
    source: github.com/x
    strategy: sometimes
    local_path: /tmp/x
  - name: fine
    source: github.com/x
    strategy: all
    local_path: /tmp/x
"#;
        let config = Config::from_yaml_str(yaml).unwrap();

        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].name, "fine");
        assert_eq!(config.rejected.len(), 2);
        assert_matches!(config.rejected[0], ConfigError::Invalid { .. });
        assert_matches!(config.rejected[1], ConfigError::Malformed { index: 1, .. });
    }

    #[test]
    fn test_validate_rejects_bad_regex_and_missing_fields() {
        let mut source: Source = serde_yaml::from_str(
            "{name: r, source: github.com/x, strategy: regex, local_path: /tmp, regex_strategy: {pattern: '(unclosed'}}",
        )
        .unwrap();
        assert_matches!(source.validate(), Err(ConfigError::Invalid { .. }));

        source.regex_strategy = Some(RegexStrategy {
            pattern: "^x/".to_string(),
        });
        assert!(source.validate().is_ok());

        source.local_path.clear();
        assert_matches!(
            source.validate(),
            Err(ConfigError::MissingField { field: "local_path", .. })
        );
    }

    #[test]
    fn test_unparseable_document_is_fatal() {
        assert!(Config::from_yaml_str("sources: [unterminated").is_err());
    }

    #[test]
    fn test_host_owner_and_provider() {
        let source: Source = serde_yaml::from_str(
            "{name: s, source: bitbucket.org/workspace, strategy: all, local_path: /tmp}",
        )
        .unwrap();
        assert_eq!(source.host(), "bitbucket.org");
        assert_eq!(source.owner(), "workspace");
        assert_eq!(source.provider_kind(), ProviderKind::Bitbucket);

        let source: Source = serde_yaml::from_str(
            "{name: s, source: code.corp.net/platform, type: GitHub, strategy: all, local_path: /tmp}",
        )
        .unwrap();
        assert_eq!(source.provider_kind(), ProviderKind::GitHub);

        let source: Source =
            serde_yaml::from_str("{name: s, source: code.corp.net, strategy: all, local_path: /tmp}")
                .unwrap();
        assert_eq!(source.owner(), "");
        assert_eq!(source.provider_kind(), ProviderKind::Gitea);
    }

    #[test]
    fn test_repo_url_forms() {
        let mut source: Source = serde_yaml::from_str(
            "{name: s, source: git.example.com/team, strategy: all, local_path: /tmp}",
        )
        .unwrap();
        assert_eq!(source.repo_url("team/api"), "git@git.example.com:team/api.git");

        source.ssh_options = Some(SshOptions {
            port: Some(2222),
            private_key: None,
        });
        assert_eq!(
            source.repo_url("team/api"),
            "ssh://git@git.example.com:2222/team/api.git"
        );
    }

    #[test]
    fn test_private_key_prefers_ssh_options() {
        let source: Source = serde_yaml::from_str(
            "{name: s, source: h/o, strategy: all, local_path: /tmp, private_key: /old, ssh_options: {private_key: /new}}",
        )
        .unwrap();
        assert_eq!(source.private_key(), Some(PathBuf::from("/new")));
    }

    #[test]
    fn test_location_parse() {
        assert_eq!(
            ConfigLocation::parse("https://example.com/c.yaml").unwrap(),
            ConfigLocation::Http("https://example.com/c.yaml".to_string())
        );
        assert_eq!(
            ConfigLocation::parse("ssh://me@box/etc/c.yaml").unwrap(),
            ConfigLocation::Ssh {
                host: "me@box".to_string(),
                path: "/etc/c.yaml".to_string()
            }
        );
        assert_eq!(
            ConfigLocation::parse("me@box:/etc/c.yaml").unwrap(),
            ConfigLocation::Ssh {
                host: "me@box".to_string(),
                path: "/etc/c.yaml".to_string()
            }
        );
        assert_eq!(
            ConfigLocation::parse("/home/me/c.yaml").unwrap(),
            ConfigLocation::Local(PathBuf::from("/home/me/c.yaml"))
        );
        assert!(ConfigLocation::parse("ssh://nopath").is_err());

        assert!(ConfigLocation::parse("me@box:/etc/c.yaml").unwrap().is_remote());
        assert!(!ConfigLocation::parse("./c.yaml").unwrap().is_remote());
    }

    #[tokio::test]
    async fn test_load_layers_sources_dir_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let main = temp_dir.path().join("config.yaml");
        std::fs::write(
            &main,
            "sources:\n  - {name: main, source: github.com/a, strategy: all, local_path: /tmp/a}\n",
        )
        .unwrap();

        let sources_d = temp_dir.path().join("sources.d");
        std::fs::create_dir_all(&sources_d).unwrap();
        std::fs::write(
            sources_d.join("20-b.yml"),
            "sources:\n  - {name: b, source: github.com/b, strategy: all, local_path: /tmp/b}\n",
        )
        .unwrap();
        std::fs::write(
            sources_d.join("10-a.yaml"),
            "sources:\n  - {name: a, source: github.com/a, strategy: all, local_path: /tmp/a}\n",
        )
        .unwrap();
        std::fs::write(sources_d.join("notes.txt"), "ignored").unwrap();

        let config = Config::load(&ConfigLocation::Local(main.clone())).await.unwrap();
        let names: Vec<&str> = config.sources.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["main", "a", "b"]);
        assert_eq!(config.sources[0].origin.as_deref(), Some(main.as_path()));
        assert_eq!(
            config.sources[2].origin.as_deref(),
            Some(sources_d.join("20-b.yml").as_path())
        );
    }

    #[tokio::test]
    async fn test_load_without_any_sources_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("config.yaml");
        let result = Config::load(&ConfigLocation::Local(missing)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_persist_repos_only_touches_that_source() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, TWO_SOURCES).unwrap();

        let mut config = Config::load(&ConfigLocation::Local(path.clone())).await.unwrap();
        config.sources[0].repos.push(RepoEntry::new("octocat/new-one"));
        config.sources[0].persist_repos().unwrap();

        let reloaded = Config::load(&ConfigLocation::Local(path)).await.unwrap();
        assert_eq!(reloaded.sources[0].repos.len(), 3);
        assert_eq!(reloaded.sources[0].repos[2], RepoEntry::new("octocat/new-one"));
        assert_eq!(
            reloaded.sources[0].repos[1].local_path.as_deref(),
            Some("/elsewhere/spoon")
        );
        assert_eq!(reloaded.sources[1].regex_pattern(), Some("^team/svc-"));
    }

    #[test]
    fn test_default_template_parses() {
        let config = Config::from_yaml_str(DEFAULT_TEMPLATE).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].strategy, Strategy::Manual);
    }

    #[test]
    fn test_config_default_path_xdg() {
        let default_path = Config::default_config_path().expect("Failed to get default path");
        assert!(default_path.to_string_lossy().contains("repoherd"));
        assert!(default_path.to_string_lossy().ends_with("config.yaml"));
    }

    #[test]
    #[serial_test::serial]
    fn test_local_root_expands_env_at_use_time() {
        let source: Source = serde_yaml::from_str(
            "{name: s, source: github.com/a, strategy: all, local_path: $REPOHERD_TEST_ROOT/work}",
        )
        .unwrap();

        std::env::set_var("REPOHERD_TEST_ROOT", "/srv/one");
        assert_eq!(source.local_root().unwrap(), PathBuf::from("/srv/one/work"));

        std::env::set_var("REPOHERD_TEST_ROOT", "/srv/two");
        assert_eq!(source.local_root().unwrap(), PathBuf::from("/srv/two/work"));
        assert_eq!(source.local_path, "$REPOHERD_TEST_ROOT/work");

        std::env::remove_var("REPOHERD_TEST_ROOT");
        assert_matches!(
            source.local_root(),
            Err(ConfigError::PathExpansion { .. })
        );
    }
}
