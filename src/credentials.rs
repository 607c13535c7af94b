//! Provider token lookup
//!
//! Tokens are read once at startup into a [`Credentials`] snapshot, which is
//! then handed to the resolver. Lookup order per provider is the process
//! environment, then the saved credentials file, then (GitHub only) the `gh`
//! CLI's `hosts.yml`.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::connector::ProviderKind;
use crate::error::ResolveError;

/// Snapshot of the tokens available to this run
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    tokens: HashMap<ProviderKind, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, kind: ProviderKind, token: impl Into<String>) -> Self {
        self.tokens.insert(kind, token.into());
        self
    }

    /// Build a snapshot from an environment lookup plus optional fallback files
    pub fn from_sources<F>(env: F, credentials_file: Option<&Path>, gh_hosts: Option<&Path>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let saved: HashMap<String, String> = credentials_file
            .and_then(|path| read_credentials_file(path).ok())
            .map(|pairs| pairs.into_iter().collect())
            .unwrap_or_default();

        let mut credentials = Credentials::new();
        for kind in ProviderKind::ALL {
            let var = kind.env_var();
            let token = env(var)
                .filter(|t| !t.is_empty())
                .or_else(|| saved.get(var).cloned().filter(|t| !t.is_empty()))
                .or_else(|| match kind {
                    ProviderKind::GitHub => gh_hosts.and_then(read_gh_token),
                    _ => None,
                });

            if let Some(token) = token {
                debug!("Found {} credential", kind);
                credentials.tokens.insert(kind, token);
            }
        }
        credentials
    }

    /// Snapshot from the real process environment and default file locations
    pub fn from_environment() -> Self {
        let file = credentials_path().ok();
        let gh_hosts = gh_hosts_path();
        Self::from_sources(
            |var| std::env::var(var).ok(),
            file.as_deref(),
            gh_hosts.as_deref(),
        )
    }

    pub fn token_for(&self, kind: ProviderKind) -> Option<&str> {
        self.tokens.get(&kind).map(String::as_str)
    }

    /// Token for `kind`, or an error naming the variable that should hold it
    pub fn require(&self, kind: ProviderKind, source_name: &str) -> Result<&str, ResolveError> {
        self.token_for(kind)
            .ok_or_else(|| ResolveError::MissingCredential {
                source_name: source_name.to_string(),
                var: kind.env_var(),
            })
    }
}

/// Location of the saved credentials file
pub fn credentials_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Failed to get user data directory")?;
    Ok(data_dir.join("repoherd").join("credentials.env"))
}

fn gh_hosts_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gh").join("hosts.yml"))
}

fn read_gh_token(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let hosts: serde_yaml::Value = serde_yaml::from_str(&content).ok()?;
    hosts
        .get("github.com")?
        .get("oauth_token")?
        .as_str()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Read `KEY=VALUE` lines, ignoring blanks and `#` comments
pub fn read_credentials_file(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file: {:?}", path))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect())
}

/// Store `var=token` in the credentials file, replacing any previous value
pub fn save_credential(path: &Path, var: &str, token: &str) -> Result<()> {
    let mut pairs = if path.exists() {
        read_credentials_file(path)?
    } else {
        Vec::new()
    };

    match pairs.iter_mut().find(|(k, _)| k == var) {
        Some(pair) => pair.1 = token.to_string(),
        None => pairs.push((var.to_string(), token.to_string())),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let mut content = String::from("# repoherd credentials\n");
    for (k, v) in &pairs {
        content.push_str(&format!("{}={}\n", k, v));
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write credentials file: {:?}", path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {:?}", path))?;
    }

    Ok(())
}

/// Show only the first and last four characters of a token
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}
