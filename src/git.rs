use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::error::ExecutionError;

/// The two git operations a sync pass performs
#[async_trait]
pub trait GitOps: Send + Sync {
    /// Clone `url` into `path`, creating the parent directory first
    async fn clone_repo(
        &self,
        url: &str,
        path: &Path,
        branch: Option<&str>,
        ssh_key: Option<&Path>,
    ) -> Result<(), ExecutionError>;

    /// Pull the current branch of the working copy at `path`
    async fn pull(&self, path: &Path, ssh_key: Option<&Path>) -> Result<(), ExecutionError>;
}

/// Runs the `git` binary
#[derive(Debug, Clone, Default)]
pub struct GitClient;

impl GitClient {
    pub fn new() -> Self {
        Self
    }

    fn command(ssh_key: Option<&Path>) -> AsyncCommand {
        let mut cmd = AsyncCommand::new("git");
        // Never block a worker on a credential prompt
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(key) = ssh_key {
            cmd.env("GIT_SSH_COMMAND", ssh_command(key));
        }
        cmd
    }
}

/// `GIT_SSH_COMMAND` value pinning a private key
pub fn ssh_command(key: &Path) -> String {
    format!(
        "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
        key.display()
    )
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stderr);
    }
    text
}

#[async_trait]
impl GitOps for GitClient {
    async fn clone_repo(
        &self,
        url: &str,
        path: &Path,
        branch: Option<&str>,
        ssh_key: Option<&Path>,
    ) -> Result<(), ExecutionError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = Self::command(ssh_key);
        cmd.arg("clone");
        if let Some(branch) = branch {
            cmd.args(["--branch", branch]);
        }
        cmd.arg(url).arg(path);

        debug!("Cloning {} into {}", url, path.display());
        let output = cmd.output().await?;

        if !output.status.success() {
            return Err(ExecutionError::Clone {
                url: url.to_string(),
                path: path.to_path_buf(),
                output: combined_output(&output),
            });
        }

        info!("Cloned {} into {}", url, path.display());
        Ok(())
    }

    async fn pull(&self, path: &Path, ssh_key: Option<&Path>) -> Result<(), ExecutionError> {
        let output = Self::command(ssh_key)
            .arg("-C")
            .arg(path)
            .arg("pull")
            .output()
            .await?;

        if !output.status.success() {
            return Err(ExecutionError::Pull {
                path: path.to_path_buf(),
                output: combined_output(&output),
            });
        }

        debug!("Pulled {}", path.display());
        Ok(())
    }
}

/// Whether `path` holds a `.git` directory
pub fn is_git_repo(path: &Path) -> bool {
    path.join(".git").is_dir()
}
