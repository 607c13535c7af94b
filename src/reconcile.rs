//! Classification of declared repositories against what is on disk
//!
//! Everything here is pure: callers scan the filesystem first and hand the
//! result in as a [`LocalState`].

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::RepoEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Declared but missing locally
    ToCreate,
    /// Declared and present
    Unchanged,
    /// Present locally but not declared
    Orphaned,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::ToCreate => "to-create",
            Classification::Unchanged => "unchanged",
            Classification::Orphaned => "orphaned",
        })
    }
}

/// One repository's reconciliation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoStatus {
    /// Directory name
    pub name: String,
    /// `owner/repo`; unknown for orphans
    pub full_name: Option<String>,
    pub path: PathBuf,
    pub classification: Classification,
    pub declared: bool,
    pub on_disk: bool,
}

/// What a scan found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalState {
    /// Working copies directly under the source root, in scan order
    pub names: Vec<String>,
    /// Override paths (outside the root scan) that hold a working copy
    pub external: HashSet<PathBuf>,
}

impl LocalState {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            external: HashSet::new(),
        }
    }
}

/// Classify `entries` against `local`
///
/// Declared entries come first in declaration order, then orphans in scan
/// order. A basename or path appears at most once; the first declaration
/// wins. A scanned directory that a declared entry resolves to is never an
/// orphan.
pub fn reconcile(entries: &[RepoEntry], root: &Path, local: &LocalState) -> Vec<RepoStatus> {
    let scanned: HashSet<&str> = local.names.iter().map(String::as_str).collect();
    let mut declared: HashSet<&str> = HashSet::new();
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut statuses = Vec::with_capacity(entries.len() + local.names.len());

    for entry in entries {
        let name = entry.basename();
        let path = entry.resolved_path(root);
        if declared.contains(name) || claimed.contains(&path) {
            continue;
        }
        declared.insert(name);
        claimed.insert(path.clone());
        let on_disk = match entry.local_path {
            Some(_) => local.external.contains(&path),
            None => scanned.contains(name),
        };

        statuses.push(RepoStatus {
            name: name.to_string(),
            full_name: Some(entry.name.clone()),
            path,
            classification: if on_disk {
                Classification::Unchanged
            } else {
                Classification::ToCreate
            },
            declared: true,
            on_disk,
        });
    }

    let mut orphaned: HashSet<&str> = HashSet::new();
    for name in &local.names {
        if declared.contains(name.as_str()) || !orphaned.insert(name.as_str()) {
            continue;
        }
        let path = root.join(name);
        if claimed.contains(&path) {
            continue;
        }
        statuses.push(RepoStatus {
            name: name.clone(),
            full_name: None,
            path,
            classification: Classification::Orphaned,
            declared: false,
            on_disk: true,
        });
    }

    statuses
}

/// Statuses with the given classification
pub fn filter_by(statuses: &[RepoStatus], classification: Classification) -> Vec<&RepoStatus> {
    statuses
        .iter()
        .filter(|s| s.classification == classification)
        .collect()
}

/// Best-effort full name for an orphan: the source owner's last segment plus the directory name
pub fn guess_full_name(owner: &str, basename: &str) -> String {
    match owner.rsplit('/').next().filter(|o| !o.is_empty()) {
        Some(owner) => format!("{}/{}", owner, basename),
        None => basename.to_string(),
    }
}
