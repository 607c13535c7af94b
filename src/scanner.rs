use std::io;
use std::path::Path;
use tracing::debug;

use crate::git::is_git_repo;

/// Names of the first-level working copies under `root`, sorted
///
/// Hidden entries and directories without a `.git` directory are ignored.
pub fn scan(root: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                debug!("Ignoring non UTF-8 entry {:?} under {}", raw, root.display());
                continue;
            }
        };
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        if path.is_dir() && is_git_repo(&path) {
            names.push(name);
        }
    }

    names.sort();
    debug!("Found {} working copies under {}", names.len(), root.display());
    Ok(names)
}

/// Like [`scan`], but a root that does not exist yet scans as empty
pub fn scan_or_empty(root: &Path) -> io::Result<Vec<String>> {
    match scan(root) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        other => other,
    }
}
