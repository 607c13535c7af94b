use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::{RepoEntry, Source, Strategy};
use crate::reconcile::{guess_full_name, RepoStatus};

/// What to do with local working copies that are not declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanAction {
    Skip,
    /// Delete them
    Prune,
    /// Declare them in the source
    Add,
}

/// Interactive decisions, kept behind a trait so runs can be scripted
pub trait Prompter: Send + Sync {
    fn choose_orphan_action(&self, source_name: &str, orphans: &[String]) -> Result<OrphanAction>;

    fn confirm_prune(&self, orphans: &[String]) -> Result<bool>;

    fn confirm_create_dir(&self, path: &Path) -> Result<bool>;
}

/// Flags that steer orphan handling
#[derive(Debug, Clone, Copy, Default)]
pub struct DispositionOptions {
    pub prune: bool,
    pub add: bool,
    pub force: bool,
    pub dry_run: bool,
}

/// Outcome of one disposition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanReport {
    pub removed: Vec<PathBuf>,
    /// Paths that could not be removed, with the reason
    pub failed: Vec<(PathBuf, String)>,
    /// Full names appended to the source
    pub added: Vec<String>,
    /// Dry-run descriptions of what would have happened
    pub planned: Vec<String>,
    /// Config file written after an add
    pub saved_to: Option<PathBuf>,
}

/// Decide the action: flags first, the prompter only when neither is set
pub fn choose_action(
    source_name: &str,
    orphans: &[&RepoStatus],
    options: &DispositionOptions,
    prompter: &dyn Prompter,
) -> Result<OrphanAction> {
    if orphans.is_empty() {
        return Ok(OrphanAction::Skip);
    }
    if options.prune {
        return Ok(OrphanAction::Prune);
    }
    if options.add {
        return Ok(OrphanAction::Add);
    }
    // A dry run never prompts
    if options.dry_run {
        return Ok(OrphanAction::Skip);
    }

    let names: Vec<String> = orphans.iter().map(|o| o.name.clone()).collect();
    prompter.choose_orphan_action(source_name, &names)
}

/// Carry out `action` for `orphans` of `source`
///
/// Removals are isolated: one failure is recorded and the rest still run.
/// An add mutates `source.repos` and writes the source back to its file.
pub fn dispose(
    source: &mut Source,
    orphans: &[&RepoStatus],
    action: OrphanAction,
    options: &DispositionOptions,
    prompter: &dyn Prompter,
) -> Result<OrphanReport> {
    let mut report = OrphanReport::default();
    if orphans.is_empty() {
        return Ok(report);
    }

    match action {
        OrphanAction::Skip => {}
        OrphanAction::Prune => {
            if options.dry_run {
                for orphan in orphans {
                    report.planned.push(format!("would prune {}", orphan.name));
                }
                return Ok(report);
            }

            if !options.force {
                let names: Vec<String> = orphans.iter().map(|o| o.name.clone()).collect();
                if !prompter.confirm_prune(&names)? {
                    info!("Prune cancelled for source {}", source.name);
                    return Ok(report);
                }
            }

            for orphan in orphans {
                info!("Removing {}", orphan.path.display());
                match remove_orphan(&orphan.path) {
                    Ok(()) => report.removed.push(orphan.path.clone()),
                    Err(e) => {
                        error!("Failed to remove {}: {}", orphan.path.display(), e);
                        report.failed.push((orphan.path.clone(), e.to_string()));
                    }
                }
            }
        }
        OrphanAction::Add => {
            let owner = source.owner().to_string();
            let names: Vec<String> = orphans
                .iter()
                .map(|o| guess_full_name(&owner, &o.name))
                .collect();

            if options.dry_run {
                for name in names {
                    report.planned.push(format!("would add {} to config", name));
                }
                return Ok(report);
            }

            if source.strategy != Strategy::Manual {
                warn!(
                    "Source {} uses the {} strategy; added repos are saved but only a manual source reads them",
                    source.name, source.strategy
                );
            }

            for name in names {
                info!("Added {} to source {}", name, source.name);
                source.repos.push(RepoEntry::new(name.clone()));
                report.added.push(name);
            }

            if source.origin.is_none() {
                warn!("Source {} came from a remote config; not saving", source.name);
            } else {
                match source.persist_repos() {
                    Ok(path) => {
                        info!("Config saved to {:?}", path);
                        report.saved_to = Some(path);
                    }
                    Err(e) => error!("Failed to save config: {:#}", e),
                }
            }
        }
    }

    Ok(report)
}

fn remove_orphan(path: &Path) -> std::io::Result<()> {
    std::fs::remove_dir_all(path)
}
