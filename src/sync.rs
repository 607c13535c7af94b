//! Sync orchestration
//!
//! Drives one pass per source: resolve the declared set, scan the local root,
//! reconcile, settle orphans, then hand clones (and optionally pulls) to the
//! [`ExecutionEngine`]. A failure inside one source is logged and recorded in
//! the [`SyncSummary`]; the remaining sources still run.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{Config, RepoEntry, Source};
use crate::engine::{ExecutionEngine, ExecutionJob, ExecutionOutcome};
use crate::error::ExecutionError;
use crate::git::is_git_repo;
use crate::orphans::{choose_action, dispose, DispositionOptions, OrphanAction, Prompter};
use crate::reconcile::{filter_by, reconcile, Classification, LocalState, RepoStatus};
use crate::resolver::StrategyResolver;
use crate::scanner::{scan, scan_or_empty};

/// Flags for `sync`
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub prune: bool,
    pub add: bool,
    pub force: bool,
    pub dry_run: bool,
    /// Also pull repositories that are already present
    pub pull: bool,
    /// Worker count, zero for the default
    pub jobs: usize,
    /// Restrict the run to one source
    pub source: Option<String>,
}

/// Totals for one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub sources_processed: usize,
    /// Sources that could not be processed, with the reason
    pub sources_skipped: Vec<(String, String)>,
    pub cloned: usize,
    pub pulled: usize,
    /// Jobs that failed, with the reason
    pub failed: Vec<(String, String)>,
    pub cancelled: usize,
    pub pruned: usize,
    pub prune_failed: usize,
    pub added: usize,
    /// Dry-run descriptions
    pub planned: Vec<String>,
    pub duration: Duration,
}

impl SyncSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.sources_skipped.is_empty() || self.prune_failed > 0
    }

    /// Count sources rejected at load time as skipped, honoring a source filter
    fn record_rejected(&mut self, config: &Config, filter: Option<&str>) {
        for err in &config.rejected {
            let label = err.source_label();
            if filter.map_or(true, |name| name == label) {
                self.sources_skipped.push((label, err.to_string()));
            }
        }
    }

    fn record(&mut self, outcomes: Vec<ExecutionOutcome>, kind: BatchKind) {
        for outcome in outcomes {
            match outcome.error {
                None => match kind {
                    BatchKind::Clone => self.cloned += 1,
                    BatchKind::Pull => self.pulled += 1,
                },
                Some(ExecutionError::Cancelled) => self.cancelled += 1,
                Some(e) => {
                    error!("{} failed: {}", outcome.name, e);
                    self.failed.push((outcome.name, e.to_string()));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BatchKind {
    Clone,
    Pull,
}

impl BatchKind {
    fn label(&self) -> &'static str {
        match self {
            BatchKind::Clone => "Cloning",
            BatchKind::Pull => "Pulling",
        }
    }
}

/// Reconciliation result for one source, as printed by `diff`
#[derive(Debug, Clone)]
pub struct SourceDiff {
    pub source_name: String,
    pub statuses: Vec<RepoStatus>,
}

pub struct SyncRunner {
    resolver: StrategyResolver,
    engine: ExecutionEngine,
    prompter: Arc<dyn Prompter>,
    show_progress: bool,
}

impl SyncRunner {
    pub fn new(
        resolver: StrategyResolver,
        engine: ExecutionEngine,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            resolver,
            engine,
            prompter,
            show_progress: false,
        }
    }

    /// Draw a progress counter on stderr while batches run
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Bring every selected source's local root in line with its declaration
    pub async fn sync(&self, config: &mut Config, options: &SyncOptions) -> Result<SyncSummary> {
        let start_time = Instant::now();
        let mut summary = SyncSummary::default();
        summary.record_rejected(config, options.source.as_deref());

        let selected: HashSet<String> = config
            .select(options.source.as_deref())?
            .into_iter()
            .map(|s| s.name.clone())
            .collect();

        for source in config.sources.iter_mut() {
            if !selected.contains(&source.name) {
                continue;
            }
            if self.engine.stop_signal().is_raised() {
                warn!("Stop requested, not starting source {}", source.name);
                break;
            }

            match self.sync_source(source, options, &mut summary).await {
                Ok(()) => summary.sources_processed += 1,
                Err(e) => {
                    warn!("Skipping source {}: {:#}", source.name, e);
                    summary.sources_skipped.push((source.name.clone(), format!("{:#}", e)));
                }
            }
        }

        summary.duration = start_time.elapsed();
        info!(
            "Sync completed in {:.2}s: {} cloned, {} pulled, {} failed",
            summary.duration.as_secs_f64(),
            summary.cloned,
            summary.pulled,
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn sync_source(
        &self,
        source: &mut Source,
        options: &SyncOptions,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let entries = self.resolver.resolve(source).await?;
        let root = source.local_root()?;

        if !root.exists() {
            if options.dry_run {
                summary.planned.push(format!("would create directory {}", root.display()));
            } else {
                if !options.force && !self.prompter.confirm_create_dir(&root)? {
                    info!("Skipping source {}: directory not created", source.name);
                    return Ok(());
                }
                std::fs::create_dir_all(&root)
                    .with_context(|| format!("Failed to create directory: {:?}", root))?;
                info!("Created directory {}", root.display());
            }
        }

        let local = local_state(&root, &entries)?;
        let statuses = reconcile(&entries, &root, &local);

        let to_create = filter_by(&statuses, Classification::ToCreate);
        let orphans = filter_by(&statuses, Classification::Orphaned);
        if to_create.is_empty() && orphans.is_empty() && !options.pull {
            info!("Source {} is up to date", source.name);
            return Ok(());
        }

        print_diff(&source.name, &statuses);

        let disposition = DispositionOptions {
            prune: options.prune,
            add: options.add,
            force: options.force,
            dry_run: options.dry_run,
        };
        let action = choose_action(&source.name, &orphans, &disposition, self.prompter.as_ref())?;
        if action != OrphanAction::Skip {
            let report = dispose(source, &orphans, action, &disposition, self.prompter.as_ref())?;
            summary.pruned += report.removed.len();
            summary.prune_failed += report.failed.len();
            summary.added += report.added.len();
            summary.planned.extend(report.planned);
        }

        let branch = source.branch().map(str::to_string);
        let ssh_key = source.private_key();

        let clones: Vec<ExecutionJob> = to_create
            .iter()
            .filter_map(|status| {
                let full_name = status.full_name.as_ref()?;
                Some(ExecutionJob::clone_repo(
                    full_name.clone(),
                    source.repo_url(full_name),
                    status.path.clone(),
                    branch.clone(),
                    ssh_key.clone(),
                ))
            })
            .collect();

        let pulls: Vec<ExecutionJob> = if options.pull {
            filter_by(&statuses, Classification::Unchanged)
                .iter()
                .map(|s| ExecutionJob::pull(s.name.clone(), s.path.clone(), ssh_key.clone()))
                .collect()
        } else {
            Vec::new()
        };

        if options.dry_run {
            for job in &clones {
                summary
                    .planned
                    .push(format!("would clone {} into {}", job.name, job.target.display()));
            }
            for job in &pulls {
                summary.planned.push(format!("would pull {}", job.target.display()));
            }
            return Ok(());
        }

        self.run_batch(clones, options.jobs, BatchKind::Clone, summary).await;
        self.run_batch(pulls, options.jobs, BatchKind::Pull, summary).await;
        Ok(())
    }

    /// Pull every working copy under every selected source root
    pub async fn pull(&self, config: &Config, jobs: usize, source: Option<&str>) -> Result<SyncSummary> {
        let start_time = Instant::now();
        let mut summary = SyncSummary::default();
        summary.record_rejected(config, source);
        let mut batch = Vec::new();

        for source in config.select(source)? {
            match pull_jobs(source) {
                Ok(mut source_jobs) => {
                    info!("Found {} repos to pull in source {}", source_jobs.len(), source.name);
                    batch.append(&mut source_jobs);
                    summary.sources_processed += 1;
                }
                Err(e) => {
                    warn!("Skipping source {}: {:#}", source.name, e);
                    summary.sources_skipped.push((source.name.clone(), format!("{:#}", e)));
                }
            }
        }

        self.run_batch(batch, jobs, BatchKind::Pull, &mut summary).await;
        summary.duration = start_time.elapsed();
        Ok(summary)
    }

    /// Classify every selected source without acting
    pub async fn diff(&self, config: &Config, source: Option<&str>) -> Result<Vec<Result<SourceDiff>>> {
        let mut diffs = Vec::new();

        for source in config.select(source)? {
            let result = async {
                let entries = self.resolver.resolve(source).await?;
                let root = source.local_root()?;
                let local = local_state(&root, &entries)?;
                Ok::<_, anyhow::Error>(SourceDiff {
                    source_name: source.name.clone(),
                    statuses: reconcile(&entries, &root, &local),
                })
            }
            .await;

            match &result {
                Ok(diff) => print_diff(&diff.source_name, &diff.statuses),
                Err(e) => warn!("Skipping source {}: {:#}", source.name, e),
            }
            diffs.push(result);
        }

        Ok(diffs)
    }

    async fn run_batch(
        &self,
        jobs: Vec<ExecutionJob>,
        workers: usize,
        kind: BatchKind,
        summary: &mut SyncSummary,
    ) {
        if jobs.is_empty() {
            return;
        }

        let show = self.show_progress;
        let outcomes = self
            .engine
            .execute(jobs, workers, |done, total| {
                if show {
                    eprint!("\r{} repos {}/{}", kind.label(), done, total);
                    let _ = std::io::stderr().flush();
                    if done == total {
                        eprintln!();
                    }
                }
            })
            .await;

        debug!("{} batch finished with {} outcomes", kind.label(), outcomes.len());
        summary.record(outcomes, kind);
    }
}

/// Scan `root` and check override paths for working copies
fn local_state(root: &Path, entries: &[RepoEntry]) -> Result<LocalState> {
    let names = scan_or_empty(root)
        .with_context(|| format!("Failed to scan local repos in {:?}", root))?;

    let external = entries
        .iter()
        .filter(|e| e.local_path.is_some())
        .map(|e| e.resolved_path(root))
        .filter(|p| is_git_repo(p))
        .collect();

    Ok(LocalState { names, external })
}

fn pull_jobs(source: &Source) -> Result<Vec<ExecutionJob>> {
    let root = source.local_root()?;
    if !root.exists() {
        anyhow::bail!("directory {:?} does not exist", root);
    }

    let ssh_key = source.private_key();
    let names = scan(&root).with_context(|| format!("Failed to scan local repos in {:?}", root))?;
    Ok(names
        .into_iter()
        .map(|name| {
            let path = root.join(&name);
            ExecutionJob::pull(name, path, ssh_key.clone())
        })
        .collect())
}

/// One line per status: `+` to create, `-` orphaned, blank unchanged
pub fn format_diff(source_name: &str, statuses: &[RepoStatus]) -> String {
    let mut out = format!("{}:\n", source_name);
    for status in statuses {
        let marker = match status.classification {
            Classification::ToCreate => '+',
            Classification::Orphaned => '-',
            Classification::Unchanged => ' ',
        };
        out.push_str(&format!("  {} {}\n", marker, status.name));
    }
    out
}

fn print_diff(source_name: &str, statuses: &[RepoStatus]) {
    print!("{}", format_diff(source_name, statuses));
}
