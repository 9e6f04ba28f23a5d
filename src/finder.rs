use crate::config::FinderOptions;
use crate::errors::Result;
use crate::ignore_rules::IgnoreRules;
use crate::replacer::FileOutcome;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

/// Work done on every file the [`Finder`] accepts.
///
/// Implementations are shared across the worker pool, so they must be `Sync`.
pub trait Process: Sync {
    fn process(&self, path: &Path) -> FileOutcome;
}

/// Walks a directory tree and hands each eligible file to a [`Process`].
///
/// The walk itself is sequential so that ignored directories can be pruned
/// before descending. Every accepted file is dispatched as its own task on a
/// rayon pool while the walk continues, and [`Finder::run`] returns only once
/// all tasks have finished.
pub struct Finder<P> {
    processor: P,
    options: FinderOptions,
}

/// Counts of file outcomes for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub dispatched: usize,
    pub unchanged: usize,
    pub rewritten: usize,
    pub would_rewrite: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicUsize,
    unchanged: AtomicUsize,
    rewritten: AtomicUsize,
    would_rewrite: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn record(&self, outcome: FileOutcome) {
        let counter = match outcome {
            FileOutcome::Unchanged => &self.unchanged,
            FileOutcome::Rewritten { .. } => &self.rewritten,
            FileOutcome::WouldRewrite { .. } => &self.would_rewrite,
            FileOutcome::Skipped => &self.skipped,
            FileOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RunStats {
        RunStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            rewritten: self.rewritten.load(Ordering::Relaxed),
            would_rewrite: self.would_rewrite.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl<P: Process> Finder<P> {
    pub fn new(processor: P, options: FinderOptions) -> Self {
        Self { processor, options }
    }

    /// Walks the tree and waits for every dispatched file task.
    ///
    /// Ignore files are compiled before anything is visited. If a directory
    /// cannot be read the walk carries on, and the first such error is
    /// returned after all tasks are done. Per-file failures are never returned.
    pub fn run(&self) -> Result<RunStats> {
        self.options.validate()?;
        let root = self.options.root.as_path();
        let rules = IgnoreRules::load(root, self.options.ignore_file.as_deref())?;
        let name_filter = self
            .options
            .name_pattern
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.unwrap_or_else(num_cpus::get))
            .build()?;
        let counters = Counters::default();
        let processor = &self.processor;
        let tally = &counters;

        let first_error = pool.scope(|scope| {
            let mut first_error = None;
            let walker = WalkDir::new(root)
                .min_depth(1)
                .into_iter()
                .filter_entry(|entry| !is_pruned(&rules, entry));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        debug!("walk error: {e}");
                        first_error.get_or_insert(e);
                        continue;
                    }
                };
                if is_directory(&entry) {
                    continue;
                }
                if let Some(pattern) = &name_filter {
                    let name = entry.file_name().to_string_lossy();
                    if !pattern.matches(&name) {
                        trace!(path = %entry.path().display(), "name filter rejected");
                        continue;
                    }
                }

                let path = task_path(entry.path());
                trace!(path = %path.display(), "dispatch");
                tally.dispatched.fetch_add(1, Ordering::Relaxed);
                scope.spawn(move |_| tally.record(processor.process(&path)));
            }
            first_error
        });

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(counters.snapshot()),
        }
    }
}

/// The ignore layers strip their own root, so the walk path goes in as is.
fn is_pruned(rules: &IgnoreRules, entry: &DirEntry) -> bool {
    rules.should_prune(entry.path(), entry.file_type().is_dir())
}

/// Directories and symlinks to directories are never processed.
fn is_directory(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() || (entry.path_is_symlink() && entry.path().is_dir())
}

/// Drops a leading `./` so reports read `src/main.rs` rather than `./src/main.rs`.
fn task_path(path: &Path) -> PathBuf {
    path.strip_prefix(".").unwrap_or(path).to_path_buf()
}
