use crate::errors::{Error, Result};
use crate::report::Reporter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to look for and what to put in its place.
#[derive(Debug, Clone)]
pub struct MatchSpec {
    /// The literal text or regex pattern to search for.
    pub from: String,
    /// The replacement. In regex mode it may reference capture groups as `$1`, `$2`, ...
    pub to: String,
    /// Treat `from` as a regular expression.
    pub use_regex: bool,
}

impl MatchSpec {
    /// Rejects inputs that can never produce a sensible run.
    ///
    /// The regex is compiled here once only to report syntax errors up front;
    /// each file task still compiles its own copy lazily.
    pub fn validate(&self) -> Result<()> {
        if self.from.is_empty() {
            return Err("FROM must not be empty".into());
        }
        if self.from == self.to {
            return Err(format!("FROM and TO are the same: '{}'", self.from).into());
        }
        if self.use_regex {
            regex::Regex::new(&self.from)?;
        }
        Ok(())
    }
}

/// Settings shared read-only by every file task.
#[derive(Clone)]
pub struct ProcessingConfig {
    pub spec: MatchSpec,
    /// Suppress the per-match report lines.
    pub quiet: bool,
    /// Detect and report matches without writing anything.
    pub dry_run: bool,
    /// Where reports and per-file errors go.
    pub reporter: Arc<Reporter>,
}

/// Settings for the directory walk.
#[derive(Debug, Clone)]
pub struct FinderOptions {
    /// Root of the tree to walk.
    pub root: PathBuf,
    /// Glob applied to file basenames, e.g. `*.rs`.
    pub name_pattern: Option<String>,
    /// Extra ignore rules evaluated after the root `.gitignore`.
    pub ignore_file: Option<PathBuf>,
    /// Size of the worker pool running file tasks. `None` means one per logical CPU.
    pub workers: Option<usize>,
}

impl Default for FinderOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            name_pattern: None,
            ignore_file: None,
            workers: None,
        }
    }
}

impl FinderOptions {
    /// Checks the glob syntax and that an explicitly named ignore file exists.
    pub fn validate(&self) -> Result<()> {
        if let Some(pattern) = &self.name_pattern {
            glob::Pattern::new(pattern)?;
        }
        if let Some(path) = &self.ignore_file {
            ensure_ignore_file_exists(path)?;
        }
        if self.workers == Some(0) {
            return Err("workers must be at least 1".into());
        }
        Ok(())
    }
}

pub(crate) fn ensure_ignore_file_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::IgnoreFile {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        })
    }
}
