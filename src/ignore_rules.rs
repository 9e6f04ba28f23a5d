use crate::config::ensure_ignore_file_exists;
use crate::errors::{Error, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;
use tracing::debug;

/// Name of the ignore file picked up automatically at the tree root.
pub const DEFAULT_IGNORE_FILE: &str = ".gitignore";

/// Directory names that are never descended into: version-control metadata,
/// log and temp output, and dependency caches.
pub const BUILTIN_IGNORED_DIRS: &[&str] = &[".git", ".hg", ".svn", "log", "tmp", "node_modules"];

/// Which layer of the rule set matched a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreSource {
    Builtin,
    DefaultFile,
    AppendedFile,
}

/// The ignore rules for one run, in evaluation order.
///
/// Layers are consulted built-in first, then the root `.gitignore`, then the
/// appended ignore file. The first layer that ignores a path decides; a
/// `!negation` in one file cannot re-include something an earlier layer ignored.
pub struct IgnoreRules {
    default_file: Option<Gitignore>,
    appended_file: Option<Gitignore>,
}

impl IgnoreRules {
    /// Compiles the rule set for the tree at `root`.
    ///
    /// A missing root `.gitignore` is fine. A missing `appended` file is an error,
    /// as is either file failing to parse.
    pub fn load(root: &Path, appended: Option<&Path>) -> Result<Self> {
        let appended_file = match appended {
            Some(path) => {
                ensure_ignore_file_exists(path)?;
                Some(compile(root, path)?)
            }
            None => None,
        };

        let default_path = root.join(DEFAULT_IGNORE_FILE);
        let default_file = if default_path.is_file() {
            Some(compile(root, &default_path)?)
        } else {
            None
        };

        Ok(Self {
            default_file,
            appended_file,
        })
    }

    /// Only the built-in directory names, no file rules.
    pub fn builtin() -> Self {
        Self {
            default_file: None,
            appended_file: None,
        }
    }

    /// Returns `true` if `path` must be skipped. For a directory this means its
    /// whole subtree is pruned.
    ///
    /// `path` is either relative to the root or the path as the walk yields it,
    /// with the root as its prefix. Never strip the root first: a nested
    /// directory named like the root would then lose a second component.
    pub fn should_prune(&self, path: &Path, is_dir: bool) -> bool {
        match self.matched_by(path, is_dir) {
            Some(source) => {
                debug!(path = %path.display(), ?source, is_dir, "pruned");
                true
            }
            None => false,
        }
    }

    /// Returns the first layer that ignores `path`, if any.
    pub fn matched_by(&self, path: &Path, is_dir: bool) -> Option<IgnoreSource> {
        if is_dir && is_builtin_dir(path) {
            return Some(IgnoreSource::Builtin);
        }
        if ignored_by(self.default_file.as_ref(), path, is_dir) {
            return Some(IgnoreSource::DefaultFile);
        }
        if ignored_by(self.appended_file.as_ref(), path, is_dir) {
            return Some(IgnoreSource::AppendedFile);
        }
        None
    }
}

fn is_builtin_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| BUILTIN_IGNORED_DIRS.contains(&name))
}

fn ignored_by(rules: Option<&Gitignore>, path: &Path, is_dir: bool) -> bool {
    rules.is_some_and(|rules| rules.matched(path, is_dir).is_ignore())
}

/// Compiles `file` with patterns anchored at `root`.
fn compile(root: &Path, file: &Path) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    if let Some(err) = builder.add(file) {
        return Err(ignore_file_error(file, err));
    }
    let rules = builder.build().map_err(|err| ignore_file_error(file, err))?;
    debug!(file = %file.display(), rules = rules.num_ignores() + rules.num_whitelists(), "compiled ignore file");
    Ok(rules)
}

fn ignore_file_error(file: &Path, err: ignore::Error) -> Error {
    Error::IgnoreFile {
        path: file.to_path_buf(),
        reason: err.to_string(),
    }
}
