//! `kaeru` is a library for concurrent find-and-replace across a directory tree.
//!
//! It provides the core logic for the `kaeru` command-line tool but can also be used
//! as a standalone library. The main components are:
//!
//! - `Matcher`: the literal or regex strategy used to match, replace and highlight.
//! - `Replacer`: scans one file, reports matching lines and rewrites it in place.
//! - `IgnoreRules`: built-in directory names plus `.gitignore`-style rule files.
//! - `Finder`: walks the tree, prunes ignored paths and runs one task per file.
//!
//! The walk is sequential; the per-file work is spread across a Rayon thread pool.

pub mod cli;
pub mod config;
pub mod errors;
pub mod finder;
pub mod ignore_rules;
pub mod matcher;
pub mod replacer;
pub mod report;

// Re-export main types for easier access by library users.
pub use config::{FinderOptions, MatchSpec, ProcessingConfig};
pub use errors::{Error, Result};
pub use finder::{Finder, Process, RunStats};
pub use ignore_rules::IgnoreRules;
pub use matcher::Matcher;
pub use replacer::{FileOutcome, Replacer};
pub use report::Reporter;
