use crate::config::{FinderOptions, MatchSpec, ProcessingConfig};
use crate::errors::Result;
use crate::finder::{Finder, RunStats};
use crate::replacer::Replacer;
use crate::report::Reporter;
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, Command, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub const CMD: &str = "kaeru";

/// Replace text across a directory tree, skipping ignored files.
///
/// Every file below the current directory that is not excluded by the built-in
/// rules, the root `.gitignore` or `-ignore-file` is scanned for FROM. Matching
/// lines are printed and the file is rewritten with FROM replaced by TO.
#[derive(Parser, Debug)]
#[command(
    name = CMD,
    version,
    disable_version_flag = true,
    override_usage = "kaeru [OPTIONS] FROM TO",
    after_help = "EXAMPLES:
  kaeru wolrd world                               # Fix a typo everywhere
  kaeru -name '*.rs' OldName NewName              # Only in Rust files
  kaeru -regexp '(\\d{4})/(\\d{2})/(\\d{2})' '$2/$3/$1'  # Reorder dates
  kaeru -dry-run -ignore-file .kaeruignore foo bar  # Preview with extra ignores"
)]
pub struct Args {
    /// Only process files whose name matches this glob pattern.
    #[arg(long = "name", value_name = "PATTERN")]
    pub name: Option<String>,

    /// Treat FROM as a regular expression. TO may use `$1`, `$2`, ...
    #[arg(long)]
    pub regexp: bool,

    /// Report matches without modifying any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not print matched lines.
    #[arg(long)]
    pub quiet: bool,

    /// Additional ignore rules (gitignore syntax), applied after the root `.gitignore`.
    #[arg(long, value_name = "PATH")]
    pub ignore_file: Option<PathBuf>,

    /// Root of the tree to process.
    #[arg(long, value_name = "PATH", default_value = ".")]
    pub dir: PathBuf,

    /// Number of worker threads processing files. Defaults to the number of logical CPUs.
    #[arg(long, value_name = "N", env = "KAERU_WORKERS")]
    pub workers: Option<usize>,

    /// Text (or pattern) to search for.
    pub from: String,

    /// Replacement text.
    pub to: String,
}

impl Args {
    /// The clap command with Go-style `-v` in place of clap's `-V`.
    pub fn command_with_version() -> Command {
        Self::command().arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .action(ArgAction::Version)
                .help("Print version number"),
        )
    }

    /// Parses a full argument list, program name first.
    pub fn try_parse_args<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut matches = Self::command_with_version().try_get_matches_from(normalize_args(args))?;
        Self::from_arg_matches_mut(&mut matches)
    }

    fn match_spec(&self) -> MatchSpec {
        MatchSpec {
            from: self.from.clone(),
            to: self.to.clone(),
            use_regex: self.regexp,
        }
    }

    fn finder_options(&self) -> FinderOptions {
        FinderOptions {
            root: self.dir.clone(),
            name_pattern: self.name.clone(),
            ignore_file: self.ignore_file.clone(),
            workers: self.workers,
        }
    }
}

/// Long options that may be written with a single dash, as in `-dry-run`.
const LONG_FLAGS: &[&str] = &[
    "name",
    "regexp",
    "dry-run",
    "quiet",
    "ignore-file",
    "dir",
    "workers",
    "version",
    "help",
];

/// Long options whose value may follow as the next argument.
const VALUE_FLAGS: &[&str] = &["name", "ignore-file", "dir", "workers"];

/// Rewrites single-dash long flags (`-name`) to their double-dash form.
///
/// Flag parsing stops at the first positional argument: a `--` is inserted in
/// front of it, so `kaeru foo -bar` replaces `foo` with `-bar`. Anything after
/// a bare `--` is left alone.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut normalized: Vec<OsString> = args.next().into_iter().collect();
    let mut expects_value = false;

    while let Some(arg) = args.next() {
        if expects_value {
            expects_value = false;
            normalized.push(arg);
            continue;
        }
        let s = arg.to_str().unwrap_or_default();
        if s == "--" {
            normalized.push(arg);
            normalized.extend(args.by_ref());
            break;
        }
        if s.len() < 2 || !s.starts_with('-') {
            normalized.push(OsString::from("--"));
            normalized.push(arg);
            normalized.extend(args.by_ref());
            break;
        }

        let single_dash = !s.starts_with("--");
        let body = s.trim_start_matches('-');
        let (flag, inline_value) = match body.split_once('=') {
            Some((flag, _)) => (flag, true),
            None => (body, false),
        };
        expects_value = VALUE_FLAGS.contains(&flag) && !inline_value;
        if single_dash && LONG_FLAGS.contains(&flag) {
            normalized.push(OsString::from(format!("-{s}")));
        } else {
            normalized.push(arg);
        }
    }
    normalized
}

/// Parses `args` (including the program name), runs, and returns the exit code.
pub fn run<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let args = match Args::try_parse_args(args) {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            // Nowhere better to report a failure to print usage.
            let _ = e.print();
            return code;
        }
    };

    match execute(&args, Arc::new(Reporter::stdio())) {
        Ok(stats) => {
            info!(
                files = stats.dispatched,
                rewritten = stats.rewritten,
                would_rewrite = stats.would_rewrite,
                unchanged = stats.unchanged,
                skipped = stats.skipped,
                failed = stats.failed,
                "done"
            );
            0
        }
        Err(e) => {
            eprintln!("{CMD}: {e}");
            1
        }
    }
}

/// Validates everything up front, then walks the tree.
pub fn execute(args: &Args, reporter: Arc<Reporter>) -> Result<RunStats> {
    let spec = args.match_spec();
    spec.validate()?;
    let options = args.finder_options();
    options.validate()?;

    let config = ProcessingConfig {
        spec,
        quiet: args.quiet,
        dry_run: args.dry_run,
        reporter,
    };
    Finder::new(Replacer::new(config), options).run()
}
