use crate::config::ProcessingConfig;
use crate::errors::{Error, Result};
use crate::finder::Process;
use crate::matcher::Matcher;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Core engine for finding and replacing text in a single file.
///
/// A `Replacer` holds the run's shared, read-only [`ProcessingConfig`]. Each call
/// to [`Replacer::process_file`] builds its own [`Matcher`], so any number of
/// files can be processed concurrently through the same `Replacer`.
pub struct Replacer {
    config: ProcessingConfig,
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// No line matched, or replacing left the content as it was.
    Unchanged,
    /// Lines matched and the file was rewritten.
    Rewritten { matches: usize },
    /// Lines matched but this is a dry run.
    WouldRewrite { matches: usize },
    /// The file could not be opened or is not text.
    Skipped,
    /// Rewriting failed; the error went to the error sink.
    Failed,
}

/// The result of scanning a file line by line.
struct Scan {
    lines: Vec<String>,
    matches: usize,
    ends_with_newline: bool,
}

impl Replacer {
    /// Creates a new `Replacer`.
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// Processes a single file.
    ///
    /// The process is as follows:
    /// 1. Every line is checked against the matcher and matching lines are reported.
    /// 2. If anything matched and this is not a dry run, the whole content is
    ///    replaced, its trailing newline is restored to what the file had, and the
    ///    result is written back with the original permissions.
    ///
    /// Matching is per line but replacement runs over the whole content, so `^`
    /// and `$` anchor at line boundaries in step 1 and at content boundaries in
    /// step 2. A file whose reported lines come out of step 2 byte-identical is
    /// left untouched and counted as [`FileOutcome::Unchanged`].
    ///
    /// A file that cannot be opened is skipped silently. Failures after that are
    /// written to the error sink and never propagate.
    pub fn process_file(&self, path: &Path) -> FileOutcome {
        match self.try_process(path) {
            Ok(outcome) => {
                debug!(path = %path.display(), ?outcome, "processed");
                outcome
            }
            Err(e) => {
                self.config
                    .reporter
                    .err(format_args!("{}", Error::processing(path, e)));
                FileOutcome::Failed
            }
        }
    }

    fn try_process(&self, path: &Path) -> Result<FileOutcome> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                debug!(path = %path.display(), "skipping unreadable file: {e}");
                return Ok(FileOutcome::Skipped);
            }
        };

        let matcher = Matcher::new(&self.config.spec);
        let Some(scan) = self.scan(&file, path, &matcher)? else {
            debug!(path = %path.display(), "skipping non UTF-8 file");
            return Ok(FileOutcome::Skipped);
        };
        drop(file);

        if scan.matches == 0 {
            return Ok(FileOutcome::Unchanged);
        }
        if self.config.dry_run {
            return Ok(FileOutcome::WouldRewrite {
                matches: scan.matches,
            });
        }

        let mut content = scan.lines.join("\n");
        if scan.ends_with_newline {
            content.push('\n');
        }
        let replaced = matcher.replace(&content)?.into_owned();
        let replaced = restore_trailing_newline(replaced, scan.ends_with_newline);
        if replaced == content {
            debug!(path = %path.display(), "replacement left content as is");
            return Ok(FileOutcome::Unchanged);
        }

        write_preserving_permissions(path, &replaced)?;
        Ok(FileOutcome::Rewritten {
            matches: scan.matches,
        })
    }

    /// Reads `file` line by line, reporting matches in line order.
    ///
    /// Returns `None` if a line is not valid UTF-8.
    fn scan(&self, file: &File, path: &Path, matcher: &Matcher<'_>) -> Result<Option<Scan>> {
        let mut reader = BufReader::new(file);
        let mut lines = Vec::new();
        let mut matches = 0;
        let mut buf = Vec::new();

        for line_number in 1usize.. {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            let Ok(line) = String::from_utf8(std::mem::take(&mut buf)) else {
                return Ok(None);
            };

            if matcher.is_match(&line)? {
                matches += 1;
                if !self.config.quiet {
                    self.config.reporter.out(format_args!(
                        "{}:{}: {}",
                        path.display(),
                        line_number,
                        matcher.highlight(&line)?
                    ));
                }
            }
            lines.push(line);
        }

        Ok(Some(Scan {
            lines,
            matches,
            ends_with_newline: ends_with_newline(file)?,
        }))
    }
}

impl Process for Replacer {
    fn process(&self, path: &Path) -> FileOutcome {
        self.process_file(path)
    }
}

/// Probes the final byte of `file`.
fn ends_with_newline(mut file: &File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Makes `content` end in a newline exactly when the original file did.
fn restore_trailing_newline(mut content: String, ends_with_newline: bool) -> String {
    if ends_with_newline {
        if !content.ends_with('\n') {
            content.push('\n');
        }
    } else {
        while content.ends_with('\n') {
            content.pop();
        }
    }
    content
}

/// Replaces the file at `path` with `content`, keeping its permission bits.
///
/// The new content goes to a temporary file next to the target which is then
/// renamed over it. A symlink is followed and its target rewritten.
///
/// The rename needs write access to the containing directory, gives the file a
/// new inode (hard links keep the old content) and leaves it owned by the
/// current user and group. A writable file in a read-only directory therefore
/// fails as a per-file error.
fn write_preserving_permissions(path: &Path, content: &str) -> Result<()> {
    let target = resolve_symlink(path)?;
    let perms = fs::metadata(&target)?.permissions();

    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(content.as_bytes())?;
    fs::set_permissions(temp_file.path(), perms)?;
    temp_file.persist(&target)?;
    Ok(())
}

fn resolve_symlink(path: &Path) -> Result<PathBuf> {
    if fs::symlink_metadata(path)?.file_type().is_symlink() {
        Ok(fs::canonicalize(path)?)
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchSpec;
    use crate::report::{Reporter, SharedBuf};
    use std::io;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        replacer: Replacer,
        out: SharedBuf,
        err: SharedBuf,
    }

    fn harness(from: &str, to: &str, use_regex: bool, quiet: bool, dry_run: bool) -> Harness {
        let out = SharedBuf::default();
        let err = SharedBuf::default();
        let config = ProcessingConfig {
            spec: MatchSpec {
                from: from.into(),
                to: to.into(),
                use_regex,
            },
            quiet,
            dry_run,
            reporter: Arc::new(Reporter::new(out.clone(), err.clone())),
        };
        Harness {
            replacer: Replacer::new(config),
            out,
            err,
        }
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_literal_replacement() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "dummy.log", "Hello, wolrd");
        let h = harness("wolrd", "world", false, true, false);

        let outcome = h.replacer.process_file(&path);

        assert_eq!(outcome, FileOutcome::Rewritten { matches: 1 });
        assert_eq!(fs::read_to_string(&path).unwrap(), "Hello, world");
        assert!(h.out.contents().is_empty());
    }

    #[test]
    fn test_regex_replacement_with_back_references() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "dummy.log", "Hello, world from 2022/01/31");
        let h = harness(r"(\d{4})/(\d{2})/(\d{2})", "$2/$3/$1", true, true, false);

        h.replacer.process_file(&path);

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Hello, world from 01/31/2022"
        );
    }

    #[test]
    fn test_trailing_newline_is_preserved() {
        let dir = TempDir::new().unwrap();
        let with = write_file(&dir, "with.txt", "foo\nbar\n");
        let without = write_file(&dir, "without.txt", "foo\nbar");
        let h = harness("bar", "baz", false, true, false);

        h.replacer.process_file(&with);
        h.replacer.process_file(&without);

        assert_eq!(fs::read_to_string(&with).unwrap(), "foo\nbaz\n");
        assert_eq!(fs::read_to_string(&without).unwrap(), "foo\nbaz");
    }

    #[test]
    fn test_blank_lines_and_crlf_survive_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "crlf.txt", "one\r\n\r\ntwo\r\n\n\n");
        let h = harness("two", "2", false, true, false);

        h.replacer.process_file(&path);

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\r\n\r\n2\r\n\n\n");
    }

    #[test]
    fn test_replacement_newline_is_normalized() {
        let dir = TempDir::new().unwrap();
        let added = write_file(&dir, "added.txt", "a\nend");
        let kept = write_file(&dir, "kept.txt", "a\nend\n");

        harness("end", "end\n", false, true, false)
            .replacer
            .process_file(&added);
        harness(r"end\n?", "END", true, true, false)
            .replacer
            .process_file(&kept);

        assert_eq!(fs::read_to_string(&added).unwrap(), "a\nend");
        assert_eq!(fs::read_to_string(&kept).unwrap(), "a\nEND\n");
    }

    #[test]
    fn test_several_added_newlines_are_all_dropped() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "tail.txt", "a\nend");
        let h = harness("end", "END\n\n", false, true, false);

        let outcome = h.replacer.process_file(&path);

        assert_eq!(outcome, FileOutcome::Rewritten { matches: 1 });
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nEND");
    }

    #[test]
    fn test_line_anchors_that_replace_nothing_leave_file_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "anchored.txt", "foo\nbar\n");
        let h = harness("^foo$", "baz", true, false, false);

        let outcome = h.replacer.process_file(&path);

        assert_eq!(outcome, FileOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), "foo\nbar\n");
        assert!(h.out.contents().contains(":1: "));
    }

    #[test]
    fn test_reports_matches_in_line_order() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "notes.txt", "TODO one\nskip\nTODO two\n");
        let h = harness("TODO", "DONE", false, false, false);

        h.replacer.process_file(&path);

        let out = h.out.contents();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(&format!("{}:1: ", path.display())));
        assert!(lines[0].contains("one"));
        assert!(lines[1].starts_with(&format!("{}:3: ", path.display())));
        assert!(lines[1].contains("two"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let original = "keep foo\nfoo again";
        let path = write_file(&dir, "a.txt", original);
        let h = harness("foo", "bar", false, false, true);

        let outcome = h.replacer.process_file(&path);

        assert_eq!(outcome, FileOutcome::WouldRewrite { matches: 2 });
        assert_eq!(fs::read(&path).unwrap(), original.as_bytes());
        assert_eq!(h.out.contents().lines().count(), 2);
    }

    #[test]
    fn test_unmatched_file_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "nothing here\n");
        let h = harness("foo", "bar", false, false, false);

        assert_eq!(h.replacer.process_file(&path), FileOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), "nothing here\n");
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "foo foo\n");
        let h = harness("foo", "bar", false, true, false);

        assert_eq!(
            h.replacer.process_file(&path),
            FileOutcome::Rewritten { matches: 1 }
        );
        assert_eq!(h.replacer.process_file(&path), FileOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), "bar bar\n");
    }

    #[test]
    fn test_missing_and_binary_files_are_skipped_silently() {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("blob.bin");
        fs::write(&binary, [b'f', b'o', b'o', 0xff, 0xfe, b'\n']).unwrap();
        let h = harness("foo", "bar", false, false, false);

        assert_eq!(
            h.replacer.process_file(&dir.path().join("gone.txt")),
            FileOutcome::Skipped
        );
        assert_eq!(h.replacer.process_file(&binary), FileOutcome::Skipped);
        assert_eq!(fs::read(&binary).unwrap(), [b'f', b'o', b'o', 0xff, 0xfe, b'\n']);
        assert!(h.out.contents().is_empty());
        assert!(h.err.contents().is_empty());
    }

    #[test]
    fn test_invalid_regex_is_reported_per_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "text\n");
        let h = harness("(", "x", true, false, false);

        assert_eq!(h.replacer.process_file(&path), FileOutcome::Failed);
        assert!(h.err.contents().contains("a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_are_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "run.sh", "#!/bin/sh\necho foo\n");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o750)).unwrap();
        let h = harness("foo", "bar", false, true, false);

        h.replacer.process_file(&path);

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o750);
        assert_eq!(fs::read_to_string(&path).unwrap(), "#!/bin/sh\necho bar\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_target_is_rewritten() {
        let dir = TempDir::new().unwrap();
        let target = write_file(&dir, "real.txt", "foo\n");
        let link = dir.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let h = harness("foo", "bar", false, true, false);

        h.replacer.process_file(&link);

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&target).unwrap(), "bar\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_detaches_hard_links() {
        use std::os::unix::fs::MetadataExt;

        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "foo\n");
        let linked = dir.path().join("b.txt");
        fs::hard_link(&path, &linked).unwrap();
        let before = fs::metadata(&path).unwrap().ino();
        let h = harness("foo", "bar", false, true, false);

        h.replacer.process_file(&path);

        assert_ne!(fs::metadata(&path).unwrap().ino(), before);
        assert_eq!(fs::read_to_string(&path).unwrap(), "bar\n");
        assert_eq!(fs::read_to_string(&linked).unwrap(), "foo\n");
    }

    #[test]
    fn test_reporter_accepts_plain_sinks() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "foo\n");
        let config = ProcessingConfig {
            spec: MatchSpec {
                from: "foo".into(),
                to: "bar".into(),
                use_regex: false,
            },
            quiet: false,
            dry_run: false,
            reporter: Arc::new(Reporter::new(io::sink(), io::sink())),
        };

        let outcome = Replacer::new(config).process_file(&path);
        assert_eq!(outcome, FileOutcome::Rewritten { matches: 1 });
    }
}
