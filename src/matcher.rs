use crate::config::MatchSpec;
use crate::errors::Result;
use colored::Colorize;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::cell::OnceCell;

/// The matching strategy applied to every line of a file.
///
/// Exactly two strategies exist and one is chosen per run from
/// [`MatchSpec::use_regex`]. A `Matcher` borrows its pattern text from the
/// shared `MatchSpec` and is built fresh for every file task, so the lazily compiled
/// regex cache is never shared between threads.
pub enum Matcher<'a> {
    /// Plain substring search.
    Literal { from: &'a str, to: &'a str },
    /// Regular expression search with `$N` expansion in the replacement.
    Regex {
        pattern: &'a str,
        to: &'a str,
        compiled: OnceCell<Regex>,
    },
}

impl<'a> Matcher<'a> {
    /// Selects the strategy for `spec`. Nothing is compiled yet.
    pub fn new(spec: &'a MatchSpec) -> Self {
        if spec.use_regex {
            Matcher::Regex {
                pattern: &spec.from,
                to: &spec.to,
                compiled: OnceCell::new(),
            }
        } else {
            Matcher::Literal {
                from: &spec.from,
                to: &spec.to,
            }
        }
    }

    /// Returns `true` if `line` contains at least one match.
    pub fn is_match(&self, line: &str) -> Result<bool> {
        match self {
            Matcher::Literal { from, .. } => Ok(line.contains(from)),
            Matcher::Regex {
                pattern, compiled, ..
            } => Ok(compile(pattern, compiled)?.is_match(line)),
        }
    }

    /// Replaces every match in `content`.
    pub fn replace<'c>(&self, content: &'c str) -> Result<Cow<'c, str>> {
        match self {
            Matcher::Literal { from, to } => {
                if content.contains(from) {
                    Ok(Cow::Owned(content.replace(from, to)))
                } else {
                    Ok(Cow::Borrowed(content))
                }
            }
            Matcher::Regex {
                pattern,
                to,
                compiled,
            } => Ok(compile(pattern, compiled)?.replace_all(content, *to)),
        }
    }

    /// Returns `line` with every matched span painted for terminal output.
    pub fn highlight<'c>(&self, line: &'c str) -> Result<Cow<'c, str>> {
        match self {
            Matcher::Literal { from, .. } => {
                if line.contains(from) {
                    Ok(Cow::Owned(line.replace(from, &paint(from))))
                } else {
                    Ok(Cow::Borrowed(line))
                }
            }
            Matcher::Regex {
                pattern, compiled, ..
            } => Ok(compile(pattern, compiled)?
                .replace_all(line, |caps: &Captures| paint(&caps[0]))),
        }
    }

    /// `true` once a regex matcher has compiled its pattern.
    #[cfg(test)]
    fn is_compiled(&self) -> bool {
        match self {
            Matcher::Regex { compiled, .. } => compiled.get().is_some(),
            Matcher::Literal { .. } => false,
        }
    }
}

/// Returns the cached regex, compiling `pattern` on first use.
fn compile<'r>(pattern: &str, cell: &'r OnceCell<Regex>) -> Result<&'r Regex> {
    if let Some(re) = cell.get() {
        return Ok(re);
    }
    let re = Regex::new(pattern)?;
    Ok(cell.get_or_init(|| re))
}

fn paint(s: &str) -> String {
    s.red().bold().to_string()
}
