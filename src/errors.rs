use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all operations in `kaeru`.
///
/// Fatal conditions (bad arguments, broken ignore files, traversal failures) travel
/// up to the binary and turn into exit code 1. Per-file failures are wrapped in
/// [`Error::Processing`] and only ever written to the error sink.
#[derive(Error, Debug)]
pub enum Error {
    /// An error related to file system I/O.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that occurred during regex compilation.
    #[error("Pattern compilation failed: {0}")]
    Regex(#[from] regex::Error),

    /// The `-name` filter is not a valid glob.
    #[error("Invalid name pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// Invalid command-line input detected before any I/O.
    #[error("{0}")]
    Argument(String),

    /// An ignore file is missing or could not be compiled.
    #[error("Ignore file error for {path}: {reason}")]
    IgnoreFile { path: PathBuf, reason: String },

    /// A directory could not be read while walking the tree.
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// An error that occurred during the processing of a single file.
    #[error("File processing failed for {path}: {source}")]
    Processing {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An error that occurred while building the Rayon thread pool.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// An error related to persisting a temporary file.
    #[error("Tempfile error: {0}")]
    TempFile(#[from] tempfile::PersistError),
}

/// A convenient type alias for `Result<T, kaeru::errors::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps any error as a failure scoped to `path`.
    pub fn processing(path: impl Into<PathBuf>, source: impl Into<Error>) -> Self {
        Error::Processing {
            path: path.into(),
            source: Box::new(source.into()),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Argument(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Argument(s.to_string())
    }
}
