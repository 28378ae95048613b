//! Error types for the girder-core crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the interpreter host.
///
/// Only [`Error::Bootstrap`] is fatal to an interpreter; every other
/// variant is logged by the component that raised it and handed back to
/// the caller, which decides whether to care.
#[derive(Debug, Error)]
pub enum Error {
    /// `start` was called on an interpreter that is not in the Created state,
    /// or an extension was attached after start.
    #[error("Interpreter {id} is already running")]
    AlreadyRunning { id: usize },

    /// Unknown interpreter id/name, store key or file.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Message or mailbox indexing out of bounds.
    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A message buffer could not be allocated.
    #[error("Out of memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },

    /// Virtual or raw filesystem read/write failure.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A virtual path escaped its root or was otherwise malformed.
    #[error("Invalid virtual path: {0}")]
    InvalidPath(String),

    /// The bootstrap program failed to load or execute.
    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    /// An interpreter thread panicked instead of returning.
    #[error("Interpreter {0} panicked")]
    Panicked(usize),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
