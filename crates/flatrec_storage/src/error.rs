//! Error types for volume operations.

use std::io;
use thiserror::Error;

/// Result type for volume operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during volume operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The path does not exist on the volume.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path already exists on the volume.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A file operation was attempted on a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// A directory operation was attempted on a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A directory could not be removed because it still has children.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The path escapes the volume root or is otherwise malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A seek would move the cursor before the start of the file.
    #[error("invalid seek to {offset} in {path}")]
    InvalidSeek {
        /// The path of the file.
        path: String,
        /// The resulting (negative) offset.
        offset: i64,
    },

    /// The handle has been closed.
    #[error("handle is closed")]
    Closed,

    /// The handle was opened read-only.
    #[error("handle is read-only: {0}")]
    ReadOnly(String),

    /// A device fault injected through a [`crate::FaultPlan`].
    #[error("injected device fault during {op}")]
    Injected {
        /// The operation that failed.
        op: &'static str,
    },
}

impl StorageError {
    /// Returns true if this error means the path does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
