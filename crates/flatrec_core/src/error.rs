//! Error types for flatrec core.

use flatrec_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in engine operations.
///
/// Variants produced by a failing I/O primitive (see
/// [`CoreError::is_io_fault`]) have already been reported to the fault
/// monitor by the time the caller sees them.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage is marked unhealthy; no I/O was attempted.
    #[error("storage not initialized")]
    NotInitialized,

    /// A file could not be opened or created.
    #[error("failed to open {path}: {source}")]
    OpenFailure {
        /// The volume path.
        path: String,
        /// The underlying device error.
        #[source]
        source: StorageError,
    },

    /// The cursor could not be moved.
    #[error("seek failed in {path}: {source}")]
    SeekFailure {
        /// The volume path.
        path: String,
        /// The underlying device error.
        #[source]
        source: StorageError,
    },

    /// Bytes could not be read.
    #[error("read failed in {path}: {source}")]
    ReadFailure {
        /// The volume path.
        path: String,
        /// The underlying device error.
        #[source]
        source: StorageError,
    },

    /// Bytes could not be written, or the device accepted fewer than requested.
    #[error("write failed in {path}: {source}")]
    WriteFailure {
        /// The volume path.
        path: String,
        /// The underlying device error.
        #[source]
        source: StorageError,
    },

    /// A flush to durable storage failed.
    #[error("sync failed in {path}: {source}")]
    SyncFailure {
        /// The volume path.
        path: String,
        /// The underlying device error.
        #[source]
        source: StorageError,
    },

    /// An entry or shifted tail does not fit in the scratch buffer.
    #[error("{needed} bytes exceed scratch capacity of {capacity}")]
    CapacityExceeded {
        /// Bytes that would have to be held.
        needed: u64,
        /// Scratch buffer capacity.
        capacity: usize,
    },

    /// The addressed entry does not exist.
    #[error("entry {ordinal} not found in {file}")]
    EntryNotFound {
        /// The file name.
        file: String,
        /// The requested ordinal.
        ordinal: u32,
    },

    /// A file declared fixed-width is not.
    #[error("{file} is declared fixed-width but entries vary in length")]
    WidthAssumptionViolated {
        /// The file name.
        file: String,
    },

    /// A shift-rewrite put back a different number of bytes than it buffered.
    #[error("consistency fault in {file}: expected {expected} bytes, rewrote {actual}")]
    ConsistencyFault {
        /// The file name.
        file: String,
        /// Tail length that was buffered.
        expected: u64,
        /// Tail length actually rewritten.
        actual: u64,
    },

    /// A byte range extends past the end of the file.
    #[error("{requested} bytes at offset {offset} exceed {file} ({available} bytes available)")]
    OutOfRange {
        /// The file name.
        file: String,
        /// Start offset of the read.
        offset: u64,
        /// Bytes requested.
        requested: usize,
        /// Bytes that could be read.
        available: usize,
    },

    /// A caller-supplied argument is unusable.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// No archive folder is newer than the requested timestamp.
    #[error("no archive found after {after}")]
    ArchiveNotFound {
        /// The requested lower bound.
        after: u64,
    },

    /// The only archive after the requested timestamp is the safety snapshot.
    #[error("closest archive {stamp} is the snapshot just taken")]
    ArchiveIsSnapshot {
        /// The snapshot's timestamp.
        stamp: u64,
    },

    /// The chosen archive is missing one of the registered files.
    #[error("archive {stamp} has no copy of {file}")]
    ArchiveIncomplete {
        /// The archive's timestamp.
        stamp: u64,
        /// The registered file name that is missing.
        file: String,
    },

    /// A directory-level volume operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CoreError {
    /// Creates an open failure.
    pub fn open_failure(path: impl Into<String>, source: StorageError) -> Self {
        Self::OpenFailure {
            path: path.into(),
            source,
        }
    }

    /// Creates a seek failure.
    pub fn seek_failure(path: impl Into<String>, source: StorageError) -> Self {
        Self::SeekFailure {
            path: path.into(),
            source,
        }
    }

    /// Creates a read failure.
    pub fn read_failure(path: impl Into<String>, source: StorageError) -> Self {
        Self::ReadFailure {
            path: path.into(),
            source,
        }
    }

    /// Creates a write failure.
    pub fn write_failure(path: impl Into<String>, source: StorageError) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }

    /// Creates a write failure for a write the device only partly accepted.
    pub fn short_write(path: impl Into<String>, written: usize, expected: usize) -> Self {
        Self::write_failure(
            path,
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("wrote {written} of {expected} bytes"),
            )),
        )
    }

    /// Creates a read failure for a read that ended before the expected length.
    pub fn short_read(path: impl Into<String>, read: usize, expected: usize) -> Self {
        Self::read_failure(
            path,
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("read {read} of {expected} bytes"),
            )),
        )
    }

    /// Creates a sync failure.
    pub fn sync_failure(path: impl Into<String>, source: StorageError) -> Self {
        Self::SyncFailure {
            path: path.into(),
            source,
        }
    }

    /// Creates a capacity exceeded error.
    pub fn capacity_exceeded(needed: u64, capacity: usize) -> Self {
        Self::CapacityExceeded { needed, capacity }
    }

    /// Creates an entry not found error.
    pub fn entry_not_found(file: impl Into<String>, ordinal: u32) -> Self {
        Self::EntryNotFound {
            file: file.into(),
            ordinal,
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true if this error came from a failing I/O primitive.
    #[must_use]
    pub fn is_io_fault(&self) -> bool {
        matches!(
            self,
            Self::OpenFailure { .. }
                | Self::SeekFailure { .. }
                | Self::ReadFailure { .. }
                | Self::WriteFailure { .. }
                | Self::SyncFailure { .. }
        )
    }

    /// Returns the volume path an I/O fault occurred on.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::OpenFailure { path, .. }
            | Self::SeekFailure { path, .. }
            | Self::ReadFailure { path, .. }
            | Self::WriteFailure { path, .. }
            | Self::SyncFailure { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Returns true if the target simply does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntryNotFound { .. } | Self::ArchiveNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_faults_are_classified() {
        let err = CoreError::sync_failure("a.csv", StorageError::Injected { op: "sync" });
        assert!(err.is_io_fault());
        assert!(CoreError::short_write("a.csv", 1, 5).is_io_fault());
        assert!(!CoreError::NotInitialized.is_io_fault());
        assert!(!CoreError::capacity_exceeded(10, 4).is_io_fault());
        assert!(!CoreError::Storage(StorageError::Closed).is_io_fault());
    }

    #[test]
    fn not_found_is_local() {
        let err = CoreError::entry_not_found("a.csv", 4);
        assert!(err.is_not_found());
        assert!(!err.is_io_fault());
        assert_eq!(err.to_string(), "entry 4 not found in a.csv");
    }

    #[test]
    fn archive_and_width_messages() {
        let err = CoreError::ArchiveIncomplete {
            stamp: 1_700_000_005,
            file: "strings.csv".into(),
        };
        assert_eq!(err.to_string(), "archive 1700000005 has no copy of strings.csv");
        assert!(!err.is_io_fault());

        let err = CoreError::WidthAssumptionViolated {
            file: "userTable.csv".into(),
        };
        assert!(err.to_string().contains("userTable.csv"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn short_write_message() {
        let err = CoreError::short_write("a.csv", 3, 8);
        assert!(err.to_string().contains("wrote 3 of 8 bytes"));
    }
}
