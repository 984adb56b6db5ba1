//! Volume and file handle trait definitions.

use crate::error::StorageResult;
use crate::time::{DateTime, TimeSource};
use std::io::SeekFrom;

/// How a file should be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing file for reading only.
    ReadOnly,
    /// Open for reading and writing, creating the file if it is missing.
    ReadWriteCreate,
    /// Open for reading and writing, creating the file and discarding any contents.
    CreateTruncate,
}

impl OpenMode {
    /// Returns true if handles opened in this mode accept writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// Device-level diagnostic codes captured when a fault is investigated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Last card/device error code.
    pub error_code: u8,
    /// Additional data accompanying the error code.
    pub error_data: u8,
}

/// A single child of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// The child's name (no path separators).
    pub name: String,
    /// Whether the child is a directory.
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, if the volume tracks it.
    pub modified: Option<DateTime>,
}

/// An open file on a [`Volume`].
///
/// Handles carry their own cursor. Reads and writes start at the cursor
/// and advance it by the number of bytes transferred.
///
/// # Invariants
///
/// - `read` returns `Ok(0)` only at end of file (or for an empty buffer)
/// - `write` returns the number of bytes accepted, which may be short
/// - `sync` makes every accepted byte durable
pub trait FileHandle: Send {
    /// Returns the volume path this handle was opened with.
    fn path(&self) -> &str;

    /// Returns true until [`FileHandle::close`] has been called.
    fn is_open(&self) -> bool;

    /// Returns the current cursor position.
    fn position(&self) -> u64;

    /// Returns the current file size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Moves the cursor and returns the new absolute position.
    ///
    /// Seeking past the end of the file is allowed; a later write fills
    /// the gap with zero bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting position would be negative or
    /// the device fails.
    fn seek(&mut self, pos: SeekFrom) -> StorageResult<u64>;

    /// Reads up to `buf.len()` bytes at the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the device fails.
    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize>;

    /// Reads a single byte at the cursor, `None` at end of file.
    ///
    /// # Errors
    ///
    /// Returns an error if the device fails.
    fn read_byte(&mut self) -> StorageResult<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Writes `data` at the cursor and returns the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the device fails or the handle is read-only.
    fn write(&mut self, data: &[u8]) -> StorageResult<usize>;

    /// Writes a single byte at the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the device fails or the handle is read-only.
    fn write_byte(&mut self, byte: u8) -> StorageResult<usize> {
        self.write(&[byte])
    }

    /// Truncates the file to `len` bytes. The cursor is not moved.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is greater than the current size or the
    /// device fails.
    fn truncate(&mut self, len: u64) -> StorageResult<()>;

    /// Flushes all accepted writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Closes the handle. Further calls fail with [`crate::StorageError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if pending data cannot be flushed.
    fn close(&mut self) -> StorageResult<()>;
}

/// A block-storage volume with a conventional file API.
///
/// Implementors own the device. The entry engine opens at most one
/// handle at a time for entry work (plus one source handle while
/// copying), so volumes need not be optimized for many open files.
///
/// # Implementors
///
/// - [`super::InMemoryVolume`] - For testing and simulation
/// - [`super::DirVolume`] - For a host directory
pub trait Volume: Send {
    /// (Re)initializes the device. Called at startup and after a power cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the device does not respond.
    fn init(&mut self) -> StorageResult<()>;

    /// Returns the device's last error codes.
    fn status(&self) -> DeviceStatus {
        DeviceStatus::default()
    }

    /// Opens the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] for a missing file in
    /// [`OpenMode::ReadOnly`], or an error if the device fails.
    fn open(&mut self, path: &str, mode: OpenMode) -> StorageResult<Box<dyn FileHandle>>;

    /// Returns true if a file or directory exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Creates a single directory. The parent must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory already exists or the device fails.
    fn create_dir(&mut self, path: &str) -> StorageResult<()>;

    /// Lists the direct children of the directory at `path`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a directory or the device fails.
    fn list_dir(&self, path: &str) -> StorageResult<Vec<DirEntry>>;

    /// Removes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or the device fails.
    fn remove_file(&mut self, path: &str) -> StorageResult<()>;

    /// Removes the empty directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing or not empty.
    fn remove_dir(&mut self, path: &str) -> StorageResult<()>;

    /// Renames a file, replacing nothing: `to` must not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` is missing, `to` exists, or the device fails.
    fn rename(&mut self, from: &str, to: &str) -> StorageResult<()>;

    /// Returns the free space on the device in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn free_space(&self) -> StorageResult<u64>;

    /// Installs the source used to stamp file modification times.
    fn set_time_source(&mut self, _source: Box<dyn TimeSource>) {}
}

/// Joins a volume directory path and a child name.
#[must_use]
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}
