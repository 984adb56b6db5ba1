//! # flatrec Storage
//!
//! Volume abstraction for flatrec.
//!
//! This crate is the boundary between the entry engine and whatever
//! block device actually holds the bytes. A [`Volume`] hands out
//! [`FileHandle`]s with a conventional cursor API (seek, read, write,
//! truncate, sync) and exposes the few directory operations the archive
//! manager needs.
//!
//! ## Design Principles
//!
//! - Volumes are plain byte stores with a cursor
//! - No knowledge of entries, delimiters, or the file registry
//! - Paths are `/`-separated and relative to the volume root (`""` is the root)
//! - Every failure is reported as a [`StorageError`], never a panic
//!
//! ## Available Volumes
//!
//! - [`InMemoryVolume`] - For tests and simulation, with fault injection via [`FaultPlan`]
//! - [`DirVolume`] - Backed by a host directory using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use flatrec_storage::{InMemoryVolume, OpenMode, Volume};
//! use std::io::SeekFrom;
//!
//! let mut volume = InMemoryVolume::new();
//! let mut handle = volume.open("log.csv", OpenMode::ReadWriteCreate).unwrap();
//! handle.write(b"a,1\r\n").unwrap();
//! handle.seek(SeekFrom::Start(0)).unwrap();
//! let mut buf = [0u8; 3];
//! assert_eq!(handle.read(&mut buf).unwrap(), 3);
//! assert_eq!(&buf, b"a,1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dir;
mod error;
mod fault;
mod memory;
mod time;
mod volume;

pub use dir::DirVolume;
pub use error::{StorageError, StorageResult};
pub use fault::{FaultKind, FaultPlan};
pub use memory::InMemoryVolume;
pub use time::{DateTime, TimeSource};
pub use volume::{join_path, DeviceStatus, DirEntry, FileHandle, OpenMode, Volume};
