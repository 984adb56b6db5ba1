//! # flatrec Core
//!
//! Entry engine for flatrec.
//!
//! flatrec stores records as delimiter-terminated text entries in flat
//! files on a small block device. This crate provides:
//! - A file registry mapping logical file kinds to names and width hints
//! - Delimiter navigation with a fixed-width fast path
//! - Entry reads, appends, in-place and shift-rewrite edits, and search
//! - A fault monitor that power-cycles the device after I/O failures
//! - Timestamped archives of the whole registry
//!
//! ## Entry Layout
//!
//! ```text
//! | header \r\n | entry 1 \r\n | entry 2 \r\n | ... |
//! ```
//!
//! Ordinal 0 is the header. Ordinal `k` starts right after the `k`-th
//! delimiter; ordinal `count + 1` is the append position at end of file.
//! Bytes after the last delimiter do not form an entry.
//!
//! ## Example
//!
//! ```rust
//! use flatrec_core::{Config, FileKind, FlatStore, Registry, SimPlatform};
//! use flatrec_storage::InMemoryVolume;
//!
//! let sim = SimPlatform::new(1_700_000_000);
//! let mut store = FlatStore::new(
//!     Box::new(InMemoryVolume::new()),
//!     sim.platform(),
//!     Config::default(),
//!     Registry::default(),
//! )
//! .unwrap();
//! store.begin().unwrap();
//!
//! store.set_headers(FileKind::StoredStrings, "key,value", true).unwrap();
//! store.append(FileKind::StoredStrings, "greeting,hello").unwrap();
//! assert_eq!(store.count_entries(FileKind::StoredStrings).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod config;
mod entries;
mod error;
mod fault;
mod navigation;
mod platform;
mod registry;
mod session;
mod sim;
mod stats;
mod tree;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use entries::Entry;
pub use error::{CoreError, CoreResult};
pub use fault::{FaultMonitor, FaultReport, HealthState};
pub use platform::{
    Clock, LogTelemetry, NoPowerLine, NoWatchdog, Platform, PowerControl, Scheduler, SystemClock,
    Telemetry, ThreadYield, Watchdog,
};
pub use registry::{FileDescriptor, FileKind, Registry};
pub use session::FlatStore;
pub use sim::{
    CountingWatchdog, ManualClock, ManualScheduler, RecordingPower, RecordingTelemetry,
    SimPlatform, Warning,
};
pub use stats::{EngineStats, StatsSnapshot};
pub use tree::{walk, TreeNode};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
