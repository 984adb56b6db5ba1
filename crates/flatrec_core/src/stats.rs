//! Engine counters.
//!
//! The counters record which code path served each call, so tests can
//! check that the sequential-read cache, the fixed-width fast path, and
//! the in-place rewrite actually ran.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = store.stats();
//! println!("Sequential reads: {}", stats.sequential_reads);
//! println!("Shift rewrites: {}", stats.shift_rewrites);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine counters.
///
/// All counters are monotonically increasing for the life of the store.
#[derive(Debug, Default)]
pub struct EngineStats {
    entries_read: AtomicU64,
    sequential_reads: AtomicU64,
    fixed_width_hits: AtomicU64,
    width_violations: AtomicU64,
    in_place_rewrites: AtomicU64,
    shift_rewrites: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    syncs: AtomicU64,
    skipped_syncs: AtomicU64,
    io_faults: AtomicU64,
    consistency_faults: AtomicU64,
}

impl EngineStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_entry_read(&self, sequential: bool) {
        self.entries_read.fetch_add(1, Ordering::Relaxed);
        if sequential {
            self.sequential_reads.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_fixed_width_hit(&self) {
        self.fixed_width_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_width_violation(&self) {
        self.width_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rewrite(&self, in_place: bool) {
        if in_place {
            self.in_place_rewrites.fetch_add(1, Ordering::Relaxed);
        } else {
            self.shift_rewrites.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_sync(&self, skipped: bool) {
        if skipped {
            self.skipped_syncs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.syncs.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_io_fault(&self) {
        self.io_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consistency_fault(&self) {
        self.consistency_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            entries_read: self.entries_read.load(Ordering::Relaxed),
            sequential_reads: self.sequential_reads.load(Ordering::Relaxed),
            fixed_width_hits: self.fixed_width_hits.load(Ordering::Relaxed),
            width_violations: self.width_violations.load(Ordering::Relaxed),
            in_place_rewrites: self.in_place_rewrites.load(Ordering::Relaxed),
            shift_rewrites: self.shift_rewrites.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            skipped_syncs: self.skipped_syncs.load(Ordering::Relaxed),
            io_faults: self.io_faults.load(Ordering::Relaxed),
            consistency_faults: self.consistency_faults.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Entries returned by entry reads.
    pub entries_read: u64,
    /// Entry reads served by the sequential cache.
    pub sequential_reads: u64,
    /// Ordinal lookups resolved by fixed-width arithmetic.
    pub fixed_width_hits: u64,
    /// Fixed-width sanity checks that failed.
    pub width_violations: u64,
    /// Equal-length rewrites done in place.
    pub in_place_rewrites: u64,
    /// Rewrites that shifted the file tail.
    pub shift_rewrites: u64,
    /// Bytes read from the device.
    pub bytes_read: u64,
    /// Bytes written to the device.
    pub bytes_written: u64,
    /// Syncs issued to the device.
    pub syncs: u64,
    /// Syncs skipped because auto-sync was off.
    pub skipped_syncs: u64,
    /// I/O failures escalated to the fault monitor.
    pub io_faults: u64,
    /// Shift-rewrites whose final size did not add up.
    pub consistency_faults: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_start_at_zero() {
        assert_eq!(EngineStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_entry_reads() {
        let stats = EngineStats::new();
        stats.record_entry_read(false);
        stats.record_entry_read(true);
        let snap = stats.snapshot();
        assert_eq!(snap.entries_read, 2);
        assert_eq!(snap.sequential_reads, 1);
    }

    #[test]
    fn record_rewrites_and_syncs() {
        let stats = EngineStats::new();
        stats.record_rewrite(true);
        stats.record_rewrite(false);
        stats.record_rewrite(false);
        stats.record_sync(false);
        stats.record_sync(true);
        let snap = stats.snapshot();
        assert_eq!(snap.in_place_rewrites, 1);
        assert_eq!(snap.shift_rewrites, 2);
        assert_eq!(snap.syncs, 1);
        assert_eq!(snap.skipped_syncs, 1);
    }

    #[test]
    fn record_bytes() {
        let stats = EngineStats::new();
        stats.record_read(10);
        stats.record_write(4);
        stats.record_write(6);
        let snap = stats.snapshot();
        assert_eq!(snap.bytes_read, 10);
        assert_eq!(snap.bytes_written, 10);
    }
}
