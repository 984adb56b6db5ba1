//! Fault injection for the in-memory volume.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A device primitive that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Device initialization.
    Init,
    /// Opening a file.
    Open,
    /// Reading bytes.
    Read,
    /// Writing bytes.
    Write,
    /// Moving the cursor.
    Seek,
    /// Flushing to durable storage.
    Sync,
    /// Truncating a file.
    Truncate,
    /// Directory creation, removal, renames.
    Directory,
}

impl FaultKind {
    /// Returns the operation name used in error messages.
    #[must_use]
    pub const fn op_name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Open => "open",
            Self::Read => "read",
            Self::Write => "write",
            Self::Seek => "seek",
            Self::Sync => "sync",
            Self::Truncate => "truncate",
            Self::Directory => "directory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arming {
    /// Fails every call until cleared.
    Always,
    /// Fails the next call only.
    Once,
    /// Lets `n` calls through, then fails once.
    After(u32),
}

#[derive(Debug, Default)]
struct FaultState {
    armed: HashMap<FaultKind, Arming>,
    short_write: Option<usize>,
    triggered: u32,
}

/// A shared set of armed faults.
///
/// Cloning a plan yields another handle to the same state, so a test can
/// keep one clone and arm faults while the engine owns the volume.
///
/// # Example
///
/// ```rust
/// use flatrec_storage::{FaultKind, FaultPlan};
///
/// let plan = FaultPlan::new();
/// plan.fail_once(FaultKind::Sync);
/// assert!(plan.check(FaultKind::Sync));
/// assert!(!plan.check(FaultKind::Sync));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    inner: Arc<Mutex<FaultState>>,
}

impl FaultPlan {
    /// Creates a plan with nothing armed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every `kind` call until [`FaultPlan::clear`] is called.
    pub fn fail(&self, kind: FaultKind) {
        self.inner.lock().armed.insert(kind, Arming::Always);
    }

    /// Fails the next `kind` call only.
    pub fn fail_once(&self, kind: FaultKind) {
        self.inner.lock().armed.insert(kind, Arming::Once);
    }

    /// Lets `calls` calls of `kind` succeed, then fails the next one.
    pub fn fail_after(&self, kind: FaultKind, calls: u32) {
        self.inner.lock().armed.insert(kind, Arming::After(calls));
    }

    /// Caps every write at `max` bytes, simulating a partial write.
    pub fn short_writes(&self, max: usize) {
        self.inner.lock().short_write = Some(max);
    }

    /// Disarms `kind`.
    pub fn clear(&self, kind: FaultKind) {
        self.inner.lock().armed.remove(&kind);
    }

    /// Disarms everything, including short writes.
    pub fn clear_all(&self) {
        let mut state = self.inner.lock();
        state.armed.clear();
        state.short_write = None;
    }

    /// Returns how many injected faults have fired so far.
    #[must_use]
    pub fn triggered(&self) -> u32 {
        self.inner.lock().triggered
    }

    /// Consumes one call of `kind` and reports whether it must fail.
    pub fn check(&self, kind: FaultKind) -> bool {
        let mut state = self.inner.lock();
        let fire = match state.armed.get(&kind).copied() {
            None => false,
            Some(Arming::Always) => true,
            Some(Arming::Once) => {
                state.armed.remove(&kind);
                true
            }
            Some(Arming::After(0)) => {
                state.armed.remove(&kind);
                true
            }
            Some(Arming::After(n)) => {
                state.armed.insert(kind, Arming::After(n - 1));
                false
            }
        };
        if fire {
            state.triggered += 1;
        }
        fire
    }

    /// Returns how many of `len` bytes a write may accept.
    #[must_use]
    pub fn write_limit(&self, len: usize) -> usize {
        match self.inner.lock().short_write {
            Some(max) => len.min(max),
            None => len,
        }
    }
}
