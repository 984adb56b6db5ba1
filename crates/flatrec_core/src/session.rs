//! The store context and file session management.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::fault::{FaultMonitor, HealthState};
use crate::platform::Platform;
use crate::registry::{FileKind, Registry};
use crate::stats::{EngineStats, StatsSnapshot};
use flatrec_storage::{FileHandle, OpenMode, StorageError, Volume};
use std::fmt;
use std::io::SeekFrom;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Position of the last entry returned by an entry read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadCursor {
    pub(crate) kind: FileKind,
    pub(crate) ordinal: u32,
    pub(crate) end: u64,
}

/// The flat-file record engine.
///
/// A `FlatStore` owns the volume, the single open file handle, the
/// scratch buffer, and the fault monitor. Every operation takes
/// `&mut self`, so no call can run while another is in flight and no
/// call can observe another's scratch contents.
///
/// # Lifecycle
///
/// ```rust
/// use flatrec_core::{Config, FileKind, FlatStore, Platform, Registry};
/// use flatrec_storage::InMemoryVolume;
///
/// let mut store = FlatStore::new(
///     Box::new(InMemoryVolume::new()),
///     Platform::host(),
///     Config::default(),
///     Registry::default(),
/// )
/// .unwrap();
/// store.begin().unwrap();
///
/// store.set_headers(FileKind::UserTable, "id,name", true).unwrap();
/// store.append(FileKind::UserTable, "1,ada").unwrap();
/// let entry = store.get_entry(FileKind::UserTable, 1).unwrap().unwrap();
/// assert_eq!(entry.text, "1,ada");
/// ```
///
/// # Faults
///
/// A failing open, seek, read, write, truncate, or sync is reported to
/// the fault monitor once, at the wrapper that saw it, and the open
/// handle is dropped. Until the monitor recovers the device, calls fail
/// with [`CoreError::NotInitialized`] without touching the volume.
pub struct FlatStore {
    pub(crate) volume: Box<dyn Volume>,
    pub(crate) platform: Platform,
    pub(crate) config: Config,
    pub(crate) registry: Registry,
    pub(crate) handle: Option<Box<dyn FileHandle>>,
    pub(crate) open_kind: Option<FileKind>,
    pub(crate) scratch: Vec<u8>,
    pub(crate) cursor: Option<ReadCursor>,
    pub(crate) auto_sync: bool,
    pub(crate) monitor: FaultMonitor,
    pub(crate) stats: EngineStats,
}

impl fmt::Debug for FlatStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatStore")
            .field("open_kind", &self.open_kind)
            .field("health", &self.monitor.state())
            .field("auto_sync", &self.auto_sync)
            .field("scratch_capacity", &self.scratch.len())
            .finish_non_exhaustive()
    }
}

impl FlatStore {
    /// Creates a store over `volume`. Call [`FlatStore::begin`] before use.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the config or registry
    /// fails validation.
    pub fn new(
        mut volume: Box<dyn Volume>,
        platform: Platform,
        config: Config,
        registry: Registry,
    ) -> CoreResult<Self> {
        config.validate()?;
        registry.validate()?;
        volume.set_time_source(platform.time_source());

        Ok(Self {
            volume,
            scratch: vec![0; config.scratch_capacity],
            auto_sync: config.auto_sync,
            monitor: FaultMonitor::new(config.recovery_cooldown, config.power_cycle_delay),
            platform,
            config,
            registry,
            handle: None,
            open_kind: None,
            cursor: None,
            stats: EngineStats::new(),
        })
    }

    /// Initializes the device.
    ///
    /// The device counts as healthy once it initializes and reports
    /// non-zero free space. Otherwise the fault monitor takes over and,
    /// since no attempt has been made yet, tries a power-cycle recovery
    /// straight away.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] if the device is still
    /// unhealthy afterwards.
    pub fn begin(&mut self) -> CoreResult<()> {
        info!("initializing storage");
        let free = match self.volume.init() {
            Ok(()) => self.volume.free_space().unwrap_or(0),
            Err(err) => {
                warn!(error = %err, "storage init failed");
                0
            }
        };

        if free > 0 {
            self.monitor.mark_healthy();
            info!(free_kb = free / 1024, "storage ready");
            return Ok(());
        }

        self.monitor
            .on_fault(self.volume.as_mut(), &self.platform, "none");
        if self.monitor.is_healthy() {
            Ok(())
        } else {
            Err(CoreError::NotInitialized)
        }
    }

    /// Attempts recovery if the device is unhealthy and the cooldown allows.
    ///
    /// Returns true if the device is healthy afterwards.
    pub fn recover(&mut self) -> bool {
        let file = self.current_path();
        self.monitor
            .admit(self.volume.as_mut(), &self.platform, &file)
    }

    /// Returns the fault monitor's state.
    #[must_use]
    pub fn health(&self) -> HealthState {
        self.monitor.state()
    }

    /// Returns true if the device is accepting I/O.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.monitor.is_healthy()
    }

    /// Returns the fault monitor.
    #[must_use]
    pub fn monitor(&self) -> &FaultMonitor {
        &self.monitor
    }

    /// Returns a snapshot of the engine counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the file registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the underlying volume.
    #[must_use]
    pub fn volume(&self) -> &dyn Volume {
        self.volume.as_ref()
    }

    /// Returns the logical file currently open, if any.
    #[must_use]
    pub fn open_kind(&self) -> Option<FileKind> {
        self.open_kind
    }

    /// Returns whether writes are synced automatically.
    #[must_use]
    pub fn auto_sync(&self) -> bool {
        self.auto_sync
    }

    /// Enables or disables sync after every write.
    pub fn set_auto_sync(&mut self, enabled: bool) {
        self.auto_sync = enabled;
    }

    /// Runs `edit` with auto-sync disabled, then syncs once.
    ///
    /// The final sync covers the file open when `edit` returns; files
    /// closed along the way were flushed by their close.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or the final sync's error.
    pub fn with_bulk_edit<R>(
        &mut self,
        edit: impl FnOnce(&mut Self) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let previous = self.auto_sync;
        self.auto_sync = false;
        let result = edit(self);
        self.auto_sync = previous;

        let value = result?;
        if previous && self.handle.is_some() {
            self.sync_current()?;
        }
        Ok(value)
    }

    /// Opens `kind` as the current file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] if storage is unhealthy, or
    /// [`CoreError::OpenFailure`] if the file cannot be opened.
    pub fn open_file(&mut self, kind: FileKind) -> CoreResult<()> {
        self.ensure_ready()?;
        self.open(kind)
    }

    /// Closes the current file, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SyncFailure`] if pending data cannot be flushed.
    pub fn close_current(&mut self) -> CoreResult<()> {
        self.open_kind = None;
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };
        let result = handle
            .close()
            .map_err(|source| CoreError::sync_failure(handle.path(), source));
        self.checked(result)
    }

    /// Syncs the current file, honoring auto-sync and the publish cooldown.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] if storage is unhealthy, or
    /// [`CoreError::SyncFailure`] if the flush fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.ensure_ready()?;
        self.sync_current()
    }

    // === Session internals ===

    /// Admits the call if storage is healthy or can be recovered now.
    pub(crate) fn ensure_ready(&mut self) -> CoreResult<()> {
        if self.monitor.is_healthy() || self.recover() {
            Ok(())
        } else {
            trace!("refusing call while storage is unhealthy");
            Err(CoreError::NotInitialized)
        }
    }

    /// Makes `kind` the open file. Reopening the open file is free.
    pub(crate) fn open(&mut self, kind: FileKind) -> CoreResult<()> {
        if self.open_kind == Some(kind) && self.handle.as_ref().is_some_and(|h| h.is_open()) {
            return Ok(());
        }
        self.close_current()?;

        let name = self.registry.name(kind).to_string();
        debug!(file = %name, "opening");
        let result = self
            .volume
            .open(&name, OpenMode::ReadWriteCreate)
            .map_err(|source| CoreError::open_failure(&name, source));
        let handle = self.checked(result)?;
        self.handle = Some(handle);
        self.open_kind = Some(kind);
        Ok(())
    }

    /// Reports an I/O fault to the monitor and returns it.
    pub(crate) fn escalate(&mut self, err: CoreError) -> CoreError {
        self.stats.record_io_fault();
        let file = err
            .path()
            .map_or_else(|| self.current_path(), str::to_string);
        warn!(error = %err, "I/O fault");

        self.handle = None;
        self.open_kind = None;
        self.cursor = None;
        self.monitor
            .on_fault(self.volume.as_mut(), &self.platform, &file);
        err
    }

    /// Escalates `result`'s error if it came from an I/O primitive.
    pub(crate) fn checked<T>(&mut self, result: CoreResult<T>) -> CoreResult<T> {
        result.map_err(|err| {
            if err.is_io_fault() {
                self.escalate(err)
            } else {
                err
            }
        })
    }

    /// Name of the open file, or `"none"`.
    pub(crate) fn current_path(&self) -> String {
        self.handle
            .as_ref()
            .map_or_else(|| "none".to_string(), |h| h.path().to_string())
    }

    pub(crate) fn file_name(&self, kind: FileKind) -> String {
        self.registry.name(kind).to_string()
    }

    fn handle_mut(&mut self) -> CoreResult<&mut Box<dyn FileHandle>> {
        self.handle
            .as_mut()
            .ok_or(CoreError::Storage(StorageError::Closed))
    }

    pub(crate) fn position(&self) -> CoreResult<u64> {
        self.handle
            .as_ref()
            .map(|h| h.position())
            .ok_or(CoreError::Storage(StorageError::Closed))
    }

    pub(crate) fn file_size(&mut self) -> CoreResult<u64> {
        let result = self
            .handle_mut()
            .and_then(|h| h.size().map_err(|source| CoreError::read_failure(h.path(), source)));
        self.checked(result)
    }

    pub(crate) fn seek_to(&mut self, pos: u64) -> CoreResult<u64> {
        let result = self.handle_mut().and_then(|h| {
            h.seek(SeekFrom::Start(pos))
                .map_err(|source| CoreError::seek_failure(h.path(), source))
        });
        self.checked(result)
    }

    pub(crate) fn seek_end(&mut self) -> CoreResult<u64> {
        let result = self.handle_mut().and_then(|h| {
            h.seek(SeekFrom::End(0))
                .map_err(|source| CoreError::seek_failure(h.path(), source))
        });
        self.checked(result)
    }

    pub(crate) fn read_into(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        let result = self.handle_mut().and_then(|h| {
            h.read(buf)
                .map_err(|source| CoreError::read_failure(h.path(), source))
        });
        let n = self.checked(result)?;
        self.stats.record_read(n);
        Ok(n)
    }

    pub(crate) fn read_byte(&mut self) -> CoreResult<Option<u8>> {
        let result = self.handle_mut().and_then(|h| {
            h.read_byte()
                .map_err(|source| CoreError::read_failure(h.path(), source))
        });
        let byte = self.checked(result)?;
        self.stats.record_read(usize::from(byte.is_some()));
        Ok(byte)
    }

    /// Writes `data` at the cursor; a short write is a failure.
    pub(crate) fn write_all(&mut self, data: &[u8]) -> CoreResult<()> {
        let result = self.handle_mut().and_then(|h| {
            let written = h
                .write(data)
                .map_err(|source| CoreError::write_failure(h.path(), source))?;
            if written == data.len() {
                Ok(())
            } else {
                Err(CoreError::short_write(h.path(), written, data.len()))
            }
        });
        self.checked(result)?;
        self.stats.record_write(data.len());
        Ok(())
    }

    pub(crate) fn truncate_to(&mut self, len: u64) -> CoreResult<()> {
        let result = self.handle_mut().and_then(|h| {
            h.truncate(len)
                .map_err(|source| CoreError::write_failure(h.path(), source))
        });
        self.checked(result)
    }

    /// Syncs the open file.
    pub(crate) fn sync_current(&mut self) -> CoreResult<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };
        let result = self.sync_handle(handle.as_mut());
        if result.is_ok() {
            self.handle = Some(handle);
        }
        result
    }

    /// Syncs `handle`: skipped when auto-sync is off, otherwise waits out
    /// the publish cooldown, pats the watchdog, and flushes.
    pub(crate) fn sync_handle(&mut self, handle: &mut dyn FileHandle) -> CoreResult<()> {
        if !self.auto_sync {
            debug!(file = handle.path(), "skipping sync");
            self.stats.record_sync(true);
            return Ok(());
        }

        self.wait_for_publish_cooldown();
        self.platform.watchdog.pat();

        trace!(file = handle.path(), "sync");
        let result = handle
            .sync()
            .map_err(|source| CoreError::sync_failure(handle.path(), source));
        self.checked(result)?;
        self.stats.record_sync(false);
        Ok(())
    }

    fn wait_for_publish_cooldown(&self) {
        let Some(last) = self.platform.telemetry.last_publish_millis() else {
            return;
        };
        let cooldown = millis(self.config.publish_cooldown);
        let mut logged = false;
        while self.platform.clock.now_millis().saturating_sub(last) < cooldown {
            if !logged {
                debug!("waiting for post-publish cooldown");
                logged = true;
            }
            self.platform.scheduler.yield_now();
        }
    }

    /// Lends the scratch buffer to `f`.
    pub(crate) fn with_scratch<R>(&mut self, f: impl FnOnce(&mut Self, &mut [u8]) -> R) -> R {
        let mut scratch = std::mem::take(&mut self.scratch);
        debug_assert!(!scratch.is_empty(), "scratch buffer lent twice");
        let result = f(self, &mut scratch);
        self.scratch = scratch;
        result
    }

    /// Forgets the sequential-read position if it belongs to `kind`.
    pub(crate) fn invalidate(&mut self, kind: FileKind) {
        if self.cursor.is_some_and(|c| c.kind == kind) {
            self.cursor = None;
        }
    }

    pub(crate) fn delimiter(&self) -> Vec<u8> {
        self.config.entry_delimiter.clone()
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
