//! Store fixtures.
//!
//! Every fixture runs on the simulated platform, so clocks, power cycles,
//! and telemetry are deterministic and inspectable.

use flatrec_core::{Config, FileKind, FlatStore, Registry, SimPlatform};
use flatrec_storage::{DirVolume, InMemoryVolume};
use std::path::Path;
use tempfile::TempDir;

/// Unix time the simulated clock starts at.
pub const SIM_ORIGIN: u64 = 1_700_000_000;

/// A started store with handles to its volume and platform doubles.
pub struct TestStore {
    /// The engine under test.
    pub store: FlatStore,
    /// The simulated platform the store runs on.
    pub sim: SimPlatform,
    /// A second handle to the in-memory volume, if the store uses one.
    pub memory: Option<InMemoryVolume>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a store over a new in-memory volume.
    pub fn memory() -> Self {
        Self::memory_with(Config::default(), Registry::default())
    }

    /// Creates a store over a new in-memory volume with custom settings.
    pub fn memory_with(config: Config, registry: Registry) -> Self {
        let volume = InMemoryVolume::new();
        let sim = SimPlatform::new(SIM_ORIGIN);
        let mut store = FlatStore::new(Box::new(volume.clone()), sim.platform(), config, registry)
            .expect("Failed to create store");
        store.begin().expect("Failed to start in-memory store");
        Self {
            store,
            sim,
            memory: Some(volume),
            temp_dir: None,
        }
    }

    /// Creates a store over a temporary directory.
    pub fn dir() -> Self {
        Self::dir_with(Config::default())
    }

    /// Creates a store over a temporary directory with a custom config.
    pub fn dir_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let volume = DirVolume::open(temp_dir.path()).expect("Failed to open directory volume");
        let sim = SimPlatform::new(SIM_ORIGIN);
        let mut store = FlatStore::new(Box::new(volume), sim.platform(), config, Registry::default())
            .expect("Failed to create store");
        store.begin().expect("Failed to start directory store");
        Self {
            store,
            sim,
            memory: None,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the backing directory if directory-based.
    pub fn root(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Replaces the contents of `kind` with `bytes`.
    ///
    /// Seed before reading from `kind`; a sequential-read position the
    /// store already holds for it is not reset.
    pub fn seed(&mut self, kind: FileKind, bytes: &[u8]) {
        let name = self.store.registry().name(kind).to_string();
        if let Some(volume) = &self.memory {
            self.store.close_current().expect("Failed to close current file");
            volume.put_file(&name, bytes);
        } else {
            self.store.wipe_file(kind).expect("Failed to wipe file");
            self.store
                .overwrite_bytes(kind, 0, bytes)
                .expect("Failed to seed file");
        }
    }

    /// Returns the raw bytes of `kind`.
    pub fn contents(&mut self, kind: FileKind) -> Vec<u8> {
        let name = self.store.registry().name(kind).to_string();
        if let Some(volume) = &self.memory {
            return volume.file_contents(&name).unwrap_or_default();
        }
        let root = self.root().expect("Directory fixture has a root");
        std::fs::read(root.join(name)).unwrap_or_default()
    }
}

impl std::ops::Deref for TestStore {
    type Target = FlatStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl std::ops::DerefMut for TestStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

/// Joins a header and entries into file bytes, each terminated by CRLF.
pub fn file_bytes(header: &str, entries: &[String]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for line in std::iter::once(header).chain(entries.iter().map(String::as_str)) {
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
    }
    bytes
}

/// Runs a test with a started in-memory store.
///
/// # Example
///
/// ```rust
/// use flatrec_core::FileKind;
/// use flatrec_testkit::with_memory_store;
///
/// with_memory_store(|fixture| {
///     fixture.store.append(FileKind::TempFile, "x").unwrap();
/// });
/// ```
pub fn with_memory_store<F, R>(f: F) -> R
where
    F: FnOnce(&mut TestStore) -> R,
{
    let mut fixture = TestStore::memory();
    f(&mut fixture)
}
