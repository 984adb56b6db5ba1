//! Shared fixtures for unit tests.

use crate::{Config, FlatStore, Registry};
use crate::sim::SimPlatform;
use flatrec_storage::InMemoryVolume;

pub(crate) const UNIX_ORIGIN: u64 = 1_700_000_000;

/// A started store over an empty in-memory volume.
pub(crate) fn store() -> (FlatStore, InMemoryVolume, SimPlatform) {
    seeded(&[])
}

/// A started store over a volume holding `files`.
pub(crate) fn seeded(files: &[(&str, &[u8])]) -> (FlatStore, InMemoryVolume, SimPlatform) {
    seeded_with(Config::default(), Registry::default(), files)
}

pub(crate) fn seeded_with(
    config: Config,
    registry: Registry,
    files: &[(&str, &[u8])],
) -> (FlatStore, InMemoryVolume, SimPlatform) {
    let volume = InMemoryVolume::new();
    for (path, bytes) in files {
        volume.put_file(path, bytes);
    }
    let sim = SimPlatform::new(UNIX_ORIGIN);
    let mut store = FlatStore::new(Box::new(volume.clone()), sim.platform(), config, registry)
        .expect("valid test config");
    store.begin().expect("in-memory volume starts");
    (store, volume, sim)
}
