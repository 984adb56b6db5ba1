//! Timestamped archives of the whole file registry.
//!
//! An archive is a top-level folder named by the decimal Unix time it was
//! taken, holding a byte-for-byte copy of every registered file under its
//! registry name: `<stamp>/<name>`. Only folders whose names parse as a
//! timestamp within [`crate::Config::archive_stamp_range`] count as
//! archives; anything else on the volume is left alone.

use crate::error::{CoreError, CoreResult};
use crate::session::FlatStore;
use crate::tree::walk;
use flatrec_storage::{join_path, FileHandle, OpenMode};
use tracing::{debug, info, warn};

impl FlatStore {
    /// Copies every registered file into a new archive folder.
    ///
    /// Returns the archive's timestamp. Fails if the folder already exists
    /// (two archives within one second) or if any single copy fails.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the folder cannot be created, an
    /// I/O failure from a copy, or [`CoreError::NotInitialized`].
    pub fn archive(&mut self) -> CoreResult<u64> {
        self.ensure_ready()?;
        self.close_current()?;
        self.cursor = None;

        let stamp = self.platform.clock.unix_seconds();
        let folder = stamp.to_string();
        self.volume.create_dir(&folder)?;

        let names: Vec<String> = self.registry.iter().map(|(_, d)| d.name.clone()).collect();
        for name in names {
            let target = join_path(&folder, &name);
            let copied = self.copy_file(&name, &target)?;
            debug!(file = %target, bytes = copied, "archived");
        }

        info!(stamp, "archive created");
        Ok(stamp)
    }

    /// Copies `src` over `dst` through the scratch buffer.
    ///
    /// `dst` is created or truncated first. A missing `src` is copied as
    /// an empty file. Returns the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Returns an I/O failure (a short read or write counts as one) or
    /// [`CoreError::NotInitialized`].
    pub fn copy_file(&mut self, src: &str, dst: &str) -> CoreResult<u64> {
        self.ensure_ready()?;
        self.close_current()?;
        self.cursor = None;

        let source = match self.volume.open(src, OpenMode::ReadOnly) {
            Ok(handle) => Some(handle),
            Err(err) if err.is_not_found() => {
                debug!(file = src, "copy source missing; copying as empty");
                None
            }
            Err(err) => return self.checked(Err(CoreError::open_failure(src, err))),
        };

        let opened = self
            .volume
            .open(dst, OpenMode::CreateTruncate)
            .map_err(|err| CoreError::open_failure(dst, err));
        let mut target = self.checked(opened)?;

        let copied = match source {
            Some(mut source) => {
                let result = self.pump(source.as_mut(), target.as_mut());
                if let Err(err) = source.close() {
                    debug!(file = src, error = %err, "closing copy source failed");
                }
                self.checked(result)?
            }
            None => 0,
        };

        self.sync_handle(target.as_mut())?;
        let closed = target
            .close()
            .map_err(|err| CoreError::sync_failure(dst, err));
        self.checked(closed)?;
        Ok(copied)
    }

    /// Restores the closest archive taken strictly after `after`.
    ///
    /// The current state is archived first, so a restore can always be
    /// undone. Returns the restored archive's timestamp.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ArchiveNotFound`] if no archive is newer than `after`
    /// - [`CoreError::ArchiveIsSnapshot`] if the only newer archive is the
    ///   snapshot this call just took
    /// - [`CoreError::ArchiveIncomplete`] if that archive lacks a registered
    ///   file; no live file is touched
    /// - any error from [`FlatStore::archive`] or a copy
    pub fn restore(&mut self, after: u64) -> CoreResult<u64> {
        let snapshot = self.archive()?;

        let closest = self.archives()?.into_iter().find(|&stamp| stamp > after);
        let stamp = match closest {
            None => return Err(CoreError::ArchiveNotFound { after }),
            Some(stamp) if stamp == snapshot => {
                warn!(stamp, "closest archive is the snapshot just taken");
                return Err(CoreError::ArchiveIsSnapshot { stamp });
            }
            Some(stamp) => stamp,
        };

        let folder = stamp.to_string();
        let names: Vec<String> = self.registry.iter().map(|(_, d)| d.name.clone()).collect();
        // Every copy must exist before any live file is overwritten.
        if let Some(missing) = names
            .iter()
            .find(|name| !self.volume.exists(&join_path(&folder, name)))
        {
            warn!(stamp, file = %missing, "archive is incomplete; nothing restored");
            return Err(CoreError::ArchiveIncomplete {
                stamp,
                file: missing.clone(),
            });
        }

        info!(stamp, snapshot, "restoring archive");
        for name in names {
            self.copy_file(&join_path(&folder, &name), &name)?;
        }
        Ok(stamp)
    }

    /// Deletes every archive older than `before`, or all of them if
    /// `before` is 0. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on the first failed removal, or
    /// [`CoreError::NotInitialized`].
    pub fn prune(&mut self, before: u64) -> CoreResult<usize> {
        let stamps = self.archives()?;
        self.close_current()?;

        let mut removed = 0;
        for stamp in stamps {
            if before != 0 && stamp >= before {
                continue;
            }
            self.remove_tree(&stamp.to_string())?;
            removed += 1;
        }
        info!(removed, before, "pruned archives");
        Ok(removed)
    }

    /// Lists archive timestamps, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the root cannot be listed, or
    /// [`CoreError::NotInitialized`].
    pub fn archives(&mut self) -> CoreResult<Vec<u64>> {
        self.ensure_ready()?;
        let mut stamps: Vec<u64> = self
            .volume
            .list_dir("")?
            .into_iter()
            .filter(|entry| entry.is_dir)
            .filter_map(|entry| parse_stamp(&entry.name))
            .filter(|stamp| self.config.archive_stamp_range.contains(stamp))
            .collect();
        stamps.sort_unstable();
        Ok(stamps)
    }

    /// Removes `dir` and everything below it, children before parents.
    fn remove_tree(&mut self, dir: &str) -> CoreResult<()> {
        let nodes = walk(self.volume.as_ref(), dir)?;
        for node in nodes.iter().rev() {
            if node.is_dir {
                self.volume.remove_dir(&node.path)?;
            } else {
                self.volume.remove_file(&node.path)?;
            }
        }
        self.volume.remove_dir(dir)?;
        debug!(dir, entries = nodes.len(), "removed tree");
        Ok(())
    }

    /// Moves every byte of `source` to `target` in scratch-sized chunks.
    fn pump(
        &mut self,
        source: &mut dyn FileHandle,
        target: &mut dyn FileHandle,
    ) -> CoreResult<u64> {
        let size = source
            .size()
            .map_err(|err| CoreError::read_failure(source.path(), err))?;

        self.with_scratch(|store, buf| -> CoreResult<u64> {
            let mut copied = 0u64;
            while copied < size {
                let want = (size - copied).min(buf.len() as u64) as usize;
                let n = source
                    .read(&mut buf[..want])
                    .map_err(|err| CoreError::read_failure(source.path(), err))?;
                if n < want {
                    return Err(CoreError::short_read(source.path(), n, want));
                }
                store.stats.record_read(n);

                let written = target
                    .write(&buf[..n])
                    .map_err(|err| CoreError::write_failure(target.path(), err))?;
                if written < n {
                    return Err(CoreError::short_write(target.path(), written, n));
                }
                store.stats.record_write(n);
                copied += n as u64;
            }
            Ok(copied)
        })
    }
}

fn parse_stamp(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::parse_stamp;
    use crate::test_support::{seeded, store};
    use crate::{CoreError, FileKind};
    use flatrec_storage::FaultKind;
    use std::time::Duration;

    const ORIGIN: u64 = 1_700_000_000;

    #[test]
    fn stamps_must_be_all_digits() {
        assert_eq!(parse_stamp("1700000000"), Some(1_700_000_000));
        assert_eq!(parse_stamp("17x"), None);
        assert_eq!(parse_stamp("+17"), None);
        assert_eq!(parse_stamp(""), None);
    }

    #[test]
    fn archive_copies_every_registered_file() {
        let (mut store, volume, _sim) =
            seeded(&[("userTable.csv", b"id\r\n1\r\n"), ("strings.csv", b"s\r\n")]);
        let stamp = store.archive().unwrap();
        assert_eq!(stamp, ORIGIN);

        let folder = stamp.to_string();
        assert_eq!(
            volume.file_contents(&format!("{folder}/userTable.csv")).unwrap(),
            b"id\r\n1\r\n"
        );
        assert_eq!(
            volume.file_contents(&format!("{folder}/strings.csv")).unwrap(),
            b"s\r\n"
        );
        // Unseeded registry files are archived as empty copies.
        assert_eq!(
            volume.file_contents(&format!("{folder}/firmware.hex")).unwrap(),
            b""
        );
        assert_eq!(store.archives().unwrap(), vec![stamp]);
    }

    #[test]
    fn archive_twice_in_one_second_fails() {
        let (mut store, _volume, _sim) = store();
        store.archive().unwrap();
        assert!(matches!(store.archive(), Err(CoreError::Storage(_))));
    }

    #[test]
    fn copy_larger_than_scratch() {
        let content: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let (mut store, volume, _sim) = seeded(&[("firmware.hex", content.as_slice())]);
        let copied = store.copy_file("firmware.hex", "copy.hex").unwrap();
        assert_eq!(copied, 5000);
        assert_eq!(volume.file_contents("copy.hex").unwrap(), content);
    }

    #[test]
    fn copy_truncates_target() {
        let (mut store, volume, _sim) =
            seeded(&[("temp.csv", b"ab"), ("strings.csv", b"much longer")]);
        store.copy_file("temp.csv", "strings.csv").unwrap();
        assert_eq!(volume.file_contents("strings.csv").unwrap(), b"ab");
    }

    #[test]
    fn short_write_during_copy_escalates() {
        let (mut store, volume, sim) = seeded(&[("temp.csv", b"abcdef")]);
        volume.faults().short_writes(3);
        let err = store.copy_file("temp.csv", "out.csv").unwrap_err();
        assert!(matches!(err, CoreError::WriteFailure { .. }));
        assert_eq!(store.stats().io_faults, 1);
        assert_eq!(sim.power.cycles(), 1);
    }

    #[test]
    fn restore_picks_closest_newer_archive() {
        let (mut store, volume, sim) = seeded(&[("strings.csv", b"v1\r\n")]);
        let first = store.archive().unwrap();

        sim.clock.advance(Duration::from_secs(10));
        store.wipe_file(FileKind::StoredStrings).unwrap();
        store.append(FileKind::StoredStrings, "v2").unwrap();
        let second = store.archive().unwrap();

        sim.clock.advance(Duration::from_secs(10));
        store.wipe_file(FileKind::StoredStrings).unwrap();
        store.append(FileKind::StoredStrings, "v3").unwrap();

        sim.clock.advance(Duration::from_secs(10));
        let restored = store.restore(first - 1).unwrap();
        assert_eq!(restored, first);
        assert_eq!(volume.file_contents("strings.csv").unwrap(), b"v1\r\n");

        sim.clock.advance(Duration::from_secs(10));
        assert_eq!(store.restore(first).unwrap(), second);
        assert_eq!(volume.file_contents("strings.csv").unwrap(), b"v2\r\n");

        // Each restore left a snapshot of what it replaced.
        assert_eq!(store.archives().unwrap().len(), 4);
    }

    #[test]
    fn restore_refuses_snapshot() {
        let (mut store, volume, sim) = seeded(&[("strings.csv", b"live\r\n")]);
        store.archive().unwrap();
        sim.clock.advance(Duration::from_secs(5));
        let err = store.restore(ORIGIN).unwrap_err();
        assert!(matches!(err, CoreError::ArchiveIsSnapshot { stamp } if stamp == ORIGIN + 5));
        assert_eq!(volume.file_contents("strings.csv").unwrap(), b"live\r\n");
    }

    #[test]
    fn restore_from_incomplete_archive_leaves_live_files() {
        let (mut store, volume, sim) = seeded(&[("strings.csv", b"precious\r\n")]);
        let partial = ORIGIN + 5;
        volume.put_file(&format!("{partial}/userTable.csv"), b"id\r\n");
        sim.clock.advance(Duration::from_secs(10));

        let err = store.restore(ORIGIN).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ArchiveIncomplete { stamp, .. } if stamp == partial
        ));
        assert_eq!(volume.file_contents("strings.csv").unwrap(), b"precious\r\n");
        assert!(volume.file_contents("userTable.csv").map_or(true, |c| c.is_empty()));
        assert!(store.is_healthy());
    }

    #[test]
    fn restore_without_newer_archive() {
        let (mut store, _volume, _sim) = store();
        assert!(matches!(
            store.restore(u64::from(u32::MAX) * 2),
            Err(CoreError::ArchiveNotFound { .. })
        ));
    }

    #[test]
    fn prune_before_and_all() {
        let (mut store, volume, sim) = seeded(&[("strings.csv", b"x\r\n")]);
        volume.put_file("notes/readme.txt", b"keep");
        volume.put_file("42/odd.txt", b"out of range");
        let mut stamps = Vec::new();
        for _ in 0..3 {
            stamps.push(store.archive().unwrap());
            sim.clock.advance(Duration::from_secs(100));
        }

        assert_eq!(store.prune(stamps[2]).unwrap(), 2);
        assert_eq!(store.archives().unwrap(), vec![stamps[2]]);
        assert!(!volume
            .file_paths()
            .iter()
            .any(|p| p.starts_with(&stamps[0].to_string())));

        assert_eq!(store.prune(0).unwrap(), 1);
        assert!(store.archives().unwrap().is_empty());
        assert!(volume.file_contents("notes/readme.txt").is_some());
        assert!(volume.file_contents("42/odd.txt").is_some());
        assert!(volume.file_contents("strings.csv").is_some());
    }

    #[test]
    fn prune_removes_nested_folders() {
        let (mut store, volume, _sim) = store();
        let stamp = store.archive().unwrap();
        volume.put_file(&format!("{stamp}/extra/deeper/file.bin"), b"1");
        assert_eq!(store.prune(0).unwrap(), 1);
        assert!(volume.file_paths().iter().all(|p| !p.starts_with(&stamp.to_string())));
    }

    #[test]
    fn directory_fault_fails_archive() {
        let (mut store, volume, _sim) = store();
        volume.faults().fail_once(FaultKind::Directory);
        assert!(store.archive().is_err());
        assert!(store.is_healthy());
    }
}
