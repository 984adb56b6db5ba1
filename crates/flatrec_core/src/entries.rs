//! Entry reads and edits.
//!
//! Edits come in two shapes. When a replacement has exactly the byte
//! length of the entry it replaces, it is written over it in place.
//! Every other edit is a shift-rewrite: the bytes after the edited span
//! are read into the scratch buffer, the file is truncated at the span
//! start, the new entry (if any) is written, and the buffered tail is
//! appended again. The tail must fit in the scratch buffer; the check
//! happens before anything is modified.

use crate::error::{CoreError, CoreResult};
use crate::registry::FileKind;
use crate::session::{FlatStore, ReadCursor};
use tracing::{debug, error, trace};

/// One delimiter-terminated record, as read from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// 1-based position in the file; 0 is the header.
    pub ordinal: u32,
    /// Offset of the first byte.
    pub start: u64,
    /// Offset just past the terminating delimiter.
    pub end: u64,
    /// The payload without its delimiter.
    pub text: String,
}

impl Entry {
    /// Byte length including the delimiter.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns true if the entry is only a delimiter.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Splits the payload on `separator`.
    pub fn fields(&self, separator: char) -> impl Iterator<Item = &str> {
        self.text.split(separator)
    }
}

impl FlatStore {
    /// Appends `text` as a new last entry.
    ///
    /// A write the device only partly accepts is reported as a failure;
    /// whatever bytes reached the device stay there.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `text` contains the
    /// entry delimiter, [`CoreError::NotInitialized`], or an I/O failure.
    pub fn append(&mut self, kind: FileKind, text: &str) -> CoreResult<()> {
        self.check_text(text)?;
        self.ensure_ready()?;
        self.invalidate(kind);
        self.open(kind)?;
        self.seek_end()?;
        self.write_entry(text)?;
        self.sync_current()
    }

    /// Reads entry `ordinal` of `kind`. Ordinal 0 is the header.
    ///
    /// Reading ordinal `k + 1` right after ordinal `k` of the same file
    /// continues from where `k` ended instead of resolving the ordinal
    /// from the start of the file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CapacityExceeded`] if the entry does not fit
    /// the scratch buffer, [`CoreError::NotInitialized`], or an I/O failure.
    pub fn get_entry(&mut self, kind: FileKind, ordinal: u32) -> CoreResult<Option<Entry>> {
        self.ensure_ready()?;
        self.open(kind)?;

        let cached = self
            .cursor
            .take()
            .filter(|c| c.kind == kind && c.ordinal.checked_add(1) == Some(ordinal));
        let start = match cached {
            Some(previous) => {
                trace!(ordinal, "sequential entry read");
                previous.end
            }
            None => {
                if !self.seek_entry(kind, ordinal)? {
                    return Ok(None);
                }
                self.position()?
            }
        };

        let entry = self.read_entry_at(ordinal, start)?;
        if let Some(entry) = &entry {
            self.stats.record_entry_read(cached.is_some());
            self.remember(kind, entry);
        }
        Ok(entry)
    }

    /// Reads the entry starting at byte `start` of `kind`.
    ///
    /// The returned ordinal is that of the entry containing `start`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CapacityExceeded`] if the entry does not fit
    /// the scratch buffer, [`CoreError::NotInitialized`], or an I/O failure.
    pub fn get_entry_at(&mut self, kind: FileKind, start: u64) -> CoreResult<Option<Entry>> {
        self.ensure_ready()?;
        self.open(kind)?;
        if start >= self.file_size()? {
            debug!(start, "entry start beyond end of file");
            return Ok(None);
        }
        let ordinal = self.entry_ordinal_at(kind, start)?;
        let entry = self.read_entry_at(ordinal, start)?;
        if let Some(entry) = &entry {
            self.stats.record_entry_read(false);
            self.remember(kind, entry);
        }
        Ok(entry)
    }

    /// Reads the last entry of `kind`, if the file has any data entries.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] or an I/O failure.
    pub fn last_entry(&mut self, kind: FileKind) -> CoreResult<Option<Entry>> {
        let count = self.count_entries(kind)?;
        if count == 0 {
            return Ok(None);
        }
        self.get_entry(kind, count)
    }

    /// Returns the byte offset where entry `ordinal` starts.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] or an I/O failure.
    pub fn entry_start(&mut self, kind: FileKind, ordinal: u32) -> CoreResult<Option<u64>> {
        self.ensure_ready()?;
        if self.seek_entry(kind, ordinal)? {
            Ok(Some(self.position()?))
        } else {
            Ok(None)
        }
    }

    /// Counts data entries; the header is not counted.
    ///
    /// Fixed-width files are counted arithmetically from the file size
    /// and the first entry's length. If that leaves stray bytes, the file
    /// is counted delimiter by delimiter instead.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] or an I/O failure.
    pub fn count_entries(&mut self, kind: FileKind) -> CoreResult<u32> {
        self.ensure_ready()?;
        self.open(kind)?;

        if self.registry.descriptor(kind).fixed_width {
            if let Some(count) = self.fixed_width_count(kind)? {
                return Ok(count);
            }
        }

        let size = self.file_size()?;
        let delimiters = self.delimiters_before(size)?;
        Ok(delimiters.saturating_sub(1))
    }

    /// Replaces entry `ordinal` with `text`.
    ///
    /// # Errors
    ///
    /// See [`FlatStore::replace_entry`].
    pub fn replace(&mut self, kind: FileKind, ordinal: u32, text: &str) -> CoreResult<()> {
        self.replace_entry(kind, ordinal, Some(text), false)
    }

    /// Removes entry `ordinal`.
    ///
    /// # Errors
    ///
    /// See [`FlatStore::replace_entry`].
    pub fn delete(&mut self, kind: FileKind, ordinal: u32) -> CoreResult<()> {
        self.replace_entry(kind, ordinal, None, true)
    }

    /// Replaces or deletes entry `ordinal`.
    ///
    /// Supplying `new_text` forces `delete` off. An ordinal one past the
    /// last entry has an empty span, so replacing it appends.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EntryNotFound`] if the ordinal does not exist (or,
    ///   when deleting, has no delimiter-terminated entry)
    /// - [`CoreError::CapacityExceeded`] if the tail after the entry does
    ///   not fit the scratch buffer; the file is left unmodified
    /// - [`CoreError::InvalidArgument`] if `new_text` contains the delimiter
    ///   or there is neither text nor a delete
    /// - [`CoreError::NotInitialized`] or an I/O failure
    pub fn replace_entry(
        &mut self,
        kind: FileKind,
        ordinal: u32,
        new_text: Option<&str>,
        delete: bool,
    ) -> CoreResult<()> {
        match new_text {
            Some(text) => self.check_text(text)?,
            None if !delete => {
                return Err(CoreError::invalid_argument(
                    "replacement text is required unless deleting",
                ))
            }
            None => {}
        }
        self.ensure_ready()?;
        self.invalidate(kind);

        if !self.seek_entry(kind, ordinal)? {
            return Err(CoreError::entry_not_found(self.file_name(kind), ordinal));
        }
        let start = self.position()?;
        let end = start + self.scan_next_delimiter()?;
        if new_text.is_none() && end == start {
            return Err(CoreError::entry_not_found(self.file_name(kind), ordinal));
        }

        if let Some(text) = new_text {
            let new_len = (text.len() + self.config.entry_delimiter.len()) as u64;
            if new_len == end - start {
                trace!(ordinal, start, "in-place rewrite");
                self.seek_to(start)?;
                self.write_entry(text)?;
                self.stats.record_rewrite(true);
                return self.sync_current();
            }
        }

        let tail = self.file_size()? - end;
        self.check_capacity(tail)?;
        trace!(ordinal, start, end, tail, "shift rewrite");
        self.shift_rewrite(kind, start, end, new_text, tail)?;
        self.sync_current()
    }

    /// Inserts `text` as entry `ordinal`, moving the old entry to `ordinal + 1`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EntryNotFound`] if the ordinal does not exist
    /// - [`CoreError::CapacityExceeded`] if everything from the insertion
    ///   point on does not fit the scratch buffer; the file is left unmodified
    /// - [`CoreError::InvalidArgument`] if `text` contains the delimiter
    /// - [`CoreError::NotInitialized`] or an I/O failure
    pub fn insert(&mut self, kind: FileKind, ordinal: u32, text: &str) -> CoreResult<()> {
        self.check_text(text)?;
        self.ensure_ready()?;
        self.invalidate(kind);

        if !self.seek_entry(kind, ordinal)? {
            return Err(CoreError::entry_not_found(self.file_name(kind), ordinal));
        }
        let start = self.position()?;
        let tail = self.file_size()? - start;
        self.check_capacity(tail)?;

        let delimiter = self.delimiter();
        self.with_scratch(|store, buf| -> CoreResult<()> {
            let tail = tail as usize;
            store.read_exact_at(start, &mut buf[..tail])?;
            store.seek_to(start)?;
            store.write_all(text.as_bytes())?;
            store.write_all(&delimiter)?;
            store.write_all(&buf[..tail])
        })?;
        self.stats.record_rewrite(false);
        self.sync_current()
    }

    /// Writes `bytes` at byte offset `start` of `kind`.
    ///
    /// If `start` lies beyond the end of the file, the gap is filled with
    /// spaces first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] or an I/O failure.
    pub fn overwrite_bytes(&mut self, kind: FileKind, start: u64, bytes: &[u8]) -> CoreResult<()> {
        self.ensure_ready()?;
        self.invalidate(kind);
        self.open(kind)?;

        let size = self.file_size()?;
        if start > size {
            self.seek_end()?;
            let gap = start - size;
            debug!(gap, "padding with spaces");
            self.with_scratch(|store, buf| -> CoreResult<()> {
                buf.fill(b' ');
                let mut remaining = gap;
                while remaining > 0 {
                    let chunk = remaining.min(buf.len() as u64) as usize;
                    store.write_all(&buf[..chunk])?;
                    remaining -= chunk as u64;
                }
                Ok(())
            })?;
        }

        self.seek_to(start)?;
        self.write_all(bytes)?;
        self.sync_current()
    }

    /// Reads exactly `count` bytes at offset `start` of `kind`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::CapacityExceeded`] if `count` exceeds the scratch buffer
    /// - [`CoreError::OutOfRange`] if fewer than `count` bytes are available
    /// - [`CoreError::NotInitialized`] or an I/O failure
    pub fn read_bytes(&mut self, kind: FileKind, start: u64, count: usize) -> CoreResult<Vec<u8>> {
        self.check_capacity(count as u64)?;
        self.ensure_ready()?;
        self.open(kind)?;
        self.seek_to(start)?;

        let file = self.file_name(kind);
        self.with_scratch(|store, buf| -> CoreResult<Vec<u8>> {
            let n = store.read_into(&mut buf[..count])?;
            if n < count {
                return Err(CoreError::OutOfRange {
                    file,
                    offset: start,
                    requested: count,
                    available: n,
                });
            }
            Ok(buf[..count].to_vec())
        })
    }

    /// Returns the entry containing the `occurrence`-th match of `needle`.
    ///
    /// Occurrences are counted from 1. A failed candidate resumes the scan
    /// one byte after where it started, so overlapping text is found.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidArgument`] for an empty needle or occurrence 0
    /// - [`CoreError::CapacityExceeded`] if `needle` exceeds the scratch buffer
    /// - [`CoreError::NotInitialized`] or an I/O failure
    pub fn search(
        &mut self,
        kind: FileKind,
        needle: &str,
        occurrence: u32,
    ) -> CoreResult<Option<Entry>> {
        let pattern = needle.as_bytes();
        let Some(&first) = pattern.first() else {
            return Err(CoreError::invalid_argument("search text is empty"));
        };
        if occurrence == 0 {
            return Err(CoreError::invalid_argument("occurrences are counted from 1"));
        }
        self.check_capacity(pattern.len() as u64)?;
        self.ensure_ready()?;
        self.open(kind)?;
        self.seek_to(0)?;

        let mut seen = 0;
        loop {
            let Some(byte) = self.read_byte()? else {
                return Ok(None);
            };
            if byte != first {
                continue;
            }

            let candidate = self.position()? - 1;
            self.seek_to(candidate)?;
            let matched = self.with_scratch(|store, buf| -> CoreResult<bool> {
                let window = &mut buf[..pattern.len()];
                let n = store.read_into(window)?;
                Ok(n == pattern.len() && window == pattern)
            })?;
            if !matched {
                self.seek_to(candidate + 1)?;
                continue;
            }

            seen += 1;
            if seen < occurrence {
                continue;
            }

            trace!(candidate, occurrence, "search hit");
            let ordinal = self.delimiters_before(candidate)?;
            if !self.seek_entry(kind, ordinal)? {
                return Ok(None);
            }
            let start = self.position()?;
            let entry = self.read_entry_at(ordinal, start)?;
            if let Some(entry) = &entry {
                self.stats.record_entry_read(false);
                self.remember(kind, entry);
            }
            return Ok(entry);
        }
    }

    /// Writes `headers` as the header line (ordinal 0).
    ///
    /// With `skip_if_exists`, a file that already holds a delimiter is
    /// left alone. Returns true if the header was written.
    ///
    /// # Errors
    ///
    /// See [`FlatStore::replace_entry`].
    pub fn set_headers(
        &mut self,
        kind: FileKind,
        headers: &str,
        skip_if_exists: bool,
    ) -> CoreResult<bool> {
        if skip_if_exists && self.has_delimiter(kind)? {
            trace!(file = self.registry.name(kind), "headers present");
            return Ok(false);
        }
        self.replace(kind, 0, headers)?;
        Ok(true)
    }

    /// Returns true if `kind` contains at least one delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] or an I/O failure.
    pub fn has_delimiter(&mut self, kind: FileKind) -> CoreResult<bool> {
        self.ensure_ready()?;
        self.open(kind)?;
        let origin = self.position()?;
        self.seek_to(0)?;
        let found = self.scan_next_delimiter()? > 0;
        self.seek_to(origin)?;
        Ok(found)
    }

    /// Returns the size of `kind` in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] or an I/O failure.
    pub fn bytes_in_file(&mut self, kind: FileKind) -> CoreResult<u64> {
        self.ensure_ready()?;
        self.open(kind)?;
        self.file_size()
    }

    /// Truncates `kind` to zero bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] or an I/O failure.
    pub fn wipe_file(&mut self, kind: FileKind) -> CoreResult<()> {
        self.ensure_ready()?;
        self.invalidate(kind);
        self.open(kind)?;
        self.truncate_to(0)?;
        self.seek_to(0)?;
        self.sync_current()
    }

    /// Replaces `target` with `replacement`: `target` is removed and
    /// `replacement` renamed to its name. A missing `target` is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the removal or rename fails, or
    /// [`CoreError::NotInitialized`].
    pub fn replace_file(&mut self, target: FileKind, replacement: FileKind) -> CoreResult<()> {
        self.ensure_ready()?;
        self.close_current()?;
        self.invalidate(target);
        self.invalidate(replacement);

        let target_name = self.file_name(target);
        let replacement_name = self.file_name(replacement);
        debug!(target = %target_name, replacement = %replacement_name, "replacing file");
        match self.volume.remove_file(&target_name) {
            Err(err) if !err.is_not_found() => return Err(err.into()),
            _ => {}
        }
        self.volume.rename(&replacement_name, &target_name)?;
        Ok(())
    }

    /// Returns the whole content of `kind` as text.
    ///
    /// With `escape`, control characters are shown as escapes (`\r`,
    /// `\n`) so delimiters are visible. The cursor is left where it was.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] or an I/O failure.
    pub fn render_file(&mut self, kind: FileKind, escape: bool) -> CoreResult<String> {
        self.ensure_ready()?;
        self.open(kind)?;
        let origin = self.position()?;
        self.seek_to(0)?;

        let bytes = self.with_scratch(|store, buf| -> CoreResult<Vec<u8>> {
            let mut out = Vec::new();
            loop {
                let n = store.read_into(buf)?;
                out.extend_from_slice(&buf[..n]);
                if n < buf.len() {
                    return Ok(out);
                }
            }
        })?;
        self.seek_to(origin)?;

        if escape {
            Ok(escape_bytes(&bytes))
        } else {
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    /// Returns free space on the volume in KiB.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the query fails, or
    /// [`CoreError::NotInitialized`].
    pub fn free_space_kb(&mut self) -> CoreResult<u64> {
        self.ensure_ready()?;
        Ok(self.volume.free_space()? / 1024)
    }

    // === Internals ===

    fn check_text(&self, text: &str) -> CoreResult<()> {
        if crate::navigation::find(text.as_bytes(), &self.config.entry_delimiter).is_some() {
            return Err(CoreError::invalid_argument(
                "entry text must not contain the entry delimiter",
            ));
        }
        Ok(())
    }

    fn check_capacity(&self, needed: u64) -> CoreResult<()> {
        if needed > self.scratch.len() as u64 {
            return Err(CoreError::capacity_exceeded(needed, self.scratch.len()));
        }
        Ok(())
    }

    fn write_entry(&mut self, text: &str) -> CoreResult<()> {
        let delimiter = self.delimiter();
        self.write_all(text.as_bytes())?;
        self.write_all(&delimiter)
    }

    fn remember(&mut self, kind: FileKind, entry: &Entry) {
        self.cursor = Some(ReadCursor {
            kind,
            ordinal: entry.ordinal,
            end: entry.end,
        });
    }

    /// Reads `buf.len()` bytes at `offset`; a short read is a read failure.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> CoreResult<()> {
        self.seek_to(offset)?;
        let n = self.read_into(buf)?;
        if n < buf.len() {
            let err = CoreError::short_read(self.current_path(), n, buf.len());
            return self.checked(Err(err));
        }
        Ok(())
    }

    /// Reads the entry starting at `start`. `None` if no delimiter follows.
    pub(crate) fn read_entry_at(&mut self, ordinal: u32, start: u64) -> CoreResult<Option<Entry>> {
        self.seek_to(start)?;
        let len = self.scan_next_delimiter()?;
        if len == 0 {
            return Ok(None);
        }
        self.check_capacity(len)?;

        let payload = len as usize - self.config.entry_delimiter.len();
        let text = self.with_scratch(|store, buf| -> CoreResult<String> {
            let entry = &mut buf[..len as usize];
            store.read_exact_at(start, entry)?;
            Ok(String::from_utf8_lossy(&entry[..payload]).into_owned())
        })?;

        Ok(Some(Entry {
            ordinal,
            start,
            end: start + len,
            text,
        }))
    }

    fn fixed_width_count(&mut self, kind: FileKind) -> CoreResult<Option<u32>> {
        let Some((first_start, width)) = self.fixed_width_geometry()? else {
            return Ok(None);
        };
        let body = self.file_size()? - first_start;
        if body % width != 0 {
            self.note_width_violation(kind);
            return Ok(None);
        }
        self.stats.record_fixed_width_hit();
        Ok(u32::try_from(body / width).ok())
    }

    fn shift_rewrite(
        &mut self,
        kind: FileKind,
        start: u64,
        end: u64,
        replacement: Option<&str>,
        tail: u64,
    ) -> CoreResult<()> {
        let delimiter = self.delimiter();
        let file = self.file_name(kind);
        self.with_scratch(|store, buf| -> CoreResult<()> {
            let tail_bytes = &mut buf[..tail as usize];
            store.read_exact_at(end, tail_bytes)?;
            store.truncate_to(start)?;
            store.seek_to(start)?;

            let mut written = 0u64;
            if let Some(text) = replacement {
                store.write_all(text.as_bytes())?;
                store.write_all(&delimiter)?;
                written = (text.len() + delimiter.len()) as u64;
            }
            store.write_all(tail_bytes)?;

            let rewritten = store.file_size()?.saturating_sub(start + written);
            if rewritten != tail {
                store.stats.record_consistency_fault();
                let fault = CoreError::ConsistencyFault {
                    file,
                    expected: tail,
                    actual: rewritten,
                };
                error!(error = %fault, "shift rewrite left an unexpected tail");
            }
            Ok(())
        })?;
        self.stats.record_rewrite(false);
        Ok(())
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 1);
    for &byte in bytes {
        match byte {
            b'\r' => out.push_str("\\r"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(char::from(byte)),
            _ => out.push_str(&format!("\\x{byte:02x}")),
        }
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::escape_bytes;
    use crate::test_support::{seeded, seeded_with, store};
    use crate::{Config, CoreError, FileKind, Registry};
    use flatrec_storage::FaultKind;

    const F: FileKind = FileKind::StoredStrings;
    const ABC: &[u8] = b"a,1\r\nb,2\r\nc,3\r\n";

    fn contents(volume: &flatrec_storage::InMemoryVolume) -> Vec<u8> {
        volume.file_contents("strings.csv").unwrap()
    }

    #[test]
    fn append_writes_entry_and_delimiter() {
        let (mut store, volume, _sim) = store();
        store.append(F, "h").unwrap();
        store.append(F, "x,1").unwrap();
        assert_eq!(contents(&volume), b"h\r\nx,1\r\n");
        assert_eq!(store.count_entries(F).unwrap(), 1);
    }

    #[test]
    fn append_rejects_embedded_delimiter() {
        let (mut store, volume, _sim) = store();
        assert!(matches!(
            store.append(F, "a\r\nb"),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(volume.file_contents("strings.csv").is_none());
    }

    #[test]
    fn short_write_is_reported() {
        let (mut store, volume, _sim) = store();
        volume.faults().short_writes(2);
        let err = store.append(F, "abcdef").unwrap_err();
        assert!(matches!(err, CoreError::WriteFailure { .. }));
        volume.faults().clear_all();
        assert_eq!(contents(&volume), b"ab");
    }

    #[test]
    fn get_entry_strips_delimiter() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", ABC)]);
        let header = store.get_entry(F, 0).unwrap().unwrap();
        assert_eq!(header.text, "a,1");
        assert_eq!((header.start, header.end), (0, 5));

        let entry = store.get_entry(F, 2).unwrap().unwrap();
        assert_eq!(entry.text, "c,3");
        assert_eq!(entry.ordinal, 2);
        assert_eq!(entry.fields(',').collect::<Vec<_>>(), vec!["c", "3"]);
        assert!(store.get_entry(F, 3).unwrap().is_none());
    }

    #[test]
    fn trailing_partial_line_is_not_an_entry() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"h\r\na\r\npartial")]);
        assert!(store.get_entry(F, 2).unwrap().is_none());
        assert_eq!(store.count_entries(F).unwrap(), 1);
    }

    #[test]
    fn sequential_reads_use_cache() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"h\r\na\r\nbb\r\nccc\r\n")]);
        let texts: Vec<String> = (1..=3)
            .map(|k| store.get_entry(F, k).unwrap().unwrap().text)
            .collect();
        assert_eq!(texts, vec!["a", "bb", "ccc"]);
        assert_eq!(store.stats().sequential_reads, 2);
        assert!(store.get_entry(F, 4).unwrap().is_none());
    }

    #[test]
    fn reading_another_file_resets_cache() {
        let (mut store, _volume, _sim) = seeded(&[
            ("strings.csv", b"h\r\na\r\nbb\r\n"),
            ("hubProperties.csv", b"k,v\r\n"),
        ]);
        store.get_entry(F, 1).unwrap();
        store.get_entry(FileKind::HubProperties, 0).unwrap();
        // The hub read replaced the cursor, so this is a cold read.
        assert_eq!(store.get_entry(F, 2).unwrap().unwrap().text, "bb");
        assert_eq!(store.stats().sequential_reads, 0);
    }

    #[test]
    fn mutation_invalidates_cache() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"h\r\na\r\nb\r\n")]);
        store.get_entry(F, 1).unwrap();
        store.insert(F, 1, "new").unwrap();
        assert_eq!(store.get_entry(F, 2).unwrap().unwrap().text, "a");
        assert_eq!(store.stats().sequential_reads, 0);
    }

    #[test]
    fn entry_too_large_for_scratch() {
        let (mut store, _volume, _sim) = seeded_with(
            Config::new().scratch_capacity(8),
            Registry::default(),
            &[("strings.csv", b"h\r\n0123456789\r\n")],
        );
        assert!(matches!(
            store.get_entry(F, 1),
            Err(CoreError::CapacityExceeded { needed: 12, capacity: 8 })
        ));
    }

    #[test]
    fn get_entry_at_offset() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", ABC)]);
        let entry = store.get_entry_at(F, 5).unwrap().unwrap();
        assert_eq!(entry.text, "b,2");
        assert_eq!(entry.ordinal, 1);
        assert!(store.get_entry_at(F, 15).unwrap().is_none());
        // Continues sequentially from an offset read.
        assert_eq!(store.get_entry(F, 2).unwrap().unwrap().text, "c,3");
        assert_eq!(store.stats().sequential_reads, 1);
    }

    #[test]
    fn last_entry_and_start() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", ABC)]);
        assert_eq!(store.last_entry(F).unwrap().unwrap().text, "c,3");
        assert_eq!(store.entry_start(F, 2).unwrap(), Some(10));
        assert_eq!(store.entry_start(F, 9).unwrap(), None);

        let (mut empty, _volume, _sim) = seeded(&[("strings.csv", b"h\r\n")]);
        assert!(empty.last_entry(F).unwrap().is_none());
    }

    #[test]
    fn count_entries_variable_width() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"h\r\na\r\nbbb\r\n")]);
        assert_eq!(store.count_entries(F).unwrap(), 2);
        let (mut none, _volume, _sim) = seeded(&[("strings.csv", b"no delimiter")]);
        assert_eq!(none.count_entries(F).unwrap(), 0);
    }

    #[test]
    fn count_entries_fixed_width() {
        let (mut store, _volume, _sim) =
            seeded(&[("userTable.csv", b"id,name\r\n01,a\r\n02,b\r\n03,c\r\n")]);
        assert_eq!(store.count_entries(FileKind::UserTable).unwrap(), 3);
        assert_eq!(store.stats().fixed_width_hits, 1);
    }

    #[test]
    fn count_entries_fixed_width_violation_falls_back() {
        let (mut store, _volume, _sim) =
            seeded(&[("userTable.csv", b"id,name\r\n01,a\r\n02,bb\r\n")]);
        assert_eq!(store.count_entries(FileKind::UserTable).unwrap(), 2);
        assert_eq!(store.stats().width_violations, 1);
    }

    #[test]
    fn replace_same_length_in_place() {
        let (mut store, volume, _sim) = seeded(&[("strings.csv", ABC)]);
        store.replace(F, 1, "x,9").unwrap();
        assert_eq!(contents(&volume), b"a,1\r\nx,9\r\nc,3\r\n");
        assert_eq!(store.stats().in_place_rewrites, 1);
        assert_eq!(store.stats().shift_rewrites, 0);
    }

    #[test]
    fn replace_different_length_shifts() {
        let (mut store, volume, _sim) = seeded(&[("strings.csv", ABC)]);
        store.replace(F, 1, "longer,22").unwrap();
        assert_eq!(contents(&volume), b"a,1\r\nlonger,22\r\nc,3\r\n");
        store.replace(F, 1, "").unwrap();
        assert_eq!(contents(&volume), b"a,1\r\n\r\nc,3\r\n");
        assert_eq!(store.stats().shift_rewrites, 2);
    }

    #[test]
    fn replace_missing_ordinal() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", ABC)]);
        assert!(matches!(
            store.replace(F, 7, "x"),
            Err(CoreError::EntryNotFound { ordinal: 7, .. })
        ));
        assert!(matches!(
            store.delete(F, 3),
            Err(CoreError::EntryNotFound { ordinal: 3, .. })
        ));
    }

    #[test]
    fn replace_past_last_entry_appends() {
        let (mut store, volume, _sim) = seeded(&[("strings.csv", ABC)]);
        store.replace(F, 3, "d,4").unwrap();
        assert_eq!(contents(&volume), b"a,1\r\nb,2\r\nc,3\r\nd,4\r\n");
    }

    #[test]
    fn replace_entry_needs_text_or_delete() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", ABC)]);
        assert!(matches!(
            store.replace_entry(F, 1, None, false),
            Err(CoreError::InvalidArgument { .. })
        ));
        // Text wins over the delete flag.
        store.replace_entry(F, 1, Some("q,0"), true).unwrap();
        assert_eq!(store.get_entry(F, 1).unwrap().unwrap().text, "q,0");
    }

    #[test]
    fn delete_last_entry() {
        let (mut store, volume, _sim) = seeded(&[("strings.csv", ABC)]);
        store.delete(F, 2).unwrap();
        assert_eq!(contents(&volume), b"a,1\r\nb,2\r\n");
    }

    #[test]
    fn capacity_exceeded_leaves_file_unmodified() {
        let mut content = b"h\r\na\r\n".to_vec();
        for _ in 0..10 {
            content.extend_from_slice(b"entry\r\n");
        }
        let (mut store, volume, _sim) = seeded_with(
            Config::new().scratch_capacity(32),
            Registry::default(),
            &[("strings.csv", content.as_slice())],
        );
        assert!(matches!(
            store.replace(F, 1, "longer"),
            Err(CoreError::CapacityExceeded { .. })
        ));
        assert!(matches!(
            store.insert(F, 1, "x"),
            Err(CoreError::CapacityExceeded { .. })
        ));
        assert!(matches!(
            store.delete(F, 1),
            Err(CoreError::CapacityExceeded { .. })
        ));
        assert_eq!(contents(&volume), content);
        // Same length still works in place.
        store.replace(F, 1, "b").unwrap();
    }

    #[test]
    fn insert_at_end_appends() {
        let (mut store, volume, _sim) = seeded(&[("strings.csv", ABC)]);
        store.insert(F, 3, "d,4").unwrap();
        assert_eq!(contents(&volume), b"a,1\r\nb,2\r\nc,3\r\nd,4\r\n");
        assert!(matches!(
            store.insert(F, 9, "z"),
            Err(CoreError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn overwrite_pads_with_spaces() {
        let (mut store, volume, _sim) = seeded(&[("strings.csv", b"abc")]);
        store.overwrite_bytes(F, 1, b"XY").unwrap();
        assert_eq!(contents(&volume), b"aXY");
        store.overwrite_bytes(F, 6, b"!").unwrap();
        assert_eq!(contents(&volume), b"aXY   !");
    }

    #[test]
    fn overwrite_pads_beyond_scratch() {
        let (mut store, volume, _sim) =
            seeded_with(Config::new().scratch_capacity(4), Registry::default(), &[]);
        store.overwrite_bytes(F, 10, b"z").unwrap();
        assert_eq!(contents(&volume), b"          z");
    }

    #[test]
    fn read_bytes_bounds() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", ABC)]);
        assert_eq!(store.read_bytes(F, 5, 3).unwrap(), b"b,2");
        assert!(matches!(
            store.read_bytes(F, 13, 5),
            Err(CoreError::OutOfRange { available: 2, .. })
        ));
        assert!(matches!(
            store.read_bytes(F, 0, 4096),
            Err(CoreError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn search_finds_nth_occurrence() {
        let (mut store, _volume, _sim) =
            seeded(&[("strings.csv", b"id,name\r\n1,bob\r\n2,alice\r\n3,bobby\r\n")]);
        let hit = store.search(F, "bob", 1).unwrap().unwrap();
        assert_eq!((hit.ordinal, hit.text.as_str()), (1, "1,bob"));
        let hit = store.search(F, "bob", 2).unwrap().unwrap();
        assert_eq!((hit.ordinal, hit.text.as_str()), (3, "3,bobby"));
        assert!(store.search(F, "bob", 3).unwrap().is_none());
        assert!(store.search(F, "carol", 1).unwrap().is_none());
    }

    #[test]
    fn search_finds_overlapping_candidates() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"h\r\nxaab\r\n")]);
        let hit = store.search(F, "ab", 1).unwrap().unwrap();
        assert_eq!(hit.text, "xaab");
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"h\r\naaab\r\n")]);
        assert_eq!(store.search(F, "aab", 1).unwrap().unwrap().ordinal, 1);
    }

    #[test]
    fn search_rejects_bad_arguments() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", ABC)]);
        assert!(store.search(F, "", 1).is_err());
        assert!(store.search(F, "a", 0).is_err());
    }

    #[test]
    fn headers_on_empty_file() {
        let (mut store, volume, _sim) = store();
        assert!(store.set_headers(F, "h1,h2", true).unwrap());
        assert_eq!(contents(&volume), b"h1,h2\r\n");
        assert!(!store.set_headers(F, "other", true).unwrap());
        assert_eq!(contents(&volume), b"h1,h2\r\n");
        assert!(store.set_headers(F, "x", false).unwrap());
        assert_eq!(contents(&volume), b"x\r\n");
    }

    #[test]
    fn has_delimiter_and_size() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"abc")]);
        assert!(!store.has_delimiter(F).unwrap());
        assert_eq!(store.bytes_in_file(F).unwrap(), 3);
        store.append(F, "").unwrap();
        assert!(store.has_delimiter(F).unwrap());
    }

    #[test]
    fn wipe_truncates() {
        let (mut store, volume, _sim) = seeded(&[("strings.csv", ABC)]);
        store.wipe_file(F).unwrap();
        assert_eq!(contents(&volume), b"");
        assert_eq!(store.count_entries(F).unwrap(), 0);
    }

    #[test]
    fn replace_file_swaps_contents() {
        let (mut store, volume, _sim) =
            seeded(&[("strings.csv", ABC), ("temp.csv", b"new\r\n")]);
        store.get_entry(F, 0).unwrap();
        store.replace_file(F, FileKind::TempFile).unwrap();
        assert_eq!(contents(&volume), b"new\r\n");
        assert!(volume.file_contents("temp.csv").is_none());
        assert_eq!(store.get_entry(F, 0).unwrap().unwrap().text, "new");
    }

    #[test]
    fn render_plain_and_escaped() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"a,1\r\nb\r\n")]);
        assert_eq!(store.render_file(F, false).unwrap(), "a,1\r\nb\r\n");
        assert_eq!(store.render_file(F, true).unwrap(), "a,1\\r\\nb\\r\\n\n");
        assert_eq!(escape_bytes(&[0x01]), "\\x01\n");
    }

    #[test]
    fn free_space_in_kb() {
        let (mut store, _volume, _sim) = store();
        assert_eq!(store.free_space_kb().unwrap(), 32 * 1024);
    }

    #[test]
    fn read_fault_during_get_marks_unhealthy() {
        let (mut store, volume, sim) = seeded(&[("strings.csv", ABC)]);
        volume.faults().fail(FaultKind::Read);
        volume.faults().fail(FaultKind::Init);
        assert!(matches!(
            store.get_entry(F, 1),
            Err(CoreError::ReadFailure { .. })
        ));
        assert_eq!(store.stats().io_faults, 1);
        assert_eq!(sim.power.cycles(), 1);
        assert!(matches!(store.get_entry(F, 1), Err(CoreError::NotInitialized)));
        assert_eq!(sim.power.cycles(), 1);
    }
}
