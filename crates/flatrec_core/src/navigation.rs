//! Delimiter scanning and ordinal/offset translation.
//!
//! Entries are not stored as objects; they are whatever lies between
//! delimiters. Ordinal `k` starts immediately after the `k`-th delimiter
//! of the file, and ordinal 0 (the header) starts at byte 0.
//!
//! Scans read the scratch buffer full at a time. When a full chunk holds
//! no delimiter, the next read starts `delimiter_len - 1` bytes before the
//! chunk end so a delimiter split across two chunks is still seen.

use crate::error::{CoreError, CoreResult};
use crate::registry::FileKind;
use crate::session::FlatStore;
use tracing::{trace, warn};

/// Offset of the first occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl FlatStore {
    /// Moves `kind`'s cursor just past the next delimiter.
    ///
    /// Returns the number of bytes skipped, or 0 (cursor unchanged) if no
    /// delimiter follows the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotInitialized`] or an I/O failure.
    pub fn skip_past_next_delimiter(&mut self, kind: FileKind) -> CoreResult<u64> {
        self.ensure_ready()?;
        self.open(kind)?;
        self.scan_next_delimiter()
    }

    /// Skips exactly `count` delimiters from `kind`'s cursor.
    ///
    /// Returns false, with the cursor restored, if fewer than `count`
    /// delimiters follow it. Skipping zero delimiters always succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotInitialized`] or an I/O failure.
    pub fn skip_past_next_delimiters(&mut self, kind: FileKind, count: u32) -> CoreResult<bool> {
        self.ensure_ready()?;
        self.open(kind)?;
        self.skip_delimiters(count)
    }

    /// Counts delimiters ending at or before `position` in `kind`.
    ///
    /// This is the ordinal of the entry containing `position`. Position 0
    /// is the header and returns 0 without scanning. The cursor is left
    /// where it was.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotInitialized`] or an I/O failure.
    pub fn count_delimiters_before(&mut self, kind: FileKind, position: u64) -> CoreResult<u32> {
        self.ensure_ready()?;
        self.open(kind)?;
        self.delimiters_before(position)
    }

    /// Counts every delimiter in `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotInitialized`] or an I/O failure.
    pub fn count_delimiters(&mut self, kind: FileKind) -> CoreResult<u32> {
        self.ensure_ready()?;
        self.open(kind)?;
        let size = self.file_size()?;
        self.delimiters_before(size)
    }

    /// Positions `kind`'s cursor at the start of entry `ordinal`.
    ///
    /// Returns false if the file has fewer than `ordinal` delimiters.
    /// Ordinal `count + 1` resolves to the end of the file, where the next
    /// appended entry would start.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotInitialized`] or an I/O failure.
    pub fn goto_entry(&mut self, kind: FileKind, ordinal: u32) -> CoreResult<bool> {
        self.ensure_ready()?;
        self.seek_entry(kind, ordinal)
    }

    /// Returns the ordinal of the entry containing `kind`'s cursor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotInitialized`] or an I/O failure.
    pub fn current_entry_ordinal(&mut self, kind: FileKind) -> CoreResult<u32> {
        self.ensure_ready()?;
        self.open(kind)?;
        let position = self.position()?;
        self.entry_ordinal_at(kind, position)
    }

    /// Returns `kind`'s cursor position.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotInitialized`] or an open failure.
    pub fn tell(&mut self, kind: FileKind) -> CoreResult<u64> {
        self.ensure_ready()?;
        self.open(kind)?;
        self.position()
    }

    // === Internals; the target file is already open ===

    pub(crate) fn scan_next_delimiter(&mut self) -> CoreResult<u64> {
        let delimiter = self.delimiter();
        self.with_scratch(|store, buf| -> CoreResult<u64> {
            let origin = store.position()?;
            let mut chunk_start = origin;
            loop {
                let n = store.read_into(buf)?;
                if let Some(at) = find(&buf[..n], &delimiter) {
                    let end = chunk_start + (at + delimiter.len()) as u64;
                    store.seek_to(end)?;
                    return Ok(end - origin);
                }
                if n < buf.len() {
                    store.seek_to(origin)?;
                    return Ok(0);
                }
                chunk_start += (n - (delimiter.len() - 1)) as u64;
                store.seek_to(chunk_start)?;
            }
        })
    }

    pub(crate) fn skip_delimiters(&mut self, count: u32) -> CoreResult<bool> {
        if count == 0 {
            return Ok(true);
        }
        let origin = self.position()?;
        for skipped in 0..count {
            if self.scan_next_delimiter()? == 0 {
                trace!(skipped, wanted = count, "ran out of delimiters");
                self.seek_to(origin)?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn delimiters_before(&mut self, limit: u64) -> CoreResult<u32> {
        if limit == 0 {
            return Ok(0);
        }
        let delimiter = self.delimiter();
        let origin = self.position()?;
        self.seek_to(0)?;

        let count = self.with_scratch(|store, buf| -> CoreResult<u32> {
            let mut count = 0;
            let mut chunk_start = 0u64;
            // Matches starting before this offset were counted in an earlier chunk.
            let mut next_allowed = 0u64;
            loop {
                let n = store.read_into(buf)?;
                let mut at = (next_allowed.saturating_sub(chunk_start) as usize).min(n);
                while let Some(found) = find(&buf[at..n], &delimiter) {
                    let end = chunk_start + (at + found + delimiter.len()) as u64;
                    if end > limit {
                        return Ok(count);
                    }
                    count += 1;
                    next_allowed = end;
                    at += found + delimiter.len();
                }
                if n < buf.len() {
                    return Ok(count);
                }
                chunk_start += (n - (delimiter.len() - 1)) as u64;
                if chunk_start >= limit {
                    return Ok(count);
                }
                store.seek_to(chunk_start)?;
            }
        })?;

        self.seek_to(origin)?;
        Ok(count)
    }

    pub(crate) fn seek_entry(&mut self, kind: FileKind, ordinal: u32) -> CoreResult<bool> {
        self.open(kind)?;
        self.seek_to(0)?;
        if ordinal == 0 {
            return Ok(true);
        }

        if self.registry.descriptor(kind).fixed_width {
            if let Some(start) = self.fixed_width_start(kind, ordinal)? {
                self.stats.record_fixed_width_hit();
                self.seek_to(start)?;
                return Ok(true);
            }
            self.seek_to(0)?;
        }

        self.skip_delimiters(ordinal)
    }

    /// First entry's start offset and the byte length of every entry,
    /// measured from the first entry.
    pub(crate) fn fixed_width_geometry(&mut self) -> CoreResult<Option<(u64, u64)>> {
        self.seek_to(0)?;
        if self.scan_next_delimiter()? == 0 {
            return Ok(None);
        }
        let first_start = self.position()?;
        let width = self.scan_next_delimiter()?;
        if width == 0 {
            return Ok(None);
        }
        Ok(Some((first_start, width)))
    }

    /// Computes where entry `ordinal` starts in a fixed-width file.
    ///
    /// Returns `None` when the arithmetic cannot be trusted, in which case
    /// the caller falls back to counting delimiters.
    fn fixed_width_start(&mut self, kind: FileKind, ordinal: u32) -> CoreResult<Option<u64>> {
        let Some((first_start, width)) = self.fixed_width_geometry()? else {
            return Ok(None);
        };
        let target = first_start + u64::from(ordinal - 1) * width;
        if target > self.file_size()? {
            return Ok(None);
        }
        if self.delimiter_precedes(target)? {
            trace!(ordinal, target, "fixed-width seek");
            return Ok(Some(target));
        }
        self.note_width_violation(kind);
        Ok(None)
    }

    pub(crate) fn note_width_violation(&mut self, kind: FileKind) {
        self.stats.record_width_violation();
        let violation = CoreError::WidthAssumptionViolated {
            file: self.file_name(kind),
        };
        warn!(error = %violation, "using delimiter scan");
    }

    /// Returns true if the bytes right before `offset` are a delimiter.
    fn delimiter_precedes(&mut self, offset: u64) -> CoreResult<bool> {
        let delimiter = self.delimiter();
        let len = delimiter.len() as u64;
        if offset < len {
            return Ok(false);
        }
        self.seek_to(offset - len)?;
        let mut check = vec![0u8; delimiter.len()];
        let n = self.read_into(&mut check)?;
        Ok(n == check.len() && check == delimiter)
    }

    pub(crate) fn entry_ordinal_at(&mut self, kind: FileKind, position: u64) -> CoreResult<u32> {
        if position == 0 {
            return Ok(0);
        }
        if self.registry.descriptor(kind).fixed_width {
            if let Some(ordinal) = self.fixed_width_ordinal(kind, position)? {
                self.stats.record_fixed_width_hit();
                self.seek_to(position)?;
                return Ok(ordinal);
            }
            self.seek_to(position)?;
        }
        self.delimiters_before(position)
    }

    fn fixed_width_ordinal(&mut self, kind: FileKind, position: u64) -> CoreResult<Option<u32>> {
        let Some((first_start, width)) = self.fixed_width_geometry()? else {
            return Ok(None);
        };
        if position < first_start {
            return Ok(Some(0));
        }
        let index = (position - first_start) / width;
        let entry_start = first_start + index * width;
        if entry_start > first_start && !self.delimiter_precedes(entry_start)? {
            self.note_width_violation(kind);
            return Ok(None);
        }
        Ok(u32::try_from(index + 1).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::find;
    use crate::test_support::{seeded, seeded_with};
    use crate::{Config, FileDescriptor, FileKind, Registry};

    const F: FileKind = FileKind::StoredStrings;

    fn small_scratch(capacity: usize) -> Config {
        Config::new().scratch_capacity(capacity)
    }

    #[test]
    fn find_basics() {
        assert_eq!(find(b"ab\r\ncd", b"\r\n"), Some(2));
        assert_eq!(find(b"ab\r", b"\r\n"), None);
        assert_eq!(find(b"", b"\r\n"), None);
    }

    #[test]
    fn skip_returns_bytes_skipped() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"h\r\na,1\r\n")]);
        assert_eq!(store.skip_past_next_delimiter(F).unwrap(), 3);
        assert_eq!(store.skip_past_next_delimiter(F).unwrap(), 5);
        assert_eq!(store.skip_past_next_delimiter(F).unwrap(), 0);
        assert_eq!(store.tell(F).unwrap(), 8);
    }

    #[test]
    fn skip_without_delimiter_restores_position() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"no terminator")]);
        assert_eq!(store.skip_past_next_delimiter(F).unwrap(), 0);
        assert_eq!(store.tell(F).unwrap(), 0);
    }

    #[test]
    fn delimiter_straddling_chunks_is_found() {
        let (mut store, _volume, _sim) = seeded_with(
            small_scratch(8),
            Registry::default(),
            &[("strings.csv", b"abcdefg\r\nxy\r\n")],
        );
        // The first chunk ends between '\r' and '\n'.
        assert_eq!(store.skip_past_next_delimiter(F).unwrap(), 9);
        assert_eq!(store.skip_past_next_delimiter(F).unwrap(), 4);
    }

    #[test]
    fn long_entry_spanning_many_chunks() {
        let mut content = vec![b'x'; 100];
        content.extend_from_slice(b"\r\nshort\r\n");
        let (mut store, _volume, _sim) =
            seeded_with(small_scratch(7), Registry::default(), &[("strings.csv", content.as_slice())]);
        assert_eq!(store.skip_past_next_delimiter(F).unwrap(), 102);
        assert_eq!(store.count_delimiters(F).unwrap(), 2);
    }

    #[test]
    fn skip_n_is_all_or_nothing() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"h\r\na\r\nb\r\n")]);
        assert!(store.skip_past_next_delimiters(F, 0).unwrap());
        assert_eq!(store.tell(F).unwrap(), 0);
        assert!(!store.skip_past_next_delimiters(F, 4).unwrap());
        assert_eq!(store.tell(F).unwrap(), 0);
        assert!(store.skip_past_next_delimiters(F, 3).unwrap());
        assert_eq!(store.tell(F).unwrap(), 9);
    }

    #[test]
    fn count_delimiters_with_tiny_chunks() {
        let (mut store, _volume, _sim) = seeded_with(
            small_scratch(3),
            Registry::default(),
            &[("strings.csv", b"\r\n\r\nx\r\n\r\r\n")],
        );
        assert_eq!(store.count_delimiters(F).unwrap(), 4);
    }

    #[test]
    fn count_before_position() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"h\r\na,1\r\nb,2\r\n")]);
        assert_eq!(store.count_delimiters_before(F, 0).unwrap(), 0);
        assert_eq!(store.count_delimiters_before(F, 2).unwrap(), 0);
        assert_eq!(store.count_delimiters_before(F, 3).unwrap(), 1);
        assert_eq!(store.count_delimiters_before(F, 7).unwrap(), 1);
        assert_eq!(store.count_delimiters_before(F, 8).unwrap(), 2);
        assert_eq!(store.count_delimiters_before(F, 13).unwrap(), 3);
    }

    #[test]
    fn goto_and_current_ordinal() {
        let (mut store, _volume, _sim) = seeded(&[("strings.csv", b"h\r\na,1\r\nbb,22\r\nc\r\n")]);
        for (ordinal, offset) in [(0u32, 0u64), (1, 3), (2, 8), (3, 15)] {
            assert!(store.goto_entry(F, ordinal).unwrap());
            assert_eq!(store.tell(F).unwrap(), offset);
            assert_eq!(store.current_entry_ordinal(F).unwrap(), ordinal);
        }
        // One past the last entry is the append position.
        assert!(store.goto_entry(F, 4).unwrap());
        assert_eq!(store.tell(F).unwrap(), 18);
        assert!(!store.goto_entry(F, 5).unwrap());
    }

    #[test]
    fn fixed_width_fast_path() {
        let (mut store, _volume, _sim) =
            seeded(&[("userTable.csv", b"id,n\r\n01,a\r\n02,b\r\n03,c\r\n")]);
        assert!(store.goto_entry(FileKind::UserTable, 3).unwrap());
        assert_eq!(store.tell(FileKind::UserTable).unwrap(), 18);
        assert_eq!(store.stats().fixed_width_hits, 1);
        assert_eq!(store.current_entry_ordinal(FileKind::UserTable).unwrap(), 3);
        assert_eq!(store.stats().width_violations, 0);
    }

    #[test]
    fn fixed_width_violation_falls_back() {
        let registry = Registry::default()
            .with_descriptor(FileKind::StoredStrings, FileDescriptor::new("strings.csv", true));
        let (mut store, _volume, _sim) = seeded_with(
            Config::default(),
            registry,
            &[("strings.csv", b"h\r\na\r\nbbbb\r\nc\r\n")],
        );
        assert!(store.goto_entry(F, 3).unwrap());
        assert_eq!(store.tell(F).unwrap(), 12);
        assert_eq!(store.stats().width_violations, 1);
        assert_eq!(store.stats().fixed_width_hits, 0);
    }

    mod chunked {
        use super::*;
        use proptest::prelude::*;

        fn naive_count(bytes: &[u8]) -> u32 {
            bytes.windows(2).filter(|w| *w == b"\r\n").count() as u32
        }

        proptest! {
            #[test]
            fn chunked_count_matches_naive(
                bytes in proptest::collection::vec(prop_oneof![Just(b'\r'), Just(b'\n'), Just(b'x')], 0..200),
                capacity in 3usize..16,
            ) {
                let (mut store, _volume, _sim) = seeded_with(
                    small_scratch(capacity),
                    Registry::default(),
                    &[("strings.csv", bytes.as_slice())],
                );
                prop_assert_eq!(store.count_delimiters(F).unwrap(), naive_count(&bytes));
            }
        }
    }
}
