//! Reference model of a flat file.
//!
//! [`FlatFile`] applies the same edits the engine does, but to a plain
//! list of lines, so an engine-edited file can be compared byte for byte.

use crate::fixtures::{file_bytes, TestStore};
use flatrec_core::FileKind;

/// A header and its entries, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatFile {
    /// Line at ordinal 0.
    pub header: String,
    /// Lines at ordinals 1..=n.
    pub entries: Vec<String>,
}

impl FlatFile {
    /// Creates a model from a header and entries.
    pub fn new(header: impl Into<String>, entries: Vec<String>) -> Self {
        Self {
            header: header.into(),
            entries,
        }
    }

    /// Returns the number of data entries.
    pub fn count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Returns the line at `ordinal`.
    pub fn line(&self, ordinal: u32) -> Option<&str> {
        match ordinal {
            0 => Some(&self.header),
            k => self.entries.get(k as usize - 1).map(String::as_str),
        }
    }

    /// Returns the byte offset where the line at `ordinal` starts.
    pub fn offset_of(&self, ordinal: u32) -> u64 {
        std::iter::once(&self.header)
            .chain(&self.entries)
            .take(ordinal as usize)
            .map(|line| line.len() as u64 + 2)
            .sum()
    }

    /// Replaces the line at `ordinal`; one past the end appends.
    pub fn replace(&mut self, ordinal: u32, text: &str) {
        match ordinal {
            0 => self.header = text.to_string(),
            k if k as usize == self.entries.len() + 1 => self.entries.push(text.to_string()),
            k => self.entries[k as usize - 1] = text.to_string(),
        }
    }

    /// Inserts `text` so that it becomes the line at `ordinal` (≥ 1).
    pub fn insert(&mut self, ordinal: u32, text: &str) {
        self.entries.insert(ordinal as usize - 1, text.to_string());
    }

    /// Removes the entry at `ordinal` (≥ 1).
    pub fn delete(&mut self, ordinal: u32) {
        self.entries.remove(ordinal as usize - 1);
    }

    /// Appends an entry.
    pub fn append(&mut self, text: &str) {
        self.entries.push(text.to_string());
    }

    /// Renders the file as stored, every line CRLF-terminated.
    pub fn to_bytes(&self) -> Vec<u8> {
        file_bytes(&self.header, &self.entries)
    }

    /// Asserts that `kind` in `fixture` holds exactly this model's bytes.
    pub fn assert_stored(&self, fixture: &mut TestStore, kind: FileKind) {
        let actual = fixture.contents(kind);
        assert_eq!(
            String::from_utf8_lossy(&actual),
            String::from_utf8_lossy(&self.to_bytes()),
            "stored file diverged from model"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> FlatFile {
        FlatFile::new("h", vec!["a".into(), "b".into(), "c".into()])
    }

    #[test]
    fn edits_follow_ordinals() {
        let mut file = abc();
        file.replace(2, "B");
        file.insert(1, "first");
        file.delete(4);
        file.replace(4, "appended");
        assert_eq!(file.line(0), Some("h"));
        assert_eq!(file.entries, vec!["first", "a", "B", "appended"]);
        assert_eq!(file.count(), 4);
        assert_eq!(file.line(5), None);
    }

    #[test]
    fn renders_crlf() {
        assert_eq!(abc().to_bytes(), b"h\r\na\r\nb\r\nc\r\n");
        assert_eq!(abc().offset_of(0), 0);
        assert_eq!(abc().offset_of(2), 6);
        assert_eq!(abc().offset_of(4), 12);
    }
}
