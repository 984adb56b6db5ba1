//! Property-based test generators using proptest.
//!
//! Provides strategies for generating entry text and whole files that
//! never contain the entry delimiter.

use crate::model::FlatFile;
use proptest::prelude::*;

/// Strategy for generating entry payloads (possibly empty, no CR or LF).
pub fn entry_text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ,._:-]{0,24}").expect("Invalid regex")
}

/// Strategy for generating non-empty entry payloads.
pub fn nonempty_entry_text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ,._:-]{1,24}").expect("Invalid regex")
}

/// Strategy for generating comma-separated header lines.
pub fn header_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}(,[a-z]{1,8}){0,3}").expect("Invalid regex")
}

/// Strategy for generating a header plus up to `max_entries` entries.
pub fn flat_file_strategy(max_entries: usize) -> impl Strategy<Value = FlatFile> {
    (
        header_strategy(),
        prop::collection::vec(entry_text_strategy(), 0..=max_entries),
    )
        .prop_map(|(header, entries)| FlatFile::new(header, entries))
}

/// Strategy for generating a file with at least one entry, plus an
/// ordinal of an existing entry.
pub fn file_and_ordinal_strategy(max_entries: usize) -> impl Strategy<Value = (FlatFile, u32)> {
    (
        header_strategy(),
        prop::collection::vec(entry_text_strategy(), 1..=max_entries.max(1)),
    )
        .prop_flat_map(|(header, entries)| {
            let count = entries.len() as u32;
            (Just(FlatFile::new(header, entries)), 1..=count)
        })
}

/// Strategy for generating `count` entries that all have `width` bytes.
pub fn fixed_width_entries_strategy(
    width: usize,
    count: std::ops::Range<usize>,
) -> impl Strategy<Value = Vec<String>> {
    let pattern = format!("[A-Z0-9]{{{width}}}");
    prop::collection::vec(
        prop::string::string_regex(&pattern).expect("Invalid regex"),
        count,
    )
}
