//! Entry read commands.

use super::Output;
use flatrec_core::{Entry, FileKind, FlatStore};
use serde::Serialize;
use std::collections::BTreeMap;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// One registered file.
#[derive(Debug, Serialize)]
pub struct FileView {
    /// Kebab-case kind.
    pub kind: String,
    /// File name on the volume.
    pub name: String,
    /// Fixed-width hint.
    pub fixed_width: bool,
    /// Size in bytes, if the file exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One entry.
#[derive(Debug, Serialize)]
pub struct EntryView {
    /// Entry ordinal (0 is the header).
    pub ordinal: u32,
    /// Byte offset of the entry.
    pub start: u64,
    /// Byte length including the delimiter.
    pub len: u64,
    /// Entry text.
    pub text: String,
}

impl From<Entry> for EntryView {
    fn from(entry: Entry) -> Self {
        Self {
            ordinal: entry.ordinal,
            start: entry.start,
            len: entry.len(),
            text: entry.text,
        }
    }
}

/// Lists the registry without opening (and so creating) any file.
pub fn files(store: &mut FlatStore, out: &Output) -> CommandResult {
    let sizes: BTreeMap<String, u64> = store
        .volume()
        .list_dir("")?
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .map(|entry| (entry.name, entry.size))
        .collect();

    let views: Vec<FileView> = store
        .registry()
        .iter()
        .map(|(kind, descriptor)| FileView {
            kind: kind.to_string(),
            name: descriptor.name.clone(),
            fixed_width: descriptor.fixed_width,
            size: sizes.get(&descriptor.name).copied(),
        })
        .collect();

    out.emit(&views, |views| {
        for view in views {
            let size = view
                .size
                .map_or_else(|| "missing".to_string(), |size| format!("{size} bytes"));
            let width = if view.fixed_width { " fixed" } else { "" };
            println!("{:<18} {:<22} {size}{width}", view.kind, view.name);
        }
    })
}

/// Prints a whole file.
pub fn cat(store: &mut FlatStore, out: &Output, kind: FileKind, escape: bool) -> CommandResult {
    let contents = store.render_file(kind, escape)?;
    out.emit(&contents, |contents| print!("{contents}"))
}

/// Prints one entry.
pub fn get(store: &mut FlatStore, out: &Output, kind: FileKind, ordinal: u32) -> CommandResult {
    let entry = store.get_entry(kind, ordinal)?;
    print_entry(out, entry, || format!("no entry {ordinal} in {kind}"))
}

/// Prints the last entry.
pub fn last(store: &mut FlatStore, out: &Output, kind: FileKind) -> CommandResult {
    let entry = store.last_entry(kind)?;
    print_entry(out, entry, || format!("{kind} has no entries"))
}

/// Prints the number of data entries.
pub fn count(store: &mut FlatStore, out: &Output, kind: FileKind) -> CommandResult {
    let count = store.count_entries(kind)?;
    out.emit(&serde_json::json!({ "kind": kind.as_str(), "count": count }), |_| {
        println!("{count}");
    })
}

/// Prints the entry holding the requested occurrence of `text`.
pub fn search(
    store: &mut FlatStore,
    out: &Output,
    kind: FileKind,
    text: &str,
    occurrence: u32,
) -> CommandResult {
    let entry = store.search(kind, text, occurrence)?;
    print_entry(out, entry, || {
        format!("occurrence {occurrence} of {text:?} not found in {kind}")
    })
}

/// Dumps a byte range, escaping control bytes in text mode.
pub fn read_bytes(
    store: &mut FlatStore,
    out: &Output,
    kind: FileKind,
    offset: u64,
    count: usize,
) -> CommandResult {
    let bytes = store.read_bytes(kind, offset, count)?;
    out.emit(&bytes, |bytes| {
        println!("{}", String::from_utf8_lossy(bytes).escape_debug());
    })
}

fn print_entry(
    out: &Output,
    entry: Option<Entry>,
    missing: impl FnOnce() -> String,
) -> CommandResult {
    match entry {
        Some(entry) => out.emit(&EntryView::from(entry), |view| println!("{}", view.text)),
        None => Err(missing().into()),
    }
}
