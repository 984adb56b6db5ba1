//! Archive and tree commands.

use super::Output;
use flatrec_core::FlatStore;
use serde::Serialize;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// One node of a tree listing.
#[derive(Debug, Serialize)]
pub struct NodeView {
    /// Path relative to the root.
    pub path: String,
    /// Whether the node is a directory.
    pub is_dir: bool,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

/// Archives every registered file.
pub fn archive(store: &mut FlatStore, out: &Output) -> CommandResult {
    let stamp = store.archive()?;
    out.emit(&serde_json::json!({ "archive": stamp }), |_| {
        println!("archived to {stamp}/");
    })
}

/// Restores the first archive taken after `after`.
pub fn restore(store: &mut FlatStore, out: &Output, after: u64) -> CommandResult {
    let stamp = store.restore(after)?;
    out.emit(&serde_json::json!({ "restored": stamp }), |_| {
        println!("restored archive {stamp}");
    })
}

/// Deletes archives older than `before` (0 deletes all).
pub fn prune(store: &mut FlatStore, out: &Output, before: u64) -> CommandResult {
    let removed = store.prune(before)?;
    out.emit(&serde_json::json!({ "removed": removed }), |_| {
        println!("removed {removed} archive(s)");
    })
}

/// Lists archive timestamps, oldest first.
pub fn archives(store: &mut FlatStore, out: &Output) -> CommandResult {
    let stamps = store.archives()?;
    out.emit(&stamps, |stamps| {
        for stamp in stamps {
            println!("{stamp}");
        }
    })
}

/// Prints the directory tree below `path`.
pub fn tree(store: &mut FlatStore, out: &Output, path: &str) -> CommandResult {
    let nodes = store.tree(path)?;
    let views: Vec<NodeView> = nodes
        .iter()
        .map(|node| NodeView {
            path: node.path.clone(),
            is_dir: node.is_dir,
            size: node.size,
            modified: node.modified.map(|m| m.to_string()),
        })
        .collect();

    out.emit(&views, |_| {
        for node in &nodes {
            println!("{}", node.render_line());
        }
    })
}
