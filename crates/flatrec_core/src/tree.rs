//! Directory tree walk.

use crate::error::CoreResult;
use crate::session::FlatStore;
use flatrec_storage::{join_path, DateTime, StorageResult, Volume};
use std::fmt::Write as _;

/// One file or directory below the walked root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Nesting level; direct children of the root are at depth 0.
    pub depth: usize,
    /// Path relative to the volume root.
    pub path: String,
    /// Last path component.
    pub name: String,
    /// Whether this node is a directory.
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, if the volume tracks it.
    pub modified: Option<DateTime>,
}

impl TreeNode {
    /// Renders the node as one indented listing line.
    #[must_use]
    pub fn render_line(&self) -> String {
        let mut line = "  ".repeat(self.depth);
        if self.is_dir {
            let _ = write!(line, "{}/", self.name);
        } else {
            let _ = write!(line, "{} ({} bytes)", self.name, self.size);
        }
        if let Some(modified) = self.modified {
            let _ = write!(line, " {modified}");
        }
        line
    }
}

/// Walks everything below `root` in sorted pre-order: each directory
/// comes before its children. The root itself is not included.
///
/// Uses an explicit stack, so arbitrarily deep trees cannot exhaust the
/// call stack.
///
/// # Errors
///
/// Returns the first listing error.
pub fn walk(volume: &dyn Volume, root: &str) -> StorageResult<Vec<TreeNode>> {
    let mut nodes = Vec::new();
    let mut pending = Vec::new();
    push_children(volume, root.trim_matches('/'), 0, &mut pending)?;

    while let Some(node) = pending.pop() {
        if node.is_dir {
            push_children(volume, &node.path, node.depth + 1, &mut pending)?;
        }
        nodes.push(node);
    }
    Ok(nodes)
}

/// Pushes the children of `dir` in reverse so they pop in listing order.
fn push_children(
    volume: &dyn Volume,
    dir: &str,
    depth: usize,
    pending: &mut Vec<TreeNode>,
) -> StorageResult<()> {
    let children = volume.list_dir(dir)?;
    pending.extend(children.into_iter().rev().map(|child| TreeNode {
        depth,
        path: join_path(dir, &child.name),
        name: child.name,
        is_dir: child.is_dir,
        size: child.size,
        modified: child.modified,
    }));
    Ok(())
}

impl FlatStore {
    /// Lists everything below `root` on the volume (`""` is the volume root).
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotInitialized`] or
    /// [`crate::CoreError::Storage`] if a directory cannot be listed.
    pub fn tree(&mut self, root: &str) -> CoreResult<Vec<TreeNode>> {
        self.ensure_ready()?;
        Ok(walk(self.volume.as_ref(), root)?)
    }
}
