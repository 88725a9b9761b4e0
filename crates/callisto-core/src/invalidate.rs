//! Dependency-aware invalidation.
//!
//! Given a changed module id, every transitively-dependent module must be
//! evicted from the runtime's cache, and every such module that is a
//! notebook cell must be re-executed.

use std::path::{Component, Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::cell::CellRef;
use crate::runtime::ModuleGraph;

/// Walk the reverse dependency edges from `module_id`, evicting every
/// reached module and collecting the cells among them as execution
/// triggers, in visit order.
///
/// The walk keeps an explicit per-pass visited set, so it terminates on
/// cyclic import graphs, does O(edges) work on diamonds, and invalidates
/// each module at most once per pass. Triggers are collected rather than
/// executed here: a failing execution must not stop the walk.
pub fn invalidation_pass<G: ModuleGraph + ?Sized>(
    graph: &G,
    project_root: &Path,
    module_id: &str,
) -> Vec<CellRef> {
    let mut visited: FxHashSet<String> = FxHashSet::default();
    let mut triggers = Vec::new();
    let mut stack = vec![module_id.to_string()];

    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }

        tracing::trace!(module = %id, "evicting module");
        graph.invalidate(&id);

        if let Some(cell) = CellRef::parse(&id) {
            triggers.push(cell);
        }

        for importer in graph.importers(&id) {
            stack.push(resolve_module_id(project_root, &importer));
        }
    }

    triggers
}

/// Resolve a possibly root-relative importer id to an absolute module id.
pub fn resolve_module_id(project_root: &Path, id: &str) -> String {
    if id.starts_with("./") || id.starts_with("../") {
        normalize_lexically(&project_root.join(id))
            .to_string_lossy()
            .into_owned()
    } else {
        id.to_string()
    }
}

/// Fold `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
