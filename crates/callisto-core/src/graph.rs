//! In-memory module graph.
//!
//! A petgraph-backed [`ModuleGraph`] for embedders that run without a live
//! dev-server, and for the test suites. Edges point importer → imported.

use std::sync::Mutex;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

use crate::runtime::ModuleGraph;

#[derive(Default)]
struct GraphInner {
    graph: DiGraph<String, ()>,
    nodes: FxHashMap<String, NodeIndex>,
    invalidated: Vec<String>,
}

impl GraphInner {
    fn node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.nodes.insert(id.to_string(), idx);
        idx
    }
}

/// In-memory dependency graph with interior mutability.
///
/// Invalidated ids are recorded so callers can observe eviction order.
#[derive(Default)]
pub struct MemoryGraph {
    inner: Mutex<GraphInner>,
}

impl MemoryGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module with no edges.
    pub fn add_module(&self, id: &str) {
        let mut inner = self.inner.lock().expect("graph lock poisoned");
        inner.node(id);
    }

    /// Record that `importer` imports `imported`.
    pub fn add_import(&self, importer: &str, imported: &str) {
        let mut inner = self.inner.lock().expect("graph lock poisoned");
        let from = inner.node(importer);
        let to = inner.node(imported);
        inner.graph.update_edge(from, to, ());
    }

    /// Ids invalidated so far, in eviction order.
    pub fn invalidated(&self) -> Vec<String> {
        self.inner.lock().expect("graph lock poisoned").invalidated.clone()
    }

    /// Forget recorded invalidations.
    pub fn clear_invalidated(&self) {
        self.inner.lock().expect("graph lock poisoned").invalidated.clear();
    }
}

impl ModuleGraph for MemoryGraph {
    fn importers(&self, id: &str) -> Vec<String> {
        let inner = self.inner.lock().expect("graph lock poisoned");
        let Some(&idx) = inner.nodes.get(id) else {
            return Vec::new();
        };
        inner
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| inner.graph[n].clone())
            .collect()
    }

    fn invalidate(&self, id: &str) {
        self.inner
            .lock()
            .expect("graph lock poisoned")
            .invalidated
            .push(id.to_string());
    }
}
