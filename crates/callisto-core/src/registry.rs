//! Registry of live cell sources.

use rustc_hash::FxHashMap;

use crate::cell::SourceDescription;

/// Holds the current rewritten source of every live cell, keyed by module id.
///
/// Entries are never evicted; they live until overwritten or the process
/// ends. Replacement is atomic from the perspective of subsequent reads: a
/// run that resolves its source after a replacement sees only the new code.
#[derive(Debug, Default)]
pub struct CellRegistry {
    entries: FxHashMap<String, SourceDescription>,
}

impl CellRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the source for a module id.
    ///
    /// Returns the previous description when this replaced an existing
    /// entry; the caller is responsible for invalidating any module the
    /// runtime cached under this id so the next read fetches fresh code.
    pub fn set(&mut self, id: impl Into<String>, description: SourceDescription) -> Option<SourceDescription> {
        self.entries.insert(id.into(), description)
    }

    /// Current source for a module id, if the id belongs to a live cell.
    pub fn get(&self, id: &str) -> Option<&SourceDescription> {
        self.entries.get(id)
    }

    /// Whether the id belongs to a live cell.
    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no cells.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ExecKind;

    fn desc(code: &str) -> SourceDescription {
        SourceDescription {
            code: code.to_string(),
            kind: ExecKind::Server,
        }
    }

    #[test]
    fn test_set_and_get() {
        let mut registry = CellRegistry::new();
        assert!(!registry.has("nb.vnb?cellId=x.js"));

        let replaced = registry.set("nb.vnb?cellId=x.js", desc("1 + 1"));
        assert!(replaced.is_none());
        assert!(registry.has("nb.vnb?cellId=x.js"));
        assert_eq!(registry.get("nb.vnb?cellId=x.js").unwrap().code, "1 + 1");
    }

    #[test]
    fn test_replace_returns_previous() {
        let mut registry = CellRegistry::new();
        registry.set("id", desc("old"));
        let replaced = registry.set("id", desc("new"));
        assert_eq!(replaced.unwrap().code, "old");
        assert_eq!(registry.get("id").unwrap().code, "new");
        assert_eq!(registry.len(), 1);
    }
}
