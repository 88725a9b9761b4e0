//! File watcher for source changes under the project root.
//!
//! Change events feed the invalidation engine so editing a module re-runs
//! the cells that transitively import it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use callisto_core::cell::CODE_EXTENSIONS;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer, notify::RecursiveMode};
use tokio::sync::mpsc;

use crate::error::{ServerError, ServerResult};

/// File change event.
#[derive(Debug, Clone)]
pub enum FileEvent {
    /// File was modified or created.
    Changed(PathBuf),
    /// File was removed.
    Removed(PathBuf),
}

/// Debounced watcher over the project root.
pub struct FileWatcher {
    /// Debouncer handle (kept alive to maintain watcher).
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    /// Receiver for file events.
    rx: mpsc::UnboundedReceiver<FileEvent>,
}

impl FileWatcher {
    /// Watch every source module under `root`, recursively.
    pub fn new(root: impl AsRef<Path>) -> ServerResult<Self> {
        let root = root.as_ref().to_path_buf();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(
            Duration::from_millis(200),
            move |result: DebounceEventResult| {
                if let Ok(events) = result {
                    for event in events {
                        let path = &event.path;
                        if !is_source_module(path) {
                            continue;
                        }
                        let file_event = if path.exists() {
                            FileEvent::Changed(path.clone())
                        } else {
                            FileEvent::Removed(path.clone())
                        };
                        let _ = tx.send(file_event);
                    }
                }
            },
        )
        .map_err(|e| ServerError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| ServerError::Watch(e.to_string()))?;

        Ok(Self {
            _debouncer: debouncer,
            rx,
        })
    }

    /// Receive the next file event.
    pub async fn recv(&mut self) -> Option<FileEvent> {
        self.rx.recv().await
    }
}

/// Whether a path looks like a module the dependency graph can know about.
fn is_source_module(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CODE_EXTENSIONS.contains(&ext) || ext == "mjs" || ext == "cjs")
}
