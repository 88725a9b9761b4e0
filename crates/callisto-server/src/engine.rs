//! Execution coordinator.
//!
//! Owns the cell registry and the per-cell admission gates, and drives the
//! start → evaluate → end protocol across all connected sessions. Module
//! evaluation itself is delegated to the external runtime behind the
//! [`ModuleRuntime`] trait.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use callisto_core::{
    CLIENT_CELL_MIME, CellOutput, CellRef, CellRegistry, ExecKind, Language, ModuleRuntime,
    OutputItem, Rewriter, encode, invalidation_pass,
};
use rustc_hash::FxHashMap;
use serde_json::json;

use crate::error::ServerResult;
use crate::session::SessionManager;

/// Coordinates cell registration, invalidation, and execution.
pub struct ExecutionEngine {
    /// Project root importer ids are resolved against.
    root: PathBuf,

    /// Externally reachable origin handed to client-executed cells.
    origin: String,

    /// Current source of every live cell.
    registry: Mutex<CellRegistry>,

    /// External module graph and evaluator.
    runtime: Arc<dyn ModuleRuntime>,

    /// Opaque cell-source rewriter.
    rewriter: Arc<dyn Rewriter>,

    /// Connected clients.
    sessions: Arc<SessionManager>,

    /// Admission gates, one per `(path, cellId)`.
    ///
    /// At most one run per cell is in flight; overlapping requests queue
    /// behind the in-flight run and re-read the registry once admitted, so
    /// a queued run always executes the latest submission.
    gates: Mutex<FxHashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl ExecutionEngine {
    /// Create an engine over the given collaborators.
    pub fn new(
        runtime: Arc<dyn ModuleRuntime>,
        rewriter: Arc<dyn Rewriter>,
        sessions: Arc<SessionManager>,
        project_root: impl AsRef<Path>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            root: project_root.as_ref().to_path_buf(),
            origin: origin.into(),
            registry: Mutex::new(CellRegistry::new()),
            runtime,
            rewriter,
            sessions,
            gates: Mutex::new(FxHashMap::default()),
        }
    }

    /// Session manager the engine broadcasts through.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Handle an `executeCell` request.
    ///
    /// Fails synchronously on an unknown language, before any notification
    /// is emitted. On success the rewritten source replaces the cell's
    /// registry entry, the runtime's cached module is forgotten, and every
    /// affected cell (this one included) is scheduled for re-execution.
    pub fn execute_cell(
        self: &Arc<Self>,
        path: &str,
        cell_id: &str,
        language_tag: &str,
        code: &str,
    ) -> ServerResult<()> {
        let language = Language::from_tag(language_tag)?;
        let cell = CellRef::new(path, cell_id, language);
        let module_id = cell.module_id();

        let description = self.rewriter.rewrite(code, language, cell_id)?;
        self.registry
            .lock()
            .expect("registry lock poisoned")
            .set(&module_id, description);

        // The invalidation pass evicts the runtime's cached module for this
        // id first, so the next read fetches the fresh source.
        self.invalidate_module(&module_id);
        Ok(())
    }

    /// Propagate an invalidation from `module_id` and schedule every
    /// affected cell for re-execution.
    ///
    /// Also the entry point for file-watch events. Execution is a trigger,
    /// not a blocking dependency: each cell runs in its own task and a
    /// failing run never stops the others.
    pub fn invalidate_module(self: &Arc<Self>, module_id: &str) {
        let triggers = invalidation_pass(self.runtime.as_ref(), &self.root, module_id);
        tracing::debug!(module_id, cells = triggers.len(), "invalidation pass");

        for cell in triggers {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.run_cell(cell).await;
            });
        }
    }

    /// Run one cell under its admission gate: broadcast start, evaluate,
    /// broadcast end.
    async fn run_cell(&self, cell: CellRef) {
        let gate = self.gate(&cell);
        let _admitted = gate.lock().await;

        self.sessions.start_execution(&cell.path, &cell.cell_id).await;
        let output = self.evaluate(&cell).await;
        self.sessions
            .end_execution(&cell.path, &cell.cell_id, output)
            .await;
    }

    /// Evaluate a cell into its normalized output. Never fails: evaluation
    /// errors are notebook output, not transport errors.
    async fn evaluate(&self, cell: &CellRef) -> CellOutput {
        let module_id = cell.module_id();

        // Read the registry after admission so the run reflects the code
        // current at its start.
        let kind = self
            .registry
            .lock()
            .expect("registry lock poisoned")
            .get(&module_id)
            .map(|d| d.kind)
            .unwrap_or(ExecKind::Server);

        match kind {
            ExecKind::Client => {
                // Defer to the browser-side runtime: the output is a
                // pointer to where the module can be loaded, not a value.
                let payload = json!({
                    "id": self.relative_id(&module_id),
                    "origin": self.origin,
                });
                CellOutput::from(Some(OutputItem::text(CLIENT_CELL_MIME, payload.to_string())))
            }
            ExecKind::Server => match self.runtime.evaluate(&module_id).await {
                Ok(value) => CellOutput::from(encode(&value)),
                Err(err) => {
                    tracing::debug!(cell = %cell, error = %err, "cell evaluation failed");
                    CellOutput::from(Some(err.to_item()))
                }
            },
        }
    }

    /// Admission gate for a cell, created on first use and kept for the
    /// life of the process (like registry entries).
    fn gate(&self, cell: &CellRef) -> Arc<tokio::sync::Mutex<()>> {
        self.gates
            .lock()
            .expect("gates lock poisoned")
            .entry((cell.path.clone(), cell.cell_id.clone()))
            .or_default()
            .clone()
    }

    /// Module id relative to the project root, as served to clients.
    fn relative_id(&self, module_id: &str) -> String {
        Path::new(module_id)
            .strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| module_id.to_string())
    }
}
