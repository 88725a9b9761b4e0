//! End-to-end execution protocol tests over a scripted runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use callisto_core::{
    CLIENT_CELL_MIME, CellRef, EvalError, EvalValue, ExecKind, Language, MemoryGraph, ModuleGraph,
    ModuleRuntime, NOTEBOOK_ERROR_MIME, PassthroughRewriter, Result, Rewriter, SourceDescription,
};
use callisto_server::protocol::ServerFrame;
use callisto_server::{ExecutionEngine, FileEvent, FileWatcher, SessionManager};
use rustc_hash::FxHashMap;
use serde_json::json;

const CELL_A: &str = "a1b2c3d4e5f6g7h8i9j0k";
const CELL_B: &str = "b1b2c3d4e5f6g7h8i9j0k";

/// Runtime whose evaluations are scripted per module id.
struct ScriptedRuntime {
    graph: MemoryGraph,
    results: Mutex<FxHashMap<String, std::result::Result<EvalValue, EvalError>>>,
    eval_delay: Duration,
}

impl ScriptedRuntime {
    fn new() -> Self {
        Self {
            graph: MemoryGraph::new(),
            results: Mutex::new(FxHashMap::default()),
            eval_delay: Duration::ZERO,
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            eval_delay: delay,
            ..Self::new()
        }
    }

    fn script(&self, id: &str, result: std::result::Result<EvalValue, EvalError>) {
        self.results.lock().unwrap().insert(id.to_string(), result);
    }
}

impl ModuleGraph for ScriptedRuntime {
    fn importers(&self, id: &str) -> Vec<String> {
        self.graph.importers(id)
    }

    fn invalidate(&self, id: &str) {
        self.graph.invalidate(id);
    }
}

#[async_trait]
impl ModuleRuntime for ScriptedRuntime {
    async fn evaluate(&self, id: &str) -> std::result::Result<EvalValue, EvalError> {
        // Snapshot the scripted result before the delay so each run
        // reflects the script current at its start.
        let result = self
            .results
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or(Ok(EvalValue::Undefined));
        if !self.eval_delay.is_zero() {
            tokio::time::sleep(self.eval_delay).await;
        }
        result
    }
}

/// Rewriter that tags every cell for browser-side execution.
struct ClientRewriter;

impl Rewriter for ClientRewriter {
    fn rewrite(&self, code: &str, _language: Language, _cell_id: &str) -> Result<SourceDescription> {
        Ok(SourceDescription {
            code: code.to_string(),
            kind: ExecKind::Client,
        })
    }
}

type Recorded = Arc<Mutex<Vec<ServerFrame>>>;

/// Attach a recording client whose writer task delivers every frame.
fn attach_client(sessions: &SessionManager) -> Recorded {
    let (_session, mut rx) = sessions.register();
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = recorded.clone();
    tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            sink.lock().unwrap().push(outbound.frame);
            if let Some(delivered) = outbound.delivered {
                let _ = delivered.send(true);
            }
        }
    });
    recorded
}

fn build_engine(runtime: Arc<ScriptedRuntime>, rewriter: Arc<dyn Rewriter>) -> Arc<ExecutionEngine> {
    Arc::new(ExecutionEngine::new(
        runtime,
        rewriter,
        Arc::new(SessionManager::new()),
        "/proj",
        "http://127.0.0.1:3000",
    ))
}

/// Poll the recorded frames until the predicate holds.
async fn wait_for(recorded: &Recorded, pred: impl Fn(&[ServerFrame]) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if pred(&recorded.lock().unwrap()) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for frames: {:?}",
            recorded.lock().unwrap()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn ends_for<'a>(frames: &'a [ServerFrame], cell: &str) -> Vec<&'a ServerFrame> {
    frames
        .iter()
        .filter(|f| matches!(f, ServerFrame::EndCellExecution { cell_id, .. } if cell_id == cell))
        .collect()
}

fn end_count(frames: &[ServerFrame], cell: &str) -> usize {
    ends_for(frames, cell).len()
}

#[tokio::test]
async fn test_primitive_result_start_then_end() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let module_id = CellRef::new("nb.vnb", CELL_A, Language::Javascript).module_id();
    runtime.script(&module_id, Ok(EvalValue::Primitive(json!(42))));

    let engine = build_engine(runtime, Arc::new(PassthroughRewriter));
    let recorded = attach_client(engine.sessions());

    engine
        .execute_cell("nb.vnb", CELL_A, "javascript", "42")
        .unwrap();
    wait_for(&recorded, |frames| end_count(frames, CELL_A) == 1).await;

    let frames = recorded.lock().unwrap();
    assert_eq!(frames.len(), 2);
    assert!(matches!(
        &frames[0],
        ServerFrame::StartCellExecution { path, cell_id, .. }
            if path == "nb.vnb" && cell_id == CELL_A
    ));
    match &frames[1] {
        ServerFrame::EndCellExecution { cell_output, .. } => {
            assert_eq!(cell_output.items.len(), 1);
            assert_eq!(cell_output.items[0].mime, "text/x-javascript");
            assert_eq!(cell_output.items[0].data, b"42");
        }
        other => panic!("expected end frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_language_rejected_before_notifications() {
    let engine = build_engine(Arc::new(ScriptedRuntime::new()), Arc::new(PassthroughRewriter));
    let recorded = attach_client(engine.sessions());

    let result = engine.execute_cell("nb.vnb", CELL_A, "python", "print(1)");
    assert!(result.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(recorded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_evaluation_failure_is_notebook_output() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let module_id = CellRef::new("nb.vnb", CELL_A, Language::Javascript).module_id();
    runtime.script(&module_id, Err(EvalError::new("Error", "boom")));

    let engine = build_engine(runtime, Arc::new(PassthroughRewriter));
    let recorded = attach_client(engine.sessions());

    engine
        .execute_cell("nb.vnb", CELL_A, "javascript", "throw new Error('boom')")
        .unwrap();
    wait_for(&recorded, |frames| end_count(frames, CELL_A) == 1).await;

    let frames = recorded.lock().unwrap();
    match ends_for(&frames, CELL_A)[0] {
        ServerFrame::EndCellExecution { cell_output, .. } => {
            assert_eq!(cell_output.items[0].mime, NOTEBOOK_ERROR_MIME);
            let body = String::from_utf8(cell_output.items[0].data.clone()).unwrap();
            assert!(body.contains("\"message\": \"boom\""));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_client_cell_defers_to_browser_runtime() {
    let engine = build_engine(Arc::new(ScriptedRuntime::new()), Arc::new(ClientRewriter));
    let recorded = attach_client(engine.sessions());

    engine
        .execute_cell("nb.vnb", CELL_A, "typescriptreact", "<App/>")
        .unwrap();
    wait_for(&recorded, |frames| end_count(frames, CELL_A) == 1).await;

    let frames = recorded.lock().unwrap();
    match ends_for(&frames, CELL_A)[0] {
        ServerFrame::EndCellExecution { cell_output, .. } => {
            assert_eq!(cell_output.items[0].mime, CLIENT_CELL_MIME);
            let payload: serde_json::Value =
                serde_json::from_slice(&cell_output.items[0].data).unwrap();
            assert_eq!(payload["origin"], "http://127.0.0.1:3000");
            assert_eq!(
                payload["id"],
                format!("nb.vnb?cellId={}.tsx", CELL_A)
            );
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_shared_dependency_reruns_both_cells() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let cell_a = CellRef::new("nb.vnb", CELL_A, Language::Javascript).module_id();
    let cell_b = CellRef::new("nb.vnb", CELL_B, Language::Javascript).module_id();
    runtime.graph.add_import(&cell_a, "lib.js");
    runtime.graph.add_import(&cell_b, "lib.js");
    runtime.script(&cell_a, Ok(EvalValue::Primitive(json!(1))));
    runtime.script(&cell_b, Ok(EvalValue::Primitive(json!(2))));

    let engine = build_engine(runtime, Arc::new(PassthroughRewriter));
    let recorded = attach_client(engine.sessions());

    engine.invalidate_module("lib.js");
    wait_for(&recorded, |frames| {
        end_count(frames, CELL_A) == 1 && end_count(frames, CELL_B) == 1
    })
    .await;

    // Each cell got exactly one start/end pair, start before end.
    let frames = recorded.lock().unwrap();
    for cell in [CELL_A, CELL_B] {
        let start = frames.iter().position(
            |f| matches!(f, ServerFrame::StartCellExecution { cell_id, .. } if cell_id == cell),
        );
        let end = frames.iter().position(
            |f| matches!(f, ServerFrame::EndCellExecution { cell_id, .. } if cell_id == cell),
        );
        assert!(start.unwrap() < end.unwrap());
    }
    assert_eq!(frames.len(), 4);
}

#[tokio::test]
async fn test_overlapping_runs_of_one_cell_are_serialized() {
    let runtime = Arc::new(ScriptedRuntime::with_delay(Duration::from_millis(50)));
    let module_id = CellRef::new("nb.vnb", CELL_A, Language::Javascript).module_id();
    runtime.script(&module_id, Ok(EvalValue::Primitive(json!(1))));

    let engine = build_engine(runtime.clone(), Arc::new(PassthroughRewriter));
    let recorded = attach_client(engine.sessions());

    engine
        .execute_cell("nb.vnb", CELL_A, "javascript", "1")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Re-submit while the first run is still evaluating.
    runtime.script(&module_id, Ok(EvalValue::Primitive(json!(2))));
    engine
        .execute_cell("nb.vnb", CELL_A, "javascript", "2")
        .unwrap();

    wait_for(&recorded, |frames| end_count(frames, CELL_A) == 2).await;

    // Runs never interleave: start, end, start, end.
    let frames = recorded.lock().unwrap();
    let kinds: Vec<&str> = frames
        .iter()
        .map(|f| match f {
            ServerFrame::StartCellExecution { .. } => "start",
            ServerFrame::EndCellExecution { .. } => "end",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, ["start", "end", "start", "end"]);

    // The queued run reflects the latest submission.
    match ends_for(&frames, CELL_A)[1] {
        ServerFrame::EndCellExecution { cell_output, .. } => {
            assert_eq!(cell_output.items[0].data, b"2");
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_undefined_result_yields_empty_output() {
    let engine = build_engine(Arc::new(ScriptedRuntime::new()), Arc::new(PassthroughRewriter));
    let recorded = attach_client(engine.sessions());

    engine
        .execute_cell("nb.vnb", CELL_A, "javascript", "void 0")
        .unwrap();
    wait_for(&recorded, |frames| end_count(frames, CELL_A) == 1).await;

    let frames = recorded.lock().unwrap();
    match ends_for(&frames, CELL_A)[0] {
        ServerFrame::EndCellExecution { cell_output, .. } => {
            assert!(cell_output.items.is_empty());
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_unresponsive_peer_does_not_wedge_execution() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let module_id = CellRef::new("nb.vnb", CELL_A, Language::Javascript).module_id();
    runtime.script(&module_id, Ok(EvalValue::Primitive(json!(42))));

    let engine = build_engine(runtime, Arc::new(PassthroughRewriter));
    let recorded = attach_client(engine.sessions());

    // Second session whose connection is gone: its outbox has no writer.
    // Delivery depends on the writer task, not on the remote client, so
    // this session must not hold up anyone else's run.
    let (_stalled, stalled_rx) = engine.sessions().register();
    drop(stalled_rx);

    engine
        .execute_cell("nb.vnb", CELL_A, "javascript", "42")
        .unwrap();
    wait_for(&recorded, |frames| end_count(frames, CELL_A) == 1).await;

    // The healthy session saw the full run; the dead one was pruned.
    let frames = recorded.lock().unwrap();
    assert!(matches!(&frames[0], ServerFrame::StartCellExecution { .. }));
    assert!(matches!(&frames[1], ServerFrame::EndCellExecution { .. }));
    assert_eq!(engine.sessions().len(), 1);
}

#[tokio::test]
async fn test_file_change_reruns_dependent_cell() {
    let temp = tempfile::TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let lib_path = root.join("lib.js");
    std::fs::write(&lib_path, "export const x = 1").unwrap();

    let runtime = Arc::new(ScriptedRuntime::new());
    let module_id = CellRef::new("nb.vnb", CELL_A, Language::Javascript).module_id();
    runtime
        .graph
        .add_import(&module_id, &lib_path.to_string_lossy());
    runtime.script(&module_id, Ok(EvalValue::Primitive(json!(1))));

    let engine = build_engine(runtime, Arc::new(PassthroughRewriter));
    let recorded = attach_client(engine.sessions());

    // Same wiring as serve(): watch events feed the invalidation engine.
    let mut watcher = FileWatcher::new(&root).unwrap();
    let watch_engine = engine.clone();
    tokio::spawn(async move {
        while let Some(event) = watcher.recv().await {
            match event {
                FileEvent::Changed(path) | FileEvent::Removed(path) => {
                    watch_engine.invalidate_module(&path.to_string_lossy());
                }
            }
        }
    });

    // Let the watcher arm before editing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(&lib_path, "export const x = 2").unwrap();

    wait_for(&recorded, |frames| end_count(frames, CELL_A) == 1).await;

    let frames = recorded.lock().unwrap();
    assert!(matches!(
        &frames[0],
        ServerFrame::StartCellExecution { cell_id, .. } if cell_id == CELL_A
    ));
}
