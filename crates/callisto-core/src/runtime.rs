//! Collaborator traits for the external dev-server.
//!
//! The bundler that resolves, transforms, and evaluates modules lives
//! outside this engine. It appears here only as trait seams: a readable
//! dependency graph with an invalidate-by-id operation, an async module
//! evaluator, and an opaque source rewriter.

use async_trait::async_trait;

use crate::cell::{ExecKind, Language, SourceDescription};
use crate::error::Result;
use crate::output::{EvalError, EvalValue};

/// Read access to the external module dependency graph.
pub trait ModuleGraph: Send + Sync {
    /// Modules that import `id` (reverse dependency edges). Ids may be
    /// reported relative to the project root.
    fn importers(&self, id: &str) -> Vec<String>;

    /// Forget the cached module and its evaluated state so the next read
    /// fetches fresh source. Unknown ids are a no-op.
    fn invalidate(&self, id: &str);
}

/// The external runtime that evaluates server-side modules.
///
/// A promise-valued default export is awaited by the runtime itself; the
/// engine only ever sees the settled value or the captured failure.
#[async_trait]
pub trait ModuleRuntime: ModuleGraph {
    /// Evaluate the module under `id` and report its default export.
    async fn evaluate(&self, id: &str) -> std::result::Result<EvalValue, EvalError>;
}

/// Rewrites raw cell source into a module body.
///
/// Import/export shimming and language-specific lowering are owned by the
/// dev-server; the engine consumes the result as an opaque description.
pub trait Rewriter: Send + Sync {
    /// Rewrite one cell's source.
    fn rewrite(&self, code: &str, language: Language, cell_id: &str) -> Result<SourceDescription>;
}

/// Rewriter that passes source through untouched as a server-side module.
///
/// Useful for embedders whose runtime accepts raw module bodies, and for
/// tests.
#[derive(Debug, Default)]
pub struct PassthroughRewriter;

impl Rewriter for PassthroughRewriter {
    fn rewrite(&self, code: &str, _language: Language, _cell_id: &str) -> Result<SourceDescription> {
        Ok(SourceDescription {
            code: code.to_string(),
            kind: ExecKind::Server,
        })
    }
}
