//! Output encoding for cell execution results.
//!
//! Evaluation produces an explicit tagged value rather than a duck-typed
//! object, so classification is decided by the producing runtime and the
//! encoder stays a pure function from value to `(mime, data)`.

use serde::{Deserialize, Serialize};

/// Mime type for captured evaluation failures.
pub const NOTEBOOK_ERROR_MIME: &str = "application/vnd.code.notebook.error";

/// Mime type for client-executed cell pointers.
pub const CLIENT_CELL_MIME: &str = "application/x-vitale";

/// One `(mime, data)` pair of a cell output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputItem {
    /// Raw bytes (UTF-8 for every mime the engine produces itself).
    pub data: Vec<u8>,
    /// Mime type of `data`.
    pub mime: String,
}

impl OutputItem {
    /// Build an item from a mime type and a UTF-8 payload.
    pub fn text(mime: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            data: data.into().into_bytes(),
            mime: mime.into(),
        }
    }
}

/// Output of one cell run; zero items when the run produced no
/// representable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutput {
    /// Output items (zero or one in practice, the shape permits more).
    pub items: Vec<OutputItem>,
}

impl CellOutput {
    /// An output with no items.
    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }
}

impl From<Option<OutputItem>> for CellOutput {
    fn from(item: Option<OutputItem>) -> Self {
        Self {
            items: item.into_iter().collect(),
        }
    }
}

/// Result value of a server-side module evaluation, classified by the
/// runtime that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvalValue {
    /// The module's default export resolved to no representable value.
    Undefined,
    /// A structured result that names its own mime type.
    Tagged { mime: String, data: String },
    /// A DOM-like result carrying serialized markup (`outerHTML`).
    Markup(String),
    /// A generic object result.
    Object(serde_json::Value),
    /// A primitive result.
    Primitive(serde_json::Value),
}

/// Captured evaluation failure.
///
/// Cell failures are notebook output, not transport errors: they travel in
/// a normal `endCellExecution` under [`NOTEBOOK_ERROR_MIME`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalError {
    /// Error class name (e.g. `Error`, `TypeError`).
    pub name: String,
    /// Error message.
    pub message: String,
    /// Stack trace, when the runtime captured one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl EvalError {
    /// Build a failure with no stack trace.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Encode the failure as a notebook error item.
    pub fn to_item(&self) -> OutputItem {
        let data = serde_json::to_vec_pretty(self)
            .unwrap_or_else(|_| self.message.clone().into_bytes());
        OutputItem {
            data,
            mime: NOTEBOOK_ERROR_MIME.to_string(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Encode a successful evaluation result, in strict precedence order:
/// self-tagged values verbatim, SVG markup, other markup as HTML, objects
/// as JSON, primitives as JavaScript source text.
pub fn encode(value: &EvalValue) -> Option<OutputItem> {
    match value {
        EvalValue::Undefined => None,
        EvalValue::Tagged { mime, data } => Some(OutputItem::text(mime.clone(), data.clone())),
        EvalValue::Markup(html) if html.starts_with("<svg") => {
            Some(OutputItem::text("image/svg+xml", html.clone()))
        }
        EvalValue::Markup(html) => Some(OutputItem::text("text/html", html.clone())),
        EvalValue::Object(v) => Some(OutputItem::text("application/json", v.to_string())),
        EvalValue::Primitive(v) => Some(OutputItem::text("text/x-javascript", v.to_string())),
    }
}
