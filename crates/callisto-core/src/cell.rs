//! Cell identity and source descriptions.
//!
//! A notebook cell becomes an addressable module under the id grammar
//! `<notebookPath>.<ext>?cellId=<21-char-id>.<codeExt>`. Anything that does
//! not match the grammar is an ordinary dependency module, never a cell.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Length of the generated cell id segment (nanoid default).
pub const CELL_ID_LEN: usize = 21;

/// Code extensions the engine recognizes as cell modules.
pub const CODE_EXTENSIONS: [&str; 4] = ["ts", "tsx", "js", "jsx"];

/// Source language of a submitted cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Typescript,
    TypescriptReact,
    Javascript,
    JavascriptReact,
}

impl Language {
    /// Parse the language tag a client submits with `executeCell`.
    ///
    /// Unrecognized tags are a hard error, surfaced at the RPC boundary
    /// before any execution notification is emitted.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "typescript" => Ok(Self::Typescript),
            "typescriptreact" => Ok(Self::TypescriptReact),
            "javascript" => Ok(Self::Javascript),
            "javascriptreact" => Ok(Self::JavascriptReact),
            _ => Err(Error::UnknownLanguage(tag.to_string())),
        }
    }

    /// File extension used for the cell's module id.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Typescript => "ts",
            Self::TypescriptReact => "tsx",
            Self::Javascript => "js",
            Self::JavascriptReact => "jsx",
        }
    }
}

/// Where a rewritten cell module is meant to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecKind {
    /// Evaluated by a browser-side runtime; the server only brokers a pointer.
    Client,
    /// Evaluated by the server-side module runtime.
    Server,
}

/// A rewritten cell module body plus its execution target.
///
/// Owned by the cell registry and replaced wholesale whenever the cell is
/// re-submitted, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescription {
    /// Rewritten module body.
    pub code: String,
    /// Execution target.
    #[serde(rename = "type")]
    pub kind: ExecKind,
}

/// Identity of one cell module: notebook path, cell id, and code extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellRef {
    /// Notebook path (including the notebook's own extension).
    pub path: String,
    /// 21-character cell id within the notebook.
    pub cell_id: String,
    /// Code extension (`ts`, `tsx`, `js`, or `jsx`).
    pub ext: String,
}

impl CellRef {
    /// Build the cell ref for a submitted cell.
    pub fn new(path: impl Into<String>, cell_id: impl Into<String>, language: Language) -> Self {
        Self {
            path: path.into(),
            cell_id: cell_id.into(),
            ext: language.extension().to_string(),
        }
    }

    /// The module id this cell is registered and served under.
    pub fn module_id(&self) -> String {
        format!("{}?cellId={}.{}", self.path, self.cell_id, self.ext)
    }

    /// Parse a module id against the cell grammar.
    ///
    /// A trailing `&t=<digits>` cache-busting query (dev-server timestamp)
    /// is stripped before matching. Returns `None` for ids that are plain
    /// dependency modules.
    pub fn parse(module_id: &str) -> Option<Self> {
        let id = strip_timestamp(module_id);
        let (path, rest) = id.split_once("?cellId=")?;

        // The notebook path must carry an extension of its own.
        let (_, notebook_ext) = path.rsplit_once('.')?;
        if notebook_ext.is_empty() || notebook_ext.contains('/') {
            return None;
        }

        let (cell_id, ext) = rest.rsplit_once('.')?;
        if cell_id.len() != CELL_ID_LEN || !cell_id.chars().all(is_id_char) {
            return None;
        }
        if !CODE_EXTENSIONS.contains(&ext) {
            return None;
        }

        Some(Self {
            path: path.to_string(),
            cell_id: cell_id.to_string(),
            ext: ext.to_string(),
        })
    }
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.path, self.cell_id)
    }
}

/// Characters nanoid draws cell ids from.
fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Strip a trailing `&t=<digits>` query appended by the dev server for
/// cache busting on HTTP fetches.
fn strip_timestamp(id: &str) -> &str {
    if let Some((head, tail)) = id.rsplit_once("&t=")
        && !tail.is_empty()
        && tail.bytes().all(|b| b.is_ascii_digit())
    {
        head
    } else {
        id
    }
}
