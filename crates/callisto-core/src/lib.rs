//! Core engine for the Callisto reactive notebook backend.
//!
//! This crate provides:
//! - Cell identity: the module id grammar and language mapping
//! - Registry of live cell sources
//! - Dependency-aware invalidation over the external module graph
//! - Output encoding to the notebook wire format
//! - Trait seams for the external dev-server (graph, runtime, rewriter)

pub mod cell;
pub mod error;
pub mod graph;
pub mod invalidate;
pub mod output;
pub mod registry;
pub mod runtime;

pub use cell::{CellRef, ExecKind, Language, SourceDescription};
pub use error::{Error, Result};
pub use graph::MemoryGraph;
pub use invalidate::{invalidation_pass, resolve_module_id};
pub use output::{
    CLIENT_CELL_MIME, CellOutput, EvalError, EvalValue, NOTEBOOK_ERROR_MIME, OutputItem, encode,
};
pub use registry::CellRegistry;
pub use runtime::{ModuleGraph, ModuleRuntime, PassthroughRewriter, Rewriter};
