use std::io;

use reasy_scene::HeapError;
use reasy_types::RegistryError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClipboardError>;

/// Clipboard failures. Copy and paste report these before the destination changes.
#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("type lookup failed: {0}")]
    TypeLookup(#[from] RegistryError),

    #[error(transparent)]
    Heap(#[from] HeapError),

    #[error("cannot paste `{source_type}` into `{target}`")]
    Incompatible { target: String, source_type: String },

    #[error("no insertion window for `{field}` of instance {owner}")]
    NoInsertionWindow { owner: u32, field: String },

    #[error("userdata at {0} is opaque and cannot be copied")]
    OpaqueContainer(u32),

    #[error("malformed object graph: {0}")]
    InvalidGraph(String),

    #[error("clipboard file error: {0}")]
    Io(#[from] io::Error),

    #[error("clipboard JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
