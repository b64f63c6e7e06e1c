use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors raised while loading or querying the type registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("registry root must be a JSON object keyed by hex type id")]
    NotAnObject,

    #[error("unknown type id {0:#010x}")]
    UnknownTypeId(u32),

    #[error("unknown type name `{0}`")]
    UnknownTypeName(String),
}
