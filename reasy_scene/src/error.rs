use reasy_types::RegistryError;
use thiserror::Error;

/// Result type alias for heap and container-tree operations
pub type Result<T> = std::result::Result<T, HeapError>;

/// Errors raised by heap mutations. Every variant is returned before anything is mutated.
#[derive(Error, Debug)]
pub enum HeapError {
    #[error("type lookup failed: {0}")]
    TypeLookup(#[from] RegistryError),

    #[error("index {0} is out of range")]
    InvalidIndex(u32),

    #[error("slot {0} holds no instance")]
    EmptySlot(u32),

    #[error("instance {0} is not in the object table")]
    NotARoot(u32),

    #[error("type `{type_name}` has no field `{field}`")]
    UnknownField { type_name: String, field: String },

    #[error("field `{field}` cannot hold a {expected} reference")]
    FieldKindMismatch { field: String, expected: &'static str },

    #[error("array `{field}` has no element {element}")]
    ElementOutOfRange { field: String, element: usize },

    #[error("no embedded container at `{0}`")]
    UnknownContainer(String),

    #[error("container at `{0}` is opaque and cannot be edited")]
    OpaqueContainer(String),
}
