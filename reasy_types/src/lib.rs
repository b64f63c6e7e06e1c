pub mod error;
pub mod field;
pub mod registry;

pub use error::*;
pub use field::*;
pub use registry::*;
