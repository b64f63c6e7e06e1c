#![forbid(unsafe_code)]

pub mod compat;
pub mod error;
pub mod extract;
pub mod graph;
pub mod guid;
pub mod paste;
pub mod store;

pub use compat::*;
pub use error::*;
pub use extract::*;
pub use graph::*;
pub use guid::*;
pub use paste::*;
pub use store::*;
