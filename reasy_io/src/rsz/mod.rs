pub mod builder;
pub mod common;
pub(crate) mod fields;
pub mod parser;

pub use builder::{build, path_hash_of, refresh_path_hashes};
pub use parser::parse;
