pub mod id_manager;
pub mod ids;

pub use id_manager::*;
pub use ids::*;
