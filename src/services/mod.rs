pub mod compositor;
pub mod introspection;
pub mod listeners;
pub mod manifest_parser;
pub mod process_manager;
pub mod project_store;

pub use compositor::*;
pub use introspection::*;
pub use manifest_parser::*;
pub use process_manager::*;
pub use project_store::*;
