pub mod process_info;
pub mod project;
pub mod runtime;

pub use process_info::*;
pub use project::*;
pub use runtime::*;
