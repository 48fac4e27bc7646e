pub mod process_killer;
pub mod shell;

pub use process_killer::*;
pub use shell::*;
