//! Operations exposed to an outer layer (HTTP, IPC or the CLI). Each returns a
//! single result or a [`SupervisorError`](crate::error::SupervisorError).

pub mod process;
pub mod project;
pub mod system;

pub use process::*;
pub use project::*;
pub use system::*;
