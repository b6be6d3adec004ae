//! CLI command handlers. Each command is in its own file.

mod get;
mod probe;
mod session;

pub use get::{run_get, GetArgs};
pub use probe::run_probe;
pub use session::run_session;
#[cfg(test)]
pub use session::{execute, SessionCommand, SessionLine};
