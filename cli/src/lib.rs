pub mod commands;
pub mod context;
pub mod format;
pub mod logging;
pub mod repl;

pub use context::CliContext;
pub use repl::readline;
